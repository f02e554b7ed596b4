use std::borrow;

use crate::kernels;
use crate::Error;

const TRACE: &str = include_str!("trace.wgsl");

// Source of the shader library with the workgroup size baked in.
// Fails if an entry point the tracer dispatches is absent
pub fn source(wg: u32) -> Result<wgpu::ShaderSource<'static>, Error> {
    let source = assemble(wg)?;

    Ok(wgpu::ShaderSource::Wgsl(borrow::Cow::Owned(source)))
}

fn assemble(wg: u32) -> Result<String, Error> {
    for kernel in kernels::Kernel::ALL {
        entry_point(TRACE, kernel)?;
    }

    Ok(TRACE.replace(
        "@workgroup_size(16, 16, 1)",
        &format!("@workgroup_size({}, {}, 1)", wg, wg)
    ))
}

// Helper function to find the declaration of a kernel's entry point
fn entry_point(source: &str, kernel: kernels::Kernel) -> Result<usize, Error> {
    let decl = format!("fn {}(", kernel.entry_point());

    source
        .find(&decl)
        .ok_or(Error::KernelMissing(kernel.entry_point()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_has_every_kernel() {
        for kernel in kernels::Kernel::ALL {
            assert!(entry_point(TRACE, kernel).is_ok());
        }
    }

    #[test]
    fn missing_kernels_are_reported() {
        let source = "@compute @workgroup_size(16, 16, 1) fn intersect_cs() {}";

        assert!(entry_point(source, kernels::Kernel::Intersect).is_ok());
        assert!(matches!(
            entry_point(source, kernels::Kernel::Scatter),
            Err(Error::KernelMissing("scatter_cs"))
        ));
    }

    #[test]
    fn workgroup_size_is_substituted() {
        let source = assemble(8).unwrap();

        assert!(!source.contains("@workgroup_size(16, 16, 1)"));
        assert_eq!(source.matches("@workgroup_size(8, 8, 1)").count(), 2);
    }
}
