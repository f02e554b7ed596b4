mod cpu;
mod gpu;

use std::{fmt, mem};

use crate::{geom, kernels, Error};

pub use cpu::CpuAccelerator;
pub use gpu::GpuAccelerator;

// Opaque index of a buffer owned by an accelerator
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) usize);

// A kernel compiled by an accelerator
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub(crate) usize);

#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub enum Capability {
    // Data-parallel kernel dispatch
    Compute,
    // Buffer to buffer copies inside a command sequence
    BufferCopy,
    // Square lane grid of the given side
    GridSide(u32),
    // Single buffer of the given byte size
    BufferSize(u64),
    // Square workgroup of the given side
    Workgroup(u32),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compute => write!(f, "compute kernels"),
            Self::BufferCopy => write!(f, "buffer copies"),
            Self::GridSide(side) => write!(f, "{side}x{side} lane grid"),
            Self::BufferSize(size) => write!(f, "{size} byte buffers"),
            Self::Workgroup(wg) => write!(f, "{wg}x{wg} workgroups"),
        }
    }
}

#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_grid_side: u32,
    pub max_buffer_size: u64,
    pub max_workgroup_side: u32,
}

impl Limits {
    pub fn admits(&self, capability: Capability) -> bool {
        match capability {
            Capability::Compute | Capability::BufferCopy => true,
            Capability::GridSide(side) => side <= self.max_grid_side,
            Capability::BufferSize(size) => size <= self.max_buffer_size,
            Capability::Workgroup(wg) => wg <= self.max_workgroup_side,
        }
    }
}

// Whether the host reads a buffer back after the run
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub enum Residency {
    Shared,
    Private,
}

#[derive(Clone, Copy)]
#[derive(Debug)]
pub struct BufferDescriptor<'a> {
    pub label: &'a str,
    pub size: u64,
    pub residency: Residency,
    // Fills the front of the buffer, the rest is zeroed
    pub contents: Option<&'a [u8]>,
}

impl<'a> BufferDescriptor<'a> {
    // Copies and buffer sizes are counted in 4 byte words
    pub const ALIGNMENT: u64 = 4;

    pub(crate) fn validate(&self) -> Result<(), Error> {
        let Self { label, size, contents, .. } = *self;

        let fits = contents.map_or(true, |c| c.len() as u64 <= size);

        if size == 0 || size % Self::ALIGNMENT != 0 || !fits {
            return Err(Error::Allocation { label: label.to_owned(), size });
        }

        Ok(())
    }
}

// The buffers a kernel is bound to.
// Always three distinct buffers
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub struct Bindings {
    pub primitives: BufferHandle,
    pub rays: BufferHandle,
    pub intersections: BufferHandle,
}

#[derive(Clone, Copy)]
#[derive(Debug, PartialEq)]
pub struct Dispatch {
    pub kernel: KernelHandle,
    pub bindings: Bindings,
    pub params: kernels::KernelParams,
}

#[derive(Clone, Copy)]
#[derive(Debug, PartialEq)]
pub enum Command {
    // Byte ranges, both offsets and the size are word aligned
    Copy {
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    },
    Dispatch(Dispatch),
}

// Commands of one sequence execute in order.
// Sequences execute in the order they were submitted
#[derive(Clone)]
#[derive(Debug, PartialEq)]
pub struct Sequence {
    pub label: String,
    pub commands: Vec<Command>,
}

impl Sequence {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    // Rejects anything a backend could not execute without
    // reading or writing out of bounds
    pub(crate) fn validate<S, K>(&self, size: S, kernel: K) -> Result<(), Error>
        where S: Fn(BufferHandle) -> Option<u64>,
              K: Fn(KernelHandle) -> Option<kernels::Kernel> {

        let label = self.label.as_str();

        let size = |handle: BufferHandle| size(handle).ok_or_else(|| {
            Error::sequence(label, format!("unknown buffer {:?}", handle))
        });

        for command in &self.commands {
            match *command {
                Command::Copy { src, src_offset, dst, dst_offset, size: len } => {
                    let aligned = [src_offset, dst_offset, len]
                        .iter()
                        .all(|v| v % BufferDescriptor::ALIGNMENT == 0);

                    if !aligned {
                        return Err(Error::sequence(label, "copy is not word aligned"));
                    }

                    let src_range = range(label, src_offset, len, size(src)?)?;
                    let dst_range = range(label, dst_offset, len, size(dst)?)?;

                    if src == dst && overlaps(&src_range, &dst_range) {
                        return Err(Error::sequence(label, "copy ranges overlap"));
                    }
                },
                Command::Dispatch(Dispatch { kernel: handle, bindings, params }) => {
                    let kernel = kernel(handle).ok_or_else(|| {
                        Error::sequence(label, format!("unknown kernel {:?}", handle))
                    })?;

                    validate_dispatch(label, kernel, bindings, &params, &size)?;
                },
            }
        }

        Ok(())
    }
}

fn validate_dispatch<S>(
    label: &str,
    kernel: kernels::Kernel,
    bindings: Bindings,
    params: &kernels::KernelParams,
    size: &S,
) -> Result<(), Error> where S: Fn(BufferHandle) -> Result<u64, Error> {
    let Bindings { primitives, rays, intersections } = bindings;

    if primitives == rays || primitives == intersections || rays == intersections {
        return Err(Error::sequence(label, "kernel bindings alias each other"));
    }

    if (params.side as u64).pow(2) != params.lanes as u64 {
        return Err(Error::sequence(label, "lane count does not match the grid"));
    }

    let ray_size = mem::size_of::<geom::Ray>() as u64;
    let intrs_size = mem::size_of::<geom::Intersection>() as u64;
    let prim_size = mem::size_of::<geom::Primitive>() as u64;

    let lanes = params.lanes as u64;

    range(label, 0, params.primitive_count as u64 * prim_size, size(primitives)?)?;

    let src = range(
        label,
        params.ray_offset as u64 * ray_size,
        lanes * ray_size,
        size(rays)?,
    )?;

    range(
        label,
        params.intersection_offset as u64 * intrs_size,
        lanes * intrs_size,
        size(intersections)?,
    )?;

    if kernel == kernels::Kernel::Scatter {
        let dst = range(
            label,
            params.next_offset as u64 * ray_size,
            lanes * ray_size,
            size(rays)?,
        )?;

        if overlaps(&src, &dst) {
            return Err(Error::sequence(label, "scatter reads the segment it writes"));
        }
    }

    Ok(())
}

fn range(label: &str, offset: u64, len: u64, size: u64) -> Result<std::ops::Range<u64>, Error> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset..end),
        _ => Err(Error::sequence(
            label,
            format!("range {}+{} exceeds buffer of {} bytes", offset, len, size),
        )),
    }
}

fn overlaps(a: &std::ops::Range<u64>, b: &std::ops::Range<u64>) -> bool {
    a.start < b.end && b.start < a.end
}

// Everything the tracer needs from a compute device.
//
// Submission is asynchronous: `submit` returns as soon as the sequence
// is queued, `wait` blocks until that submission (and, since sequences
// run in order, every earlier one) has completed
pub trait Accelerator {
    type Submission;

    fn name(&self) -> &str;

    fn limits(&self) -> Limits;

    fn supports(&self, capability: Capability) -> bool {
        self.limits().admits(capability)
    }

    fn compile(&mut self, kernel: kernels::Kernel) -> Result<KernelHandle, Error>;

    fn allocate(&mut self, desc: &BufferDescriptor) -> Result<BufferHandle, Error>;

    fn submit(&mut self, sequence: Sequence) -> Result<Self::Submission, Error>;

    fn wait(&mut self, submission: Self::Submission) -> Result<(), Error>;

    // Only `Residency::Shared` buffers can be read
    fn read(&mut self, buffer: BufferHandle) -> Result<Vec<u8>, Error>;
}
