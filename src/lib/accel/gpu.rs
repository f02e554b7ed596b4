use std::sync;

use wgpu::util::DeviceExt as _;

use crate::kernels::Kernel;
use crate::{pipelines, shaders, Error};

use super::{Accelerator, BufferDescriptor, BufferHandle, Bindings, Capability};
use super::{Command, Dispatch, KernelHandle, Limits, Residency, Sequence};

struct Allocation {
    label: String,
    residency: Residency,
    inner: wgpu::Buffer,
}

// Runs the kernels as WGSL compute shaders through wgpu
pub struct GpuAccelerator {
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: wgpu::Limits,
    compute: bool,
    wg: u32,
    module: Option<wgpu::ShaderModule>,
    group_layout: wgpu::BindGroupLayout,
    pipelines: Vec<pipelines::Pipeline>,
    buffers: Vec<Allocation>,
}

impl GpuAccelerator {
    const STORAGE_USAGES: wgpu::BufferUsages = {
        wgpu::BufferUsages::STORAGE //
            .union(wgpu::BufferUsages::COPY_SRC) //
            .union(wgpu::BufferUsages::COPY_DST) //
    };

    pub fn new(wg: u32) -> Result<Self, Error> {
        pollster::block_on(Self::request(wg))
    }

    pub async fn request(wg: u32) -> Result<Self, Error> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(), ..Default::default()
        });

        // No surface to be compatible with, any adapter will do
        let adapter = instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }).await.ok_or(Error::DeviceUnavailable)?;

        let info = adapter.get_info();
        let compute = adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);

        // Ask for everything the adapter offers,
        // batch buffers quickly outgrow the defaults
        let device_desc = wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
        };

        let (device, queue) = adapter
            .request_device(&device_desc, None)
            .await
            .map_err(|_| Error::DeviceUnavailable)?;

        let limits = device.limits();

        log::info!("Using {} ({:?}, {:?})", info.name, info.device_type, info.backend);
        log::info!(
            "Max invocations per workgroup: {}, max workgroups per dimension: {}",
            limits.max_compute_invocations_per_workgroup,
            limits.max_compute_workgroups_per_dimension,
        );
        log::info!(
            "Max buffer size: {} bytes, max storage binding: {} bytes",
            limits.max_buffer_size,
            limits.max_storage_buffer_binding_size,
        );

        let group_layout = pipelines::group_layout(&device);

        let accel = Self {
            device,
            queue,
            limits,
            compute,
            wg,
            module: None,
            group_layout,
            pipelines: Vec::new(),
            buffers: Vec::new(),
        };

        if !accel.supports(Capability::Workgroup(wg)) {
            return Err(Error::Unsupported(Capability::Workgroup(wg)));
        }

        Ok(accel)
    }

    fn module(&mut self, kernel: Kernel) -> Result<&wgpu::ShaderModule, Error> {
        if self.module.is_none() {
            let source = shaders::source(self.wg)?;

            self.device.push_error_scope(wgpu::ErrorFilter::Validation);

            let module = self.device.create_shader_module(
                wgpu::ShaderModuleDescriptor {
                    label: Some("trace"),
                    source,
                },
            );

            if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
                return Err(Error::PipelineCompilation {
                    kernel: kernel.entry_point(),
                    reason: e.to_string(),
                });
            }

            self.module = Some(module);
        }

        self.module
            .as_ref()
            .ok_or(Error::KernelMissing(kernel.entry_point()))
    }

    fn buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(handle.0).map(|allocation| &allocation.inner)
    }

    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        command: &Command,
    ) -> Result<(), Error> {
        // Handles were resolved during validation
        let lost = || Error::SubmissionLost;

        match *command {
            Command::Copy { src, src_offset, dst, dst_offset, size } => {
                encoder.copy_buffer_to_buffer(
                    self.buffer(src).ok_or_else(lost)?, src_offset,
                    self.buffer(dst).ok_or_else(lost)?, dst_offset,
                    size,
                );
            },
            Command::Dispatch(Dispatch { kernel, bindings, params }) => {
                let pipelines::Pipeline {
                    kernel,
                    inner: pipeline,
                } = self.pipelines.get(kernel.0).ok_or_else(lost)?;

                let Bindings { primitives, rays, intersections } = bindings;

                let params_buffer = self.device.create_buffer_init(
                    &wgpu::util::BufferInitDescriptor {
                        label: None,
                        contents: bytemuck::cast_slice(&[params]),
                        usage: wgpu::BufferUsages::UNIFORM,
                    }
                );

                let group = pipelines::group(
                    &self.device,
                    &self.group_layout,
                    [
                        self.buffer(primitives).ok_or_else(lost)?,
                        self.buffer(rays).ok_or_else(lost)?,
                        self.buffer(intersections).ok_or_else(lost)?,
                    ],
                    &params_buffer,
                );

                let mut compute_pass = encoder.begin_compute_pass(
                    &wgpu::ComputePassDescriptor {
                        label: Some(kernel.entry_point()),
                        timestamp_writes: None,
                    }
                );

                compute_pass.set_pipeline(pipeline);
                compute_pass.set_bind_group(0, &group, &[]);

                // Partial workgroups are bounds checked in the shader
                let groups = params.side.div_ceil(self.wg);

                compute_pass.dispatch_workgroups(groups, groups, 1);
            },
        }

        Ok(())
    }
}

impl Accelerator for GpuAccelerator {
    type Submission = wgpu::SubmissionIndex;

    fn name(&self) -> &str { "gpu" }

    fn limits(&self) -> Limits {
        let wgpu::Limits {
            max_compute_workgroups_per_dimension,
            max_compute_workgroup_size_x,
            max_compute_workgroup_size_y,
            max_compute_invocations_per_workgroup,
            max_buffer_size,
            max_storage_buffer_binding_size,
            ..
        } = self.limits;

        let max_workgroup_side = max_compute_workgroup_size_x
            .min(max_compute_workgroup_size_y)
            .min(crate::isqrt(max_compute_invocations_per_workgroup as usize) as u32);

        Limits {
            max_grid_side: max_compute_workgroups_per_dimension.saturating_mul(self.wg),
            // Whole buffers are bound to the kernels
            max_buffer_size: max_buffer_size.min(max_storage_buffer_binding_size as u64),
            max_workgroup_side,
        }
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Compute => self.compute,
            capability => self.limits().admits(capability),
        }
    }

    fn compile(&mut self, kernel: Kernel) -> Result<KernelHandle, Error> {
        if !self.compute {
            return Err(Error::Unsupported(Capability::Compute));
        }

        self.module(kernel)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let pipeline: pipelines::Pipeline = match self.module.as_ref() {
            Some(module) => pipelines::PipelineBuilder {
                device: &self.device,
                module,
                layout: &self.group_layout,
                kernel,
            }.into(),
            None => return Err(Error::KernelMissing(kernel.entry_point())),
        };

        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(Error::PipelineCompilation {
                kernel: kernel.entry_point(),
                reason: e.to_string(),
            });
        }

        log::debug!("Compiled pipeline for `{}`", kernel);

        self.pipelines.push(pipeline);

        Ok(KernelHandle(self.pipelines.len() - 1))
    }

    fn allocate(&mut self, desc: &BufferDescriptor) -> Result<BufferHandle, Error> {
        desc.validate()?;

        let BufferDescriptor { label, size, residency, contents } = *desc;

        let failed = || Error::Allocation { label: label.to_owned(), size };

        if !self.supports(Capability::BufferSize(size)) {
            return Err(failed());
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let inner = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: Self::STORAGE_USAGES,
            mapped_at_creation: contents.is_some(),
        });

        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());

        if validation.is_some() || oom.is_some() {
            return Err(failed());
        }

        // The tail beyond the contents is already zeroed
        if let Some(contents) = contents {
            inner.slice(..).get_mapped_range_mut()[..contents.len()]
                .copy_from_slice(contents);

            inner.unmap();
        }

        log::trace!("Allocated `{}` ({} bytes)", label, size);

        self.buffers.push(Allocation {
            label: label.to_owned(),
            residency,
            inner,
        });

        Ok(BufferHandle(self.buffers.len() - 1))
    }

    fn submit(&mut self, sequence: Sequence) -> Result<Self::Submission, Error> {
        sequence.validate(
            |handle| self.buffer(handle).map(wgpu::Buffer::size),
            |handle| self.pipelines.get(handle.0).map(|p| p.kernel),
        )?;

        let Sequence { label, commands } = sequence;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: Some(&label) }
        );

        let index = commands
            .iter()
            .try_for_each(|command| self.encode(&mut encoder, command))
            .map(|_| self.queue.submit(Some(encoder.finish())));

        // The scope is popped even if encoding bailed out early
        let scope = pollster::block_on(self.device.pop_error_scope());

        let index = index?;
        if let Some(e) = scope {
            return Err(Error::sequence(&label, e.to_string()));
        }

        log::trace!("Submitted `{}` ({} commands)", label, commands.len());

        Ok(index)
    }

    fn wait(&mut self, submission: Self::Submission) -> Result<(), Error> {
        self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(submission));

        Ok(())
    }

    fn read(&mut self, buffer: BufferHandle) -> Result<Vec<u8>, Error> {
        let Allocation { label, residency, inner } = self.buffers
            .get(buffer.0)
            .ok_or_else(|| Error::Readback {
                label: String::from("?"),
                reason: String::from("unknown buffer"),
            })?;

        let failed = |reason: String| Error::Readback {
            label: label.clone(),
            reason,
        };

        if *residency != Residency::Shared {
            return Err(failed(String::from("buffer is not host visible")));
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: inner.size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&{
            wgpu::CommandEncoderDescriptor::default()
        });

        // Queue the copy operation
        encoder.copy_buffer_to_buffer(inner, 0, &staging, 0, inner.size());

        self.queue.submit(Some(encoder.finish()));

        let (sender, receiver) = sync::mpsc::channel();

        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| failed(String::from("map callback was dropped")))?
            .map_err(|e| failed(e.to_string()))?;

        let data = slice.get_mapped_range().to_vec();

        staging.unmap();

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Intersection, Primitive, Ray};
    use crate::kernels::KernelParams;
    use crate::ComputeConfig;

    // Compares both backends on the same sequence.
    // Needs an adapter with compute support
    #[test]
    #[ignore]
    fn matches_the_cpu_backend() {
        let mut gpu = GpuAccelerator::new(16).unwrap();
        let mut cpu = super::super::CpuAccelerator::new();

        let prims = [
            Primitive::new([-10., 3.], [10., 3.]),
            Primitive::new([4., -10.], [4., 10.]),
        ];

        let mut rays = Vec::new();
        for idx in 0..16 {
            rays.push(Ray {
                origin: [0., 0.],
                angle: idx as f32 * std::f32::consts::TAU / 16.,
                wavelength: 400. + idx as f32,
                rng: [0.1, 0.2, 0.3, 0.4],
            });
        }
        rays.extend([Ray::ZERO; 16]);

        let results = [
            run(&mut gpu, &prims, &rays),
            run(&mut cpu, &prims, &rays),
        ];

        let [(gpu_rays, gpu_intrs), (cpu_rays, cpu_intrs)] = results;

        for (g, c) in gpu_intrs.iter().zip(&cpu_intrs) {
            assert_eq!(g.primitive_index, c.primitive_index);
            assert!((g.location[0] - c.location[0]).abs() < 1e-2);
            assert!((g.location[1] - c.location[1]).abs() < 1e-2);
        }

        for (g, c) in gpu_rays.iter().zip(&cpu_rays) {
            assert_eq!(g.wavelength, c.wavelength);
            assert!((g.angle - c.angle).abs() < 1e-3);
        }
    }

    fn run<A: Accelerator>(
        accel: &mut A,
        prims: &[Primitive],
        rays: &[Ray],
    ) -> (Vec<Ray>, Vec<Intersection>) {
        let intersect = accel.compile(Kernel::Intersect).unwrap();
        let scatter = accel.compile(Kernel::Scatter).unwrap();

        let mut upload = |label, bytes: &[u8], residency| accel.allocate(&BufferDescriptor {
            label,
            size: bytes.len() as u64,
            residency,
            contents: Some(bytes),
        }).unwrap();

        let prims = upload("prims", bytemuck::cast_slice(prims), Residency::Private);
        let rays_buffer = upload("rays", bytemuck::cast_slice(rays), Residency::Shared);
        let intrs = upload(
            "intrs",
            bytemuck::cast_slice(&[<Intersection as bytemuck::Zeroable>::zeroed(); 16]),
            Residency::Shared,
        );

        let bindings = Bindings { primitives: prims, rays: rays_buffer, intersections: intrs };
        let params = KernelParams::new(&ComputeConfig::default(), 4, 2);

        let mut seq = Sequence::new("parity");
        seq.push(Command::Dispatch(Dispatch { kernel: intersect, bindings, params }));
        seq.push(Command::Dispatch(Dispatch {
            kernel: scatter,
            bindings,
            params: params.writing(16),
        }));

        let submission = accel.submit(seq).unwrap();
        accel.wait(submission).unwrap();

        (
            bytemuck::pod_collect_to_vec(&accel.read(rays_buffer).unwrap()),
            bytemuck::pod_collect_to_vec(&accel.read(intrs).unwrap()),
        )
    }
}
