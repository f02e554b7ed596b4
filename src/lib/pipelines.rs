use crate::kernels;

// Both kernels share one bind group layout:
//
// 0: 'primitives'
// 1: 'rays'
// 2: 'intersections'
// 3: 'params'
pub fn group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };

    device.create_bind_group_layout(
        &wgpu::BindGroupLayoutDescriptor {
            label: Some("trace"),
            entries: &[
                storage(0, true),
                storage(1, false),
                storage(2, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        }
    )
}

pub fn group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffers: [&wgpu::Buffer; 3],
    params: &wgpu::Buffer,
) -> wgpu::BindGroup {
    let [primitives, rays, intersections] = buffers;

    device.create_bind_group(
        &wgpu::BindGroupDescriptor {
            label: None,
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: primitives.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: rays.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: intersections.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params.as_entire_binding(),
                },
            ],
        }
    )
}

pub struct Pipeline {
    pub kernel: kernels::Kernel,
    pub inner: wgpu::ComputePipeline,
}

#[derive(Clone, Copy)]
pub struct PipelineBuilder<'a> {
    pub device: &'a wgpu::Device,
    pub module: &'a wgpu::ShaderModule,
    pub layout: &'a wgpu::BindGroupLayout,
    pub kernel: kernels::Kernel,
}

#[allow(clippy::from_over_into)]
impl<'a> Into<Pipeline> for PipelineBuilder<'a> {
    fn into(self) -> Pipeline {
        let Self {
            device,
            module,
            layout,
            kernel,
        } = self;

        let inner_layout = device.create_pipeline_layout(
            &wgpu::PipelineLayoutDescriptor {
                label: None,
                push_constant_ranges: &[],
                bind_group_layouts: &[layout],
            }
        );

        let inner = device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(kernel.entry_point()),
                layout: Some(&inner_layout),
                module,
                entry_point: kernel.entry_point(),
            }
        );

        Pipeline { kernel, inner }
    }
}
