use std::mem;

use crate::accel::{Bindings, BufferHandle, Command, Dispatch, KernelHandle, Sequence};
use crate::geom::Ray;
use crate::kernels::KernelParams;
use crate::BufferLayout;

#[derive(Clone, Copy)]
#[derive(Debug)]
pub struct Kernels {
    pub intersect: KernelHandle,
    pub scatter: KernelHandle,
}

#[derive(Clone, Copy)]
#[derive(Debug)]
pub struct Buffers {
    pub primitives: BufferHandle,
    // Bounce 0 of every batch, generated once on the host
    pub template: BufferHandle,
    pub rays: BufferHandle,
    pub intersections: BufferHandle,
}

// Everything one batch needs, in execution order:
//
// copy template -> rays[bounce 0]
// intersect bounce 0, scatter bounce 0 -> bounce 1
// ...
// intersect bounce L - 1
//
// The terminal bounce has nowhere to scatter into
pub fn batch_sequence(
    layout: &BufferLayout,
    batch: usize,
    kernels: &Kernels,
    buffers: &Buffers,
    params: KernelParams,
) -> Sequence {
    let Buffers { primitives, template, rays, intersections } = *buffers;

    let bindings = Bindings { primitives, rays, intersections };

    let mut sequence = Sequence::new(format!("batch {}", batch));

    // The template shares the bounce 0 layout,
    // so the batch's slice sits at the same offset in both
    let offset = layout.byte_offset::<Ray>(batch, 0);

    sequence.push(Command::Copy {
        src: template,
        src_offset: offset,
        dst: rays,
        dst_offset: offset,
        size: (layout.batch_size() * mem::size_of::<Ray>()) as u64,
    });

    for bounce in 0..layout.light_path_length() {
        // Offsets fit in u32, the config rejects larger runs
        let offset = layout.offset(batch, bounce) as u32;

        sequence.push(Command::Dispatch(Dispatch {
            kernel: kernels.intersect,
            bindings,
            params: params.at(offset),
        }));

        if let Some(next) = layout.next(batch, bounce) {
            sequence.push(Command::Dispatch(Dispatch {
                kernel: kernels.scatter,
                bindings,
                params: params.at(offset).writing(next as u32),
            }));
        }
    }

    sequence
}
