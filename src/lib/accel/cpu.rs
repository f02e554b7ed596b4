use std::{mem, sync, thread};

use rayon::prelude::*;

use crate::geom::{Intersection, Primitive, Ray};
use crate::kernels::{self, Kernel, KernelParams};
use crate::Error;

use super::{Accelerator, BufferDescriptor, BufferHandle, Bindings};
use super::{Command, Dispatch, KernelHandle, Limits, Residency, Sequence};

// Word storage keeps every record view 4-byte aligned
struct Allocation {
    label: String,
    residency: Residency,
    words: Vec<u32>,
}

impl Allocation {
    fn size(&self) -> u64 {
        (self.words.len() * mem::size_of::<u32>()) as u64
    }
}

type Storage = sync::Arc<sync::Mutex<Vec<Allocation>>>;

struct Job {
    sequence: Sequence,
    kernels: Vec<Kernel>,
    completed: sync::mpsc::Sender<Result<(), Error>>,
}

pub struct CpuSubmission {
    label: String,
    completed: sync::mpsc::Receiver<Result<(), Error>>,
}

// Runs the kernels lane-parallel on the host.
//
// Sequences are handed to a single worker thread in submission order,
// each kernel dispatch is spread over the rayon pool
pub struct CpuAccelerator {
    storage: Storage,
    kernels: Vec<Kernel>,
    jobs: Option<sync::mpsc::Sender<Job>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CpuAccelerator {
    pub fn new() -> Self {
        let storage: Storage = sync::Arc::new(sync::Mutex::new(Vec::new()));

        let (jobs, jobs_receiver) = sync::mpsc::channel::<Job>();

        let worker = {
            let storage = storage.clone();

            thread::spawn(move || {
                loop {
                    match jobs_receiver.recv() {
                        Ok(Job { sequence, kernels, completed }) => {
                            let result = execute(&storage, &sequence, &kernels);

                            // The submission may have been dropped without a wait
                            let _ = completed.send(result);
                        },
                        Err(_) => break,
                    }
                }
            })
        };

        log::info!(
            "Using the CPU accelerator with {} threads",
            rayon::current_num_threads()
        );

        Self {
            storage,
            kernels: Vec::new(),
            jobs: Some(jobs),
            worker: Some(worker),
        }
    }

    fn lock(&self) -> Option<sync::MutexGuard<'_, Vec<Allocation>>> {
        self.storage.lock().ok()
    }
}

impl Default for CpuAccelerator {
    fn default() -> Self { Self::new() }
}

impl Drop for CpuAccelerator {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        self.jobs.take();

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Accelerator for CpuAccelerator {
    type Submission = CpuSubmission;

    fn name(&self) -> &str { "cpu" }

    fn limits(&self) -> Limits {
        Limits {
            // Lane indices are u32
            max_grid_side: 1 << 16,
            max_buffer_size: isize::MAX as u64,
            max_workgroup_side: u32::MAX,
        }
    }

    fn compile(&mut self, kernel: Kernel) -> Result<KernelHandle, Error> {
        self.kernels.push(kernel);

        Ok(KernelHandle(self.kernels.len() - 1))
    }

    fn allocate(&mut self, desc: &BufferDescriptor) -> Result<BufferHandle, Error> {
        desc.validate()?;

        let BufferDescriptor { label, size, residency, contents } = *desc;

        let failed = || Error::Allocation { label: label.to_owned(), size };

        let len = usize::try_from(size / 4).map_err(|_| failed())?;

        let mut words = Vec::new();
        words.try_reserve_exact(len).map_err(|_| failed())?;
        words.resize(len, 0u32);

        if let Some(contents) = contents {
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words);

            bytes[..contents.len()].copy_from_slice(contents);
        }

        let mut storage = self.lock().ok_or_else(failed)?;

        storage.push(Allocation {
            label: label.to_owned(),
            residency,
            words,
        });

        log::trace!("Allocated `{}` ({} bytes)", label, size);

        Ok(BufferHandle(storage.len() - 1))
    }

    fn submit(&mut self, sequence: Sequence) -> Result<Self::Submission, Error> {
        {
            let storage = self.lock().ok_or_else(|| {
                Error::sequence(&sequence.label, "buffer storage is poisoned")
            })?;

            sequence.validate(
                |handle| storage.get(handle.0).map(Allocation::size),
                |handle| self.kernels.get(handle.0).copied(),
            )?;
        }

        let (completed, receiver) = sync::mpsc::channel();

        let label = sequence.label.clone();

        let job = Job {
            sequence,
            kernels: self.kernels.clone(),
            completed,
        };

        self.jobs
            .as_ref()
            .ok_or(Error::SubmissionLost)?
            .send(job)
            .map_err(|_| Error::SubmissionLost)?;

        log::trace!("Submitted `{}`", label);

        Ok(CpuSubmission { label, completed: receiver })
    }

    fn wait(&mut self, submission: Self::Submission) -> Result<(), Error> {
        let CpuSubmission { label, completed } = submission;

        // A dead worker drops the sender
        completed.recv().map_err(|_| Error::SubmissionLost)??;

        log::trace!("Completed `{}`", label);

        Ok(())
    }

    fn read(&mut self, buffer: BufferHandle) -> Result<Vec<u8>, Error> {
        let failed = |label: &str, reason: &str| Error::Readback {
            label: label.to_owned(),
            reason: reason.to_owned(),
        };

        let storage = self.lock().ok_or_else(|| failed("?", "buffer storage is poisoned"))?;

        let allocation = storage
            .get(buffer.0)
            .ok_or_else(|| failed("?", "unknown buffer"))?;

        if allocation.residency != Residency::Shared {
            return Err(failed(&allocation.label, "buffer is not host visible"));
        }

        Ok(bytemuck::cast_slice(&allocation.words).to_vec())
    }
}

fn execute(storage: &Storage, sequence: &Sequence, kernels: &[Kernel]) -> Result<(), Error> {
    let label = sequence.label.as_str();

    let mut buffers = storage
        .lock()
        .map_err(|_| Error::sequence(label, "buffer storage is poisoned"))?;

    for command in &sequence.commands {
        match *command {
            Command::Copy { src, src_offset, dst, dst_offset, size } => {
                let [src_offset, dst_offset, size] = [src_offset, dst_offset, size]
                    .map(|v| v as usize);

                let src_range = src_offset..(src_offset + size);

                if src == dst {
                    let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut buffers[src.0].words);

                    bytes.copy_within(src_range, dst_offset);
                } else {
                    let mut target = mem::take(&mut buffers[dst.0].words);

                    {
                        let from: &[u8] = bytemuck::cast_slice(&buffers[src.0].words);
                        let to: &mut [u8] = bytemuck::cast_slice_mut(&mut target);

                        to[dst_offset..(dst_offset + size)].copy_from_slice(&from[src_range]);
                    }

                    buffers[dst.0].words = target;
                }
            },
            Command::Dispatch(Dispatch { kernel, bindings, params }) => {
                let kernel = kernels
                    .get(kernel.0)
                    .copied()
                    .ok_or_else(|| Error::sequence(label, "unknown kernel"))?;

                log::trace!("`{}`: {} over {} lanes", label, kernel, params.lanes);

                match kernel {
                    Kernel::Intersect => run_intersect(&mut buffers, bindings, &params),
                    Kernel::Scatter => run_scatter(&mut buffers, bindings, &params),
                }
            },
        }
    }

    Ok(())
}

fn records<T: bytemuck::Pod>(words: &[u32]) -> &[T] {
    let bytes: &[u8] = bytemuck::cast_slice(words);
    let len = bytes.len() / mem::size_of::<T>();

    bytemuck::cast_slice(&bytes[..(len * mem::size_of::<T>())])
}

fn records_mut<T: bytemuck::Pod>(words: &mut [u32]) -> &mut [T] {
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(words);
    let len = bytes.len() / mem::size_of::<T>();

    bytemuck::cast_slice_mut(&mut bytes[..(len * mem::size_of::<T>())])
}

// Ranges below were checked against the buffer sizes on submission
fn run_intersect(buffers: &mut [Allocation], bindings: Bindings, params: &KernelParams) {
    let Bindings { primitives, rays, intersections } = bindings;

    let lanes = params.lanes as usize;
    let ray_offset = params.ray_offset as usize;
    let intrs_offset = params.intersection_offset as usize;

    let mut target = mem::take(&mut buffers[intersections.0].words);

    {
        let prims = records::<Primitive>(&buffers[primitives.0].words);
        let prims = &prims[..(params.primitive_count as usize)];

        let rays = &records::<Ray>(&buffers[rays.0].words)[ray_offset..(ray_offset + lanes)];
        let out = &mut records_mut::<Intersection>(&mut target)[intrs_offset..(intrs_offset + lanes)];

        out.par_iter_mut()
            .zip(rays.par_iter())
            .for_each(|(intrs, ray)| {
                *intrs = kernels::intersect(ray, prims, params).into();
            });
    }

    buffers[intersections.0].words = target;
}

fn run_scatter(buffers: &mut [Allocation], bindings: Bindings, params: &KernelParams) {
    let Bindings { rays, intersections, .. } = bindings;

    let lanes = params.lanes as usize;
    let ray_offset = params.ray_offset as usize;
    let intrs_offset = params.intersection_offset as usize;
    let next_offset = params.next_offset as usize;

    let mut words = mem::take(&mut buffers[rays.0].words);

    {
        let intrs = records::<Intersection>(&buffers[intersections.0].words);
        let intrs = &intrs[intrs_offset..(intrs_offset + lanes)];

        // Source & destination segments are disjoint
        let all = records_mut::<Ray>(&mut words);
        let (src, dst) = if next_offset > ray_offset {
            let (lo, hi) = all.split_at_mut(next_offset);

            (&lo[ray_offset..(ray_offset + lanes)], &mut hi[..lanes])
        } else {
            let (lo, hi) = all.split_at_mut(ray_offset);

            (&hi[..lanes], &mut lo[next_offset..(next_offset + lanes)])
        };

        dst.par_iter_mut()
            .zip(src.par_iter().zip(intrs.par_iter()))
            .for_each(|(next, (ray, intrs))| {
                *next = kernels::scatter(ray, intrs, params);
            });
    }

    buffers[rays.0].words = words;
}

#[cfg(test)]
mod tests {
    use std::f32::consts;

    use super::*;
    use crate::geom::Hit;
    use crate::ComputeConfig;

    fn upload<T: bytemuck::Pod>(
        accel: &mut CpuAccelerator,
        label: &str,
        data: &[T],
        residency: Residency,
    ) -> BufferHandle {
        accel.allocate(&BufferDescriptor {
            label,
            size: mem::size_of_val(data) as u64,
            residency,
            contents: Some(bytemuck::cast_slice(data)),
        }).unwrap()
    }

    fn ray(angle: f32) -> Ray {
        Ray { origin: [0., -5.], angle, wavelength: 500., rng: [0.5; 4] }
    }

    #[test]
    fn intersect_then_scatter() {
        let mut accel = CpuAccelerator::new();

        let intersect = accel.compile(Kernel::Intersect).unwrap();
        let scatter = accel.compile(Kernel::Scatter).unwrap();

        let prims = [Primitive::new([-10., 0.], [10., 0.])];
        let prims = upload(&mut accel, "prims", &prims, Residency::Private);

        // One hit and one miss in the first bounce
        let mut rays = vec![Ray::ZERO; 2];
        rays[0] = ray(consts::FRAC_PI_2);
        rays[1] = ray(-consts::FRAC_PI_2);
        rays.extend([Ray::ZERO; 2]);

        let rays = upload(&mut accel, "rays", &rays, Residency::Shared);
        let intrs = upload(&mut accel, "intrs", &[<Intersection as bytemuck::Zeroable>::zeroed(); 4], Residency::Shared);

        let bindings = Bindings { primitives: prims, rays, intersections: intrs };

        // Grid side 1 with two lanes would not validate, use two dispatches
        let params = KernelParams::new(&ComputeConfig { roughness: 0., ..Default::default() }, 1, 1);

        let mut seq = Sequence::new("test");
        for lane in 0..2 {
            seq.push(Command::Dispatch(Dispatch {
                kernel: intersect,
                bindings,
                params: params.at(lane),
            }));
            seq.push(Command::Dispatch(Dispatch {
                kernel: scatter,
                bindings,
                params: params.at(lane).writing(lane + 2),
            }));
        }

        let submission = accel.submit(seq).unwrap();
        accel.wait(submission).unwrap();

        let rays_out: Vec<Ray> = bytemuck::pod_collect_to_vec(&accel.read(rays).unwrap());
        let intrs_out: Vec<Intersection> = bytemuck::pod_collect_to_vec(&accel.read(intrs).unwrap());

        assert!(matches!(intrs_out[0].hit(1), Hit::Surface { primitive: 0, .. }));
        assert!(intrs_out[1].is_miss(1));

        assert!((rays_out[2].angle - 3. * consts::FRAC_PI_2).abs() < 1e-5);
        assert_eq!(rays_out[2].wavelength, 500.);
        assert_eq!(rays_out[3], Ray::ZERO);
    }

    #[test]
    fn copies_move_bytes() {
        let mut accel = CpuAccelerator::new();

        let src = upload(&mut accel, "src", &[1u32, 2, 3, 4], Residency::Private);
        let dst = upload(&mut accel, "dst", &[0u32; 6], Residency::Shared);

        let mut seq = Sequence::new("copy");
        seq.push(Command::Copy { src, src_offset: 4, dst, dst_offset: 8, size: 8 });
        seq.push(Command::Copy { src: dst, src_offset: 8, dst, dst_offset: 16, size: 8 });

        let submission = accel.submit(seq).unwrap();
        accel.wait(submission).unwrap();

        let out: Vec<u32> = bytemuck::pod_collect_to_vec(&accel.read(dst).unwrap());

        assert_eq!(out, [0, 0, 2, 3, 2, 3]);
    }

    #[test]
    fn private_buffers_are_not_readable() {
        let mut accel = CpuAccelerator::new();

        let buffer = upload(&mut accel, "private", &[0u32; 4], Residency::Private);

        assert!(matches!(accel.read(buffer), Err(Error::Readback { .. })));
    }

    #[test]
    fn invalid_sequences_are_refused_before_queueing() {
        let mut accel = CpuAccelerator::new();

        let buffer = upload(&mut accel, "buffer", &[0u32; 4], Residency::Shared);

        let mut seq = Sequence::new("bad");
        seq.push(Command::Copy { src: buffer, src_offset: 0, dst: buffer, dst_offset: 8, size: 16 });

        assert!(matches!(accel.submit(seq), Err(Error::CommandSequence { .. })));
    }

    #[test]
    fn submissions_complete_in_order() {
        let mut accel = CpuAccelerator::new();

        let src = upload(&mut accel, "src", &[7u32; 4], Residency::Private);
        let dst = upload(&mut accel, "dst", &[0u32; 4], Residency::Shared);

        let mut submissions = Vec::new();
        for word in 0..4u64 {
            let mut seq = Sequence::new(format!("copy {}", word));
            seq.push(Command::Copy { src, src_offset: 0, dst, dst_offset: word * 4, size: 4 });

            submissions.push(accel.submit(seq).unwrap());
        }

        // Waiting on the last one is enough
        let last = submissions.pop().unwrap();
        accel.wait(last).unwrap();

        let out: Vec<u32> = bytemuck::pod_collect_to_vec(&accel.read(dst).unwrap());
        assert_eq!(out, [7; 4]);
    }
}
