pub mod schedule;

use std::{mem, time};

use rand::SeedableRng as _;

use crate::accel::{self, Accelerator, Capability};
use crate::geom::{Hit, Intersection, Ray};
use crate::kernels::{Kernel, KernelParams};
use crate::{scene, vertex};
use crate::{BufferLayout, Config, Error, TracerConfig};

// Where a run is. Only the last batch's submission is ever awaited
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub enum RunState {
    Configured,
    Dispatching { batch: usize },
    AwaitingLast,
    Completed,
}

// Both buffers read back after a run, in `BufferLayout` order
#[derive(Clone)]
#[derive(Debug, PartialEq)]
pub struct RayData {
    pub config: TracerConfig,
    pub primitive_count: u32,
    pub rays: Vec<Ray>,
    pub intersections: Vec<Intersection>,
}

impl RayData {
    pub fn layout(&self) -> BufferLayout {
        BufferLayout::new(&self.config)
    }

    // One ray followed through every bounce,
    // `None` if the batch or lane is out of range
    pub fn path(&self, batch: usize, lane: usize) -> Option<Vec<(Ray, Hit)>> {
        let layout = self.layout();

        if batch >= layout.batch_count() || lane >= layout.batch_size() {
            return None;
        }

        (0..layout.light_path_length())
            .map(|bounce| layout.offset(batch, bounce) + lane)
            .map(|idx| {
                let ray = *self.rays.get(idx)?;
                let intrs = self.intersections.get(idx)?;

                Some((ray, intrs.hit(self.primitive_count)))
            })
            .collect()
    }

    pub fn hit_count(&self) -> usize {
        self.intersections
            .iter()
            .filter(|intrs| !intrs.is_miss(self.primitive_count))
            .count()
    }

    // `ray_count * 2` vertices, drawn as a line list
    pub fn line_vertices(&self) -> Vec<vertex::Vertex> {
        vertex::lines(&self.rays, &self.intersections)
    }
}

// One configured run on one accelerator.
// Everything the kernels touch is allocated up front
pub struct LightTracer<A: Accelerator> {
    accel: A,
    config: TracerConfig,
    layout: BufferLayout,
    params: KernelParams,
    kernels: schedule::Kernels,
    buffers: schedule::Buffers,
    primitive_count: u32,
    state: RunState,
}

impl<A: Accelerator> LightTracer<A> {
    pub fn new(mut accel: A, config: &Config, scene: &scene::Scene) -> Result<Self, Error> {
        let Config { tracer, compute, seed, .. } = *config;

        let layout = BufferLayout::new(&tracer);

        let side = tracer.batch_side_length() as u32;
        let rays_size = (layout.len() * mem::size_of::<Ray>()) as u64;

        for capability in [
            Capability::Compute,
            Capability::BufferCopy,
            Capability::GridSide(side),
            Capability::BufferSize(rays_size),
        ] {
            if !accel.supports(capability) {
                return Err(Error::Unsupported(capability));
            }
        }

        let kernels = schedule::Kernels {
            intersect: accel.compile(Kernel::Intersect)?,
            scatter: accel.compile(Kernel::Scatter)?,
        };

        let scene::ScenePack {
            buffer: primitives,
            count: primitive_count,
        } = scene.pack(&mut accel)?;

        let mut rng = match seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };

        // Every batch copies its slice of bounce 0 from here
        let template = scene.light.generate(layout.rays_per_bounce(), &mut rng);

        let template = accel.allocate(&accel::BufferDescriptor {
            label: "template",
            size: (template.len() * mem::size_of::<Ray>()) as u64,
            residency: accel::Residency::Private,
            contents: Some(bytemuck::cast_slice(&template)),
        })?;

        let rays = accel.allocate(&accel::BufferDescriptor {
            label: "rays",
            size: rays_size,
            residency: accel::Residency::Shared,
            contents: None,
        })?;

        let intersections = accel.allocate(&accel::BufferDescriptor {
            label: "intersections",
            size: (layout.len() * mem::size_of::<Intersection>()) as u64,
            residency: accel::Residency::Shared,
            contents: None,
        })?;

        log::info!(
            "Configured {} batches of {} rays ({}x{} lanes), {} bounces, {} primitives on {}",
            tracer.batch_count(),
            tracer.batch_size(),
            side, side,
            tracer.light_path_length(),
            primitive_count,
            accel.name(),
        );

        Ok(Self {
            accel,
            config: tracer,
            layout,
            params: KernelParams::new(&compute, side, primitive_count),
            kernels,
            buffers: schedule::Buffers {
                primitives,
                template,
                rays,
                intersections,
            },
            primitive_count,
            state: RunState::Configured,
        })
    }

    pub fn state(&self) -> RunState { self.state }

    pub fn layout(&self) -> BufferLayout { self.layout }

    pub fn into_inner(self) -> A { self.accel }

    // Submits every batch, waits on the last one and reads the results back.
    // A failure leaves the state where it happened
    pub fn run(&mut self) -> Result<RayData, Error> {
        let start = time::Instant::now();

        self.state = RunState::Configured;

        let mut last = None;
        for batch in 0..self.config.batch_count() {
            self.state = RunState::Dispatching { batch };

            let sequence = schedule::batch_sequence(
                &self.layout,
                batch,
                &self.kernels,
                &self.buffers,
                self.params,
            );

            log::debug!("Submitting batch {} ({} commands)", batch, sequence.commands.len());

            last = Some(self.accel.submit(sequence)?);
        }

        self.state = RunState::AwaitingLast;

        // Sequences complete in submission order,
        // so the last one finishing implies all of them have
        if let Some(submission) = last {
            self.accel.wait(submission)?;
        }

        self.state = RunState::Completed;

        log::info!(
            "Traced {} rays in {:.3}ms",
            self.config.ray_count(),
            start.elapsed().as_secs_f64() * 1000.,
        );

        let rays: Vec<Ray> = self.read(self.buffers.rays, "rays")?;
        let intersections: Vec<Intersection> = self.read(self.buffers.intersections, "intersections")?;

        Ok(RayData {
            config: self.config,
            primitive_count: self.primitive_count,
            rays,
            intersections,
        })
    }

    fn read<T: bytemuck::Pod>(
        &mut self,
        buffer: accel::BufferHandle,
        label: &str,
    ) -> Result<Vec<T>, Error> {
        let bytes = self.accel.read(buffer)?;

        let expected = self.layout.len() * mem::size_of::<T>();
        if bytes.len() != expected {
            return Err(Error::Readback {
                label: label.to_owned(),
                reason: format!("expected {} bytes, got {}", expected, bytes.len()),
            });
        }

        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}
