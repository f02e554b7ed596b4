pub mod intersect;
pub mod rng;
pub mod scatter;

use std::fmt;

use crate::ComputeConfig;

pub use intersect::intersect;
pub use scatter::scatter;

// The two data-parallel programs a run dispatches.
// Each has a CPU lane function and a WGSL entry point with the same math
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    Intersect,
    Scatter,
}

impl Kernel {
    pub const ALL: [Self; 2] = [Self::Intersect, Self::Scatter];

    pub const fn entry_point(&self) -> &'static str {
        match self {
            Self::Intersect => "intersect_cs",
            Self::Scatter => "scatter_cs",
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entry_point())
    }
}

// Per-dispatch parameter block, bound as a uniform.
// Offsets are element indices, the kernels never derive them
#[repr(C)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq)]
pub struct KernelParams {
    pub ray_offset: u32,
    pub intersection_offset: u32,
    pub next_offset: u32,
    pub primitive_count: u32,
    pub side: u32,
    pub lanes: u32,
    _p0: [u32; 2],
    pub t_min: f32,
    pub t_max: f32,
    pub eps: f32,
    pub roughness: f32,
}

impl KernelParams {
    pub fn new(compute: &ComputeConfig, side: u32, primitive_count: u32) -> Self {
        let ComputeConfig {
            t_min,
            t_max,
            eps,
            roughness,
        } = *compute;

        Self {
            ray_offset: 0,
            intersection_offset: 0,
            next_offset: 0,
            primitive_count,
            side,
            lanes: side * side,
            _p0: [0; 2],
            t_min,
            t_max,
            eps,
            roughness,
        }
    }

    pub fn at(mut self, offset: u32) -> Self {
        self.ray_offset = offset;
        self.intersection_offset = offset;
        self.next_offset = offset;
        self
    }

    pub fn writing(mut self, next_offset: u32) -> Self {
        self.next_offset = next_offset;
        self
    }

    // Lanes ordered row by row over the square grid
    pub fn lane(&self, x: u32, y: u32) -> u32 {
        y * self.side + x
    }
}
