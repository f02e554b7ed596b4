pub mod accel;
pub mod geom;
pub mod kernels;
pub mod layout;
pub mod pipelines;
pub mod scene;
pub mod shaders;
pub mod tracer;
pub mod vertex;

mod error;

pub use error::Error;
pub use layout::BufferLayout;
pub use tracer::{LightTracer, RayData};

// Sizing of a run. Only constructible through `TracerConfig::new`,
// so every instance holds a square batch
#[derive(Clone, Copy)]
#[derive(serde::Serialize)]
#[derive(Debug, PartialEq, Eq)]
pub struct TracerConfig {
    batch_size: usize,
    batch_count: usize,
    light_path_length: usize,
}

impl TracerConfig {
    // 32^4 rays in a single batch, traced for two bounces
    const DEFAULT: Self = Self {
        batch_size: 1 << 20,
        batch_count: 1,
        light_path_length: 2,
    };

    pub fn new(
        batch_size: usize,
        batch_count: usize,
        light_path_length: usize,
    ) -> Result<Self, Error> {
        for (name, value) in [
            ("batch_size", batch_size),
            ("batch_count", batch_count),
            ("light_path_length", light_path_length),
        ] {
            if value == 0 {
                return Err(Error::ZeroDimension(name));
            }
        }

        // The kernels are dispatched over a square lane grid
        let side = isqrt(batch_size);
        if side * side != batch_size {
            return Err(Error::NotSquare(batch_size));
        }

        // Element offsets reach the kernels as u32
        let ray_count = batch_size as u128
            * batch_count as u128
            * light_path_length as u128;

        if ray_count > u32::MAX as u128 {
            return Err(Error::TooManyRays(ray_count));
        }

        Ok(Self {
            batch_size,
            batch_count,
            light_path_length,
        })
    }

    pub fn batch_size(&self) -> usize { self.batch_size }

    pub fn batch_count(&self) -> usize { self.batch_count }

    pub fn light_path_length(&self) -> usize { self.light_path_length }

    pub fn batch_side_length(&self) -> usize { isqrt(self.batch_size) }

    pub fn rays_per_bounce(&self) -> usize {
        self.batch_size * self.batch_count
    }

    pub fn ray_count(&self) -> usize {
        self.rays_per_bounce() * self.light_path_length
    }
}

impl Default for TracerConfig {
    fn default() -> Self { Self::DEFAULT }
}

impl<'de> serde::Deserialize<'de> for TracerConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: serde::Deserializer<'de> {

        #[derive(serde::Deserialize)]
        struct Intermediate {
            batch_size: usize,
            batch_count: usize,
            light_path_length: usize,
        }

        let Intermediate {
            batch_size,
            batch_count,
            light_path_length,
        } = Intermediate::deserialize(deserializer)?;

        Self::new(batch_size, batch_count, light_path_length)
            .map_err(serde::de::Error::custom)
    }
}

fn isqrt(n: usize) -> usize {
    let n = n as u128;
    let mut root = (n as f64).sqrt() as u128;

    // Correct the float estimate in either direction
    while root * root > n { root -= 1; }
    while (root + 1) * (root + 1) <= n { root += 1; }

    root as usize
}

// These options are handed to the kernels with every dispatch
#[derive(Clone, Copy)]
#[derive(serde::Deserialize, serde::Serialize)]
#[derive(Debug, PartialEq)]
#[serde(default)]
pub struct ComputeConfig {
    pub t_min: f32,
    pub t_max: f32,
    pub eps: f32,
    pub roughness: f32,
}

impl ComputeConfig {
    const fn new() -> Self {
        Self {
            t_min: 0.01,
            t_max: 4096.,
            eps: 0.0000001,
            roughness: 0.1,
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self { Self::new() }
}

#[derive(Clone, Copy)]
#[derive(serde::Deserialize, serde::Serialize)]
#[derive(Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Cpu,
    Gpu,
}

// Config declaration
#[derive(Clone, Copy)]
#[derive(serde::Deserialize, serde::Serialize)]
#[derive(Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub tracer: TracerConfig,
    pub compute: ComputeConfig,
    pub backend: Backend,
    pub workgroup: u32,
    pub seed: Option<u64>,
}

impl Config {
    const fn new() -> Self {
        Self {
            tracer: TracerConfig::DEFAULT,
            compute: ComputeConfig::new(),
            backend: Backend::Gpu,
            workgroup: 16,
            seed: None,
        }
    }

    // Side length of a GPU workgroup
    pub fn wg(&self) -> u32 {
        let dim = self.workgroup.max(1);

        // Hard limit the local group size
        // WebGPU only supports 256 instances per workgroup at maximum
        if dim.saturating_mul(dim) > 256 { 16 } else { dim }
    }
}

impl Default for Config {
    fn default() -> Self { Self::new() }
}

// Builds the accelerator the config asks for and performs a single run
pub fn trace(config: &Config, scene: &scene::Scene) -> Result<RayData, Error> {
    match config.backend {
        Backend::Cpu => {
            let accel = accel::CpuAccelerator::new();

            LightTracer::new(accel, config, scene)?.run()
        },
        Backend::Gpu => {
            let accel = accel::GpuAccelerator::new(config.wg())?;

            LightTracer::new(accel, config, scene)?.run()
        },
    }
}
