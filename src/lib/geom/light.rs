use std::{array, f64::consts};

use super::{v2::V2, Ray};

// The emitter every initial ray leaves from.
// Angles are in radians, the sweep covers [initial_angle, initial_angle + range)
#[derive(Clone, Copy)]
#[derive(serde::Serialize)]
#[derive(Debug, PartialEq)]
pub struct Light {
    pub origin: V2<f32>,
    pub initial_angle: f64,
    pub range: f64,
}

impl Light {
    pub const fn new(origin: V2<f32>, initial_angle: f64, range: f64) -> Self {
        Self { origin, initial_angle, range }
    }

    pub fn generate<R: rand::Rng>(&self, count: usize, rng: &mut R) -> Vec<Ray> {
        let Self { origin, initial_angle, range } = *self;

        generate_rays(origin, count, initial_angle, range, rng)
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::new([0.; 2], 0., 2. * consts::PI)
    }
}

impl<'de> serde::Deserialize<'de> for Light {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: serde::Deserializer<'de> {

        #[derive(serde::Deserialize)]
        struct Intermediate {
            origin: Vec<f32>,
            #[serde(default)]
            initial_angle: f64,
            #[serde(default = "full_turn")]
            range: f64,
        }

        fn full_turn() -> f64 { 2. * consts::PI }

        let Intermediate {
            origin,
            initial_angle,
            range,
        } = Intermediate::deserialize(deserializer)?;

        Ok(Self::new(super::finite_v2(origin)?, initial_angle, range))
    }
}

// The deterministic part of generation.
// Exactly `count` angles, the end of the range is excluded
pub fn sweep(count: usize, initial_angle: f64, range: f64) -> impl Iterator<Item = f32> {
    let delta = if count == 0 { 0. } else { range / count as f64 };

    (0..count).map(move |i| (i as f64 * delta + initial_angle) as f32)
}

pub fn generate_rays<R: rand::Rng>(
    origin: V2<f32>,
    count: usize,
    initial_angle: f64,
    range: f64,
    rng: &mut R,
) -> Vec<Ray> {
    sweep(count, initial_angle, range).map(|angle| {
        let wavelength = rng.gen_range(super::WAVELENGTH_MIN..super::WAVELENGTH_MAX);

        Ray {
            origin,
            angle,
            wavelength,
            rng: array::from_fn(|_| rng.gen::<f32>()),
        }
    }).collect()
}
