pub mod light;
pub mod v2;

use v2::{V2, V2Ops as _};

// Visible range the emitter samples wavelengths from (nm)
pub const WAVELENGTH_MIN: f32 = 350.;
pub const WAVELENGTH_MAX: f32 = 750.;

// Helper to pull a finite 2-vector out of a deserialized Vec
fn finite_v2<E: serde::de::Error>(values: Vec<f32>) -> Result<V2<f32>, E> {
    match values[..] {
        [x, y] if x.is_finite() && y.is_finite() => Ok([x, y]),
        [_, _] => Err(E::custom("coordinates must be finite")),
        _ => Err(E::invalid_length(values.len(), &"an array of len 2")),
    }
}

// A line segment obstacle. Both faces reflect
#[repr(C)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[derive(Clone, Copy)]
#[derive(serde::Serialize)]
#[derive(Debug, PartialEq)]
pub struct Primitive {
    pub src: V2<f32>,
    pub dst: V2<f32>,
}

impl Primitive {
    pub const fn new(src: V2<f32>, dst: V2<f32>) -> Self {
        Self { src, dst }
    }

    pub fn edge(&self) -> V2<f32> {
        self.dst.sub(self.src)
    }

    // Angle of the edge rotated a quarter turn counter-clockwise.
    // Reflection only depends on the surface line, so either winding works
    pub fn normal(&self) -> f32 {
        let [x, y] = self.edge();

        x.atan2(-y)
    }
}

impl<'de> serde::Deserialize<'de> for Primitive {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: serde::Deserializer<'de> {

        #[derive(serde::Deserialize)]
        struct Intermediate {
            src: Vec<f32>,
            dst: Vec<f32>,
        }

        let Intermediate { src, dst } = Intermediate::deserialize(deserializer)?;

        Ok(Self::new(finite_v2(src)?, finite_v2(dst)?))
    }
}

#[repr(C)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq)]
pub struct Ray {
    pub origin: V2<f32>,
    pub angle: f32,
    pub wavelength: f32,
    pub rng: [f32; 4],
}

impl Ray {
    // Written forward once a ray has escaped the scene
    pub const ZERO: Self = Self {
        origin: [0.; 2],
        angle: 0.,
        wavelength: 0.,
        rng: [0.; 4],
    };

    pub fn direction(&self) -> V2<f32> {
        <V2<f32>>::from_angle(self.angle)
    }

    // Degenerate rays carry no light, the visualizer draws them as points
    pub fn is_degenerate(&self) -> bool {
        self.wavelength <= 0.
    }
}

// The flat record the kernels write.
// `primitive_index` outside of [0, primitive count) marks a miss
#[repr(C)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq)]
pub struct Intersection {
    pub location: V2<f32>,
    pub primitive_index: u32,
    pub surface_normal: f32,
}

impl Intersection {
    pub const MISS: u32 = u32::MAX;

    pub fn is_miss(&self, primitive_count: u32) -> bool {
        self.primitive_index >= primitive_count
    }

    pub fn hit(&self, primitive_count: u32) -> Hit {
        let Self { location, primitive_index, surface_normal } = *self;

        if self.is_miss(primitive_count) {
            Hit::Miss { terminal: location, normal: surface_normal }
        } else {
            Hit::Surface {
                location,
                primitive: primitive_index,
                normal: surface_normal,
            }
        }
    }
}

// What the kernels compute per lane.
// Collapsed into an `Intersection` at the accelerator boundary
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq)]
pub enum Hit {
    Surface {
        location: V2<f32>,
        primitive: u32,
        normal: f32,
    },
    Miss {
        terminal: V2<f32>,
        normal: f32,
    },
}

impl From<Hit> for Intersection {
    fn from(hit: Hit) -> Self {
        match hit {
            Hit::Surface { location, primitive, normal } => Self {
                location,
                primitive_index: primitive,
                surface_normal: normal,
            },
            Hit::Miss { terminal, normal } => Self {
                location: terminal,
                primitive_index: Self::MISS,
                surface_normal: normal,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{f32::consts, mem};

    use super::*;

    #[test]
    fn records_match_shader_layout() {
        assert_eq!(mem::size_of::<Primitive>(), 16);
        assert_eq!(mem::size_of::<Ray>(), 32);
        assert_eq!(mem::size_of::<Intersection>(), 16);
    }

    #[test]
    fn horizontal_segment_normal_points_up() {
        let prim = Primitive::new([-10., 0.], [10., 0.]);

        assert!((prim.normal() - consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn hit_collapses_and_expands() {
        let hit = Hit::Surface { location: [1., 2.], primitive: 3, normal: 0.5 };
        let record = Intersection::from(hit);

        assert_eq!(record.hit(4), hit);

        // The same record is a miss in a scene too small to contain index 3
        assert!(matches!(record.hit(3), Hit::Miss { .. }));

        let miss = Intersection::from(Hit::Miss { terminal: [0.; 2], normal: 0. });
        assert_eq!(miss.primitive_index, Intersection::MISS);
        assert!(miss.is_miss(u32::MAX - 1));
    }

    #[test]
    fn primitive_rejects_bad_coordinates() {
        let ok: Primitive = serde_json::from_str(
            r#"{ "src": [0, 1], "dst": [2, 3] }"#
        ).unwrap();
        assert_eq!(ok, Primitive::new([0., 1.], [2., 3.]));

        assert!(serde_json::from_str::<Primitive>(
            r#"{ "src": [0, 1, 2], "dst": [2, 3] }"#
        ).is_err());
    }
}
