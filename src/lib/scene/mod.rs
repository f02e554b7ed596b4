use std::mem;

use crate::accel;
use crate::geom::{self, light, v2::V2};
use crate::Error;

pub struct ScenePack {
    pub buffer: accel::BufferHandle,
    pub count: u32,
}

// Obstacles & the emitter for a single run.
// Both stay fixed while the run is in flight
#[derive(Clone)]
#[derive(serde::Deserialize, serde::Serialize)]
#[derive(Debug, Default, PartialEq)]
pub struct Scene {
    pub light: light::Light,
    #[serde(default)]
    pub primitives: Vec<geom::Primitive>,
}

impl Scene {
    pub fn new(light: light::Light) -> Self {
        Self {
            light,
            primitives: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, src: V2<f32>, dst: V2<f32>) {
        self.primitives.push(geom::Primitive::new(src, dst));
    }

    // Connects consecutive points, closing the loop if asked to
    pub fn add_polyline(&mut self, points: &[V2<f32>], closed: bool) {
        for pair in points.windows(2) {
            self.add_segment(pair[0], pair[1]);
        }

        if let (true, [first, .., last]) = (closed, points) {
            self.add_segment(*last, *first);
        }
    }

    // u32::MAX is the miss sentinel, so it can never be an index
    pub fn primitive_count(&self) -> Result<u32, Error> {
        let count = self.primitives.len();

        match u32::try_from(count) {
            Ok(count) if count < u32::MAX => Ok(count),
            _ => Err(Error::TooManyPrimitives { count, max: u32::MAX - 1 }),
        }
    }

    pub fn pack<A: accel::Accelerator>(&self, accel: &mut A) -> Result<ScenePack, Error> {
        let count = self.primitive_count()?;

        // Zero-sized buffers can't be bound,
        // an empty scene gets a single 'null' primitive the kernels never read
        let null = [geom::Primitive::new([0.; 2], [0.; 2])];
        let primitives = if self.primitives.is_empty() {
            &null[..]
        } else {
            self.primitives.as_slice()
        };

        let contents: &[u8] = bytemuck::cast_slice(primitives);

        let buffer = accel.allocate(&accel::BufferDescriptor {
            label: "primitives",
            size: (primitives.len() * mem::size_of::<geom::Primitive>()) as u64,
            residency: accel::Residency::Private,
            contents: Some(contents),
        })?;

        log::debug!("Packed {} primitives", count);

        Ok(ScenePack { buffer, count })
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts;

    use super::*;
    use crate::accel::CpuAccelerator;

    #[test]
    fn default_scene_loads() {
        let scene: Scene = serde_json::from_str({
            include_str!("../../../scenes/default.json")
        }).unwrap();

        assert_eq!(scene.primitives, vec![
            geom::Primitive::new([1024., 512.], [512., -512.]),
        ]);

        assert_eq!(scene.light.origin, [0.; 2]);
        assert!((scene.light.initial_angle + consts::FRAC_PI_4).abs() < 1e-9);
        assert!((scene.light.range - consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn missing_primitives_mean_an_empty_scene() {
        let scene: Scene = serde_json::from_str(r#"{
            "light": { "origin": [1, 2] }
        }"#).unwrap();

        assert!(scene.primitives.is_empty());
        assert_eq!(scene.primitive_count().unwrap(), 0);
        assert!((scene.light.range - 2. * consts::PI).abs() < 1e-9);
    }

    #[test]
    fn polylines_connect_points() {
        let mut scene = Scene::default();

        scene.add_polyline(&[[0., 0.], [1., 0.], [1., 1.]], true);

        assert_eq!(scene.primitives, vec![
            geom::Primitive::new([0., 0.], [1., 0.]),
            geom::Primitive::new([1., 0.], [1., 1.]),
            geom::Primitive::new([1., 1.], [0., 0.]),
        ]);

        let mut open = Scene::default();
        open.add_polyline(&[[0., 0.], [1., 0.], [1., 1.]], false);
        assert_eq!(open.primitives.len(), 2);

        // A single point is no segment at all
        let mut point = Scene::default();
        point.add_polyline(&[[0., 0.]], true);
        assert!(point.primitives.is_empty());
    }

    #[test]
    fn empty_scenes_still_pack() {
        let mut accel = CpuAccelerator::new();

        let pack = Scene::default().pack(&mut accel).unwrap();

        assert_eq!(pack.count, 0);
    }

    #[test]
    fn packing_reports_the_count() {
        let mut accel = CpuAccelerator::new();

        let mut scene = Scene::default();
        scene.add_segment([0., 0.], [1., 0.]);
        scene.add_segment([0., 1.], [1., 1.]);

        let pack = scene.pack(&mut accel).unwrap();

        assert_eq!(pack.count, 2);
    }
}
