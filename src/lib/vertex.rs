use std::mem;

use crate::geom::{Intersection, Ray};

// One end of a drawn ray segment.
// The wavelength is left for the visualizer to color
#[repr(C)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub wavelength: f32,
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = //
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32];

    pub fn description<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

// A line list: each ray runs from its origin to where it stopped
pub fn lines(rays: &[Ray], intersections: &[Intersection]) -> Vec<Vertex> {
    rays.iter()
        .zip(intersections)
        .flat_map(|(ray, intrs)| [
            Vertex { pos: ray.origin, wavelength: ray.wavelength },
            Vertex { pos: intrs.location, wavelength: ray.wavelength },
        ])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Hit;

    #[test]
    fn layout_matches_the_record() {
        let desc = Vertex::description();

        assert_eq!(desc.array_stride, 12);
        assert_eq!(desc.attributes.len(), 2);
        assert_eq!(desc.attributes[1].offset, 8);
    }

    #[test]
    fn two_vertices_per_ray() {
        let rays = [
            Ray { origin: [1., 2.], angle: 0., wavelength: 450., rng: [0.; 4] },
            Ray::ZERO,
        ];

        let intersections = [
            Intersection::from(Hit::Surface { location: [3., 4.], primitive: 0, normal: 0. }),
            Intersection::from(Hit::Miss { terminal: [0.; 2], normal: 0. }),
        ];

        let vertices = lines(&rays, &intersections);

        assert_eq!(vertices.len(), 4);
        assert_eq!(vertices[0], Vertex { pos: [1., 2.], wavelength: 450. });
        assert_eq!(vertices[1], Vertex { pos: [3., 4.], wavelength: 450. });

        // Dead rays collapse to a point
        assert_eq!(vertices[2].pos, vertices[3].pos);
    }
}
