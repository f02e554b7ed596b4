use std::f32::consts;

use crate::geom::{Hit, Primitive, Ray};
use crate::geom::v2::V2Ops as _;

use super::KernelParams;

// Nearest hit of one ray against every primitive.
//
// Solves origin + t * dir = src + u * edge. Only hits with
// t in (t_min, t_max) and u in [0, 1] count, so the surface a ray
// leaves from is not hit again
pub fn intersect(ray: &Ray, primitives: &[Primitive], params: &KernelParams) -> Hit {
    if ray.is_degenerate() {
        return Hit::Miss { terminal: ray.origin, normal: 0. };
    }

    let dir = ray.direction();

    let mut nearest = params.t_max;
    let mut hit = None;

    let count = primitives.len().min(params.primitive_count as usize);
    for (idx, prim) in primitives[..count].iter().enumerate() {
        let edge = prim.edge();

        // Parallel to the segment
        let denom = dir.cross(edge);
        if denom.abs() < params.eps {
            continue;
        }

        let w = prim.src.sub(ray.origin);
        let t = w.cross(edge) / denom;
        let u = w.cross(dir) / denom;

        // Strict, so on a tie (a shared polygon vertex) the lower index wins.
        // The mirror off that edge can leave a closed polygon
        if t > params.t_min && t < nearest && (0. ..=1.).contains(&u) {
            nearest = t;
            hit = Some((idx as u32, prim.normal()));
        }
    }

    let location = ray.origin.add(dir.scale(nearest));

    match hit {
        Some((primitive, normal)) => Hit::Surface { location, primitive, normal },
        None => Hit::Miss {
            terminal: location,
            normal: ray.angle + consts::PI,
        },
    }
}
