use std::f32::consts;

use crate::geom::{Hit, Intersection, Ray};
use crate::geom::v2::{V2, V2Ops as _};

use super::{rng, KernelParams};

// Continues a ray off the surface it hit.
// Escaped and degenerate rays continue as `Ray::ZERO`
pub fn scatter(ray: &Ray, intrs: &Intersection, params: &KernelParams) -> Ray {
    if ray.is_degenerate() {
        return Ray::ZERO;
    }

    let (location, normal) = match intrs.hit(params.primitive_count) {
        Hit::Surface { location, normal, .. } => (location, normal),
        Hit::Miss { .. } => return Ray::ZERO,
    };

    let mirror = 2. * normal + consts::PI - ray.angle;

    // Glossy lobe around the mirror direction
    let spread = ((2. * ray.rng[0] - 1.) * params.roughness).clamp(-1., 1.);
    let mut angle = mirror + spread.asin();

    // Fall back to the mirror direction if the lobe crosses the surface
    let n = <V2<f32>>::from_angle(normal);
    let side = <V2<f32>>::from_angle(mirror).dot(n);
    if <V2<f32>>::from_angle(angle).dot(n) * side <= 0. {
        angle = mirror;
    }

    Ray {
        origin: location,
        angle: wrap(angle),
        wavelength: ray.wavelength,
        rng: rng::advance(ray.rng),
    }
}

// Into [0, 2pi)
fn wrap(angle: f32) -> f32 {
    let angle = angle - consts::TAU * (angle / consts::TAU).floor();

    if angle >= consts::TAU { 0. } else { angle }
}

#[cfg(test)]
mod tests {
    use std::f32::consts;

    use super::*;
    use crate::ComputeConfig;
    use crate::geom::Primitive;

    fn params(roughness: f32) -> KernelParams {
        let compute = ComputeConfig { roughness, ..Default::default() };

        KernelParams::new(&compute, 1, 1)
    }

    fn upward(rng: [f32; 4]) -> Ray {
        Ray {
            origin: [0., -5.],
            angle: consts::FRAC_PI_2,
            wavelength: 620.,
            rng,
        }
    }

    fn floor_hit() -> Intersection {
        let prim = Primitive::new([-10., 0.], [10., 0.]);

        Intersection::from(Hit::Surface {
            location: [0., 0.],
            primitive: 0,
            normal: prim.normal(),
        })
    }

    #[test]
    fn smooth_surfaces_mirror() {
        let ray = upward([0.9, 0.1, 0.2, 0.3]);
        let next = scatter(&ray, &floor_hit(), &params(0.));

        assert!((next.angle - 3. * consts::FRAC_PI_2).abs() < 1e-5);
        assert_eq!(next.origin, [0., 0.]);
    }

    #[test]
    fn wavelength_survives_and_rng_moves() {
        let ray = upward([0.4, 0.5, 0.6, 0.7]);
        let next = scatter(&ray, &floor_hit(), &params(0.1));

        assert_eq!(next.wavelength, ray.wavelength);
        assert_eq!(next.rng, rng::advance(ray.rng));
    }

    #[test]
    fn misses_terminate_the_path() {
        let ray = upward([0.5; 4]);
        let miss = Intersection::from(Hit::Miss { terminal: [0., 100.], normal: 0. });

        assert_eq!(scatter(&ray, &miss, &params(0.1)), Ray::ZERO);
        assert_eq!(scatter(&Ray::ZERO, &floor_hit(), &params(0.1)), Ray::ZERO);
    }

    #[test]
    fn lobe_stays_on_the_reflecting_side() {
        let hit = floor_hit();
        let params = params(1.);

        let mut state = [0.3, 0.6, 0.9, 0.2];
        for _ in 0..256 {
            state = rng::advance(state);

            let next = scatter(&upward(state), &hit, &params);

            // Reflected off the top of y = 0 means heading down
            assert!(next.direction()[1] < 0.);
            assert!((0. ..consts::TAU).contains(&next.angle));
        }
    }

    #[test]
    fn angles_wrap() {
        assert!((wrap(-consts::FRAC_PI_2) - 3. * consts::FRAC_PI_2).abs() < 1e-5);
        assert!((wrap(5. * consts::PI) - consts::PI).abs() < 1e-5);
        assert_eq!(wrap(0.), 0.);
    }
}
