// Same approach as the records: a plain array alias
// keeps the structs Pod without a newtype in the way
pub type V2<T> = [T; 2];

pub trait V2Ops {
    type Ty: Default + num_traits::real::Real;

    fn add(self, b: Self) -> Self;
    fn sub(self, b: Self) -> Self;
    fn cross(self, b: Self) -> Self::Ty;
    fn dot(self, b: Self) -> Self::Ty;
    fn scale(self, s: Self::Ty) -> Self;
    fn mag(self) -> Self::Ty;
    fn angle(self) -> Self::Ty;
    fn from_angle(angle: Self::Ty) -> Self;
}

impl<T: Default + num_traits::real::Real> V2Ops for V2<T> {
    type Ty = T;

    fn add(mut self, b: Self) -> Self {
        self[0] = self[0] + b[0];
        self[1] = self[1] + b[1];
        self
    }

    fn sub(mut self, b: Self) -> Self {
        self[0] = self[0] - b[0];
        self[1] = self[1] - b[1];
        self
    }

    // The z component of the 3D cross product
    fn cross(self, b: Self) -> Self::Ty {
        self[0] * b[1] - self[1] * b[0]
    }

    fn dot(self, b: Self) -> Self::Ty {
        self.into_iter()
            .zip(b)
            .fold(Self::Ty::default(), |dot, (a, b)| dot + a * b)
    }

    fn scale(mut self, s: Self::Ty) -> Self {
        self[0] = self[0] * s;
        self[1] = self[1] * s;
        self
    }

    fn mag(self) -> Self::Ty {
        self.dot(self).sqrt()
    }

    fn angle(self) -> Self::Ty {
        self[1].atan2(self[0])
    }

    fn from_angle(angle: Self::Ty) -> Self {
        [angle.cos(), angle.sin()]
    }
}

#[cfg(test)]
mod tests {
    use super::V2Ops as _;

    #[test]
    fn cross_sign_follows_winding() {
        assert!([1f32, 0.].cross([0., 1.]) > 0.);
        assert!([0f32, 1.].cross([1., 0.]) < 0.);
    }

    #[test]
    fn angle_round_trips_through_unit_vector() {
        let angle = 1.234f32;
        let v = <[f32; 2]>::from_angle(angle);

        assert!((v.mag() - 1.).abs() < 1e-6);
        assert!((v.angle() - angle).abs() < 1e-6);
    }
}
