use crate::{Dual2, Interval, Vec3};

/// Default start of the parametric range; keeps secondary rays off their origin surface.
pub const RAY_TNEAR: f32 = 1e-3;
/// Default end of the parametric range.
pub const RAY_TFAR: f32 = 1e30;

/// A ray carrying image-space differentials.
///
/// Origin and direction are dual numbers: their `dx`/`dy` parts describe how
/// the ray changes between neighbouring pixels. The direction is not required
/// to be unit length, so `t` is measured in units of `|direction|`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Dual2<Vec3>,
    pub direction: Dual2<Vec3>,
    pub tnear: f32,
    pub tfar: f32,
}

impl Ray {
    /// A ray without differentials over the default range.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self::with_differentials(Dual2::constant(origin), Dual2::constant(direction))
    }

    pub fn with_differentials(origin: Dual2<Vec3>, direction: Dual2<Vec3>) -> Self {
        Self {
            origin,
            direction,
            tnear: RAY_TNEAR,
            tfar: RAY_TFAR,
        }
    }

    pub fn with_range(mut self, tnear: f32, tfar: f32) -> Self {
        self.tnear = tnear;
        self.tfar = tfar;
        self
    }

    pub fn range(&self) -> Interval {
        Interval::new(self.tnear, self.tfar)
    }

    /// Point at parameter `t`, ignoring differentials.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin.val + self.direction.val * t
    }

    /// Point at a differential parameter: `o + d * t` with full derivative propagation.
    pub fn at_dual(&self, t: Dual2<f32>) -> Dual2<Vec3> {
        self.origin + self.direction * t
    }

    /// Strips the differentials for the intersection service.
    pub fn query(&self) -> QueryRay {
        QueryRay::new(self.origin.val, self.direction.val, self.tnear, self.tfar)
    }
}

/// The plain ray handed to intersection services.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct QueryRay {
    pub origin: Vec3,
    pub direction: Vec3,
    pub tmin: f32,
    pub tmax: f32,
}

impl QueryRay {
    pub fn new(origin: Vec3, direction: Vec3, tmin: f32, tmax: f32) -> Self {
        Self {
            origin,
            direction,
            tmin,
            tmax,
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    pub fn range(&self) -> Interval {
        Interval::new(self.tmin, self.tmax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_defaults() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert_eq!(ray.tnear, RAY_TNEAR);
        assert_eq!(ray.tfar, RAY_TFAR);
        assert_eq!(ray.origin.dx, Vec3::ZERO);
    }

    #[test]
    fn test_ray_at_dual_carries_derivatives() {
        let ray = Ray::with_differentials(
            Dual2::new(Vec3::ZERO, Vec3::X, Vec3::ZERO),
            Dual2::new(Vec3::Z, Vec3::ZERO, Vec3::Y),
        );
        let p = ray.at_dual(Dual2::new(2.0, 0.0, 0.5));
        assert_eq!(p.val, Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(p.dx, Vec3::X);
        // d/dy (d * t) = dd/dy * t + d * dt/dy
        assert_eq!(p.dy, Vec3::new(0.0, 2.0, 0.5));
    }

    #[test]
    fn test_query_keeps_range() {
        let q = Ray::new(Vec3::ONE, Vec3::Y).with_range(0.5, 2.0).query();
        assert_eq!(q.origin, Vec3::ONE);
        assert_eq!(q.range(), Interval::new(0.5, 2.0));
        assert_eq!(q.at(2.0), Vec3::new(1.0, 3.0, 1.0));
    }
}
