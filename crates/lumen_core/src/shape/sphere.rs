//! Analytic sphere centred at the local origin.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use lumen_math::{atan2, sampling, Aabb, Dual2, QueryRay, Ray, Vec3};

use super::{AreaSample, HitInfo};
use crate::attribute::{AttributeCounts, AttributeSet, InterpolationContext};
use crate::error::{ShapeError, ShapeResult};
use crate::params::ParamReader;

/// Spheres only carry constant and per-face (single face) attributes.
const SPHERE_COUNTS: AttributeCounts = AttributeCounts {
    per_face: 1,
    linear: None,
    vertex: None,
};

#[derive(Debug, Clone)]
pub struct Sphere {
    radius: f32,
    attributes: AttributeSet,
}

impl Sphere {
    pub fn new(radius: f32, params: &mut ParamReader<'_>) -> ShapeResult<Self> {
        if radius < 0.0 || !radius.is_finite() {
            return Err(ShapeError::NegativeRadius(radius));
        }
        Ok(Self {
            radius,
            attributes: AttributeSet::from_reader(params, &SPHERE_COUNTS),
        })
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    pub fn area(&self) -> f32 {
        4.0 * PI * self.radius * self.radius
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(Vec3::splat(-self.radius), Vec3::splat(self.radius))
    }

    /// Both roots of `|o + t d|^2 = r^2`, nearest first.
    fn roots(&self, origin: Vec3, direction: Vec3) -> Option<(f32, f32)> {
        let a = direction.dot(direction);
        let b = 2.0 * direction.dot(origin);
        let c = origin.dot(origin) - self.radius * self.radius;
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 || a == 0.0 || self.radius == 0.0 {
            return None;
        }
        let sq = disc.sqrt();
        Some(((-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a)))
    }

    /// The nearer root inside `[tmin, tmax]`, falling back to the farther one.
    fn pick_root(&self, origin: Vec3, direction: Vec3, tmin: f32, tmax: f32) -> Option<f32> {
        let (near, far) = self.roots(origin, direction)?;
        if (tmin..=tmax).contains(&near) {
            Some(near)
        } else if (tmin..=tmax).contains(&far) {
            Some(far)
        } else {
            None
        }
    }

    pub fn intersect(&self, ray: &QueryRay) -> Option<f32> {
        self.pick_root(ray.origin, ray.direction, ray.tmin, ray.tmax)
    }

    /// Differential hit record with spherical `(u, v)` parameterization.
    pub fn hit_info(&self, ray: &Ray) -> Option<HitInfo> {
        let (near, _) = self.roots(ray.origin.val, ray.direction.val)?;
        // Solve again with duals so t carries the ray's differentials
        let t = self.dual_root(ray, near < ray.tnear)?;

        let p = ray.at_dual(t);
        let (x, y, z) = (p.x(), p.y(), p.z());
        let mut theta = atan2(y, x);
        if theta.val < 0.0 {
            theta.val += TAU;
        }
        let phi = (z / self.radius).asin();

        let u = theta / TAU;
        let v = (phi + Dual2::constant(FRAC_PI_2)) / PI;

        let (sin_t, cos_t) = theta.val.sin_cos();
        let dpdu = Vec3::new(-p.val.y, p.val.x, 0.0) * TAU;
        let dpdv = Vec3::new(-p.val.z * cos_t, -p.val.z * sin_t, self.radius * phi.val.cos()) * PI;

        Some(HitInfo {
            prim_id: 0,
            t,
            u,
            v,
            dpdu,
            dpdv,
            ng: p.val.normalize_or_zero(),
        })
    }

    fn dual_root(&self, ray: &Ray, far: bool) -> Option<Dual2<f32>> {
        let (o, d) = (ray.origin, ray.direction);
        let a = d.dot(&d);
        let b = d.dot(&o) * 2.0;
        let c = o.dot(&o) - Dual2::constant(self.radius * self.radius);
        let disc = b * b - a * c * 4.0;
        if disc.val < 0.0 || a.val == 0.0 {
            return None;
        }
        let sq = disc.sqrt();
        let num = if far { -b + sq } else { -b - sq };
        Some(num / (a * 2.0))
    }

    pub fn interpolation_context(&self) -> InterpolationContext {
        InterpolationContext::face_only(0)
    }

    /// Uniform point on the surface. `u3` is unused.
    pub fn sample(&self, u1: f32, u2: f32, _u3: f32) -> AreaSample {
        let n = sampling::uniform_sample_sphere(u1, u2);
        AreaSample {
            prim_id: 0,
            p: n * self.radius,
            n,
        }
    }
}
