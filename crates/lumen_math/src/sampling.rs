//! Warps from the unit square to common sampling domains.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use glam::{Vec2, Vec3};

/// Concentric mapping of the unit square onto the unit disk (Shirley-Chiu).
pub fn concentric_sample_disk(u1: f32, u2: f32) -> Vec2 {
    let sx = 2.0 * u1 - 1.0;
    let sy = 2.0 * u2 - 1.0;
    if sx == 0.0 && sy == 0.0 {
        return Vec2::ZERO;
    }
    let (r, theta) = if sx.abs() > sy.abs() {
        (sx, FRAC_PI_4 * (sy / sx))
    } else {
        (sy, FRAC_PI_2 - FRAC_PI_4 * (sx / sy))
    };
    Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Uniform direction on the unit sphere.
pub fn uniform_sample_sphere(u1: f32, u2: f32) -> Vec3 {
    let z = 1.0 - 2.0 * u1;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u2;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

pub const UNIFORM_SPHERE_PDF: f32 = 1.0 / (4.0 * PI);

/// Uniform barycentric coordinates `(u, v)` over a triangle.
///
/// The weight of the first vertex is `1 - u - v`.
pub fn uniform_sample_triangle(u1: f32, u2: f32) -> (f32, f32) {
    let su1 = u1.sqrt();
    (1.0 - su1, u2 * su1)
}
