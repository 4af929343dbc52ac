//! Geometric shapes.
//!
//! The set of shapes is closed, so dispatch is a `match` on [`Shape`].

mod mesh;
mod sphere;
mod triangulate;

pub use mesh::{Mesh, MeshTriangle};
pub use sphere::Sphere;
pub use triangulate::triangulate;

use lumen_math::{Aabb, Dual2, QueryRay, Ray, Vec3};

use crate::attribute::{AttributeSet, InterpolationContext};
use crate::intersect::LocalGeometry;

/// Local-space differential geometry at a hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitInfo {
    pub prim_id: usize,
    pub t: Dual2<f32>,
    pub u: Dual2<f32>,
    pub v: Dual2<f32>,
    pub dpdu: Vec3,
    pub dpdv: Vec3,
    /// Unit geometric normal.
    pub ng: Vec3,
}

/// A point drawn uniformly by area.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AreaSample {
    pub prim_id: usize,
    pub p: Vec3,
    /// Unit normal at `p`.
    pub n: Vec3,
}

#[derive(Debug, Clone)]
pub enum Shape {
    Mesh(Mesh),
    Sphere(Sphere),
}

impl Shape {
    pub fn attributes(&self) -> &AttributeSet {
        match self {
            Shape::Mesh(m) => m.attributes(),
            Shape::Sphere(s) => s.attributes(),
        }
    }

    pub fn area(&self) -> f32 {
        match self {
            Shape::Mesh(m) => m.area(),
            Shape::Sphere(s) => s.area(),
        }
    }

    pub fn bounds(&self) -> Aabb {
        match self {
            Shape::Mesh(m) => m.bounds(),
            Shape::Sphere(s) => s.bounds(),
        }
    }

    /// Converts a local-space hit on `prim_id` into differential geometry.
    pub fn hit_info(&self, ray: &Ray, prim_id: usize) -> Option<HitInfo> {
        match self {
            Shape::Mesh(m) => m.hit_info(ray, prim_id),
            Shape::Sphere(s) => s.hit_info(ray),
        }
    }

    pub fn interpolation_context(&self, hit: &HitInfo) -> InterpolationContext {
        match self {
            Shape::Mesh(m) => m.interpolation_context(hit),
            Shape::Sphere(s) => s.interpolation_context(),
        }
    }

    /// Uniform area sample in local space.
    pub fn sample(&self, u1: f32, u2: f32, u3: f32) -> AreaSample {
        match self {
            Shape::Mesh(m) => m.sample(u1, u2, u3),
            Shape::Sphere(s) => s.sample(u1, u2, u3),
        }
    }

    /// Local-space area density of [`Shape::sample`]; zero for a shape without area.
    pub fn pdf_area(&self) -> f32 {
        let area = self.area();
        if area > 0.0 {
            1.0 / area
        } else {
            0.0
        }
    }
}

impl LocalGeometry for Shape {
    fn primitive_count(&self) -> usize {
        match self {
            Shape::Mesh(m) => m.triangles().len(),
            Shape::Sphere(_) => 1,
        }
    }

    fn primitive_bounds(&self, prim_id: usize) -> Aabb {
        match self {
            Shape::Mesh(m) => m.triangle_bounds(prim_id),
            Shape::Sphere(s) => s.bounds(),
        }
    }

    fn intersect_primitive(&self, ray: &QueryRay, prim_id: usize) -> Option<f32> {
        match self {
            Shape::Mesh(m) => m.intersect_triangle(ray, prim_id),
            Shape::Sphere(s) => s.intersect(ray),
        }
    }
}

impl From<Mesh> for Shape {
    fn from(mesh: Mesh) -> Self {
        Shape::Mesh(mesh)
    }
}

impl From<Sphere> for Shape {
    fn from(sphere: Sphere) -> Self {
        Shape::Sphere(sphere)
    }
}
