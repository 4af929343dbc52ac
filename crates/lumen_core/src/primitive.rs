//! A shape placed in the world with a shader bound to it.

use std::sync::Arc;

use lumen_math::{Dual2, Ray, Transform, Vec3};

use crate::attribute::{AttributeType, AttributeValue, InterpolationContext};
use crate::shading::{ShaderRef, ShadingInputs};
use crate::shape::Shape;

/// A world-space point drawn from a primitive's surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSample {
    pub prim_id: usize,
    pub p: Vec3,
    /// Unit world normal.
    pub n: Vec3,
    /// Density with respect to world-space area.
    pub pdf_area: f32,
}

#[derive(Debug, Clone)]
pub struct Primitive {
    shape: Arc<Shape>,
    object_to_world: Transform,
    world_to_object: Transform,
    shader: ShaderRef,
    shader_to_world: Transform,
    emissive: bool,
}

impl Primitive {
    pub fn new(
        shape: Arc<Shape>,
        object_to_world: Transform,
        shader: ShaderRef,
        shader_to_world: Transform,
        emissive: bool,
    ) -> Self {
        Self {
            shape,
            world_to_object: object_to_world.inverse(),
            object_to_world,
            shader,
            shader_to_world,
            emissive,
        }
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn object_to_world(&self) -> &Transform {
        &self.object_to_world
    }

    pub fn world_to_object(&self) -> &Transform {
        &self.world_to_object
    }

    pub fn shader(&self) -> &ShaderRef {
        &self.shader
    }

    pub fn shader_to_world(&self) -> &Transform {
        &self.shader_to_world
    }

    pub fn is_emissive(&self) -> bool {
        self.emissive
    }

    /// Shading inputs for a world ray that the intersection service reported
    /// as hitting local primitive `prim_id`.
    ///
    /// `None` when the shape cannot build a hit record (degenerate geometry).
    pub fn intersection_inputs(&self, ray: &Ray, prim_id: usize) -> Option<ShadingInputs<'_>> {
        let local_ray = self.world_to_object.ray(ray);
        let hit = self.shape.hit_info(&local_ray, prim_id)?;
        let interpolation = self.shape.interpolation_context(&hit);
        let attributes = self.shape.attributes();

        // The transform is affine and the direction unnormalized, so t is shared by both spaces
        let p = ray.at_dual(hit.t);

        let u = attributes
            .u()
            .and_then(|a| a.interpolate_float(&interpolation))
            .unwrap_or(hit.u);
        let v = attributes
            .v()
            .and_then(|a| a.interpolate_float(&interpolation))
            .unwrap_or(hit.v);

        let mut ng = self.object_to_world.normal(hit.ng).normalize_or_zero();
        let mut n = attributes
            .normal()
            .and_then(|a| a.interpolate_vec3(&interpolation))
            .map(|n| self.object_to_world.normal(n.val).normalize_or_zero())
            .filter(|n| *n != Vec3::ZERO)
            .unwrap_or(ng);
        if n.dot(ng) < 0.0 {
            n = -n;
        }

        let i = ray.direction;
        let backfacing = ng.dot(i.val) > 0.0;
        if backfacing {
            n = -n;
            ng = -ng;
        }

        Some(ShadingInputs {
            p,
            i,
            u,
            v,
            dpdu: self.object_to_world.vector(hit.dpdu),
            dpdv: self.object_to_world.vector(hit.dpdv),
            n,
            ng,
            backfacing,
            surface_area: self.shape.area(),
            object_to_world: self.object_to_world,
            shader_to_world: self.shader_to_world,
            interpolation,
            primitive: self,
        })
    }

    /// Shading inputs at a sampled surface point, as seen from one unit
    /// above it along the normal.
    pub fn surface_inputs(&self, sample: &SurfaceSample) -> Option<ShadingInputs<'_>> {
        let ray = Ray::new(sample.p + sample.n, -sample.n);
        self.intersection_inputs(&ray, sample.prim_id)
    }

    /// Uniform sample by area, mapped to world space.
    pub fn sample(&self, u1: f32, u2: f32, u3: f32) -> SurfaceSample {
        let local = self.shape.sample(u1, u2, u3);
        let scale = self.object_to_world.area_scale(local.n);
        SurfaceSample {
            prim_id: local.prim_id,
            p: self.object_to_world.point(local.p),
            n: self.object_to_world.normal(local.n).normalize_or_zero(),
            pdf_area: if scale > 0.0 {
                self.shape.pdf_area() / scale
            } else {
                0.0
            },
        }
    }

    /// Samples the surface as seen from `reference`. The returned pdf is
    /// with respect to solid angle at `reference`; zero means the sample is
    /// unusable.
    pub fn sample_solid_angle(&self, reference: Vec3, u1: f32, u2: f32, u3: f32) -> (SurfaceSample, f32) {
        let sample = self.sample(u1, u2, u3);
        let pdf = solid_angle_pdf(sample.pdf_area, reference, sample.p, sample.n);
        (sample, pdf)
    }

    /// Solid-angle density of [`Primitive::sample_solid_angle`] producing
    /// the point `p` with world normal `n`.
    pub fn pdf_solid_angle(&self, reference: Vec3, p: Vec3, n: Vec3) -> f32 {
        let local_n = self.world_to_object.normal(n).normalize_or_zero();
        let scale = self.object_to_world.area_scale(local_n);
        if scale <= 0.0 {
            return 0.0;
        }
        solid_angle_pdf(self.shape.pdf_area() / scale, reference, p, n)
    }

    /// Interpolates attribute `name` at a hit and moves geometric types to
    /// world space. Normals are renormalized.
    pub fn interpolate(&self, name: &str, ctx: &InterpolationContext) -> Option<AttributeValue<'_>> {
        let attribute = self.shape.attributes().get(name)?;
        let value = attribute.interpolate(ctx);
        let AttributeValue::Floats(floats) = value else {
            return Some(value);
        };
        let map: fn(&Transform, Dual2<Vec3>) -> Dual2<Vec3> = match attribute.ty {
            AttributeType::Point => |t, v| t.point_dual(v),
            AttributeType::Vector => |t, v| t.vector_dual(v),
            AttributeType::Normal => |t, v| t.normal_dual(v).normalize(),
            _ => return Some(AttributeValue::Floats(floats)),
        };
        let world = floats
            .chunks_exact(3)
            .flat_map(|c| {
                let w = map(&self.object_to_world, Dual2::from_components(c[0], c[1], c[2]));
                [w.x(), w.y(), w.z()]
            })
            .collect();
        Some(AttributeValue::Floats(world))
    }
}

/// Converts an area density at `p` into a solid-angle density at `reference`.
pub fn solid_angle_pdf(pdf_area: f32, reference: Vec3, p: Vec3, n: Vec3) -> f32 {
    let to_point = p - reference;
    let dist2 = to_point.length_squared();
    if dist2 == 0.0 || pdf_area <= 0.0 {
        return 0.0;
    }
    let cos = to_point.dot(n).abs() / dist2.sqrt();
    if cos < 1e-6 {
        return 0.0;
    }
    pdf_area * dist2 / cos
}
