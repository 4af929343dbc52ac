//! Interface to the shading engine.
//!
//! Shading networks are opaque to the renderer. It hands the engine a
//! [`ShadingInputs`] record and gets back a [`Bsdf`] and emitted radiance.

use std::fmt;
use std::sync::Arc;

use lumen_math::{Dual2, Transform, Vec3};

use crate::attribute::{AttributeValue, InterpolationContext};
use crate::primitive::Primitive;

/// Linear RGB radiance or reflectance.
pub type Color = Vec3;

pub fn is_black(c: Color) -> bool {
    !(c.x > 0.0 || c.y > 0.0 || c.z > 0.0)
}

/// Name of a shading network, shared between the primitives bound to it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ShaderRef(Arc<str>);

impl ShaderRef {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ShaderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShaderRef({:?})", self.name())
    }
}

/// Resolves renderer-owned coordinate systems (`camera`, `screen`, `NDC`, `raster`).
pub trait NamedSpaces: Send + Sync {
    /// Transform from the named space to world space.
    fn space_to_world(&self, name: &str) -> Option<Transform>;
}

/// No renderer-owned spaces.
impl NamedSpaces for () {
    fn space_to_world(&self, _name: &str) -> Option<Transform> {
        None
    }
}

/// Everything the shading engine gets to see about a surface point.
///
/// All vectors are in world space. `n` and `ng` face the incoming ray's
/// side when `backfacing` is set.
#[derive(Debug, Clone)]
pub struct ShadingInputs<'a> {
    /// Position with its screen-space derivatives.
    pub p: Dual2<Vec3>,
    /// Incident ray direction with derivatives.
    pub i: Dual2<Vec3>,
    pub u: Dual2<f32>,
    pub v: Dual2<f32>,
    pub dpdu: Vec3,
    pub dpdv: Vec3,
    /// Shading normal.
    pub n: Vec3,
    /// Geometric normal.
    pub ng: Vec3,
    pub backfacing: bool,
    pub surface_area: f32,
    pub object_to_world: Transform,
    pub shader_to_world: Transform,
    pub interpolation: InterpolationContext,
    pub primitive: &'a Primitive,
}

impl<'a> ShadingInputs<'a> {
    /// Looks up user data on the primitive, already moved to world space.
    pub fn attribute(&self, name: &str) -> Option<AttributeValue<'a>> {
        self.primitive.interpolate(name, &self.interpolation)
    }

    /// Transform from a named space to world space.
    ///
    /// `world` and `common` are the render space; `object` and `shader`
    /// belong to the primitive. Anything else is asked of `renderer`.
    pub fn space_to_world(&self, name: &str, renderer: &dyn NamedSpaces) -> Option<Transform> {
        match name {
            "world" | "common" => Some(Transform::IDENTITY),
            "object" => Some(self.object_to_world),
            "shader" => Some(self.shader_to_world),
            other => renderer.space_to_world(other),
        }
    }
}

/// Result of sampling a BSDF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BsdfSample {
    /// Outgoing direction with differentials.
    pub direction: Dual2<Vec3>,
    /// `f * |cos| / pdf`, or `f * |cos|` for a delta lobe.
    pub weight: Color,
    /// Inverse solid-angle pdf; zero marks a specular (delta) sample.
    pub inv_pdf: f32,
}

pub trait Bsdf {
    fn sample(&self, inputs: &ShadingInputs<'_>, u1: f32, u2: f32) -> BsdfSample;

    /// `f * |cos|` toward `wi` and the solid-angle pdf of sampling it.
    fn eval(&self, inputs: &ShadingInputs<'_>, wi: Vec3) -> (Color, f32);
}

pub struct ShadingResult<B> {
    pub bsdf: B,
    pub emission: Color,
}

/// The shading engine.
///
/// A `Context` is per-thread scratch state; it is created once per worker and
/// released when dropped.
pub trait ShadingService: Send + Sync {
    type Context: Send;
    type Bsdf: Bsdf;

    fn create_context(&self) -> Self::Context;

    fn execute(
        &self,
        ctx: &mut Self::Context,
        shader: &ShaderRef,
        inputs: &ShadingInputs<'_>,
        spaces: &dyn NamedSpaces,
    ) -> ShadingResult<Self::Bsdf>;

    /// Radiance arriving from infinitely far away along `direction`.
    fn background(&self, ctx: &mut Self::Context, shader: &ShaderRef, direction: Vec3) -> Color;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_black() {
        assert!(is_black(Color::ZERO));
        assert!(is_black(Color::new(-1.0, 0.0, 0.0)));
        assert!(is_black(Color::splat(f32::NAN)));
        assert!(!is_black(Color::new(0.0, 0.1, 0.0)));
    }

    #[test]
    fn test_shader_ref_shares_name() {
        let a = ShaderRef::new("matte");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.name(), "matte");
        assert_eq!(format!("{:?}", a), "ShaderRef(\"matte\")");
    }
}
