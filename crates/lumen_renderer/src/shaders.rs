//! A small reference shading service.
//!
//! Shaders are looked up by name in a table of fixed materials: diffuse,
//! perfect mirror and one-sided emitter, plus constant and gradient
//! backgrounds. Enough to drive the integrator and the demo scene.

use std::collections::HashMap;
use std::f32::consts::{FRAC_1_PI, PI};

use log::{debug, warn};
use lumen_core::{
    AttributeValue, Bsdf, BsdfSample, Color, NamedSpaces, ShaderRef, ShadingInputs, ShadingResult,
    ShadingService,
};
use lumen_math::sampling::concentric_sample_disk;
use lumen_math::{Dual2, Vec3};

/// Surface materials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Material {
    /// Lambertian reflector. A `Cs` color attribute on the primitive tints it.
    Diffuse { albedo: Color },
    /// Perfect specular reflector.
    Mirror { albedo: Color },
    /// Emits `radiance` from its front side and reflects diffusely.
    Emitter { radiance: Color, albedo: Color },
}

impl Default for Material {
    fn default() -> Self {
        Material::Diffuse {
            albedo: Color::splat(0.5),
        }
    }
}

/// Background shaders. Directions use `z` as up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    Constant(Color),
    Gradient { horizon: Color, zenith: Color },
}

impl Background {
    fn radiance(&self, direction: Vec3) -> Color {
        match *self {
            Background::Constant(c) => c,
            Background::Gradient { horizon, zenith } => {
                let t = direction.normalize_or_zero().z.max(0.0);
                horizon.lerp(zenith, t)
            }
        }
    }
}

/// Per-thread shading state.
#[derive(Debug, Default)]
pub struct ShadingContext {
    executions: u64,
}

impl ShadingContext {
    pub fn executions(&self) -> u64 {
        self.executions
    }
}

impl Drop for ShadingContext {
    fn drop(&mut self) {
        if self.executions > 0 {
            debug!("Releasing shading context after {} executions", self.executions);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceBsdf {
    Diffuse(Color),
    Mirror(Color),
}

impl Bsdf for ReferenceBsdf {
    fn sample(&self, inputs: &ShadingInputs<'_>, u1: f32, u2: f32) -> BsdfSample {
        match *self {
            ReferenceBsdf::Diffuse(albedo) => {
                // Cosine-weighted hemisphere around the shading normal
                let d = concentric_sample_disk(u1, u2);
                let z = (1.0 - d.length_squared()).max(0.0).sqrt();
                let (t, b) = inputs.n.any_orthonormal_pair();
                let wi = t * d.x + b * d.y + inputs.n * z;
                if z <= 0.0 || wi.dot(inputs.ng) <= 0.0 {
                    return BsdfSample {
                        direction: Dual2::constant(wi),
                        weight: Color::ZERO,
                        inv_pdf: 0.0,
                    };
                }
                BsdfSample {
                    direction: Dual2::constant(wi),
                    weight: albedo,
                    inv_pdf: PI / z,
                }
            }
            ReferenceBsdf::Mirror(albedo) => {
                let i = inputs.i.normalize();
                let n = inputs.n;
                let reflected = i - n * (i.dot_vec(n) * 2.0);
                BsdfSample {
                    direction: reflected,
                    weight: albedo,
                    inv_pdf: 0.0,
                }
            }
        }
    }

    fn eval(&self, inputs: &ShadingInputs<'_>, wi: Vec3) -> (Color, f32) {
        match *self {
            ReferenceBsdf::Diffuse(albedo) => {
                let wi = wi.normalize_or_zero();
                let cos = wi.dot(inputs.n);
                if cos <= 0.0 || wi.dot(inputs.ng) <= 0.0 {
                    return (Color::ZERO, 0.0);
                }
                (albedo * (cos * FRAC_1_PI), cos * FRAC_1_PI)
            }
            ReferenceBsdf::Mirror(_) => (Color::ZERO, 0.0),
        }
    }
}

/// Name-keyed material and background tables.
#[derive(Debug, Clone, Default)]
pub struct ReferenceShading {
    materials: HashMap<String, Material>,
    backgrounds: HashMap<String, Background>,
    fallback: Material,
}

impl ReferenceShading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_material(mut self, name: &str, material: Material) -> Self {
        self.materials.insert(name.to_string(), material);
        self
    }

    pub fn with_background(mut self, name: &str, background: Background) -> Self {
        self.backgrounds.insert(name.to_string(), background);
        self
    }

    /// Material used for shader names missing from the table.
    pub fn with_fallback(mut self, material: Material) -> Self {
        self.fallback = material;
        self
    }

    pub fn material(&self, shader: &ShaderRef) -> &Material {
        self.materials.get(shader.name()).unwrap_or(&self.fallback)
    }

    /// Warns once for each shader name with no material.
    pub fn report_missing<'a>(&self, shaders: impl IntoIterator<Item = &'a ShaderRef>) {
        let mut seen: Vec<&str> = Vec::new();
        for shader in shaders {
            let name = shader.name();
            if !self.materials.contains_key(name) && !seen.contains(&name) {
                warn!("No material named \"{}\"; using the fallback", name);
                seen.push(name);
            }
        }
    }
}

/// Primitive color from a `Cs` attribute, if present.
fn surface_color(inputs: &ShadingInputs<'_>) -> Option<Color> {
    match inputs.attribute("Cs")? {
        AttributeValue::Floats(v) if v.len() >= 3 => Some(Color::new(v[0].val, v[1].val, v[2].val)),
        _ => None,
    }
}

impl ShadingService for ReferenceShading {
    type Context = ShadingContext;
    type Bsdf = ReferenceBsdf;

    fn create_context(&self) -> ShadingContext {
        ShadingContext::default()
    }

    fn execute(
        &self,
        ctx: &mut ShadingContext,
        shader: &ShaderRef,
        inputs: &ShadingInputs<'_>,
        _spaces: &dyn NamedSpaces,
    ) -> ShadingResult<ReferenceBsdf> {
        ctx.executions += 1;
        let tint = surface_color(inputs).unwrap_or(Color::ONE);
        match *self.material(shader) {
            Material::Diffuse { albedo } => ShadingResult {
                bsdf: ReferenceBsdf::Diffuse(albedo * tint),
                emission: Color::ZERO,
            },
            Material::Mirror { albedo } => ShadingResult {
                bsdf: ReferenceBsdf::Mirror(albedo * tint),
                emission: Color::ZERO,
            },
            Material::Emitter { radiance, albedo } => ShadingResult {
                bsdf: ReferenceBsdf::Diffuse(albedo * tint),
                emission: if inputs.backfacing { Color::ZERO } else { radiance },
            },
        }
    }

    fn background(&self, ctx: &mut ShadingContext, shader: &ShaderRef, direction: Vec3) -> Color {
        ctx.executions += 1;
        self.backgrounds
            .get(shader.name())
            .map_or(Color::ZERO, |b| b.radiance(direction))
    }
}
