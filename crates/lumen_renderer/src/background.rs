//! Importance sampling of the background shader.
//!
//! The shader is tabulated once over a grid in `(phi, theta)` and turned into
//! a piecewise-constant 2D distribution. Directions use `z` as the polar axis.

use std::f32::consts::PI;

use log::debug;
use lumen_core::{Color, ShaderRef, ShadingService};
use lumen_math::{Dual2, Vec2, Vec3};

/// Piecewise-constant density on `[0, 1)`.
#[derive(Debug, Clone)]
pub struct Distribution1D {
    func: Vec<f32>,
    cdf: Vec<f32>,
    integral: f32,
}

impl Distribution1D {
    pub fn new(func: Vec<f32>) -> Self {
        let n = func.len();
        let mut cdf = Vec::with_capacity(n + 1);
        cdf.push(0.0);
        for (i, f) in func.iter().enumerate() {
            cdf.push(cdf[i] + f.max(0.0) / n as f32);
        }
        let integral = cdf[n];
        if integral > 0.0 {
            for c in cdf.iter_mut() {
                *c /= integral;
            }
        } else {
            // Degenerate: fall back to uniform so sampling stays well-defined
            for (i, c) in cdf.iter_mut().enumerate() {
                *c = i as f32 / n as f32;
            }
        }
        Self {
            func,
            cdf,
            integral,
        }
    }

    pub fn count(&self) -> usize {
        self.func.len()
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Maps `u` to `(x, pdf, segment)`.
    pub fn sample(&self, u: f32) -> (f32, f32, usize) {
        let n = self.count();
        let offset = self
            .cdf
            .partition_point(|&c| c <= u)
            .saturating_sub(1)
            .min(n - 1);
        let width = self.cdf[offset + 1] - self.cdf[offset];
        let du = if width > 0.0 {
            (u - self.cdf[offset]) / width
        } else {
            0.0
        };
        let x = ((offset as f32 + du) / n as f32).min(1.0 - f32::EPSILON);
        (x, self.pdf_segment(offset), offset)
    }

    fn pdf_segment(&self, offset: usize) -> f32 {
        if self.integral > 0.0 {
            self.func[offset].max(0.0) / self.integral
        } else {
            0.0
        }
    }

    pub fn segment(&self, x: f32) -> usize {
        ((x * self.count() as f32) as usize).min(self.count() - 1)
    }

    pub fn pdf(&self, x: f32) -> f32 {
        self.pdf_segment(self.segment(x))
    }
}

/// Density on `[0, 1)^2`: a marginal over rows (`v`) and one conditional per row (`u`).
#[derive(Debug, Clone)]
pub struct Distribution2D {
    conditional: Vec<Distribution1D>,
    marginal: Distribution1D,
}

impl Distribution2D {
    /// `func` is row-major with `nu` columns and `nv` rows.
    pub fn new(func: &[f32], nu: usize, nv: usize) -> Self {
        let conditional: Vec<Distribution1D> = func
            .chunks_exact(nu)
            .take(nv)
            .map(|row| Distribution1D::new(row.to_vec()))
            .collect();
        let marginal = Distribution1D::new(conditional.iter().map(|c| c.integral()).collect());
        Self {
            conditional,
            marginal,
        }
    }

    pub fn integral(&self) -> f32 {
        self.marginal.integral()
    }

    pub fn sample(&self, u1: f32, u2: f32) -> (Vec2, f32) {
        let (v, pdf_v, row) = self.marginal.sample(u2);
        let (u, pdf_u, _) = self.conditional[row].sample(u1);
        (Vec2::new(u, v), pdf_u * pdf_v)
    }

    pub fn pdf(&self, uv: Vec2) -> f32 {
        let row = self.marginal.segment(uv.y);
        let column = self.conditional[row].segment(uv.x);
        let integral = self.marginal.integral();
        if integral > 0.0 {
            self.conditional[row].func[column].max(0.0) / integral
        } else {
            0.0
        }
    }
}

/// The background shader seen as a light at infinity.
pub struct BackgroundLight {
    shader: ShaderRef,
    distribution: Distribution2D,
}

impl BackgroundLight {
    /// Tabulates `shader` on a `resolution x resolution` grid of cell centers.
    pub fn new<S: ShadingService>(
        shading: &S,
        ctx: &mut S::Context,
        shader: ShaderRef,
        resolution: usize,
    ) -> Self {
        let resolution = resolution.max(1);
        let mut func = Vec::with_capacity(resolution * resolution);
        for iv in 0..resolution {
            let v = (iv as f32 + 0.5) / resolution as f32;
            let theta = v * PI;
            for iu in 0..resolution {
                let u = (iu as f32 + 0.5) / resolution as f32;
                let radiance = shading.background(ctx, &shader, uv_to_direction(u, v));
                func.push(radiance.element_sum() / 3.0 * theta.sin());
            }
        }
        let distribution = Distribution2D::new(&func, resolution, resolution);
        debug!(
            "Background distribution for {:?}: {}x{} cells, integral {}",
            shader,
            resolution,
            resolution,
            distribution.integral()
        );
        Self {
            shader,
            distribution,
        }
    }

    pub fn shader(&self) -> &ShaderRef {
        &self.shader
    }

    /// Radiance, direction (without differentials) and inverse solid-angle pdf.
    /// An inverse pdf of zero marks an unusable sample.
    pub fn sample<S: ShadingService>(
        &self,
        shading: &S,
        ctx: &mut S::Context,
        u1: f32,
        u2: f32,
    ) -> (Color, Dual2<Vec3>, f32) {
        let (uv, pdf_uv) = self.distribution.sample(u1, u2);
        let direction = uv_to_direction(uv.x, uv.y);
        let pdf = solid_angle_density(pdf_uv, uv.y);
        if pdf <= 0.0 {
            return (Color::ZERO, Dual2::constant(direction), 0.0);
        }
        let radiance = shading.background(ctx, &self.shader, direction);
        (radiance, Dual2::constant(direction), 1.0 / pdf)
    }

    /// Radiance along `direction` and the solid-angle pdf of sampling it.
    pub fn eval<S: ShadingService>(
        &self,
        shading: &S,
        ctx: &mut S::Context,
        direction: Vec3,
    ) -> (Color, f32) {
        let radiance = shading.background(ctx, &self.shader, direction);
        let uv = direction_to_uv(direction);
        let pdf = solid_angle_density(self.distribution.pdf(uv), uv.y);
        (radiance, pdf)
    }
}

/// `u` spans `phi` over `[0, 2pi)`, `v` spans `theta` over `[0, pi]`.
fn uv_to_direction(u: f32, v: f32) -> Vec3 {
    let phi = u * 2.0 * PI;
    let (sin_theta, cos_theta) = (v * PI).sin_cos();
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

fn direction_to_uv(direction: Vec3) -> Vec2 {
    let d = direction.normalize_or_zero();
    let theta = d.z.clamp(-1.0, 1.0).acos();
    let mut phi = d.y.atan2(d.x);
    if phi < 0.0 {
        phi += 2.0 * PI;
    }
    Vec2::new(phi / (2.0 * PI), theta / PI)
}

/// Converts a density over `(u, v)` into one over solid angle.
fn solid_angle_density(pdf_uv: f32, v: f32) -> f32 {
    let sin_theta = (v * PI).sin();
    if pdf_uv <= 0.0 || sin_theta <= 0.0 {
        return 0.0;
    }
    pdf_uv / (2.0 * PI * PI * sin_theta)
}
