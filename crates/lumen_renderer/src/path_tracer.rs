//! Unidirectional path tracing with multiple importance sampled direct lighting.
//!
//! Each bounce samples one light (an emissive primitive or the background)
//! against one BSDF sample, combines them with the power heuristic, then
//! extends the path by a second BSDF sample. Paths longer than three bounces
//! are subject to Russian roulette.

use lumen_core::{
    is_black, Bsdf, Color, IntersectionService, NamedSpaces, Scene, ShadingInputs, ShadingService,
    Trace,
};
use lumen_math::{Ray, Vec3};
use rand::Rng;

use crate::background::BackgroundLight;

/// Bounces that always continue before Russian roulette kicks in.
const ROULETTE_START: u32 = 3;

/// Power heuristic with exponent 2.
pub fn power_heuristic(a: f32, b: f32) -> f32 {
    let a2 = a * a;
    let sum = a2 + b * b;
    if sum > 0.0 {
        a2 / sum
    } else {
        0.0
    }
}

pub struct PathTracer<'a, A, S> {
    scene: &'a Scene<A>,
    shading: &'a S,
    spaces: &'a dyn NamedSpaces,
    background: Option<&'a BackgroundLight>,
    max_depth: u32,
}

impl<'a, A, S> PathTracer<'a, A, S>
where
    A: IntersectionService,
    S: ShadingService,
{
    pub fn new(
        scene: &'a Scene<A>,
        shading: &'a S,
        spaces: &'a dyn NamedSpaces,
        background: Option<&'a BackgroundLight>,
        max_depth: u32,
    ) -> Self {
        Self {
            scene,
            shading,
            spaces,
            background,
            max_depth,
        }
    }

    /// Number of lights direct lighting chooses between.
    pub fn light_count(&self) -> usize {
        self.scene.emissive_primitives().len() + usize::from(self.background.is_some())
    }

    /// Radiance arriving along `ray`.
    pub fn li(&self, ctx: &mut S::Context, rng: &mut impl Rng, ray: Ray) -> Color {
        let mut radiance = Color::ZERO;
        let mut throughput = Color::ONE;
        let mut specular = false;
        let mut ray = ray;

        for bounce in 0..self.max_depth {
            let hit = match self.scene.trace(&ray) {
                Trace::Hit(hit) => hit,
                Trace::Blocked { .. } => break,
                Trace::Miss => {
                    if bounce == 0 || specular {
                        if let Some(background) = self.background {
                            radiance += throughput
                                * self.shading.background(ctx, background.shader(), ray.direction.val);
                        }
                    }
                    break;
                }
            };

            let inputs = &hit.inputs;
            let result = self
                .shading
                .execute(ctx, hit.primitive().shader(), inputs, self.spaces);
            if bounce == 0 || specular {
                radiance += throughput * result.emission;
            }

            radiance += throughput * self.estimate_direct(ctx, rng, inputs, &result.bsdf);

            let sample = result.bsdf.sample(inputs, rng.gen(), rng.gen());
            throughput *= sample.weight;
            if is_black(throughput) {
                break;
            }
            specular = sample.inv_pdf == 0.0;
            ray = Ray::with_differentials(inputs.p, sample.direction);

            if bounce > ROULETTE_START {
                let survive = throughput.max_element().min(0.5);
                if rng.gen::<f32>() >= survive {
                    break;
                }
                throughput /= survive;
            }
        }

        radiance
    }

    /// One light sample and one BSDF sample, each weighted against the other.
    pub fn estimate_direct(
        &self,
        ctx: &mut S::Context,
        rng: &mut impl Rng,
        inputs: &ShadingInputs<'_>,
        bsdf: &S::Bsdf,
    ) -> Color {
        let count = self.light_count();
        if count == 0 {
            return Color::ZERO;
        }
        let select_pdf = 1.0 / count as f32;
        let lights = self.scene.emissive_primitives();
        let pick = ((rng.gen::<f32>() * count as f32) as usize).min(count - 1);
        let p = inputs.p.val;

        let mut radiance = match lights.get(pick) {
            Some(&index) => self.sample_primitive_light(ctx, rng, inputs, bsdf, index, select_pdf),
            None => self.sample_background(ctx, rng, inputs, bsdf, select_pdf),
        };

        let sample = bsdf.sample(inputs, rng.gen(), rng.gen());
        if sample.inv_pdf == 0.0 {
            return radiance;
        }
        let wi = sample.direction.val;
        let (f, bsdf_pdf) = bsdf.eval(inputs, wi);
        if bsdf_pdf == 0.0 || is_black(f) {
            return radiance;
        }

        let (emission, light_pdf) = match self.scene.trace(&Ray::new(p, wi)) {
            Trace::Miss => match self.background {
                Some(background) => background.eval(self.shading, ctx, wi),
                None => return radiance,
            },
            Trace::Blocked { .. } => return radiance,
            Trace::Hit(hit) => {
                let light = hit.primitive();
                if !light.is_emissive() || hit.inputs.backfacing {
                    return radiance;
                }
                let emission = self
                    .shading
                    .execute(ctx, light.shader(), &hit.inputs, self.spaces)
                    .emission;
                (emission, light.pdf_solid_angle(p, hit.inputs.p.val, hit.inputs.ng))
            }
        };
        if !is_black(emission) {
            let light_pdf = light_pdf * select_pdf;
            radiance += f * emission * (power_heuristic(bsdf_pdf, light_pdf) / bsdf_pdf);
        }
        radiance
    }

    fn sample_primitive_light(
        &self,
        ctx: &mut S::Context,
        rng: &mut impl Rng,
        inputs: &ShadingInputs<'_>,
        bsdf: &S::Bsdf,
        index: usize,
        select_pdf: f32,
    ) -> Color {
        let Some(light) = self.scene.primitive(index) else {
            return Color::ZERO;
        };
        let p = inputs.p.val;
        let (sample, pdf) = light.sample_solid_angle(p, rng.gen(), rng.gen(), rng.gen());
        if pdf == 0.0 {
            return Color::ZERO;
        }
        let Some(light_inputs) = light.surface_inputs(&sample) else {
            return Color::ZERO;
        };
        let wi = (sample.p - p).normalize_or_zero();
        // Light must face the shading point
        if wi == Vec3::ZERO || wi.dot(light_inputs.ng) >= 0.0 {
            return Color::ZERO;
        }
        let emission = self
            .shading
            .execute(ctx, light.shader(), &light_inputs, self.spaces)
            .emission;
        if is_black(emission) {
            return Color::ZERO;
        }
        let (f, bsdf_pdf) = bsdf.eval(inputs, wi);
        if is_black(f) || !self.scene.is_visible_between(p, sample.p) {
            return Color::ZERO;
        }
        let light_pdf = pdf * select_pdf;
        f * emission * (power_heuristic(light_pdf, bsdf_pdf) / light_pdf)
    }

    fn sample_background(
        &self,
        ctx: &mut S::Context,
        rng: &mut impl Rng,
        inputs: &ShadingInputs<'_>,
        bsdf: &S::Bsdf,
        select_pdf: f32,
    ) -> Color {
        let Some(background) = self.background else {
            return Color::ZERO;
        };
        let (emission, direction, inv_pdf) = background.sample(self.shading, ctx, rng.gen(), rng.gen());
        if inv_pdf == 0.0 || is_black(emission) {
            return Color::ZERO;
        }
        let light_pdf = select_pdf / inv_pdf;
        let wi = direction.val;
        let (f, bsdf_pdf) = bsdf.eval(inputs, wi);
        if is_black(f) || !self.scene.is_visible(&Ray::new(inputs.p.val, wi)) {
            return Color::ZERO;
        }
        f * emission * (power_heuristic(light_pdf, bsdf_pdf) / light_pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::InstancedAccelerator;
    use crate::shaders::{Background, Material, ReferenceShading};
    use lumen_core::{
        BsdfSample, GeometryHandle, InstanceHit, LocalGeometry, ParamList, SceneBuilder, ShaderRef,
        ShadingResult, SurfaceBinding,
    };
    use lumen_math::{Dual2, QueryRay, Transform, Vec3};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Service for an empty world: accepts registrations, never reports a hit.
    #[derive(Default)]
    struct EmptyWorld {
        committed: bool,
    }

    impl IntersectionService for EmptyWorld {
        fn register_geometry(&mut self, _geometry: Arc<dyn LocalGeometry>) -> GeometryHandle {
            GeometryHandle(0)
        }

        fn set_instance_transform(&mut self, _: usize, _: GeometryHandle, _: &Transform) {}

        fn commit(&mut self) {
            self.committed = true;
        }

        fn intersect(&self, _ray: &QueryRay) -> Option<InstanceHit> {
            assert!(self.committed);
            None
        }

        fn occluded(&self, _ray: &QueryRay) -> bool {
            false
        }
    }

    /// Shading stub: a constant sky and a BSDF that never reflects.
    struct StubShading;

    struct AbsorbingBsdf;

    impl Bsdf for AbsorbingBsdf {
        fn sample(&self, _: &ShadingInputs<'_>, _: f32, _: f32) -> BsdfSample {
            BsdfSample {
                direction: Dual2::constant(Vec3::Z),
                weight: Color::ZERO,
                inv_pdf: 0.0,
            }
        }

        fn eval(&self, _: &ShadingInputs<'_>, _: Vec3) -> (Color, f32) {
            (Color::ZERO, 0.0)
        }
    }

    impl ShadingService for StubShading {
        type Context = ();
        type Bsdf = AbsorbingBsdf;

        fn create_context(&self) -> Self::Context {}

        fn execute(
            &self,
            _: &mut (),
            _: &ShaderRef,
            _: &ShadingInputs<'_>,
            _: &dyn NamedSpaces,
        ) -> ShadingResult<AbsorbingBsdf> {
            ShadingResult {
                bsdf: AbsorbingBsdf,
                emission: Color::ZERO,
            }
        }

        fn background(&self, _: &mut (), _: &ShaderRef, _: Vec3) -> Color {
            Color::new(0.25, 0.5, 1.0)
        }
    }

    #[test]
    fn test_power_heuristic() {
        assert_eq!(power_heuristic(2.0, 2.0), 0.5);
        assert_eq!(power_heuristic(3.0, 0.0), 1.0);
        assert_eq!(power_heuristic(0.0, 3.0), 0.0);
        assert_eq!(power_heuristic(0.0, 0.0), 0.0);
        assert!((power_heuristic(1.0, 2.0) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_miss_returns_background_or_nothing() {
        let scene = SceneBuilder::new().build(EmptyWorld::default());
        let shading = StubShading;
        let mut ctx = shading.create_context();
        let background = BackgroundLight::new(&shading, &mut ctx, ShaderRef::new("sky"), 8);
        let mut rng = StdRng::seed_from_u64(1);
        let ray = Ray::new(Vec3::ZERO, Vec3::X);

        let tracer = PathTracer::new(&scene, &shading, &(), Some(&background), 8);
        assert_eq!(tracer.light_count(), 1);
        assert_eq!(tracer.li(&mut ctx, &mut rng, ray), Color::new(0.25, 0.5, 1.0));

        let dark = PathTracer::new(&scene, &shading, &(), None, 8);
        assert_eq!(dark.light_count(), 0);
        assert_eq!(dark.li(&mut ctx, &mut rng, ray), Color::ZERO);
    }

    fn ground_quad(builder: &mut SceneBuilder, half: f32, binding: &SurfaceBinding) {
        let params = ParamList::new()
            .with(
                "vertex point P",
                vec![-half, -half, 0.0, half, -half, 0.0, half, half, 0.0, -half, half, 0.0],
            )
            .unwrap();
        builder.mesh(&[4], &[0, 1, 2, 3], &params, binding).unwrap();
    }

    #[test]
    fn test_looking_at_light_sees_its_emission() {
        let mut builder = SceneBuilder::new();
        let lamp = ParamList::new().with("int emissive", 1).unwrap();
        builder
            .sphere(1.0, &lamp, &SurfaceBinding::new("lamp"))
            .unwrap();
        let scene = builder.build(InstancedAccelerator::new());
        let shading = ReferenceShading::new().with_material(
            "lamp",
            Material::Emitter {
                radiance: Color::splat(3.0),
                albedo: Color::ZERO,
            },
        );
        let mut ctx = shading.create_context();
        let mut rng = StdRng::seed_from_u64(5);
        let tracer = PathTracer::new(&scene, &shading, &(), None, 16);
        let li = tracer.li(&mut ctx, &mut rng, Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z));
        assert_eq!(li, Color::splat(3.0));
    }

    #[test]
    fn test_diffuse_ground_under_uniform_sky() {
        // Reflected radiance of a Lambertian plane under a unit sky is its albedo
        let mut builder = SceneBuilder::new();
        ground_quad(&mut builder, 1000.0, &SurfaceBinding::new("ground"));
        let scene = builder.build(InstancedAccelerator::new());
        let shading = ReferenceShading::new()
            .with_material("ground", Material::Diffuse { albedo: Color::splat(0.5) })
            .with_background("sky", Background::Constant(Color::ONE));
        let mut ctx = shading.create_context();
        let background = BackgroundLight::new(&shading, &mut ctx, ShaderRef::new("sky"), 32);
        let tracer = PathTracer::new(&scene, &shading, &(), Some(&background), 16);

        let mut rng = StdRng::seed_from_u64(17);
        let n = 4000;
        let mut sum = Color::ZERO;
        for _ in 0..n {
            sum += tracer.li(&mut ctx, &mut rng, Ray::new(Vec3::new(0.0, 0.0, 1.0), -Vec3::Z));
        }
        let mean = sum / n as f32;
        assert!((mean.x - 0.5).abs() < 0.03, "mean {:?}", mean);
    }

    #[test]
    fn test_area_light_over_ground() {
        // Small emitter facing down over a white floor: direct lighting is positive and finite
        let mut builder = SceneBuilder::new();
        ground_quad(&mut builder, 10.0, &SurfaceBinding::new("ground"));
        let lamp = ParamList::new().with("int emissive", 1).unwrap();
        let above = SurfaceBinding::new("lamp")
            .with_transform(Transform::translate(Vec3::new(0.0, 0.0, 2.0)));
        builder.sphere(0.25, &lamp, &above).unwrap();
        let scene = builder.build(InstancedAccelerator::new());
        let shading = ReferenceShading::new()
            .with_material("ground", Material::Diffuse { albedo: Color::ONE })
            .with_material(
                "lamp",
                Material::Emitter {
                    radiance: Color::splat(10.0),
                    albedo: Color::ZERO,
                },
            );
        let mut ctx = shading.create_context();
        let tracer = PathTracer::new(&scene, &shading, &(), None, 16);
        let mut rng = StdRng::seed_from_u64(23);

        let n = 2000;
        let mut sum = Color::ZERO;
        for _ in 0..n {
            let li = tracer.li(&mut ctx, &mut rng, Ray::new(Vec3::new(0.5, 0.0, 1.0), -Vec3::Z));
            assert!(li.is_finite());
            sum += li;
        }
        let mean = sum / n as f32;
        // Sphere of radius 0.25 at height 2, seen from (0.5, 0, 0): E = L * pi * (r/d)^2 * cos
        let d2: f32 = 0.25 + 4.0;
        let cos = 2.0 / d2.sqrt();
        let expected = 10.0 * (0.0625 / d2) * cos;
        assert!((mean.x - expected).abs() < 0.15 * expected, "mean {} expected {}", mean.x, expected);
    }

    /// Emits from the "lamp" shader only; its BSDF checks every evaluated
    /// direction is unit length and counts the evaluations.
    struct UnitCheckShading {
        evals: Arc<AtomicUsize>,
    }

    struct UnitCheckBsdf {
        evals: Arc<AtomicUsize>,
    }

    impl Bsdf for UnitCheckBsdf {
        fn sample(&self, _: &ShadingInputs<'_>, _: f32, _: f32) -> BsdfSample {
            // Delta sample with no weight: skips the BSDF strategy and ends the path
            BsdfSample {
                direction: Dual2::constant(Vec3::Z),
                weight: Color::ZERO,
                inv_pdf: 0.0,
            }
        }

        fn eval(&self, _: &ShadingInputs<'_>, wi: Vec3) -> (Color, f32) {
            assert!((wi.length() - 1.0).abs() < 1e-4, "non-unit direction {:?}", wi);
            self.evals.fetch_add(1, Ordering::Relaxed);
            (Color::splat(0.1), 0.1)
        }
    }

    impl ShadingService for UnitCheckShading {
        type Context = ();
        type Bsdf = UnitCheckBsdf;

        fn create_context(&self) -> Self::Context {}

        fn execute(
            &self,
            _: &mut (),
            shader: &ShaderRef,
            _: &ShadingInputs<'_>,
            _: &dyn NamedSpaces,
        ) -> ShadingResult<UnitCheckBsdf> {
            ShadingResult {
                bsdf: UnitCheckBsdf {
                    evals: self.evals.clone(),
                },
                emission: if shader.name() == "lamp" { Color::ONE } else { Color::ZERO },
            }
        }

        fn background(&self, _: &mut (), _: &ShaderRef, _: Vec3) -> Color {
            Color::ZERO
        }
    }

    #[test]
    fn test_light_samples_are_evaluated_along_unit_directions() {
        let mut builder = SceneBuilder::new();
        ground_quad(&mut builder, 10.0, &SurfaceBinding::new("ground"));
        let lamp = ParamList::new().with("int emissive", 1).unwrap();
        let above = SurfaceBinding::new("lamp")
            .with_transform(Transform::translate(Vec3::new(0.0, 0.0, 5.0)));
        builder.sphere(1.0, &lamp, &above).unwrap();
        let scene = builder.build(InstancedAccelerator::new());

        let evals = Arc::new(AtomicUsize::new(0));
        let shading = UnitCheckShading {
            evals: evals.clone(),
        };
        let tracer = PathTracer::new(&scene, &shading, &(), None, 8);
        let mut rng = StdRng::seed_from_u64(31);
        for _ in 0..50 {
            let li = tracer.li(&mut (), &mut rng, Ray::new(Vec3::new(0.3, 0.0, 1.0), -Vec3::Z));
            assert!(li.is_finite());
        }
        assert!(evals.load(Ordering::Relaxed) > 0);
    }

    /// Cube of half-size 1 around the origin with every face wound to face inward.
    fn inward_cube(builder: &mut SceneBuilder, binding: &SurfaceBinding) {
        #[rustfmt::skip]
        let corners: Vec<f32> = vec![
            -1.0, -1.0, -1.0,   1.0, -1.0, -1.0,   1.0, -1.0, 1.0,   -1.0, -1.0, 1.0,
            -1.0,  1.0, -1.0,   1.0,  1.0, -1.0,   1.0,  1.0, 1.0,   -1.0,  1.0, 1.0,
        ];
        #[rustfmt::skip]
        let indices = [
            0, 3, 2, 1,
            4, 5, 6, 7,
            3, 7, 6, 2,
            0, 1, 5, 4,
            0, 4, 7, 3,
            1, 2, 6, 5,
        ];
        let params = ParamList::new()
            .with("vertex point P", corners)
            .unwrap()
            .with("int emissive", 1)
            .unwrap();
        builder.mesh(&[4; 6], &indices, &params, binding).unwrap();
    }

    fn mean_radiance_in_glowing_box(albedo: f32, max_depth: u32, paths: usize, seed: u64) -> f32 {
        let mut builder = SceneBuilder::new();
        inward_cube(&mut builder, &SurfaceBinding::new("walls"));
        let scene = builder.build(InstancedAccelerator::new());
        let shading = ReferenceShading::new().with_material(
            "walls",
            Material::Emitter {
                radiance: Color::ONE,
                albedo: Color::splat(albedo),
            },
        );
        let mut ctx = shading.create_context();
        let tracer = PathTracer::new(&scene, &shading, &(), None, max_depth);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut sum = 0.0;
        for _ in 0..paths {
            let dir = lumen_math::sampling::uniform_sample_sphere(rng.gen(), rng.gen());
            let li = tracer.li(&mut ctx, &mut rng, Ray::new(Vec3::new(0.1, -0.2, 0.05), dir));
            assert!(li.is_finite());
            sum += li.x;
        }
        sum / paths as f32
    }

    #[test]
    fn test_glowing_box_converges_to_geometric_series() {
        // Every wall emits 1 and reflects 0.6: radiance is 1 / (1 - 0.6) everywhere.
        // Five fixed bounces alone reach only 1 + 0.6 + ... + 0.6^5, so the roulette
        // tail has to contribute for the estimate to land on 2.5.
        let mean = mean_radiance_in_glowing_box(0.6, 64, 20_000, 3);
        let truncated: f32 = (0..6).map(|k| 0.6f32.powi(k)).sum();
        assert!((mean - 2.5).abs() < 0.05, "mean {}", mean);
        assert!(mean - truncated > 0.05, "mean {} truncated {}", mean, truncated);
    }

    #[test]
    fn test_depth_cap_stops_after_first_bounce() {
        // Emission seen directly plus one bounce of direct light
        let mean = mean_radiance_in_glowing_box(0.6, 1, 5_000, 9);
        assert!((mean - 1.6).abs() < 0.04, "mean {}", mean);
    }

    /// Reports a hit on the first primitive for every ray, as a service
    /// disagreeing with the shape about a grazing ray would.
    #[derive(Default)]
    struct ClaimsHitWorld;

    impl IntersectionService for ClaimsHitWorld {
        fn register_geometry(&mut self, _geometry: Arc<dyn LocalGeometry>) -> GeometryHandle {
            GeometryHandle(0)
        }

        fn set_instance_transform(&mut self, _: usize, _: GeometryHandle, _: &Transform) {}

        fn commit(&mut self) {}

        fn intersect(&self, _ray: &QueryRay) -> Option<InstanceHit> {
            Some(InstanceHit {
                instance: 0,
                prim_id: 0,
                t: 1.0,
            })
        }

        fn occluded(&self, _ray: &QueryRay) -> bool {
            true
        }
    }

    #[test]
    fn test_unresolvable_hit_does_not_see_background() {
        let mut builder = SceneBuilder::new();
        ground_quad(&mut builder, 10.0, &SurfaceBinding::new("ground"));
        let scene = builder.build(ClaimsHitWorld);
        let shading = StubShading;
        let mut ctx = shading.create_context();
        let background = BackgroundLight::new(&shading, &mut ctx, ShaderRef::new("sky"), 8);
        let tracer = PathTracer::new(&scene, &shading, &(), Some(&background), 8);
        let mut rng = StdRng::seed_from_u64(2);

        // Lies in the ground plane, so the triangle cannot resolve the hit
        let grazing = Ray::new(Vec3::new(-20.0, 0.5, 0.0), Vec3::X);
        assert_eq!(tracer.li(&mut ctx, &mut rng, grazing), Color::ZERO);
    }
}
