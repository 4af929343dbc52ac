//! The committed scene: primitives plus the intersection service holding
//! one instance per primitive.

use std::sync::Arc;

use log::{debug, error, info};
use lumen_math::{Ray, Transform, Vec3};

use crate::error::ShapeResult;
use crate::intersect::{IntersectionService, LocalGeometry};
use crate::params::{ParamList, ParamReader};
use crate::primitive::Primitive;
use crate::shading::{ShaderRef, ShadingInputs};
use crate::shape::{Mesh, Shape, Sphere};

/// Epsilon inset applied at both ends of a two-point visibility test.
pub const VISIBILITY_EPSILON: f32 = 1e-3;

/// A resolved hit: which primitive, and what the shader gets to see.
#[derive(Debug, Clone)]
pub struct SceneHit<'a> {
    pub primitive_index: usize,
    pub t: f32,
    pub inputs: ShadingInputs<'a>,
}

impl<'a> SceneHit<'a> {
    pub fn primitive(&self) -> &'a Primitive {
        self.inputs.primitive
    }
}

/// Outcome of [`Scene::trace`].
#[derive(Debug, Clone)]
pub enum Trace<'a> {
    Miss,
    /// The service reported a hit the shape could not resolve into a
    /// surface. The ray is stopped there but carries nothing.
    Blocked { primitive_index: usize },
    Hit(SceneHit<'a>),
}

pub struct Scene<A> {
    primitives: Vec<Arc<Primitive>>,
    lights: Vec<usize>,
    accel: A,
}

impl<A: IntersectionService> Scene<A> {
    /// Registers one instance per primitive, in order, and commits the service.
    pub fn new(primitives: Vec<Arc<Primitive>>, mut accel: A) -> Self {
        for (index, primitive) in primitives.iter().enumerate() {
            let geometry: Arc<dyn LocalGeometry> = primitive.shape().clone();
            let handle = accel.register_geometry(geometry);
            accel.set_instance_transform(index, handle, primitive.object_to_world());
        }
        accel.commit();

        let lights: Vec<usize> = primitives
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_emissive())
            .map(|(i, _)| i)
            .collect();

        info!(
            "Scene committed: {} primitives, {} emissive",
            primitives.len(),
            lights.len()
        );

        Self {
            primitives,
            lights,
            accel,
        }
    }

    pub fn primitives(&self) -> &[Arc<Primitive>] {
        &self.primitives
    }

    pub fn primitive(&self, index: usize) -> Option<&Primitive> {
        self.primitives.get(index).map(Arc::as_ref)
    }

    /// Indices of the emissive primitives.
    pub fn emissive_primitives(&self) -> &[usize] {
        &self.lights
    }

    pub fn service(&self) -> &A {
        &self.accel
    }

    /// Nearest surface along the ray, resolved into shading inputs.
    ///
    /// `None` on a miss, and also when the nearest surface cannot be
    /// resolved; use [`Scene::trace`] to tell the two apart.
    pub fn intersect(&self, ray: &Ray) -> Option<SceneHit<'_>> {
        match self.trace(ray) {
            Trace::Hit(hit) => Some(hit),
            Trace::Miss | Trace::Blocked { .. } => None,
        }
    }

    /// Nearest surface along the ray.
    pub fn trace(&self, ray: &Ray) -> Trace<'_> {
        let Some(hit) = self.accel.intersect(&ray.query()) else {
            return Trace::Miss;
        };
        let primitive = self.primitives.get(hit.instance).unwrap_or_else(|| {
            panic!(
                "intersection service reported instance {} but the scene has {} primitives",
                hit.instance,
                self.primitives.len()
            )
        });
        match primitive.intersection_inputs(ray, hit.prim_id) {
            Some(inputs) => Trace::Hit(SceneHit {
                primitive_index: hit.instance,
                t: hit.t,
                inputs,
            }),
            None => {
                debug!(
                    "Unresolvable hit on primitive {} (local {}) at t={}",
                    hit.instance, hit.prim_id, hit.t
                );
                Trace::Blocked {
                    primitive_index: hit.instance,
                }
            }
        }
    }

    /// True when nothing blocks the ray within its range.
    pub fn is_visible(&self, ray: &Ray) -> bool {
        !self.accel.occluded(&ray.query())
    }

    /// True when the open segment between two points is unblocked.
    pub fn is_visible_between(&self, p1: Vec3, p2: Vec3) -> bool {
        let ray = Ray::new(p1, p2 - p1).with_range(VISIBILITY_EPSILON, 1.0 - VISIBILITY_EPSILON);
        self.is_visible(&ray)
    }
}

/// Placement and shading shared by the shape statements of a [`SceneBuilder`].
#[derive(Debug, Clone)]
pub struct SurfaceBinding {
    pub object_to_world: Transform,
    pub shader: ShaderRef,
    pub shader_to_world: Transform,
}

impl SurfaceBinding {
    pub fn new(shader: &str) -> Self {
        Self {
            object_to_world: Transform::IDENTITY,
            shader: ShaderRef::new(shader),
            shader_to_world: Transform::IDENTITY,
        }
    }

    pub fn with_transform(mut self, object_to_world: Transform) -> Self {
        self.object_to_world = object_to_world;
        self
    }

    pub fn with_shader_transform(mut self, shader_to_world: Transform) -> Self {
        self.shader_to_world = shader_to_world;
        self
    }
}

/// Collects primitives before the scene is committed.
#[derive(Debug, Default)]
pub struct SceneBuilder {
    primitives: Vec<Arc<Primitive>>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a primitive and returns its index (which is also its instance index).
    pub fn add_primitive(
        &mut self,
        shape: Arc<Shape>,
        object_to_world: Transform,
        shader: ShaderRef,
        shader_to_world: Transform,
        emissive: bool,
    ) -> usize {
        self.primitives.push(Arc::new(Primitive::new(
            shape,
            object_to_world,
            shader,
            shader_to_world,
            emissive,
        )));
        self.primitives.len() - 1
    }

    /// Polygon mesh statement. Reads `int emissive`; the remaining parameters
    /// become attributes.
    pub fn mesh(
        &mut self,
        face_counts: &[i32],
        indices: &[i32],
        params: &ParamList,
        binding: &SurfaceBinding,
    ) -> ShapeResult<usize> {
        let mut reader = ParamReader::new(params);
        let emissive = reader.int("emissive", 0) != 0;
        let mesh = Mesh::new(face_counts, indices, &mut reader).inspect_err(|err| {
            error!("Skipping mesh: {}", err);
        })?;
        reader.report_unused("mesh");
        Ok(self.bind(mesh.into(), binding, emissive))
    }

    /// Sphere statement. Reads `int emissive`; the remaining parameters
    /// become attributes.
    pub fn sphere(
        &mut self,
        radius: f32,
        params: &ParamList,
        binding: &SurfaceBinding,
    ) -> ShapeResult<usize> {
        let mut reader = ParamReader::new(params);
        let emissive = reader.int("emissive", 0) != 0;
        let sphere = Sphere::new(radius, &mut reader).inspect_err(|err| {
            error!("Skipping sphere: {}", err);
        })?;
        reader.report_unused("sphere");
        Ok(self.bind(sphere.into(), binding, emissive))
    }

    fn bind(&mut self, shape: Shape, binding: &SurfaceBinding, emissive: bool) -> usize {
        self.add_primitive(
            Arc::new(shape),
            binding.object_to_world,
            binding.shader.clone(),
            binding.shader_to_world,
            emissive,
        )
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Commits every primitive to `accel`.
    pub fn build<A: IntersectionService>(self, accel: A) -> Scene<A> {
        Scene::new(self.primitives, accel)
    }
}
