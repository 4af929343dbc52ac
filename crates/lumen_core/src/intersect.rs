//! Interface to a ray-intersection acceleration service.
//!
//! The service knows nothing about shapes: it sees opaque local datasets
//! that can bound and intersect their own primitives, and places them in the
//! world through one transform per instance.

use std::sync::Arc;

use lumen_math::{Aabb, QueryRay, Transform};

/// A local-space geometric dataset registered with an intersection service.
pub trait LocalGeometry: Send + Sync {
    fn primitive_count(&self) -> usize;

    /// Local-space bounds of one primitive.
    fn primitive_bounds(&self, prim_id: usize) -> Aabb;

    /// Distance to the primitive along a local-space ray, if it is hit
    /// within `[ray.tmin, ray.tmax]`.
    fn intersect_primitive(&self, ray: &QueryRay, prim_id: usize) -> Option<f32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHandle(pub usize);

/// Nearest hit reported by a service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceHit {
    pub instance: usize,
    pub prim_id: usize,
    /// Parametric distance along the world ray.
    pub t: f32,
}

/// Builds an acceleration structure over instanced geometry and answers
/// ray queries against it.
///
/// Registration happens before [`IntersectionService::commit`]; afterwards the
/// service is read-only and may be queried from many threads.
pub trait IntersectionService: Send + Sync {
    fn register_geometry(&mut self, geometry: Arc<dyn LocalGeometry>) -> GeometryHandle;

    /// Places `geometry` into the world as instance number `instance`.
    fn set_instance_transform(
        &mut self,
        instance: usize,
        geometry: GeometryHandle,
        object_to_world: &Transform,
    );

    fn commit(&mut self);

    fn intersect(&self, ray: &QueryRay) -> Option<InstanceHit>;

    /// Whether anything blocks the ray within its range.
    fn occluded(&self, ray: &QueryRay) -> bool;
}
