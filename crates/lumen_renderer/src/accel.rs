//! Two-level BVH intersection service.
//!
//! Each registered geometry gets its own bottom-level BVH over its local
//! primitives. Instances reference a geometry through a transform, and a
//! top-level BVH over the instances' world bounds is built on commit.

use std::sync::Arc;

use log::info;
use lumen_core::{GeometryHandle, InstanceHit, IntersectionService, LocalGeometry};
use lumen_math::{Aabb, QueryRay, Transform};

use crate::bvh::BvhNode;

struct Blas {
    geometry: Arc<dyn LocalGeometry>,
    bvh: BvhNode,
    bounds: Aabb,
}

struct Instance {
    blas: usize,
    world_to_object: Transform,
}

impl Instance {
    /// The world ray in the instance's object space. The direction keeps its
    /// length so `t` stays valid in both spaces.
    fn local_ray(&self, ray: &QueryRay) -> QueryRay {
        QueryRay::new(
            self.world_to_object.point(ray.origin),
            self.world_to_object.vector(ray.direction),
            ray.tmin,
            ray.tmax,
        )
    }
}

#[derive(Default)]
pub struct InstancedAccelerator {
    blas: Vec<Blas>,
    instances: Vec<Option<Instance>>,
    instance_bounds: Vec<Aabb>,
    tlas: Option<BvhNode>,
}

impl InstancedAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn is_committed(&self) -> bool {
        self.tlas.is_some()
    }

    fn tlas(&self) -> &BvhNode {
        self.tlas
            .as_ref()
            .unwrap_or_else(|| panic!("intersection service queried before commit"))
    }

    fn instance(&self, index: usize) -> &Instance {
        self.instances[index]
            .as_ref()
            .unwrap_or_else(|| panic!("instance {} was never placed", index))
    }

    fn intersect_instance(&self, index: usize, ray: &QueryRay) -> Option<(f32, usize)> {
        let instance = self.instance(index);
        let blas = &self.blas[instance.blas];
        let local = instance.local_ray(ray);
        blas.bvh.closest(&local, &mut |prim_id, r: &QueryRay| {
            blas.geometry.intersect_primitive(r, prim_id).map(|t| (t, prim_id))
        })
    }

    fn occluded_instance(&self, index: usize, ray: &QueryRay) -> bool {
        let instance = self.instance(index);
        let blas = &self.blas[instance.blas];
        let local = instance.local_ray(ray);
        blas.bvh.any(&local, &mut |prim_id, r: &QueryRay| {
            blas.geometry.intersect_primitive(r, prim_id).is_some()
        })
    }
}

impl IntersectionService for InstancedAccelerator {
    fn register_geometry(&mut self, geometry: Arc<dyn LocalGeometry>) -> GeometryHandle {
        assert!(
            !self.is_committed(),
            "geometry registered after the service was committed"
        );
        let bounds: Vec<Aabb> = (0..geometry.primitive_count())
            .map(|prim_id| geometry.primitive_bounds(prim_id))
            .collect();
        let bvh = BvhNode::new(&bounds);
        let bounds = bvh.bounding_box();
        self.blas.push(Blas {
            geometry,
            bvh,
            bounds,
        });
        GeometryHandle(self.blas.len() - 1)
    }

    fn set_instance_transform(
        &mut self,
        instance: usize,
        geometry: GeometryHandle,
        object_to_world: &Transform,
    ) {
        assert!(
            !self.is_committed(),
            "instance placed after the service was committed"
        );
        let blas = self
            .blas
            .get(geometry.0)
            .unwrap_or_else(|| panic!("unknown geometry handle {}", geometry.0));
        let world_bounds = if blas.bounds.is_empty() {
            Aabb::EMPTY
        } else {
            object_to_world.aabb(&blas.bounds)
        };

        if instance >= self.instances.len() {
            self.instances.resize_with(instance + 1, || None);
            self.instance_bounds.resize(instance + 1, Aabb::EMPTY);
        }
        self.instances[instance] = Some(Instance {
            blas: geometry.0,
            world_to_object: object_to_world.inverse(),
        });
        self.instance_bounds[instance] = world_bounds;
    }

    fn commit(&mut self) {
        if let Some(missing) = self.instances.iter().position(Option::is_none) {
            panic!("instance {} was never placed", missing);
        }
        let tlas = BvhNode::new(&self.instance_bounds);
        info!(
            "Committed InstancedAccelerator: {} geometries, {} instances, top-level depth {}",
            self.blas.len(),
            self.instances.len(),
            tlas.depth()
        );
        self.tlas = Some(tlas);
    }

    fn intersect(&self, ray: &QueryRay) -> Option<InstanceHit> {
        let (t, (instance, prim_id)) = self.tlas().closest(ray, &mut |index, r: &QueryRay| {
            self.intersect_instance(index, r)
                .map(|(t, prim_id)| (t, (index, prim_id)))
        })?;
        Some(InstanceHit {
            instance,
            prim_id,
            t,
        })
    }

    fn occluded(&self, ray: &QueryRay) -> bool {
        self.tlas()
            .any(ray, &mut |index, r: &QueryRay| self.occluded_instance(index, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_math::Vec3;

    /// Unit spheres at the given centers; enough geometry to exercise both levels.
    struct Spheres(Vec<Vec3>);

    impl LocalGeometry for Spheres {
        fn primitive_count(&self) -> usize {
            self.0.len()
        }

        fn primitive_bounds(&self, prim_id: usize) -> Aabb {
            let c = self.0[prim_id];
            Aabb::from_points(c - Vec3::ONE, c + Vec3::ONE)
        }

        fn intersect_primitive(&self, ray: &QueryRay, prim_id: usize) -> Option<f32> {
            let oc = ray.origin - self.0[prim_id];
            let a = ray.direction.length_squared();
            let h = ray.direction.dot(oc);
            let c = oc.length_squared() - 1.0;
            let disc = h * h - a * c;
            if disc < 0.0 {
                return None;
            }
            let sq = disc.sqrt();
            [(-h - sq) / a, (-h + sq) / a]
                .into_iter()
                .find(|t| ray.range().contains(*t))
        }
    }

    fn row() -> Arc<dyn LocalGeometry> {
        Arc::new(Spheres((0..8).map(|i| Vec3::new(3.0 * i as f32, 0.0, 0.0)).collect()))
    }

    fn committed(transforms: &[Transform]) -> InstancedAccelerator {
        let mut accel = InstancedAccelerator::new();
        let handle = accel.register_geometry(row());
        for (i, xf) in transforms.iter().enumerate() {
            accel.set_instance_transform(i, handle, xf);
        }
        accel.commit();
        accel
    }

    #[test]
    fn test_nearest_instance_and_primitive() {
        let accel = committed(&[
            Transform::IDENTITY,
            Transform::translate(Vec3::new(0.0, 0.0, -10.0)),
        ]);
        assert_eq!(accel.instance_count(), 2);

        let ray = QueryRay::new(Vec3::new(6.0, 0.0, 10.0), -Vec3::Z, 1e-3, 1e30);
        let hit = accel.intersect(&ray).unwrap();
        assert_eq!(hit.instance, 0);
        assert_eq!(hit.prim_id, 2);
        assert!((hit.t - 9.0).abs() < 1e-4);

        // Starting between the rows only sees the lower one
        let ray = QueryRay::new(Vec3::new(6.0, 0.0, -5.0), -Vec3::Z, 1e-3, 1e30);
        let hit = accel.intersect(&ray).unwrap();
        assert_eq!(hit.instance, 1);
        assert!((hit.t - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_t_is_measured_in_world_units() {
        // Scaled instance with an unnormalized world direction
        let accel = committed(&[Transform::scale(Vec3::splat(2.0)).unwrap()]);
        let ray = QueryRay::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -2.0), 1e-3, 1e30);
        let hit = accel.intersect(&ray).unwrap();
        // World sphere radius 2, surface at z = 2
        assert!((ray.at(hit.t).z - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_occlusion_respects_range() {
        let accel = committed(&[Transform::IDENTITY]);
        let ray = QueryRay::new(Vec3::new(0.0, 0.0, 10.0), -Vec3::Z, 1e-3, 5.0);
        assert!(!accel.occluded(&ray));
        let ray = QueryRay::new(Vec3::new(0.0, 0.0, 10.0), -Vec3::Z, 1e-3, 20.0);
        assert!(accel.occluded(&ray));
        let miss = QueryRay::new(Vec3::new(0.0, 5.0, 10.0), -Vec3::Z, 1e-3, 1e30);
        assert!(accel.intersect(&miss).is_none());
    }

    #[test]
    #[should_panic(expected = "after the service was committed")]
    fn test_register_after_commit_panics() {
        let mut accel = committed(&[Transform::IDENTITY]);
        accel.register_geometry(row());
    }

    #[test]
    #[should_panic(expected = "never placed")]
    fn test_gap_in_instances_panics() {
        let mut accel = InstancedAccelerator::new();
        let handle = accel.register_geometry(row());
        accel.set_instance_transform(1, handle, &Transform::IDENTITY);
        accel.commit();
    }
}
