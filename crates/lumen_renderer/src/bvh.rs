//! Bounding Volume Hierarchy over indexed items.
//!
//! The tree stores item indices only; callers supply the per-item hit test.
//! Used both inside instances (over triangles) and across instances.

use lumen_math::{Aabb, QueryRay};

/// Maximum items per leaf node before splitting.
const LEAF_MAX_SIZE: usize = 4;

pub enum BvhNode {
    Branch {
        left: Box<BvhNode>,
        right: Box<BvhNode>,
        bbox: Aabb,
    },
    Leaf {
        items: Vec<usize>,
        bbox: Aabb,
    },
    Empty,
}

impl BvhNode {
    /// Builds a tree over `bounds`; item `i` has bounds `bounds[i]`.
    /// Items with empty bounds are left out.
    pub fn new(bounds: &[Aabb]) -> Self {
        let items: Vec<usize> = (0..bounds.len()).filter(|&i| !bounds[i].is_empty()).collect();
        if items.is_empty() {
            return BvhNode::Empty;
        }
        Self::build(items, bounds)
    }

    /// Median split on the longest axis of the centroid bounds.
    fn build(mut items: Vec<usize>, bounds: &[Aabb]) -> Self {
        let bbox = items
            .iter()
            .fold(Aabb::EMPTY, |acc, &i| Aabb::surrounding(&acc, &bounds[i]));

        if items.len() <= LEAF_MAX_SIZE {
            return BvhNode::Leaf { items, bbox };
        }

        let centroid_bounds = Aabb::from_point_set(items.iter().map(|&i| bounds[i].centroid()));
        let axis = centroid_bounds.longest_axis();

        items.sort_unstable_by(|&a, &b| {
            let ca = bounds[a].centroid()[axis];
            let cb = bounds[b].centroid()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let right_items = items.split_off(items.len() / 2);
        BvhNode::Branch {
            left: Box::new(Self::build(items, bounds)),
            right: Box::new(Self::build(right_items, bounds)),
            bbox,
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        match self {
            BvhNode::Empty => Aabb::EMPTY,
            BvhNode::Leaf { bbox, .. } | BvhNode::Branch { bbox, .. } => *bbox,
        }
    }

    /// Nearest item hit along `ray`.
    ///
    /// `test` is called with an item index and the ray clipped to the
    /// closest hit found so far; it returns the hit distance and a payload.
    pub fn closest<H>(
        &self,
        ray: &QueryRay,
        test: &mut impl FnMut(usize, &QueryRay) -> Option<(f32, H)>,
    ) -> Option<(f32, H)> {
        let mut ray = *ray;
        let mut best = None;
        self.closest_in(&mut ray, test, &mut best);
        best
    }

    fn closest_in<H>(
        &self,
        ray: &mut QueryRay,
        test: &mut impl FnMut(usize, &QueryRay) -> Option<(f32, H)>,
        best: &mut Option<(f32, H)>,
    ) {
        match self {
            BvhNode::Empty => {}
            BvhNode::Leaf { items, bbox } => {
                if bbox.hit(ray, ray.range()).is_none() {
                    return;
                }
                for &item in items {
                    if let Some((t, payload)) = test(item, ray) {
                        if t <= ray.tmax {
                            ray.tmax = t;
                            *best = Some((t, payload));
                        }
                    }
                }
            }
            BvhNode::Branch { left, right, bbox } => {
                if bbox.hit(ray, ray.range()).is_none() {
                    return;
                }
                // Visit the nearer child first so the far one is clipped harder
                let tl = left.bounding_box().hit(ray, ray.range());
                let tr = right.bounding_box().hit(ray, ray.range());
                let (first, second) = match (tl, tr) {
                    (Some(a), Some(b)) if b < a => (right, left),
                    _ => (left, right),
                };
                first.closest_in(ray, test, best);
                second.closest_in(ray, test, best);
            }
        }
    }

    /// Whether any item reports a hit; stops at the first one.
    pub fn any(&self, ray: &QueryRay, test: &mut impl FnMut(usize, &QueryRay) -> bool) -> bool {
        match self {
            BvhNode::Empty => false,
            BvhNode::Leaf { items, bbox } => {
                bbox.hit(ray, ray.range()).is_some() && items.iter().any(|&i| test(i, ray))
            }
            BvhNode::Branch { left, right, bbox } => {
                bbox.hit(ray, ray.range()).is_some()
                    && (left.any(ray, test) || right.any(ray, test))
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            BvhNode::Empty => 0,
            BvhNode::Leaf { .. } => 1,
            BvhNode::Branch { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}
