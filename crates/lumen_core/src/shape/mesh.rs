//! Polygon meshes, triangulated at construction.

use log::{debug, warn};
use lumen_math::{sampling, Aabb, Dual2, QueryRay, Ray, Vec3};

use super::{triangulate::triangulate, AreaSample, HitInfo};
use crate::attribute::{
    AttributeCounts, AttributeSet, AttributeType, InterpolationContext, InterpolationWeight,
    Interpolation,
};
use crate::error::{ShapeError, ShapeResult};
use crate::params::{ParamReader, ParamValue};

/// One triangle of the triangulated mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshTriangle {
    /// Index of the polygon this triangle came from.
    pub face: usize,
    pub vertices: [usize; 3],
    /// Positions in the flattened face-vertex index stream.
    pub corners: [usize; 3],
}

#[derive(Debug, Clone)]
pub struct Mesh {
    positions: Vec<Vec3>,
    triangles: Vec<MeshTriangle>,
    /// Normalized cumulative area, `triangles.len() + 1` entries starting at 0.
    cdf: Vec<f32>,
    area: f32,
    face_count: usize,
    bounds: Aabb,
    attributes: AttributeSet,
}

impl Mesh {
    /// Builds a mesh from polygon vertex counts and a flattened index stream.
    ///
    /// `P` (vertex point) is read from `params`; every other unread parameter
    /// becomes an attribute.
    pub fn new(face_counts: &[i32], indices: &[i32], params: &mut ParamReader<'_>) -> ShapeResult<Self> {
        let positions = read_positions(params)?;
        let vertex_count = positions.len();

        let expected: usize = face_counts
            .iter()
            .enumerate()
            .map(|(face, &count)| {
                if count < 3 {
                    Err(ShapeError::ShortFace { face, count })
                } else {
                    Ok(count as usize)
                }
            })
            .sum::<ShapeResult<usize>>()?;
        if expected != indices.len() {
            return Err(ShapeError::IndexCount {
                expected,
                actual: indices.len(),
            });
        }
        let indices: Vec<usize> = indices
            .iter()
            .map(|&index| match usize::try_from(index) {
                Ok(i) if i < vertex_count => Ok(i),
                _ => Err(ShapeError::IndexOutOfRange {
                    index,
                    vertices: vertex_count,
                }),
            })
            .collect::<ShapeResult<_>>()?;

        let mut triangles = Vec::new();
        let mut local = Vec::new();
        let mut polygon = Vec::new();
        let mut base = 0;
        for (face, &count) in face_counts.iter().enumerate() {
            let count = count as usize;
            let face_indices = &indices[base..base + count];
            polygon.clear();
            polygon.extend(face_indices.iter().map(|&i| positions[i]));

            local.clear();
            if !triangulate(&polygon, &mut local) {
                warn!("{}", ShapeError::DegeneratePolygon { face });
            }
            triangles.extend(local.iter().map(|tri| MeshTriangle {
                face,
                vertices: tri.map(|k| face_indices[k]),
                corners: tri.map(|k| base + k),
            }));
            base += count;
        }

        let areas: Vec<f32> = triangles
            .iter()
            .map(|tri| triangle_area(&positions, tri))
            .collect();
        let area: f32 = areas.iter().sum();
        let mut cdf = Vec::with_capacity(areas.len() + 1);
        cdf.push(0.0);
        let mut running = 0.0;
        for a in &areas {
            running += a;
            cdf.push(if area > 0.0 { running / area } else { 0.0 });
        }

        let counts = AttributeCounts {
            per_face: face_counts.len(),
            linear: Some(indices.len()),
            vertex: Some(vertex_count),
        };
        let attributes = AttributeSet::from_reader(params, &counts);

        let bounds = Aabb::from_point_set(positions.iter().copied());
        debug!(
            "Mesh: {} faces, {} triangles, {} vertices, area {:.4}",
            face_counts.len(),
            triangles.len(),
            vertex_count,
            area
        );

        Ok(Self {
            positions,
            triangles,
            cdf,
            area,
            face_count: face_counts.len(),
            bounds,
            attributes,
        })
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn triangles(&self) -> &[MeshTriangle] {
        &self.triangles
    }

    pub fn face_count(&self) -> usize {
        self.face_count
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    pub fn area(&self) -> f32 {
        self.area
    }

    fn corners(&self, prim_id: usize) -> Option<(&MeshTriangle, Vec3, Vec3, Vec3)> {
        let tri = self.triangles.get(prim_id)?;
        let [a, b, c] = tri.vertices;
        Some((tri, self.positions[a], self.positions[b], self.positions[c]))
    }

    pub fn triangle_bounds(&self, prim_id: usize) -> Aabb {
        match self.corners(prim_id) {
            Some((_, p0, p1, p2)) => Aabb::from_point_set([p0, p1, p2]),
            None => Aabb::EMPTY,
        }
    }

    /// Möller-Trumbore test for the service's traversal.
    pub fn intersect_triangle(&self, ray: &QueryRay, prim_id: usize) -> Option<f32> {
        let (_, p0, p1, p2) = self.corners(prim_id)?;
        let edge1 = p1 - p0;
        let edge2 = p2 - p0;

        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);
        // Parallel to the triangle
        if a.abs() < 1e-12 {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - p0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        (ray.tmin..=ray.tmax).contains(&t).then_some(t)
    }

    /// Differential hit record; `None` for a degenerate triangle or one the
    /// ray runs parallel to.
    pub fn hit_info(&self, ray: &Ray, prim_id: usize) -> Option<HitInfo> {
        let (_, p0, p1, p2) = self.corners(prim_id)?;
        let edge1 = p1 - p0;
        let edge2 = p2 - p0;

        let pvec = ray.direction.cross_vec(edge2);
        let det = pvec.dot_vec(edge1);
        if det.val.abs() < 1e-12 {
            return None;
        }
        let inv_det = det.recip();

        let tvec = ray.origin - Dual2::constant(p0);
        let u = tvec.dot(&pvec) * inv_det;
        let qvec = tvec.cross_vec(edge1);
        let v = ray.direction.dot(&qvec) * inv_det;
        let t = qvec.dot_vec(edge2) * inv_det;

        Some(HitInfo {
            prim_id,
            t,
            u,
            v,
            dpdu: edge1,
            dpdv: edge2,
            ng: edge1.cross(edge2).normalize_or_zero(),
        })
    }

    /// Barycentric blend weights `(1 - u - v, u, v)` against the triangle's
    /// vertices and corners.
    pub fn interpolation_context(&self, hit: &HitInfo) -> InterpolationContext {
        let Some(tri) = self.triangles.get(hit.prim_id) else {
            return InterpolationContext::default();
        };
        let w0 = Dual2::constant(1.0) - hit.u - hit.v;
        let weights = [w0, hit.u, hit.v];
        InterpolationContext::triangle(
            tri.face,
            std::array::from_fn(|k| InterpolationWeight {
                vertex: tri.vertices[k],
                corner: tri.corners[k],
                weight: weights[k],
            }),
        )
    }

    /// Uniform point over the surface: `u3` picks a triangle by area,
    /// `u1`, `u2` a point inside it.
    pub fn sample(&self, u1: f32, u2: f32, u3: f32) -> AreaSample {
        let prim_id = self.pick_triangle(u3);
        let Some((_, p0, p1, p2)) = self.corners(prim_id) else {
            return AreaSample::default();
        };
        let (u, v) = sampling::uniform_sample_triangle(u1, u2);
        let p = p0 * (1.0 - u - v) + p1 * u + p2 * v;
        let n = (p1 - p0).cross(p2 - p0).normalize_or_zero();
        AreaSample { prim_id, p, n }
    }

    fn pick_triangle(&self, u: f32) -> usize {
        // First entry whose cumulative area reaches u, searched over the interior of the table
        let interior = &self.cdf[1..self.cdf.len().saturating_sub(1).max(1)];
        interior.partition_point(|&c| c < u)
    }
}

fn read_positions(params: &mut ParamReader<'_>) -> ShapeResult<Vec<Vec3>> {
    let param = params.get("P").ok_or(ShapeError::MissingPositions)?;
    let ParamValue::Float(values) = &param.value else {
        return Err(ShapeError::BadPositions);
    };
    if param.decl.interpolation != Interpolation::Vertex
        || param.decl.ty != AttributeType::Point
        || values.len() % 3 != 0
    {
        return Err(ShapeError::BadPositions);
    }
    Ok(values
        .chunks_exact(3)
        .map(|c| Vec3::new(c[0], c[1], c[2]))
        .collect())
}

fn triangle_area(positions: &[Vec3], tri: &MeshTriangle) -> f32 {
    let [a, b, c] = tri.vertices.map(|i| positions[i]);
    0.5 * (b - a).cross(c - a).length()
}
