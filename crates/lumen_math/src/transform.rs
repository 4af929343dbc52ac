//! 4x4 transforms with cached inverse.
//!
//! Composition follows glam's column-vector convention: `a * b` applies `b`
//! first, then `a`.

use std::ops::Mul;

use glam::{Mat3, Mat4, Vec3, Vec4};
use thiserror::Error;

use crate::{Aabb, Dual2, Ray};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("matrix has non-finite entries")]
    NonFinite,

    #[error("matrix is singular (determinant {0})")]
    Singular(f32),

    #[error("degenerate {0}")]
    Degenerate(&'static str),
}

/// An invertible transform.
///
/// The inverse and the normal matrix (inverse-transpose of the upper 3x3)
/// are computed once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    m: Mat4,
    m_inv: Mat4,
    n: Mat3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        m: Mat4::IDENTITY,
        m_inv: Mat4::IDENTITY,
        n: Mat3::IDENTITY,
    };

    /// Builds a transform from a forward matrix, rejecting singular or non-finite input.
    pub fn try_new(m: Mat4) -> Result<Self, TransformError> {
        if !m.is_finite() {
            return Err(TransformError::NonFinite);
        }
        let det = m.determinant();
        if det.abs() < f32::MIN_POSITIVE || !det.is_finite() {
            return Err(TransformError::Singular(det));
        }
        let m_inv = m.inverse();
        if !m_inv.is_finite() {
            return Err(TransformError::Singular(det));
        }
        Ok(Self::from_pair(m, m_inv))
    }

    fn from_pair(m: Mat4, m_inv: Mat4) -> Self {
        Self {
            m,
            m_inv,
            n: Mat3::from_mat4(m_inv).transpose(),
        }
    }

    pub fn translate(offset: Vec3) -> Self {
        Self::from_pair(
            Mat4::from_translation(offset),
            Mat4::from_translation(-offset),
        )
    }

    /// Non-uniform scale. Every factor must be non-zero.
    pub fn scale(factors: Vec3) -> Result<Self, TransformError> {
        if factors.cmpeq(Vec3::ZERO).any() || !factors.is_finite() {
            return Err(TransformError::Degenerate("scale"));
        }
        Ok(Self::from_pair(
            Mat4::from_scale(factors),
            Mat4::from_scale(factors.recip()),
        ))
    }

    /// Rotation by `degrees` about `axis`.
    pub fn rotate(degrees: f32, axis: Vec3) -> Result<Self, TransformError> {
        let axis = axis.try_normalize().ok_or(TransformError::Degenerate("rotation axis"))?;
        let m = Mat4::from_axis_angle(axis, degrees.to_radians());
        Ok(Self::from_pair(m, m.transpose()))
    }

    /// Camera-to-world transform for a camera at `eye` looking at `target`.
    ///
    /// Camera space is left-handed: +x right, +y up, +z forward.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Result<Self, TransformError> {
        let dir = (target - eye)
            .try_normalize()
            .ok_or(TransformError::Degenerate("look-at direction"))?;
        let right = up
            .normalize_or_zero()
            .cross(dir)
            .try_normalize()
            .ok_or(TransformError::Degenerate("look-at up vector"))?;
        let new_up = dir.cross(right);
        let m = Mat4::from_cols(
            right.extend(0.0),
            new_up.extend(0.0),
            dir.extend(0.0),
            eye.extend(1.0),
        );
        Self::try_new(m)
    }

    /// Perspective projection mapping camera space to screen space.
    ///
    /// Depth maps `near..far` to `0..1`; x and y are divided by z and scaled
    /// so that the field of view spans `[-1, 1]`.
    pub fn perspective(fov_degrees: f32, near: f32, far: f32) -> Result<Self, TransformError> {
        if near <= 0.0 || far <= near {
            return Err(TransformError::Degenerate("clipping range"));
        }
        let persp = Mat4::from_cols(
            Vec4::new(1.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 1.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, far / (far - near), 1.0),
            Vec4::new(0.0, 0.0, -far * near / (far - near), 0.0),
        );
        let inv_tan = 1.0 / (fov_degrees.to_radians() * 0.5).tan();
        Ok(Self::scale(Vec3::new(inv_tan, inv_tan, 1.0))? * Self::try_new(persp)?)
    }

    pub fn matrix(&self) -> &Mat4 {
        &self.m
    }

    pub fn inverse_matrix(&self) -> &Mat4 {
        &self.m_inv
    }

    pub fn inverse(&self) -> Transform {
        Self::from_pair(self.m_inv, self.m)
    }

    pub fn is_identity(&self) -> bool {
        self.m == Mat4::IDENTITY
    }

    /// Determinant of the linear (upper 3x3) part.
    pub fn linear_determinant(&self) -> f32 {
        Mat3::from_mat4(self.m).determinant()
    }

    /// Transforms a point, dividing by w when the matrix is projective.
    pub fn point(&self, p: Vec3) -> Vec3 {
        let h = self.m * p.extend(1.0);
        if h.w == 1.0 || h.w == 0.0 {
            h.truncate()
        } else {
            h.truncate() / h.w
        }
    }

    /// Transforms a direction (translation ignored).
    pub fn vector(&self, v: Vec3) -> Vec3 {
        self.m.transform_vector3(v)
    }

    /// Transforms a normal with the inverse-transpose. Not renormalized.
    pub fn normal(&self, n: Vec3) -> Vec3 {
        self.n * n
    }

    /// Transforms a differential point, applying the quotient rule to the
    /// homogeneous divide.
    pub fn point_dual(&self, p: Dual2<Vec3>) -> Dual2<Vec3> {
        let h = self.m * p.val.extend(1.0);
        let hx = self.m * p.dx.extend(0.0);
        let hy = self.m * p.dy.extend(0.0);
        if h.w == 1.0 || h.w == 0.0 {
            return Dual2::new(h.truncate(), hx.truncate(), hy.truncate());
        }
        let inv_w = h.w.recip();
        let val = h.truncate() * inv_w;
        Dual2::new(
            val,
            (hx.truncate() - val * hx.w) * inv_w,
            (hy.truncate() - val * hy.w) * inv_w,
        )
    }

    pub fn vector_dual(&self, v: Dual2<Vec3>) -> Dual2<Vec3> {
        Dual2::new(self.vector(v.val), self.vector(v.dx), self.vector(v.dy))
    }

    pub fn normal_dual(&self, n: Dual2<Vec3>) -> Dual2<Vec3> {
        Dual2::new(self.normal(n.val), self.normal(n.dx), self.normal(n.dy))
    }

    /// Transforms origin as a point and direction as a vector; the range is kept.
    pub fn ray(&self, r: &Ray) -> Ray {
        Ray {
            origin: self.point_dual(r.origin),
            direction: self.vector_dual(r.direction),
            tnear: r.tnear,
            tfar: r.tfar,
        }
    }

    /// Bounds of the eight transformed corners.
    pub fn aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return Aabb::EMPTY;
        }
        Aabb::from_point_set(aabb.corners().map(|c| self.point(c)))
    }

    /// Ratio of world to local surface area for a surface element whose
    /// local unit normal is `n`. Only meaningful for affine transforms.
    pub fn area_scale(&self, n: Vec3) -> f32 {
        self.linear_determinant().abs() * self.normal(n).length()
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        Transform::from_pair(self.m * rhs.m, rhs.m_inv * self.m_inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    fn sample_transform() -> Transform {
        Transform::translate(Vec3::new(1.0, -2.0, 3.0))
            * Transform::rotate(30.0, Vec3::new(1.0, 1.0, 0.0)).unwrap()
            * Transform::scale(Vec3::new(2.0, 0.5, 3.0)).unwrap()
    }

    #[test]
    fn test_point_vector_normal_round_trip() {
        let t = sample_transform();
        let inv = t.inverse();
        let p = Vec3::new(0.3, -1.2, 4.0);

        assert!(close(inv.point(t.point(p)), p));
        assert!(close(inv.vector(t.vector(p)), p));
        assert!(close(inv.normal(t.normal(p)), p));
    }

    #[test]
    fn test_normal_stays_perpendicular() {
        let t = sample_transform();
        let tangent = Vec3::new(1.0, 0.0, 0.0);
        let normal = Vec3::new(0.0, 1.0, 1.0);
        assert!(t.vector(tangent).dot(t.normal(normal)).abs() < 1e-4);
    }

    #[test]
    fn test_translation_ignores_vectors() {
        let t = Transform::translate(Vec3::new(10.0, 20.0, 30.0));
        assert_eq!(t.vector(Vec3::X), Vec3::X);
        assert_eq!(t.point(Vec3::X), Vec3::new(11.0, 20.0, 30.0));
    }

    #[test]
    fn test_composition_order() {
        // Scale first, then translate
        let t = Transform::translate(Vec3::X) * Transform::scale(Vec3::splat(2.0)).unwrap();
        assert!(close(t.point(Vec3::X), Vec3::new(3.0, 0.0, 0.0)));
        assert!(close(t.inverse().point(Vec3::new(3.0, 0.0, 0.0)), Vec3::X));
    }

    #[test]
    fn test_singular_matrix_rejected() {
        assert!(matches!(
            Transform::try_new(Mat4::ZERO),
            Err(TransformError::Singular(_))
        ));
        let mut nan = Mat4::IDENTITY;
        nan.x_axis.x = f32::NAN;
        assert_eq!(Transform::try_new(nan), Err(TransformError::NonFinite));
        assert!(Transform::scale(Vec3::new(1.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn test_perspective_divides_by_depth() {
        let p = Transform::perspective(90.0, 1.0, 100.0).unwrap();
        let near = p.point(Vec3::new(1.0, 1.0, 1.0));
        let far = p.point(Vec3::new(2.0, 2.0, 100.0));
        assert!(close(near, Vec3::new(1.0, 1.0, 0.0)));
        assert!(close(far, Vec3::new(0.02, 0.02, 1.0)));
        // Inverse brings screen points back along the same camera ray
        let back = p.inverse().point(Vec3::new(0.5, 0.0, 0.0));
        assert!(close(back, Vec3::new(0.5, 0.0, 1.0)));
    }

    #[test]
    fn test_point_dual_quotient_rule() {
        let p = Transform::perspective(90.0, 1.0, 100.0).unwrap();
        // x' = x / z; moving along x by dx changes x' by dx / z
        let q = p.point_dual(Dual2::new(Vec3::new(1.0, 0.0, 2.0), Vec3::X, Vec3::Z));
        assert!((q.val.x - 0.5).abs() < 1e-5);
        assert!((q.dx.x - 0.5).abs() < 1e-5);
        // d/dz (x / z) = -x / z^2
        assert!((q.dy.x + 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_look_at_axes() {
        let t = Transform::look_at(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::Y).unwrap();
        assert!(close(t.point(Vec3::ZERO), Vec3::new(0.0, 0.0, -5.0)));
        assert!(close(t.vector(Vec3::Z), Vec3::Z));
        assert!(close(t.vector(Vec3::Y), Vec3::Y));
        assert!(close(t.vector(Vec3::X), Vec3::X));
        assert!(Transform::look_at(Vec3::ZERO, Vec3::Y, Vec3::Y).is_err());
    }

    #[test]
    fn test_area_scale() {
        let t = Transform::scale(Vec3::new(2.0, 3.0, 5.0)).unwrap();
        // A patch in the xy plane grows by 2 * 3
        assert!((t.area_scale(Vec3::Z) - 6.0).abs() < 1e-4);
        let r = Transform::rotate(45.0, Vec3::Y).unwrap();
        assert!((r.area_scale(Vec3::Z) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_aabb_transform() {
        let t = Transform::translate(Vec3::splat(5.0));
        let b = t.aabb(&Aabb::from_points(Vec3::ZERO, Vec3::ONE));
        assert!(close(b.min(), Vec3::splat(5.0)));
        assert!(close(b.max(), Vec3::splat(6.0)));
    }
}
