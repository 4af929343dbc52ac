//! Dual numbers carrying screen-space partial derivatives.
//!
//! A `Dual2<T>` holds a value and its derivatives with respect to the image
//! x and y directions. Ray differentials, surface position derivatives and
//! interpolation weights are all expressed with it.

use std::ops::{Add, Div, Mul, Neg, Sub};

use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dual2<T> {
    pub val: T,
    pub dx: T,
    pub dy: T,
}

impl<T> Dual2<T> {
    pub const fn new(val: T, dx: T, dy: T) -> Self {
        Self { val, dx, dy }
    }
}

impl<T: Copy + Default> Dual2<T> {
    /// A value with zero derivatives.
    pub fn constant(val: T) -> Self {
        Self::new(val, T::default(), T::default())
    }

    /// Drops the derivatives.
    pub fn without_derivatives(self) -> Self {
        Self::constant(self.val)
    }
}

impl<T: Add<Output = T>> Add for Dual2<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.dx + rhs.dx, self.dy + rhs.dy)
    }
}

impl<T: Sub<Output = T>> Sub for Dual2<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.dx - rhs.dx, self.dy - rhs.dy)
    }
}

impl<T: Neg<Output = T>> Neg for Dual2<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.val, -self.dx, -self.dy)
    }
}

impl<T: Mul<f32, Output = T>> Mul<f32> for Dual2<T> {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.val * rhs, self.dx * rhs, self.dy * rhs)
    }
}

impl<T: Mul<f32, Output = T>> Div<f32> for Dual2<T> {
    type Output = Self;

    fn div(self, rhs: f32) -> Self {
        self * rhs.recip()
    }
}

impl Mul for Dual2<f32> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.val * rhs.val,
            self.dx * rhs.val + self.val * rhs.dx,
            self.dy * rhs.val + self.val * rhs.dy,
        )
    }
}

impl Div for Dual2<f32> {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        self * rhs.recip()
    }
}

impl Mul<Dual2<f32>> for Dual2<Vec3> {
    type Output = Self;

    fn mul(self, rhs: Dual2<f32>) -> Self {
        Self::new(
            self.val * rhs.val,
            self.dx * rhs.val + self.val * rhs.dx,
            self.dy * rhs.val + self.val * rhs.dy,
        )
    }
}

impl Mul<Dual2<f32>> for Vec3 {
    type Output = Dual2<Vec3>;

    fn mul(self, rhs: Dual2<f32>) -> Dual2<Vec3> {
        Dual2::new(self * rhs.val, self * rhs.dx, self * rhs.dy)
    }
}

impl Dual2<f32> {
    pub fn recip(self) -> Self {
        let inv = self.val.recip();
        let d = -inv * inv;
        Self::new(inv, self.dx * d, self.dy * d)
    }

    /// Square root; derivatives vanish at zero instead of blowing up.
    pub fn sqrt(self) -> Self {
        let s = self.val.max(0.0).sqrt();
        if s == 0.0 {
            return Self::constant(s);
        }
        let d = 0.5 / s;
        Self::new(s, self.dx * d, self.dy * d)
    }

    /// Arc sine of a value clamped to [-1, 1].
    pub fn asin(self) -> Self {
        let x = self.val.clamp(-1.0, 1.0);
        let denom = (1.0 - x * x).sqrt();
        if denom == 0.0 {
            return Self::constant(x.asin());
        }
        let d = denom.recip();
        Self::new(x.asin(), self.dx * d, self.dy * d)
    }

    pub fn abs(self) -> Self {
        if self.val < 0.0 {
            -self
        } else {
            self
        }
    }
}

/// Two-argument arc tangent of `y / x`.
pub fn atan2(y: Dual2<f32>, x: Dual2<f32>) -> Dual2<f32> {
    let val = y.val.atan2(x.val);
    let denom = x.val * x.val + y.val * y.val;
    if denom == 0.0 {
        return Dual2::constant(val);
    }
    let inv = denom.recip();
    Dual2::new(
        val,
        (x.val * y.dx - y.val * x.dx) * inv,
        (x.val * y.dy - y.val * x.dy) * inv,
    )
}

impl Dual2<Vec3> {
    /// Assembles a vector from three scalar components.
    pub fn from_components(x: Dual2<f32>, y: Dual2<f32>, z: Dual2<f32>) -> Self {
        Self::new(
            Vec3::new(x.val, y.val, z.val),
            Vec3::new(x.dx, y.dx, z.dx),
            Vec3::new(x.dy, y.dy, z.dy),
        )
    }

    pub fn x(&self) -> Dual2<f32> {
        Dual2::new(self.val.x, self.dx.x, self.dy.x)
    }

    pub fn y(&self) -> Dual2<f32> {
        Dual2::new(self.val.y, self.dx.y, self.dy.y)
    }

    pub fn z(&self) -> Dual2<f32> {
        Dual2::new(self.val.z, self.dx.z, self.dy.z)
    }

    pub fn dot(&self, rhs: &Dual2<Vec3>) -> Dual2<f32> {
        Dual2::new(
            self.val.dot(rhs.val),
            self.dx.dot(rhs.val) + self.val.dot(rhs.dx),
            self.dy.dot(rhs.val) + self.val.dot(rhs.dy),
        )
    }

    pub fn dot_vec(&self, rhs: Vec3) -> Dual2<f32> {
        Dual2::new(self.val.dot(rhs), self.dx.dot(rhs), self.dy.dot(rhs))
    }

    pub fn cross(&self, rhs: &Dual2<Vec3>) -> Dual2<Vec3> {
        Dual2::new(
            self.val.cross(rhs.val),
            self.dx.cross(rhs.val) + self.val.cross(rhs.dx),
            self.dy.cross(rhs.val) + self.val.cross(rhs.dy),
        )
    }

    pub fn cross_vec(&self, rhs: Vec3) -> Dual2<Vec3> {
        Dual2::new(
            self.val.cross(rhs),
            self.dx.cross(rhs),
            self.dy.cross(rhs),
        )
    }

    pub fn length(&self) -> Dual2<f32> {
        self.dot(self).sqrt()
    }

    /// Unit-length vector with the derivatives of `v / |v|`.
    ///
    /// A zero vector normalizes to zero with zero derivatives.
    pub fn normalize(&self) -> Dual2<Vec3> {
        let len = self.val.length();
        if len == 0.0 || !len.is_finite() {
            return Dual2::default();
        }
        let inv = len.recip();
        let n = self.val * inv;
        let project = |d: Vec3| (d - n * n.dot(d)) * inv;
        Dual2::new(n, project(self.dx), project(self.dy))
    }

    pub fn is_finite(&self) -> bool {
        self.val.is_finite() && self.dx.is_finite() && self.dy.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_product_rule() {
        // f(x) = x * x at x = 3 with dx = 1
        let x = Dual2::new(3.0f32, 1.0, 0.0);
        let f = x * x;
        assert_eq!(f.val, 9.0);
        assert_eq!(f.dx, 6.0);
        assert_eq!(f.dy, 0.0);
    }

    #[test]
    fn test_division_and_recip() {
        let x = Dual2::new(2.0f32, 1.0, 0.0);
        let f = Dual2::constant(1.0f32) / x;
        assert!(approx(f.val, 0.5));
        assert!(approx(f.dx, -0.25));
    }

    #[test]
    fn test_sqrt_at_zero_has_no_nan() {
        let x = Dual2::new(0.0f32, 1.0, 1.0);
        let s = x.sqrt();
        assert_eq!(s.val, 0.0);
        assert!(s.dx.is_finite() && s.dy.is_finite());
    }

    #[test]
    fn test_atan2_derivative() {
        // d/dy atan2(y, 1) at y = 0 is 1
        let y = Dual2::new(0.0f32, 1.0, 0.0);
        let x = Dual2::constant(1.0f32);
        let a = atan2(y, x);
        assert!(approx(a.val, 0.0));
        assert!(approx(a.dx, 1.0));
    }

    #[test]
    fn test_normalize_derivative_is_tangent() {
        let v = Dual2::new(Vec3::new(0.0, 0.0, 2.0), Vec3::new(1.0, 0.0, 1.0), Vec3::ZERO);
        let n = v.normalize();
        assert!(approx(n.val.length(), 1.0));
        // Derivative of a unit vector is orthogonal to it
        assert!(approx(n.dx.dot(n.val), 0.0));
        assert!(approx(n.dx.x, 0.5));
    }

    #[test]
    fn test_normalize_zero_vector() {
        let n = Dual2::<Vec3>::default().normalize();
        assert_eq!(n.val, Vec3::ZERO);
        assert!(n.is_finite());
    }

    #[test]
    fn test_cross_and_dot() {
        let a = Dual2::new(Vec3::X, Vec3::Y, Vec3::ZERO);
        let b = Dual2::constant(Vec3::Y);
        let c = a.cross(&b);
        assert_eq!(c.val, Vec3::Z);
        assert_eq!(c.dx, Vec3::ZERO);
        let d = a.dot(&b);
        assert_eq!(d.val, 0.0);
        assert_eq!(d.dx, 1.0);
    }
}
