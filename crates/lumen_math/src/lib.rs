// Re-export glam for convenience
pub use glam::*;

// Lumen math types
mod aabb;
mod dual;
mod interval;
mod ray;
pub mod sampling;
mod transform;

pub use aabb::Aabb;
pub use dual::{atan2, Dual2};
pub use interval::Interval;
pub use ray::{QueryRay, Ray, RAY_TFAR, RAY_TNEAR};
pub use transform::{Transform, TransformError};
