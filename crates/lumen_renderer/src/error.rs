//! Error types for the renderer crate.

use lumen_math::TransformError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("invalid camera transform: {0}")]
    Transform(#[from] TransformError),

    #[error("resolution must be positive, got {x}x{y}")]
    Resolution { x: i32, y: i32 },

    #[error("screen window [{0}, {1}] x [{2}, {3}] has zero extent")]
    ScreenWindow(f32, f32, f32, f32),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read render config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse render config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0} must be positive")]
    NotPositive(&'static str),
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("failed to write image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("image of {width}x{height} does not fit the output format")]
    Size { width: usize, height: usize },
}
