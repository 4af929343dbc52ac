//! Construction-time errors for scene data.
//!
//! None of these abort a render: the offending parameter, attribute or shape
//! is logged and skipped.

use thiserror::Error;

use crate::attribute::{AttributeType, Interpolation};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("cannot parse parameter declaration \"{0}\"")]
    Declaration(String),

    #[error("unknown interpolation \"{0}\"")]
    UnknownInterpolation(String),

    #[error("unknown parameter type \"{0}\"")]
    UnknownType(String),

    #[error("parameter \"{name}\" of type {ty:?} given values of the wrong kind")]
    ValueKind { name: String, ty: AttributeType },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributeError {
    #[error("attribute \"{name}\" has {actual} values, expected {expected}")]
    Length {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("attribute \"{name}\" of type {ty:?} cannot use {interpolation:?} interpolation")]
    Interpolation {
        name: String,
        ty: AttributeType,
        interpolation: Interpolation,
    },

    #[error("shape does not support {interpolation:?} attribute \"{name}\"")]
    Unsupported {
        name: String,
        interpolation: Interpolation,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("mesh has no vertex point attribute \"P\"")]
    MissingPositions,

    #[error("\"P\" must be a vertex point attribute with a multiple of 3 values")]
    BadPositions,

    #[error("face {face} has {count} vertices, at least 3 required")]
    ShortFace { face: usize, count: i32 },

    #[error("face counts reference {expected} indices but {actual} were given")]
    IndexCount { expected: usize, actual: usize },

    #[error("vertex index {index} out of range for {vertices} vertices")]
    IndexOutOfRange { index: i32, vertices: usize },

    #[error("face {face} could not be fully triangulated")]
    DegeneratePolygon { face: usize },

    #[error("sphere radius {0} is negative")]
    NegativeRadius(f32),

    #[error(transparent)]
    Param(#[from] ParamError),
}

pub type ShapeResult<T> = Result<T, ShapeError>;
