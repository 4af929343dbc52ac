//! Lumen core scene model.
//!
//! Shapes with their attributes, primitives binding shapes to transforms and
//! shaders, the committed [`Scene`], and the two service interfaces the
//! renderer is built against: [`IntersectionService`] and [`ShadingService`].

pub mod attribute;
pub mod error;
pub mod intersect;
pub mod params;
pub mod primitive;
pub mod scene;
pub mod shading;
pub mod shape;

pub use attribute::{
    Attribute, AttributeSet, AttributeType, AttributeValue, Interpolation, InterpolationContext,
};
pub use error::{AttributeError, ParamError, ShapeError, ShapeResult};
pub use intersect::{GeometryHandle, InstanceHit, IntersectionService, LocalGeometry};
pub use params::{ParamList, ParamReader, ParamValue};
pub use primitive::{solid_angle_pdf, Primitive, SurfaceSample};
pub use scene::{Scene, SceneBuilder, SceneHit, SurfaceBinding, Trace};
pub use shading::{
    is_black, Bsdf, BsdfSample, Color, NamedSpaces, ShaderRef, ShadingInputs, ShadingResult,
    ShadingService,
};
pub use shape::{HitInfo, Mesh, Shape, Sphere};
