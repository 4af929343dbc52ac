//! Per-shape attributes and their interpolation.
//!
//! Every attribute carries a frequency tag deciding how many values it stores
//! and how a value is reconstructed at a hit point:
//!
//! | tag        | values per shape        | lookup                        |
//! |------------|-------------------------|-------------------------------|
//! | `Constant` | 1                       | copied verbatim               |
//! | `PerFace`  | one per face            | copied from the hit face      |
//! | `Linear`   | one per face corner     | weighted sum over the corners |
//! | `Vertex`   | one per vertex          | weighted sum over the vertices|

use std::str::FromStr;

use log::warn;
use lumen_math::{Dual2, Vec3};

use crate::error::{AttributeError, ParamError};
use crate::params::{Param, ParamReader, ParamValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Constant,
    PerFace,
    Linear,
    Vertex,
}

impl FromStr for Interpolation {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constant" => Ok(Self::Constant),
            "perpiece" | "perface" | "uniform" => Ok(Self::PerFace),
            "linear" | "facevarying" => Ok(Self::Linear),
            "vertex" | "varying" => Ok(Self::Vertex),
            other => Err(ParamError::UnknownInterpolation(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Float,
    Int,
    String,
    Color,
    Point,
    Vector,
    Normal,
}

impl AttributeType {
    /// Number of scalars per element.
    pub fn width(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::String => 1,
            Self::Color | Self::Point | Self::Vector | Self::Normal => 3,
        }
    }

    /// Whether values are stored as floats.
    pub fn is_float(self) -> bool {
        !matches!(self, Self::Int | Self::String)
    }
}

impl FromStr for AttributeType {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" => Ok(Self::Float),
            "int" => Ok(Self::Int),
            "string" => Ok(Self::String),
            "color" => Ok(Self::Color),
            "point" => Ok(Self::Point),
            "vector" => Ok(Self::Vector),
            "normal" => Ok(Self::Normal),
            other => Err(ParamError::UnknownType(other.to_string())),
        }
    }
}

/// Element counts of a shape for each interpolation frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeCounts {
    pub per_face: usize,
    /// `None` when the shape has no corner/vertex topology.
    pub linear: Option<usize>,
    pub vertex: Option<usize>,
}

impl AttributeCounts {
    pub fn elements(&self, interpolation: Interpolation) -> Option<usize> {
        match interpolation {
            Interpolation::Constant => Some(1),
            Interpolation::PerFace => Some(self.per_face),
            Interpolation::Linear => self.linear,
            Interpolation::Vertex => self.vertex,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub interpolation: Interpolation,
    pub ty: AttributeType,
    pub data: ParamValue,
}

/// One blend term of an interpolation context.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InterpolationWeight {
    pub vertex: usize,
    pub corner: usize,
    pub weight: Dual2<f32>,
}

/// Where a hit landed, in terms attribute lookup understands.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InterpolationContext {
    pub face: usize,
    weights: [InterpolationWeight; 3],
    len: usize,
}

impl InterpolationContext {
    /// Context without corner or vertex weights.
    pub fn face_only(face: usize) -> Self {
        Self {
            face,
            ..Default::default()
        }
    }

    pub fn triangle(face: usize, weights: [InterpolationWeight; 3]) -> Self {
        Self {
            face,
            weights,
            len: 3,
        }
    }

    pub fn weights(&self) -> &[InterpolationWeight] {
        &self.weights[..self.len]
    }
}

/// An interpolated attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue<'a> {
    /// One entry per scalar; carries screen-space derivatives from the weights.
    Floats(Vec<Dual2<f32>>),
    Ints(&'a [i32]),
    Strings(&'a [String]),
}

impl Attribute {
    fn validate(&self, counts: &AttributeCounts) -> Result<(), AttributeError> {
        if !self.ty.is_float()
            && matches!(self.interpolation, Interpolation::Linear | Interpolation::Vertex)
        {
            return Err(AttributeError::Interpolation {
                name: self.name.clone(),
                ty: self.ty,
                interpolation: self.interpolation,
            });
        }
        let elements = counts
            .elements(self.interpolation)
            .ok_or_else(|| AttributeError::Unsupported {
                name: self.name.clone(),
                interpolation: self.interpolation,
            })?;
        let expected = elements * self.ty.width();
        if self.data.len() != expected {
            return Err(AttributeError::Length {
                name: self.name.clone(),
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Reconstructs the value at a hit.
    pub fn interpolate(&self, ctx: &InterpolationContext) -> AttributeValue<'_> {
        let width = self.ty.width();
        let block = match self.interpolation {
            Interpolation::Constant => 0,
            Interpolation::PerFace => ctx.face,
            Interpolation::Linear | Interpolation::Vertex => {
                let ParamValue::Float(values) = &self.data else {
                    return AttributeValue::Floats(Vec::new());
                };
                let vertex = self.interpolation == Interpolation::Vertex;
                let mut acc = vec![Dual2::<f32>::default(); width];
                for w in ctx.weights() {
                    let index = if vertex { w.vertex } else { w.corner };
                    let Some(src) = values.get(index * width..(index + 1) * width) else {
                        continue;
                    };
                    for (a, &s) in acc.iter_mut().zip(src) {
                        *a = *a + w.weight * s;
                    }
                }
                return AttributeValue::Floats(acc);
            }
        };
        let range = block * width..(block + 1) * width;
        match &self.data {
            ParamValue::Float(values) => AttributeValue::Floats(
                values
                    .get(range)
                    .unwrap_or_default()
                    .iter()
                    .map(|&v| Dual2::constant(v))
                    .collect(),
            ),
            ParamValue::Int(values) => AttributeValue::Ints(values.get(range).unwrap_or_default()),
            ParamValue::String(values) => {
                AttributeValue::Strings(values.get(range).unwrap_or_default())
            }
        }
    }

    /// Interpolated scalar, for single-float attributes.
    pub fn interpolate_float(&self, ctx: &InterpolationContext) -> Option<Dual2<f32>> {
        match self.interpolate(ctx) {
            AttributeValue::Floats(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    /// Interpolated triple, for color, point, vector and normal attributes.
    pub fn interpolate_vec3(&self, ctx: &InterpolationContext) -> Option<Dual2<Vec3>> {
        match self.interpolate(ctx) {
            AttributeValue::Floats(v) if v.len() == 3 => {
                Some(Dual2::from_components(v[0], v[1], v[2]))
            }
            _ => None,
        }
    }
}

/// The immutable attribute table of a shape.
///
/// The surface overrides `N` (normal), `u` and `v` (float) are located once
/// at construction; a wrongly typed override is ignored with a warning but
/// stays available as ordinary user data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    attributes: Vec<Attribute>,
    normal: Option<usize>,
    u: Option<usize>,
    v: Option<usize>,
}

impl AttributeSet {
    /// Builds the table from every parameter the reader has not consumed yet.
    ///
    /// Attributes failing validation are logged and skipped.
    pub fn from_reader(reader: &mut ParamReader<'_>, counts: &AttributeCounts) -> Self {
        let mut set = Self::default();
        for param in reader.take_remaining() {
            match set.push(param, counts) {
                Ok(()) => {}
                Err(err) => warn!("Ignoring attribute: {}", err),
            }
        }
        set.normal = set.find_override("N", AttributeType::Normal);
        set.u = set.find_override("u", AttributeType::Float);
        set.v = set.find_override("v", AttributeType::Float);
        set
    }

    fn push(&mut self, param: &Param, counts: &AttributeCounts) -> Result<(), AttributeError> {
        let attribute = Attribute {
            name: param.decl.name.clone(),
            interpolation: param.decl.interpolation,
            ty: param.decl.ty,
            data: param.value.clone(),
        };
        attribute.validate(counts)?;
        self.attributes.push(attribute);
        Ok(())
    }

    fn find_override(&self, name: &str, ty: AttributeType) -> Option<usize> {
        let index = self.attributes.iter().position(|a| a.name == name)?;
        if self.attributes[index].ty != ty {
            warn!(
                "The type of attribute \"{}\" should be {:?}. Ignoring it as a surface override.",
                name, ty
            );
            return None;
        }
        Some(index)
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Shading normal override.
    pub fn normal(&self) -> Option<&Attribute> {
        self.normal.map(|i| &self.attributes[i])
    }

    pub fn u(&self) -> Option<&Attribute> {
        self.u.map(|i| &self.attributes[i])
    }

    pub fn v(&self) -> Option<&Attribute> {
        self.v.map(|i| &self.attributes[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamList;

    const TRIANGLE: AttributeCounts = AttributeCounts {
        per_face: 1,
        linear: Some(3),
        vertex: Some(3),
    };

    fn corner_context() -> InterpolationContext {
        let third = Dual2::constant(1.0 / 3.0);
        InterpolationContext::triangle(
            0,
            [
                InterpolationWeight { vertex: 0, corner: 2, weight: third },
                InterpolationWeight { vertex: 1, corner: 1, weight: third },
                InterpolationWeight { vertex: 2, corner: 0, weight: third },
            ],
        )
    }

    fn build(params: &ParamList, counts: &AttributeCounts) -> AttributeSet {
        let mut reader = ParamReader::new(params);
        AttributeSet::from_reader(&mut reader, counts)
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!("vertex".parse::<Interpolation>().unwrap(), Interpolation::Vertex);
        assert_eq!("perpiece".parse::<Interpolation>().unwrap(), Interpolation::PerFace);
        assert!("sometimes".parse::<Interpolation>().is_err());
        assert_eq!("normal".parse::<AttributeType>().unwrap(), AttributeType::Normal);
        assert_eq!(AttributeType::Color.width(), 3);
    }

    #[test]
    fn test_vertex_scalar_at_centroid() {
        let params = ParamList::new().with("vertex float s", vec![0.0f32, 1.0, 0.0]).unwrap();
        let set = build(&params, &TRIANGLE);
        let s = set.get("s").unwrap().interpolate_float(&corner_context()).unwrap();
        assert!((s.val - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_linear_uses_corner_indices() {
        let params = ParamList::new().with("linear float s", vec![3.0f32, 0.0, 0.0]).unwrap();
        let set = build(&params, &TRIANGLE);
        let mut ctx = corner_context();
        ctx.weights[0].weight = Dual2::constant(1.0);
        ctx.weights[1].weight = Dual2::constant(0.0);
        ctx.weights[2].weight = Dual2::constant(0.0);
        // First weight points at corner 2
        let s = set.get("s").unwrap().interpolate_float(&ctx).unwrap();
        assert_eq!(s.val, 0.0);
    }

    #[test]
    fn test_constant_and_per_face_lookup() {
        let counts = AttributeCounts { per_face: 2, linear: None, vertex: None };
        let params = ParamList::new()
            .with("constant color Cs", vec![0.1f32, 0.2, 0.3])
            .unwrap()
            .with("perpiece int id", vec![7, 9])
            .unwrap()
            .with("perpiece string tag", vec!["a".to_string(), "b".to_string()])
            .unwrap();
        let set = build(&params, &counts);
        let ctx = InterpolationContext::face_only(1);

        let cs = set.get("Cs").unwrap().interpolate_vec3(&ctx).unwrap();
        assert_eq!(cs.val, Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(set.get("id").unwrap().interpolate(&ctx), AttributeValue::Ints(&[9]));
        assert_eq!(
            set.get("tag").unwrap().interpolate(&ctx),
            AttributeValue::Strings(&["b".to_string()])
        );
    }

    #[test]
    fn test_invalid_attributes_skipped() {
        let counts = AttributeCounts { per_face: 1, linear: None, vertex: None };
        let params = ParamList::new()
            .with("vertex float a", vec![1.0f32, 2.0, 3.0])
            .unwrap()
            .with("constant float b", vec![1.0f32, 2.0])
            .unwrap()
            .with("constant float ok", 1.0f32)
            .unwrap();
        let set = build(&params, &counts);
        assert!(set.get("a").is_none());
        assert!(set.get("b").is_none());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_int_attributes_cannot_blend() {
        let params = ParamList::new().with("vertex int n", vec![1, 2, 3]).unwrap();
        let set = build(&params, &TRIANGLE);
        assert!(set.is_empty());
    }

    #[test]
    fn test_overrides_require_types() {
        let params = ParamList::new()
            .with("vertex vector N", vec![0.0f32; 9])
            .unwrap()
            .with("vertex float u", vec![0.0f32, 1.0, 0.0])
            .unwrap();
        let set = build(&params, &TRIANGLE);
        assert!(set.normal().is_none());
        // Still reachable as user data
        assert!(set.get("N").is_some());
        assert!(set.u().is_some());
        assert!(set.v().is_none());
    }
}
