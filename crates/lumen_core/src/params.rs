//! Typed parameter lists for scene statements.
//!
//! Parameters are declared with strings of the form `"[interpolation] type name"`,
//! e.g. `"vertex point P"` or `"float fov"`. The interpolation defaults to
//! `constant`.
//!
//! A [`ParamList`] is immutable once handed to a consumer. Which parameters a
//! consumer actually read is tracked by a [`ParamReader`] so leftovers can be
//! reported.

use std::str::FromStr;

use log::warn;
use lumen_math::Vec3;

use crate::attribute::{AttributeType, Interpolation};
use crate::error::ParamError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub interpolation: Interpolation,
    pub ty: AttributeType,
    pub name: String,
}

impl FromStr for ParamDecl {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        let (interpolation, ty, name) = match tokens.as_slice() {
            [interp, ty, name] => (interp.parse()?, ty, name),
            [ty, name] => (Interpolation::Constant, ty, name),
            _ => return Err(ParamError::Declaration(s.to_string())),
        };
        Ok(Self {
            interpolation,
            ty: ty.parse()?,
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(Vec<f32>),
    Int(Vec<i32>),
    String(Vec<String>),
}

impl ParamValue {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches(&self, ty: AttributeType) -> bool {
        match self {
            Self::Float(_) => ty.is_float(),
            Self::Int(_) => ty == AttributeType::Int,
            Self::String(_) => ty == AttributeType::String,
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        Self::Float(vec![v])
    }
}

impl From<Vec<f32>> for ParamValue {
    fn from(v: Vec<f32>) -> Self {
        Self::Float(v)
    }
}

impl From<Vec3> for ParamValue {
    fn from(v: Vec3) -> Self {
        Self::Float(v.to_array().to_vec())
    }
}

impl From<&[Vec3]> for ParamValue {
    fn from(v: &[Vec3]) -> Self {
        Self::Float(v.iter().flat_map(|p| p.to_array()).collect())
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(vec![v])
    }
}

impl From<Vec<i32>> for ParamValue {
    fn from(v: Vec<i32>) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::String(vec![v.to_string()])
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        Self::String(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub decl: ParamDecl,
    pub value: ParamValue,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamList {
    params: Vec<Param>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing an earlier one with the same name.
    pub fn insert(&mut self, decl: &str, value: impl Into<ParamValue>) -> Result<(), ParamError> {
        let decl: ParamDecl = decl.parse()?;
        let value = value.into();
        if !value.matches(decl.ty) {
            return Err(ParamError::ValueKind {
                name: decl.name,
                ty: decl.ty,
            });
        }
        self.params.retain(|p| p.decl.name != decl.name);
        self.params.push(Param { decl, value });
        Ok(())
    }

    /// Builder form of [`ParamList::insert`].
    pub fn with(mut self, decl: &str, value: impl Into<ParamValue>) -> Result<Self, ParamError> {
        self.insert(decl, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.decl.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Reads a [`ParamList`] while recording which entries were looked up.
#[derive(Debug)]
pub struct ParamReader<'a> {
    list: &'a ParamList,
    used: Vec<bool>,
}

impl<'a> ParamReader<'a> {
    pub fn new(list: &'a ParamList) -> Self {
        Self {
            list,
            used: vec![false; list.len()],
        }
    }

    /// Looks up a parameter and marks it used.
    pub fn get(&mut self, name: &str) -> Option<&'a Param> {
        let index = self.list.params.iter().position(|p| p.decl.name == name)?;
        self.used[index] = true;
        Some(&self.list.params[index])
    }

    pub fn floats(&mut self, name: &str) -> Option<&'a [f32]> {
        match &self.get(name)?.value {
            ParamValue::Float(v) => Some(v),
            _ => {
                warn!("Parameter \"{}\" is not a float array. Ignoring.", name);
                None
            }
        }
    }

    /// First value of a float parameter, or `default`.
    pub fn float(&mut self, name: &str, default: f32) -> f32 {
        self.floats(name)
            .and_then(|v| v.first().copied())
            .unwrap_or(default)
    }

    pub fn ints(&mut self, name: &str) -> Option<&'a [i32]> {
        match &self.get(name)?.value {
            ParamValue::Int(v) => Some(v),
            _ => {
                warn!("Parameter \"{}\" is not an int array. Ignoring.", name);
                None
            }
        }
    }

    pub fn int(&mut self, name: &str, default: i32) -> i32 {
        self.ints(name)
            .and_then(|v| v.first().copied())
            .unwrap_or(default)
    }

    pub fn string(&mut self, name: &str) -> Option<&'a str> {
        match &self.get(name)?.value {
            ParamValue::String(v) => v.first().map(String::as_str),
            _ => {
                warn!("Parameter \"{}\" is not a string. Ignoring.", name);
                None
            }
        }
    }

    /// Marks every parameter not yet read as used and returns them.
    pub fn take_remaining(&mut self) -> Vec<&'a Param> {
        let list = self.list;
        self.used
            .iter_mut()
            .zip(list.params.iter())
            .filter(|(used, _)| !**used)
            .map(|(used, param)| {
                *used = true;
                param
            })
            .collect()
    }

    pub fn unused(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.list
            .params
            .iter()
            .zip(self.used.iter())
            .filter(|(_, used)| !**used)
            .map(|(p, _)| p.decl.name.as_str())
    }

    /// Logs every parameter nobody read.
    pub fn report_unused(&self, context: &str) {
        for name in self.unused() {
            warn!("{}: unused parameter \"{}\"", context, name);
        }
    }
}
