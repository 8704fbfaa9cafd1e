//! Typed argument values and accumulated argument lists.

use crate::abi::ArgType;
use std::fmt::{Display, Formatter};

/// One argument value decoded from the host's tagged representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
}

impl ArgValue {
    pub fn arg_type(&self) -> ArgType {
        match self {
            Self::Bool(_) => ArgType::Bool,
            Self::Int(_) => ArgType::Int,
            Self::Float(_) => ArgType::Float,
            Self::String(_) => ArgType::String,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f32),
            _ => None,
        }
    }
}

impl Display for ArgValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value:?}"),
        }
    }
}

/// Arguments accepted so far, in host order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    values: Vec<ArgValue>,
}

impl ParsedArgs {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index)
    }

    pub fn int(&self, index: usize) -> Option<i32> {
        self.get(index).and_then(ArgValue::as_int)
    }

    pub fn values(&self) -> &[ArgValue] {
        &self.values
    }

    pub(crate) fn push(&mut self, value: ArgValue) {
        self.values.push(value);
    }
}
