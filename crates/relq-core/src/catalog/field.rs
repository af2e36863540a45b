//! Field definitions for entities.

use relq_ir::ValueKind;
use serde::{Deserialize, Serialize};

/// Scalar data types a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Binary data.
    Bytes,
    /// Timestamp as microseconds since Unix epoch.
    Timestamp,
    /// UUID.
    Uuid,
}

impl ScalarType {
    /// The runtime value kind values of this type carry.
    pub fn value_kind(self) -> ValueKind {
        match self {
            ScalarType::Bool => ValueKind::Bool,
            ScalarType::Int32 => ValueKind::Int32,
            ScalarType::Int64 => ValueKind::Int64,
            ScalarType::Float32 => ValueKind::Float32,
            ScalarType::Float64 => ValueKind::Float64,
            ScalarType::String => ValueKind::String,
            ScalarType::Bytes => ValueKind::Bytes,
            ScalarType::Timestamp => ValueKind::Timestamp,
            ScalarType::Uuid => ValueKind::Uuid,
        }
    }
}

/// A field definition within an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Scalar type of the field.
    pub scalar: ScalarType,
    /// Whether the field is required (non-nullable).
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar,
            required: true,
        }
    }

    /// Create an optional (nullable) field.
    pub fn optional(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar,
            required: false,
        }
    }

    /// The runtime value kind of this field.
    pub fn value_kind(&self) -> ValueKind {
        self.scalar.value_kind()
    }
}
