// stateflow-core/src/core/value.rs
// ============================================================================
// Module: Stateflow Port Values
// Description: Tagged value variant and declared type names for data ports.
// Purpose: Replace dynamic typing with explicit values and conversion rules.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Port values are a tagged variant covering the primitive and structured
//! shapes routed through data flows. Declared port types are string type
//! names validated against a fixed vocabulary; the conversion rules between
//! values and declared types are an explicit table rather than host-language
//! coercion.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Value Variant
// ============================================================================

/// Runtime value carried by ports, scoped variables, and history records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Str(String),
    /// Byte string value.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    List(Vec<Value>),
    /// String-keyed map of values.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the type name this value conforms to exactly.
    #[must_use]
    pub const fn type_name(&self) -> TypeName {
        match self {
            Self::Null => TypeName::Any,
            Self::Bool(_) => TypeName::Bool,
            Self::Int(_) => TypeName::Int,
            Self::Float(_) => TypeName::Float,
            Self::Str(_) => TypeName::Str,
            Self::Bytes(_) => TypeName::Bytes,
            Self::List(_) => TypeName::List,
            Self::Map(_) => TypeName::Map,
        }
    }

    /// Returns true if the value is `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Checks whether this value may drive a port of the declared type.
    ///
    /// The conversion table is explicit: every value matches its own type
    /// and `any`; `Null` matches every declared type; `Int` additionally
    /// matches `float` by widening.
    #[must_use]
    pub fn conforms_to(&self, declared: TypeName) -> bool {
        if declared == TypeName::Any || self.is_null() {
            return true;
        }
        match (self, declared) {
            (Self::Int(_), TypeName::Float) => true,
            (value, declared) => value.type_name() == declared,
        }
    }

    /// Converts this value for a port of the declared type.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeMismatch`] when the conversion table has no
    /// entry for the value/declared pair.
    pub fn convert_to(&self, declared: TypeName) -> Result<Self, ValueError> {
        if declared == TypeName::Any || self.is_null() {
            return Ok(self.clone());
        }
        match (self, declared) {
            (Self::Int(value), TypeName::Float) => {
                #[allow(
                    clippy::cast_precision_loss,
                    reason = "Widening to float is the documented conversion rule."
                )]
                let widened = *value as f64;
                Ok(Self::Float(widened))
            }
            (value, declared) if value.type_name() == declared => Ok(value.clone()),
            (value, declared) => Err(ValueError::TypeMismatch {
                found: value.type_name(),
                declared,
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => value.fmt(f),
            Self::Int(value) => value.fmt(f),
            Self::Float(value) => value.fmt(f),
            Self::Str(value) => value.fmt(f),
            Self::Bytes(value) => write!(f, "<{} bytes>", value.len()),
            Self::List(values) => {
                write!(f, "[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    value.fmt(f)?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ============================================================================
// SECTION: Declared Type Names
// ============================================================================

/// Declared type of a data port or scoped variable.
///
/// # Invariants
/// - String forms are stable for serialization and on-disk layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TypeName {
    /// Accepts every value.
    #[default]
    Any,
    /// Boolean values.
    Bool,
    /// Signed integer values.
    Int,
    /// Floating point values; also accepts integers by widening.
    Float,
    /// String values.
    Str,
    /// Byte string values.
    Bytes,
    /// List values.
    List,
    /// String-keyed map values.
    Map,
}

impl TypeName {
    /// Parses a declared type name.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::UnknownTypeName`] when the name is not part of
    /// the type vocabulary.
    pub fn parse(name: &str) -> Result<Self, ValueError> {
        match name {
            "any" => Ok(Self::Any),
            "bool" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "str" => Ok(Self::Str),
            "bytes" => Ok(Self::Bytes),
            "list" => Ok(Self::List),
            "map" => Ok(Self::Map),
            other => Err(ValueError::UnknownTypeName(other.to_string())),
        }
    }

    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Map => "map",
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Value and type vocabulary errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    /// A value does not conform to the declared port type.
    #[error("value of type {found} does not conform to declared type {declared}")]
    TypeMismatch {
        /// Exact type of the offending value.
        found: TypeName,
        /// Declared type of the port.
        declared: TypeName,
    },
    /// A declared type name is not part of the vocabulary.
    #[error("unknown type name: {0}")]
    UnknownTypeName(String),
}
