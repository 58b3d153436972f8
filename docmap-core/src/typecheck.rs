//! Type checking of field values against a schema.
//!
//! The checker honors a three-level [`AlertLevel`] policy, except for fields declared
//! with [`FieldSpec::RequiredTyped`], whose type is enforced no matter what the policy
//! says. The same alert levels drive the handling of writes to fields that the schema
//! does not declare.

use std::fmt;

use bson::Bson;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{DocMapError, DocMapResult},
    schema::{FieldSpec, Schema},
};

/// How loudly a policy violation is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Fail the operation.
    Error,
    /// Log a warning and proceed.
    Warning,
    /// Do nothing.
    #[default]
    None,
}

/// The kinds of values a schema can constrain.
///
/// Inferred checks (from a literal default) only ever produce the first five kinds;
/// `DateTime` and `ObjectId` are available to [`FieldSpec::RequiredTyped`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Int,
    Float,
    List,
    Dict,
    DateTime,
    ObjectId,
}

impl FieldType {
    /// Returns the checkable kind of a literal default, if it has one.
    ///
    /// Booleans have no kind: a boolean default accepts any value, and a boolean value
    /// never satisfies an `Int` default.
    pub fn checkable(default: &Bson) -> Option<FieldType> {
        match default {
            Bson::String(_) => Some(FieldType::String),
            Bson::Int32(_) | Bson::Int64(_) => Some(FieldType::Int),
            Bson::Double(_) => Some(FieldType::Float),
            Bson::Array(_) => Some(FieldType::List),
            Bson::Document(_) => Some(FieldType::Dict),
            _ => None,
        }
    }

    /// Whether `value` is of this kind.
    pub fn matches(&self, value: &Bson) -> bool {
        matches!(
            (self, value),
            (FieldType::String, Bson::String(_))
                | (FieldType::Int, Bson::Int32(_) | Bson::Int64(_))
                | (FieldType::Float, Bson::Double(_))
                | (FieldType::List, Bson::Array(_))
                | (FieldType::Dict, Bson::Document(_))
                | (FieldType::DateTime, Bson::DateTime(_))
                | (FieldType::ObjectId, Bson::ObjectId(_))
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::List => "list",
            FieldType::Dict => "dict",
            FieldType::DateTime => "datetime",
            FieldType::ObjectId => "object id",
        };
        f.write_str(name)
    }
}

/// Whether a failed check may raise, or may only warn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Writes: violations raise according to policy.
    Enforce,
    /// Reads: violations are only ever logged.
    WarnOnly,
}

/// Validates field keys and values against a [`Schema`].
pub struct TypeChecker;

impl TypeChecker {
    /// Checks `value` against the schema entry for `field`.
    ///
    /// `context` names the owning model in messages (usually its path).
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::InvalidType`] when the field is `RequiredTyped` and the value
    /// has another type (regardless of `policy`), or when the inferred type mismatches
    /// under [`AlertLevel::Error`]. Never fails in [`CheckMode::WarnOnly`].
    pub fn check_type(
        schema: &Schema,
        field: &str,
        value: &Bson,
        policy: AlertLevel,
        mode: CheckMode,
        context: &str,
    ) -> DocMapResult<()> {
        let expected = match schema.get(field) {
            None => return Ok(()),
            Some(FieldSpec::RequiredTyped(kind)) => {
                if kind.matches(value) {
                    return Ok(());
                }
                let message = Self::mismatch_message(field, value, *kind, context);
                return match mode {
                    CheckMode::Enforce => Err(DocMapError::InvalidType(message)),
                    CheckMode::WarnOnly => {
                        warn!(field, context, "{message}");
                        Ok(())
                    }
                };
            }
            Some(FieldSpec::Required | FieldSpec::UpdateOnly | FieldSpec::DefaultFn(_)) => {
                return Ok(());
            }
            Some(FieldSpec::Default(default)) => FieldType::checkable(default),
        };

        if policy == AlertLevel::None {
            return Ok(());
        }

        let Some(expected) = expected else {
            return Ok(());
        };

        if expected.matches(value) {
            return Ok(());
        }

        let message = Self::mismatch_message(field, value, expected, context);

        match (policy, mode) {
            (AlertLevel::Error, CheckMode::Enforce) => Err(DocMapError::InvalidType(message)),
            _ => {
                warn!(field, context, "{message}");
                Ok(())
            }
        }
    }

    /// Applies the defaults-handling policy to a write of `field`.
    ///
    /// Schemas are permissive when empty; otherwise a field outside the schema is
    /// reported at the given `policy` level.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::InvalidKey`] under [`AlertLevel::Error`].
    pub fn check_key(
        schema: &Schema,
        field: &str,
        policy: AlertLevel,
        context: &str,
    ) -> DocMapResult<()> {
        if schema.is_empty() || schema.contains(field) {
            return Ok(());
        }

        match policy {
            AlertLevel::Error => Err(DocMapError::InvalidKey(format!(
                "{field} not in defaults for {context}"
            ))),
            AlertLevel::Warning => {
                warn!(field, context, "{field} not in defaults for {context}");
                Ok(())
            }
            AlertLevel::None => Ok(()),
        }
    }

    fn mismatch_message(field: &str, value: &Bson, expected: FieldType, context: &str) -> String {
        format!("value '{value}' for key '{field}' of {context} must be of type {expected}")
    }
}
