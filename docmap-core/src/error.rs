//! Error types and result types for document mapping operations.
//!
//! This module provides the error taxonomy shared by every layer of the mapper.
//! Use [`DocMapResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when mapping objects onto a document store.
///
/// None of these are retried internally; every variant is surfaced synchronously to the
/// immediate caller.
#[derive(Error, Debug)]
pub enum DocMapError {
    /// A required field has no value at save/create time, or the identity is missing
    /// when one is required.
    #[error("Malformed object: {0}")]
    MalformedObject(String),
    /// Duplicate identity on create without overwrite, or a query unexpectedly matched
    /// more than one record.
    #[error("Database conflict: {0}")]
    DatabaseConflict(String),
    /// A field key the store cannot hold, or a write outside the schema under the
    /// `error` defaults-handling policy.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    /// A value failed a type constraint.
    #[error("Invalid type: {0}")]
    InvalidType(String),
    /// Field access on an object that matched nothing, or that has been removed.
    #[error("The object does not exist: {0}")]
    NonexistentObject(String),
    /// A template-only model was used as a live collection.
    #[error("Model is a template and cannot be used as a database accessor")]
    TemplateDatabase,
    /// The store could not be reached when establishing the connection.
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),
    /// The schema marks the field as required and it has no value.
    #[error("'{0}' is a required key")]
    RequiredKey(String),
    /// The field is in neither the object nor its defaults, or is update-only.
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    /// The identity field may only change through `rename`.
    #[error("Do not modify '{0}' directly; use rename() instead")]
    ProtectedKey(String),
    /// A path that is not of the form `database.collection`.
    #[error("Invalid path \"{0}\"; database paths must be of the form \"database.collection\"")]
    InvalidPath(String),
    /// Credentials were rejected by the store.
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// Serialization/deserialization error when converting between BSON and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document mapping operations.
pub type DocMapResult<T> = Result<T, DocMapError>;

impl From<BsonError> for DocMapError {
    fn from(err: BsonError) -> Self {
        DocMapError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocMapError {
    fn from(err: SerdeJsonError) -> Self {
        DocMapError::Serialization(err.to_string())
    }
}
