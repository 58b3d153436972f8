//! Database paths and the namespaces they resolve to.
//!
//! A [`Path`] is the caller-facing `"database.collection"` address of a backing
//! collection. A [`Namespace`] is what a backend actually receives after the
//! connection has applied test-mode redirection.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{DocMapError, DocMapResult};

/// Separator between the database and collection parts of a path.
pub const PATH_SEPARATOR: char = '.';

/// A validated `"database.collection"` path.
///
/// The string is split on its first separator, so collection names may themselves
/// contain dots. Both parts must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    database: String,
    collection: String,
}

impl Path {
    /// Parses a path of the form `"database.collection"`.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::InvalidPath`] if the separator is missing or either side is empty.
    pub fn parse(path: &str) -> DocMapResult<Self> {
        match path.split_once(PATH_SEPARATOR) {
            Some((database, collection)) if !database.is_empty() && !collection.is_empty() => {
                Ok(Self {
                    database: database.to_string(),
                    collection: collection.to_string(),
                })
            }
            _ => Err(DocMapError::InvalidPath(path.to_string())),
        }
    }

    /// Returns the database part of the path.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the collection part of the path.
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.database, PATH_SEPARATOR, self.collection)
    }
}

impl FromStr for Path {
    type Err = DocMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = DocMapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Path::parse(&value)
    }
}

impl TryFrom<&str> for Path {
    type Error = DocMapError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Path::parse(value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

/// The `(database, collection)` pair a backend operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Name of the database.
    pub database: String,
    /// Name of the collection within the database.
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl From<&Path> for Namespace {
    fn from(path: &Path) -> Self {
        Namespace::new(path.database(), path.collection())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.database, PATH_SEPARATOR, self.collection)
    }
}
