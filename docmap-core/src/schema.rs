//! Field schemas and default-value resolution.
//!
//! A [`Schema`] maps field names to a [`FieldSpec`] describing how a missing value is
//! produced: a literal default, a fresh value from a function, or no default at all
//! (required, update-only, or required with a mandatory type).
//!
//! # Example
//!
//! ```ignore
//! use docmap::schema::Schema;
//! use docmap::typecheck::FieldType;
//! use bson::{Bson, DateTime};
//!
//! let schema = Schema::new()
//!     .with_required("email")
//!     .with_required_type("password", FieldType::String)
//!     .with_default_fn("time_created", || Bson::DateTime(DateTime::now()))
//!     .with_default("name", "anonymous");
//! ```

use std::{collections::BTreeMap, fmt, sync::Arc};

use bson::Bson;

use crate::{
    error::{DocMapError, DocMapResult},
    typecheck::FieldType,
};

/// A zero-argument function producing a fresh default value on every call.
pub type DefaultFn = Arc<dyn Fn() -> Bson + Send + Sync>;

/// How a single field of a schema is defaulted and constrained.
#[derive(Clone)]
pub enum FieldSpec {
    /// A literal default value; its type is also the field's inferred type.
    Default(Bson),
    /// A function invoked once per resolution.
    DefaultFn(DefaultFn),
    /// No default; the field must have a value before the object is saved.
    Required,
    /// No default; intended to be written only through explicit updates.
    UpdateOnly,
    /// No default, and values must be of the given type regardless of policy.
    RequiredTyped(FieldType),
}

impl FieldSpec {
    /// Creates a literal default.
    pub fn value(value: impl Into<Bson>) -> Self {
        FieldSpec::Default(value.into())
    }

    /// Creates a function default.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn() -> Bson + Send + Sync + 'static,
    {
        FieldSpec::DefaultFn(Arc::new(f))
    }

    /// Whether this spec yields no value on its own.
    pub fn is_required(&self) -> bool {
        matches!(self, FieldSpec::Required | FieldSpec::RequiredTyped(_))
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSpec::Default(value) => f.debug_tuple("Default").field(value).finish(),
            FieldSpec::DefaultFn(_) => f.write_str("DefaultFn(..)"),
            FieldSpec::Required => f.write_str("Required"),
            FieldSpec::UpdateOnly => f.write_str("UpdateOnly"),
            FieldSpec::RequiredTyped(kind) => f.debug_tuple("RequiredTyped").field(kind).finish(),
        }
    }
}

/// A mapping from field name to [`FieldSpec`].
///
/// An empty schema is fully permissive: no field is unknown and nothing is defaulted.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the spec of `field`.
    pub fn with_field(mut self, field: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(field.into(), spec);
        self
    }

    pub fn with_default(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with_field(field, FieldSpec::value(value))
    }

    pub fn with_default_fn<F>(self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Bson + Send + Sync + 'static,
    {
        self.with_field(field, FieldSpec::function(f))
    }

    pub fn with_required(self, field: impl Into<String>) -> Self {
        self.with_field(field, FieldSpec::Required)
    }

    pub fn with_update_only(self, field: impl Into<String>) -> Self {
        self.with_field(field, FieldSpec::UpdateOnly)
    }

    pub fn with_required_type(self, field: impl Into<String>, kind: FieldType) -> Self {
        self.with_field(field, FieldSpec::RequiredTyped(kind))
    }

    /// Layers `other` on top of this schema; entries of `other` win.
    pub fn merged(mut self, other: &Schema) -> Self {
        for (field, spec) in &other.fields {
            self.fields.insert(field.clone(), spec.clone());
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterates over the declared field names in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Computes the default value of `field`.
    ///
    /// Function defaults are invoked on every call. The returned value is owned, so
    /// containers produced for one object never alias those of another.
    ///
    /// # Errors
    ///
    /// - [`DocMapError::RequiredKey`] if the field is `Required` or `RequiredTyped`.
    /// - [`DocMapError::KeyNotFound`] if the field is `UpdateOnly` or not in the schema.
    pub fn resolve(&self, field: &str) -> DocMapResult<Bson> {
        match self.fields.get(field) {
            None | Some(FieldSpec::UpdateOnly) => Err(DocMapError::KeyNotFound(field.to_string())),
            Some(FieldSpec::Required | FieldSpec::RequiredTyped(_)) => {
                Err(DocMapError::RequiredKey(field.to_string()))
            }
            Some(FieldSpec::DefaultFn(f)) => Ok(f()),
            Some(FieldSpec::Default(value)) => Ok(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn literal_defaults_are_not_shared() {
        let schema = Schema::new().with_default("tags", Bson::Array(vec![Bson::Int32(1)]));

        let mut first = schema.resolve("tags").unwrap();
        let second = schema.resolve("tags").unwrap();

        if let Bson::Array(items) = &mut first {
            items.push(Bson::Int32(2));
        }

        assert_eq!(second, Bson::Array(vec![Bson::Int32(1)]));
        assert_eq!(schema.resolve("tags").unwrap(), Bson::Array(vec![Bson::Int32(1)]));
    }

    #[test]
    fn function_defaults_run_per_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let schema = Schema::new().with_default_fn("meta", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Bson::Document(doc! { "seen": false })
        });

        let mut a = schema.resolve("meta").unwrap();
        let b = schema.resolve("meta").unwrap();
        if let Bson::Document(d) = &mut a {
            d.insert("seen", true);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(b, Bson::Document(doc! { "seen": false }));
    }

    #[test]
    fn required_and_update_only_have_no_default() {
        let schema = Schema::new()
            .with_required("email")
            .with_required_type("count", FieldType::Int)
            .with_update_only("last_login");

        assert!(matches!(schema.resolve("email"), Err(DocMapError::RequiredKey(f)) if f == "email"));
        assert!(matches!(schema.resolve("count"), Err(DocMapError::RequiredKey(_))));
        assert!(matches!(schema.resolve("last_login"), Err(DocMapError::KeyNotFound(_))));
        assert!(matches!(schema.resolve("missing"), Err(DocMapError::KeyNotFound(_))));
    }

    #[test]
    fn merged_schema_overrides_base_entries() {
        let base = Schema::new().with_default("name", "anonymous").with_required("email");
        let child = Schema::new().with_default("name", "guest").with_default("age", 0);
        let merged = base.merged(&child);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.resolve("name").unwrap(), Bson::String("guest".into()));
        assert!(merged.get("email").unwrap().is_required());
    }
}
