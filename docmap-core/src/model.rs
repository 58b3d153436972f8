//! Object models: the path and schema a document object is bound to.
//!
//! A model is plain configuration passed to the generic [`DatabaseObject`] and
//! [`DatabaseCollection`] types. Shared behavior between models is expressed by
//! composing schemas, starting from a template model that has no path of its own.
//!
//! ```ignore
//! use docmap::model::ObjectModel;
//! use docmap::schema::Schema;
//!
//! let timestamped = ObjectModel::template(
//!     Schema::new().with_default_fn("created", || bson::Bson::DateTime(bson::DateTime::now())),
//! );
//! let users = timestamped.extend("app.users", Schema::new().with_required("email"))?;
//! ```
//!
//! [`DatabaseObject`]: crate::object::DatabaseObject
//! [`DatabaseCollection`]: crate::collection::DatabaseCollection

use std::{fmt, sync::Arc};

use crate::{
    error::{DocMapError, DocMapResult},
    path::Path,
    schema::Schema,
};

/// Where a model's records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelPath {
    /// A live collection.
    Collection(Path),
    /// A template that only carries shared schema; never bound to a collection.
    Template,
}

/// The path and schema of a family of document objects.
#[derive(Debug, Clone)]
pub struct ObjectModel {
    path: ModelPath,
    schema: Schema,
}

/// Models are shared between every object and collection built from them.
pub type ModelRef = Arc<ObjectModel>;

impl ObjectModel {
    /// Creates a model bound to `path`, with an empty (permissive) schema.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::InvalidPath`] if `path` is not `"database.collection"`.
    pub fn new(path: &str) -> DocMapResult<Self> {
        Ok(Self::with_path(Path::parse(path)?))
    }

    pub fn with_path(path: Path) -> Self {
        Self {
            path: ModelPath::Collection(path),
            schema: Schema::new(),
        }
    }

    /// Creates a template model.
    pub fn template(schema: Schema) -> Self {
        Self {
            path: ModelPath::Template,
            schema,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Derives a live model from this one, layering `schema` over the inherited fields.
    pub fn extend(&self, path: &str, schema: Schema) -> DocMapResult<Self> {
        Ok(Self {
            path: ModelPath::Collection(Path::parse(path)?),
            schema: self.schema.clone().merged(&schema),
        })
    }

    /// Same model and schema, stored under another path.
    pub fn at(&self, path: Path) -> Self {
        Self {
            path: ModelPath::Collection(path),
            schema: self.schema.clone(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn model_path(&self) -> &ModelPath {
        &self.path
    }

    /// The collection path of a live model.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::TemplateDatabase`] for template models.
    pub fn path(&self) -> DocMapResult<&Path> {
        match &self.path {
            ModelPath::Collection(path) => Ok(path),
            ModelPath::Template => Err(DocMapError::TemplateDatabase),
        }
    }

    pub fn is_template(&self) -> bool {
        self.path == ModelPath::Template
    }

    pub fn into_ref(self) -> ModelRef {
        Arc::new(self)
    }
}

impl fmt::Display for ObjectModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            ModelPath::Collection(path) => write!(f, "{path}"),
            ModelPath::Template => f.write_str("<template>"),
        }
    }
}
