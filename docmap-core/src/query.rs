//! Find requests passed from the mapper to a store backend.
//!
//! Filters are plain MongoDB-style filter documents; this module only describes how
//! results are shaped: projection, sort order, and skip/limit.
//!
//! ```ignore
//! use docmap::query::{FindQuery, SortDirection};
//! use bson::doc;
//!
//! let query = FindQuery::builder()
//!     .filter(doc! { "status": "active" })
//!     .sort("created_at", SortDirection::Desc)
//!     .limit(10)
//!     .build();
//! ```

use bson::{Bson, Document};

use crate::ID_KEY;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending { SortDirection::Asc } else { SortDirection::Desc }
    }

    /// The value MongoDB uses for this direction in a sort document.
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// One key of a sort specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self { field: field.into(), direction }
    }
}

/// Which fields a find returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Only the listed fields; ID_KEY is always included.
    Fields(Vec<String>),
    /// A raw projection document, e.g. `{ "name": 1, "_id": 0 }`.
    Document(Document),
}

impl Projection {
    /// Renders this projection as a MongoDB projection document.
    pub fn to_document(&self) -> Document {
        match self {
            Projection::Fields(fields) => {
                let mut projection = Document::new();
                for field in fields {
                    projection.insert(field.clone(), true);
                }
                projection
            }
            Projection::Document(document) => document.clone(),
        }
    }

    /// Applies this projection to a full record.
    ///
    /// Supports inclusion lists and documents made of all-inclusive or all-exclusive
    /// top-level fields, with ID_KEY handled on its own as MongoDB does.
    pub fn apply(&self, record: &Document) -> Document {
        let spec = self.to_document();
        let include_id = !matches!(spec.get(ID_KEY), Some(value) if !is_truthy(value));
        let only_id = spec.len() == 1 && spec.get(ID_KEY).is_some_and(is_truthy);
        let inclusive = only_id
            || spec
                .iter()
                .filter(|(key, _)| key.as_str() != ID_KEY)
                .any(|(_, value)| is_truthy(value));
        let exclusive = spec
            .iter()
            .filter(|(key, _)| key.as_str() != ID_KEY)
            .any(|(_, value)| !is_truthy(value));

        let mut projected = Document::new();
        for (key, value) in record {
            let keep = if key == ID_KEY {
                include_id
            } else if inclusive {
                spec.get(key).is_some_and(is_truthy)
            } else if exclusive {
                spec.get(key).is_none()
            } else {
                true
            };

            if keep {
                projected.insert(key.clone(), value.clone());
            }
        }
        projected
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// A structured find request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// Filter document records must match; empty matches everything.
    pub filter: Document,
    /// Optional projection of the returned records.
    pub projection: Option<Projection>,
    /// Sort keys, applied in order; empty means natural order.
    pub sort: Vec<Sort>,
    /// Number of records to skip.
    pub skip: Option<u64>,
    /// Maximum number of records to return.
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(filter: Document) -> Self {
        Self { filter, ..Default::default() }
    }

    pub fn builder() -> FindQueryBuilder {
        FindQueryBuilder::new()
    }

    /// Renders the sort keys as a MongoDB sort document, if any are set.
    pub fn sort_document(&self) -> Option<Document> {
        if self.sort.is_empty() {
            return None;
        }

        let mut document = Document::new();
        for sort in &self.sort {
            document.insert(sort.field.clone(), sort.direction.as_i32());
        }
        Some(document)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindQueryBuilder {
    query: FindQuery,
}

impl FindQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter document.
    pub fn filter(mut self, filter: Document) -> Self {
        self.query.filter = filter;
        self
    }

    /// Sets the projection.
    pub fn projection(mut self, projection: Projection) -> Self {
        self.query.projection = Some(projection);
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort::new(field, direction));
        self
    }

    /// Replaces all sort keys.
    pub fn sort_by(mut self, sort: Vec<Sort>) -> Self {
        self.query.sort = sort;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.query.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn build(self) -> FindQuery {
        self.query
    }
}
