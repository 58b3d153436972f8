//! Convenient re-exports of commonly used types from docmap.
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```
//!
//! This provides access to:
//! - The connection context and its settings
//! - Models, schemas and type-checking policies
//! - Document objects and collection views
//! - Store backend traits
//! - Error types

pub use docmap_core::{
    ID_KEY,
    backend::{Connector, StoreBackend, StoreBackendBuilder},
    collection::{CollectionCursor, DatabaseCollection, ListOptions, Listing},
    config::Settings,
    connection::{Connection, TEST_DATABASE_NAME},
    error::{DocMapError, DocMapResult},
    model::{ModelRef, ObjectModel},
    object::{CreateOptions, DatabaseObject, ObjectState, Selector},
    page::Pagination,
    path::Path,
    query::{Projection, Sort, SortDirection},
    schema::{FieldSpec, Schema},
    typecheck::{AlertLevel, FieldType},
};
