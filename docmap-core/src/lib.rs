//! Core of the docmap object-document mapper.
//!
//! docmap projects MongoDB collections onto dictionary-shaped objects with schema
//! defaults, required-field enforcement and optional type checking. This crate holds
//! the backend-independent engine:
//!
//! - **Connection context** ([`connection`]) - Lazily connected store handle plus live policy settings
//! - **Settings** ([`config`]) - Defaults-handling, type-checking and test-mode policies
//! - **Schemas** ([`schema`]) - Per-field default specifications and their resolution
//! - **Type checking** ([`typecheck`]) - Alert levels and value/key validation
//! - **Models** ([`model`]) - Path and schema configuration, including templates
//! - **Document objects** ([`object`]) - One record with schema-aware field access
//! - **Collection views** ([`collection`]) - Query-backed lists and paging cursors
//! - **Store backend abstraction** ([`backend`]) - Traits implemented by storage backends
//! - **Queries** ([`query`]) - Projection, sort and skip/limit of find requests
//! - **JSON codec** ([`codec`]) - Tagged JSON encoding of object ids and timestamps
//! - **Error handling** ([`error`]) - Error taxonomy and result type
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//! use bson::doc;
//!
//! let conn = Connection::lazy(InMemoryStore::builder());
//! let users = ObjectModel::new("app.users")?
//!     .with_schema(Schema::new().with_required("email").with_default("name", "anonymous"))
//!     .into_ref();
//!
//! DatabaseObject::create(&conn, &users, doc! { "_id": "alice", "email": "a@example.com" }, CreateOptions::default()).await?;
//! let mut alice = DatabaseObject::load(&conn, &users, "alice").await?;
//! assert_eq!(alice.get("name")?, bson::Bson::String("anonymous".into()));
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_core;

pub mod backend;
pub mod codec;
pub mod collection;
pub mod config;
pub mod connection;
pub mod error;
pub mod model;
pub mod object;
pub mod page;
pub mod path;
pub mod query;
pub mod schema;
pub mod typecheck;

/// Name of the identity field of every record.
pub const ID_KEY: &str = "_id";

/// Records fetched per page by [`collection::DatabaseCollection::iterator`] by default.
pub const DEFAULT_ITERATOR_PAGE_SIZE: u64 = 1000;
