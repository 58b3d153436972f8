//! In-memory document storage backend for docmap.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development
//! and tests: every mapper operation works against it without a running server.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Filter support** - Comparison, membership, existence and logical operators
//! - **Update operators** - `$set`, `$unset` and `$inc`, with dotted paths
//! - **User registry** - Backs `authenticate` and `add_user`
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::prelude::*;
//! use docmap::memory::InMemoryStore;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = Connection::lazy(InMemoryStore::builder());
//!     let notes = ObjectModel::new("app.notes")?.into_ref();
//!
//!     DatabaseObject::create(&conn, &notes, doc! { "text": "hi" }, CreateOptions::random_id()).await?;
//!     assert_eq!(DatabaseCollection::count(&conn, &notes, doc! {}).await?, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_memory;

pub mod evaluator;
pub mod store;

pub use store::{ADMIN_DATABASE, InMemoryStore, InMemoryStoreBuilder};
