//! Dictionary-shaped object mapping over MongoDB collections.
//!
//! This crate is the primary entry point of docmap. It re-exports the core engine and
//! gives access to the storage backends.
//!
//! # Features
//!
//! - **Schema defaults** - Literal or computed defaults, required and update-only fields
//! - **Policies** - Configurable handling of unknown fields and type mismatches
//! - **Document objects** - Load, create, update, rename, copy and remove single records
//! - **Collection views** - Sorted, paginated listings and constant-memory iteration
//! - **Test mode** - Redirect every path to a disposable database
//! - **JSON** - Tagged encoding of object ids and timestamps
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::InMemoryStore};
//! use bson::{doc, Bson, DateTime};
//!
//! #[tokio::main]
//! async fn main() -> DocMapResult<()> {
//!     // Nothing is connected until the first store call
//!     let conn = Connection::lazy(InMemoryStore::builder());
//!     conn.set_type_checking(AlertLevel::Error);
//!
//!     let users = ObjectModel::new("application.users")?
//!         .with_schema(
//!             Schema::new()
//!                 .with_required("email")
//!                 .with_required_type("password", FieldType::String)
//!                 .with_default_fn("time_created", || Bson::DateTime(DateTime::now()))
//!                 .with_default("name", "anonymous"),
//!         )
//!         .into_ref();
//!
//!     let mut user = DatabaseObject::create(
//!         &conn,
//!         &users,
//!         doc! { "_id": "alice", "email": "alice@example.com", "password": "hunter2" },
//!         CreateOptions::default(),
//!     )
//!     .await?;
//!
//!     user.update(doc! { "name": "Alice" }).await?;
//!
//!     let everyone = DatabaseCollection::load(&conn, &users, ListOptions::new()).await?;
//!     println!("{}", everyone.to_json()?);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Test Mode
//!
//! [`Connection::isolated`](connection::Connection::isolated) returns a context sharing
//! the backend with test mode on: every path resolves into one disposable database that
//! [`drop_test_database`](connection::Connection::drop_test_database) wipes.
//!
//! ```ignore
//! let test_conn = conn.isolated();
//! DatabaseObject::create(&test_conn, &users, doc! { "_id": "t" }, CreateOptions::default()).await?;
//! test_conn.drop_test_database().await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmap_core::{
    DEFAULT_ITERATOR_PAGE_SIZE, ID_KEY, backend, codec, collection, config, connection, error,
    model, object, page, path, query, schema, typecheck,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmap_memory::{ADMIN_DATABASE, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmap_mongodb::{DEFAULT_DSN, MongoDbStore, MongoDbStoreBuilder};
}
