//! Storage backend abstraction for the object mapper.
//!
//! This module defines the store capability the mapper is written against: a handful of
//! single-record operations over collections addressed by a [`Namespace`], plus the
//! administrative calls exposed on a connection.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//! - [`Connector`]: Object-safe factory used to connect lazily
//!
//! # Examples
//!
//! ```ignore
//! use docmap::backend::StoreBackend;
//! use docmap::path::Namespace;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//! let users = Namespace::new("app", "users");
//!
//! let id = backend.insert_one(&users, doc! { "name": "Alice" }).await?;
//! let found = backend.find_one(&users, doc! { "_id": id }).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::{error::DocMapResult, path::Namespace, query::FindQuery};

/// Credentials presented to [`StoreBackend::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Database the user is registered in; `None` means the admin database.
    pub database: Option<String>,
}

/// Role granted to a user created through [`StoreBackend::add_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    /// Read-only access to the user's database.
    Read,
    /// Read and write access to the user's database.
    ReadWrite,
    /// Full administrative access to every database.
    Root,
}

/// A user to register with the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub password: String,
    pub role: UserRole,
    /// Database to register the user in; `None` means the admin database.
    pub database: Option<String>,
}

/// Abstract interface for document storage backends.
///
/// Every operation is atomic at the level of a single record, and nothing more: the
/// mapper builds multi-step operations (rename, move) out of these calls without any
/// rollback.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
///
/// # Error Handling
///
/// Operations return [`DocMapResult<T>`](crate::error::DocMapResult). Inserting a record
/// whose ID_KEY already exists must fail with
/// [`DocMapError::DatabaseConflict`](crate::error::DocMapError::DatabaseConflict).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the first record matching `filter`, if any.
    async fn find_one(&self, ns: &Namespace, filter: Document) -> DocMapResult<Option<Document>>;

    /// Returns every record matching the query, projected, sorted and windowed.
    async fn find(&self, ns: &Namespace, query: FindQuery) -> DocMapResult<Vec<Document>>;

    /// Counts the records matching `filter`.
    async fn count(&self, ns: &Namespace, filter: Document) -> DocMapResult<u64>;

    /// Inserts a record and returns its ID_KEY, assigning a fresh object id when the
    /// record has none.
    async fn insert_one(&self, ns: &Namespace, document: Document) -> DocMapResult<Bson>;

    /// Replaces the first record matching `filter` with `document`.
    ///
    /// With `upsert`, the document is inserted when nothing matches.
    async fn replace_one(
        &self,
        ns: &Namespace,
        filter: Document,
        document: Document,
        upsert: bool,
    ) -> DocMapResult<()>;

    /// Applies an update document (e.g. `{"$set": {...}}`) to the first record matching `filter`.
    async fn update_one(&self, ns: &Namespace, filter: Document, update: Document) -> DocMapResult<()>;

    /// Removes every record matching `filter` and returns how many were removed.
    async fn remove(&self, ns: &Namespace, filter: Document) -> DocMapResult<u64>;

    /// Lists the names of all databases.
    async fn list_databases(&self) -> DocMapResult<Vec<String>>;

    /// Lists the collection names of `database`.
    async fn list_collections(&self, database: &str) -> DocMapResult<Vec<String>>;

    /// Drops `database` and everything in it.
    async fn drop_database(&self, database: &str) -> DocMapResult<()>;

    /// Verifies credentials with the store and uses them from now on.
    async fn authenticate(&self, credentials: Credentials) -> DocMapResult<()>;

    /// Registers a user that can later be used with [`authenticate`](Self::authenticate).
    async fn add_user(&self, user: NewUser) -> DocMapResult<()>;

    /// Releases backend resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(&self) -> DocMapResult<()> {
        Ok(())
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocMapResult<Self::Backend>;
}

/// Object-safe factory used by a connection to create its backend on first use.
///
/// Implemented for every cloneable [`StoreBackendBuilder`].
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    async fn connect(&self) -> DocMapResult<Arc<dyn StoreBackend>>;
}

#[async_trait]
impl<B> Connector for B
where
    B: StoreBackendBuilder + Clone + Send + Sync + Debug,
    B::Backend: 'static,
{
    async fn connect(&self) -> DocMapResult<Arc<dyn StoreBackend>> {
        let backend = self.clone().build().await?;

        Ok(Arc::new(backend))
    }
}
