//! MongoDB backend implementation for docmap.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait on top
//! of the official async driver. Filters, projections and update documents are passed to
//! the server as they are.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmap = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! [`MongoDbStoreBuilder`] takes a connection string (defaulting to
//! `mongodb://localhost:27017`) with optional host/port overrides. Building pings the
//! server and fails with `DatabaseUnavailable` when it cannot be reached, so a lazily
//! connected `Connection` surfaces an unreachable server on first use.
//!
//! # Example
//!
//! ```ignore
//! use docmap::{connection::Connection, mongodb::MongoDbStoreBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = Connection::connect(MongoDbStoreBuilder::new("mongodb://localhost:27017")).await?;
//!     println!("{:?}", conn.list_databases().await?);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_mongodb;

pub mod store;

pub use store::{DEFAULT_DSN, MongoDbStore, MongoDbStoreBuilder};
