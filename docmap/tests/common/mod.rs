#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use docmap::{bson::Bson, memory::InMemoryStore, prelude::*};

/// A connection over a fresh in-memory store, plus the store itself for inspection.
pub fn connection() -> (Connection, InMemoryStore) {
    let store = InMemoryStore::new();
    (Connection::new(store.clone()), store)
}

pub fn model(path: &str, schema: Schema) -> ModelRef {
    ObjectModel::new(path)
        .expect("valid path")
        .with_schema(schema)
        .into_ref()
}

/// The users schema used across tests.
pub fn user_schema() -> Schema {
    Schema::new()
        .with_required("email")
        .with_required_type("password", FieldType::String)
        .with_default("name", "anonymous")
        .with_default("age", 0)
        .with_default_fn("tags", || Bson::Array(vec![]))
        .with_update_only("last_login")
}

/// A function default that counts its invocations.
pub fn counting_default() -> (Arc<AtomicUsize>, FieldSpec) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let spec = FieldSpec::function(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Bson::Document(docmap::bson::doc! { "visits": 0 })
    });
    (calls, spec)
}
