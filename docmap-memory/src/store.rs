//! In-memory storage implementation of the store capability.
//!
//! Records are kept as BSON documents in insertion order, grouped by database and
//! collection, behind async-aware read-write locks.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::trace;

use docmap_core::{
    ID_KEY,
    backend::{Credentials, NewUser, StoreBackend, StoreBackendBuilder, UserRole},
    error::{DocMapError, DocMapResult},
    path::Namespace,
    query::FindQuery,
};

use crate::evaluator::{apply_update, filter_documents, matches, sort_documents, values_equal};

/// Database the user registry falls back to when none is named.
pub const ADMIN_DATABASE: &str = "admin";

type CollectionMap = HashMap<String, Vec<Document>>;
type StoreMap = HashMap<String, CollectionMap>;

#[derive(Debug, Clone)]
struct UserRecord {
    password: String,
    role: UserRole,
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so clones
/// share the same data.
///
/// # Performance
///
/// Queries scan all records of a collection (no indexing), which is fine for tests and
/// small datasets.
///
/// # Example
///
/// ```ignore
/// use docmap::memory::InMemoryStore;
/// use docmap::backend::StoreBackend;
/// use docmap::path::Namespace;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let users = Namespace::new("app", "users");
///
/// let id = store.insert_one(&users, doc! { "name": "Alice" }).await?;
/// assert!(store.find_one(&users, doc! { "_id": id }).await?.is_some());
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// database -> collection -> records
    store: Arc<RwLock<StoreMap>>,
    /// database -> user name -> credentials
    users: Arc<RwLock<HashMap<String, HashMap<String, UserRecord>>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder, usable directly as a lazy [`Connector`](docmap_core::backend::Connector).
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn insertion_id(document: &mut Document) -> Bson {
    if let Some(id) = document.get(ID_KEY) {
        return id.clone();
    }

    let id = Bson::ObjectId(ObjectId::new());
    let mut with_id = Document::new();
    with_id.insert(ID_KEY, id.clone());
    for (key, value) in std::mem::take(document) {
        with_id.insert(key, value);
    }
    *document = with_id;
    id
}

fn check_duplicate(records: &[Document], id: &Bson, ns: &Namespace) -> DocMapResult<()> {
    if records
        .iter()
        .any(|record| record.get(ID_KEY).is_some_and(|existing| values_equal(existing, id)))
    {
        return Err(DocMapError::DatabaseConflict(format!(
            "duplicate key {ID_KEY} \"{id}\" in {ns}"
        )));
    }
    Ok(())
}

fn first_match(records: &[Document], filter: &Document) -> DocMapResult<Option<usize>> {
    for (index, record) in records.iter().enumerate() {
        if matches(record, filter)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Upserted records take their identity from a plain equality on it in the filter.
fn upsert_id(filter: &Document) -> Option<Bson> {
    match filter.get(ID_KEY) {
        Some(Bson::Document(ops)) if ops.keys().any(|k| k.starts_with('$')) => None,
        Some(id) => Some(id.clone()),
        None => None,
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find_one(&self, ns: &Namespace, filter: Document) -> DocMapResult<Option<Document>> {
        let store = self.store.read().await;
        let Some(records) = store.get(&ns.database).and_then(|db| db.get(&ns.collection)) else {
            return Ok(None);
        };

        Ok(first_match(records, &filter)?.map(|index| records[index].clone()))
    }

    async fn find(&self, ns: &Namespace, query: FindQuery) -> DocMapResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(records) = store.get(&ns.database).and_then(|db| db.get(&ns.collection)) else {
            return Ok(vec![]);
        };

        let mut found: Vec<Document> = filter_documents(records, &query.filter)?
            .into_iter()
            .cloned()
            .collect();
        sort_documents(&mut found, &query.sort);

        let skip = query.skip.unwrap_or(0) as usize;
        let limit = match query.limit {
            Some(0) | None => usize::MAX,
            Some(limit) => limit as usize,
        };
        trace!(namespace = %ns, matched = found.len(), skip, "in-memory find");

        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|record| match &query.projection {
                Some(projection) => projection.apply(&record),
                None => record,
            })
            .collect())
    }

    async fn count(&self, ns: &Namespace, filter: Document) -> DocMapResult<u64> {
        let store = self.store.read().await;
        let Some(records) = store.get(&ns.database).and_then(|db| db.get(&ns.collection)) else {
            return Ok(0);
        };

        Ok(filter_documents(records, &filter)?.len() as u64)
    }

    async fn insert_one(&self, ns: &Namespace, mut document: Document) -> DocMapResult<Bson> {
        let mut store = self.store.write().await;
        let records = store
            .entry(ns.database.clone())
            .or_default()
            .entry(ns.collection.clone())
            .or_default();

        let id = insertion_id(&mut document);
        check_duplicate(records, &id, ns)?;
        records.push(document);
        trace!(namespace = %ns, id = %id, "in-memory insert");

        Ok(id)
    }

    async fn replace_one(
        &self,
        ns: &Namespace,
        filter: Document,
        mut document: Document,
        upsert: bool,
    ) -> DocMapResult<()> {
        let mut store = self.store.write().await;
        let records = store
            .entry(ns.database.clone())
            .or_default()
            .entry(ns.collection.clone())
            .or_default();

        match first_match(records, &filter)? {
            Some(index) => {
                let existing = records[index].get(ID_KEY).cloned();
                let replacement_id = document.get(ID_KEY).cloned();
                match (existing, replacement_id) {
                    (Some(existing), Some(new)) if !values_equal(&existing, &new) => {
                        return Err(DocMapError::Backend(format!(
                            "replacement would modify the immutable field '{ID_KEY}'"
                        )));
                    }
                    (Some(existing), None) => {
                        let mut with_id = Document::new();
                        with_id.insert(ID_KEY, existing);
                        for (key, value) in document {
                            with_id.insert(key, value);
                        }
                        document = with_id;
                    }
                    _ => {}
                }
                records[index] = document;
            }
            None if upsert => {
                if !document.contains_key(ID_KEY) {
                    if let Some(id) = upsert_id(&filter) {
                        document.insert(ID_KEY, id);
                    }
                }
                let id = insertion_id(&mut document);
                check_duplicate(records, &id, ns)?;
                records.push(document);
            }
            None => {}
        }

        Ok(())
    }

    async fn update_one(&self, ns: &Namespace, filter: Document, update: Document) -> DocMapResult<()> {
        let mut store = self.store.write().await;
        let Some(records) = store.get_mut(&ns.database).and_then(|db| db.get_mut(&ns.collection)) else {
            return Ok(());
        };

        if let Some(index) = first_match(records, &filter)? {
            let mut updated = records[index].clone();
            apply_update(&mut updated, &update)?;
            records[index] = updated;
        }

        Ok(())
    }

    async fn remove(&self, ns: &Namespace, filter: Document) -> DocMapResult<u64> {
        let mut store = self.store.write().await;
        let Some(records) = store.get_mut(&ns.database).and_then(|db| db.get_mut(&ns.collection)) else {
            return Ok(0);
        };

        let mut doomed = Vec::with_capacity(records.len());
        for record in records.iter() {
            doomed.push(matches(record, &filter)?);
        }

        let before = records.len();
        let mut doomed = doomed.into_iter();
        records.retain(|_| !doomed.next().unwrap_or(false));

        Ok((before - records.len()) as u64)
    }

    async fn list_databases(&self) -> DocMapResult<Vec<String>> {
        let mut names: Vec<String> = self.store.read().await.keys().cloned().collect();
        names.sort();

        Ok(names)
    }

    async fn list_collections(&self, database: &str) -> DocMapResult<Vec<String>> {
        let mut names: Vec<String> = self
            .store
            .read()
            .await
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();

        Ok(names)
    }

    async fn drop_database(&self, database: &str) -> DocMapResult<()> {
        self.store.write().await.remove(database);

        Ok(())
    }

    async fn authenticate(&self, credentials: Credentials) -> DocMapResult<()> {
        let database = credentials.database.as_deref().unwrap_or(ADMIN_DATABASE);
        let users = self.users.read().await;

        match users.get(database).and_then(|db| db.get(&credentials.username)) {
            Some(user) if user.password == credentials.password => Ok(()),
            _ => Err(DocMapError::Authentication(format!(
                "invalid credentials for user '{}' on database '{database}'",
                credentials.username
            ))),
        }
    }

    async fn add_user(&self, user: NewUser) -> DocMapResult<()> {
        let database = user.database.unwrap_or_else(|| ADMIN_DATABASE.to_string());
        self.users.write().await.entry(database).or_default().insert(
            user.name,
            UserRecord {
                password: user.password,
                role: user.role,
            },
        );

        Ok(())
    }
}

impl InMemoryStore {
    /// Role of a registered user, if any.
    pub async fn user_role(&self, database: &str, name: &str) -> Option<UserRole> {
        self.users
            .read()
            .await
            .get(database)
            .and_then(|db| db.get(name))
            .map(|user| user.role)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// By default every build yields a fresh, empty store. A builder created with
/// [`InMemoryStoreBuilder::shared`] hands out clones of one store instead, so data
/// survives reconnects.
///
/// # Example
///
/// ```ignore
/// use docmap::memory::InMemoryStore;
/// use docmap::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStoreBuilder {
    shared: Option<InMemoryStore>,
}

impl InMemoryStoreBuilder {
    /// A builder that always yields clones of `store`.
    pub fn shared(store: InMemoryStore) -> Self {
        Self { shared: Some(store) }
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocMapResult<Self::Backend> {
        Ok(self.shared.unwrap_or_default())
    }
}
