//! Document objects: one record of a collection, with schema-aware field access.
//!
//! A [`DatabaseObject`] is created in one of three ways:
//!
//! - [`DatabaseObject::load`] queries the store by identity or filter,
//! - [`DatabaseObject::from_document`] wraps data already in hand without a round trip,
//! - [`DatabaseObject::create`] validates and persists fresh data.
//!
//! Reads go through [`get`](DatabaseObject::get), which fills in schema defaults, and
//! writes through [`set`](DatabaseObject::set), which applies the connection's
//! defaults-handling and type-checking policies. The identity field can only change
//! through [`rename`](DatabaseObject::rename).
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//! use bson::doc;
//!
//! let users = ObjectModel::new("app.users")?
//!     .with_schema(Schema::new().with_required("email").with_default("visits", 0))
//!     .into_ref();
//!
//! let mut user = DatabaseObject::create(
//!     &conn,
//!     &users,
//!     doc! { "_id": "alice", "email": "alice@example.com" },
//!     CreateOptions::default(),
//! )
//! .await?;
//!
//! assert_eq!(user.get("visits")?, bson::Bson::Int32(0));
//! user.update(doc! { "visits": 1 }).await?;
//! ```

use std::sync::Arc;

use bson::{Bson, Document, doc, oid::ObjectId};
use tracing::debug;

use crate::{
    ID_KEY,
    backend::StoreBackend,
    codec,
    connection::Connection,
    error::{DocMapError, DocMapResult},
    model::ModelRef,
    path::Namespace,
    query::FindQuery,
    typecheck::{CheckMode, TypeChecker},
};

/// Lifecycle state of a [`DatabaseObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Backed by a matched record or by explicitly supplied data.
    Loaded,
    /// The load query matched nothing.
    NonExistent,
    /// Deleted through [`DatabaseObject::remove`].
    Removed,
}

/// What to match when loading or probing for an object.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Match on the identity field.
    Id(Bson),
    /// Match on an arbitrary filter document.
    Query(Document),
}

impl Selector {
    pub fn into_filter(self) -> Document {
        match self {
            Selector::Id(id) => doc! { ID_KEY: id },
            Selector::Query(filter) => filter,
        }
    }
}

impl From<Document> for Selector {
    fn from(filter: Document) -> Self {
        Selector::Query(filter)
    }
}

impl From<Bson> for Selector {
    fn from(value: Bson) -> Self {
        match value {
            Bson::Document(filter) => Selector::Query(filter),
            id => Selector::Id(id),
        }
    }
}

impl From<ObjectId> for Selector {
    fn from(id: ObjectId) -> Self {
        Selector::Id(Bson::ObjectId(id))
    }
}

impl From<&str> for Selector {
    fn from(id: &str) -> Self {
        Selector::Id(Bson::String(id.to_string()))
    }
}

impl From<String> for Selector {
    fn from(id: String) -> Self {
        Selector::Id(Bson::String(id))
    }
}

impl From<i32> for Selector {
    fn from(id: i32) -> Self {
        Selector::Id(Bson::Int32(id))
    }
}

impl From<i64> for Selector {
    fn from(id: i64) -> Self {
        Selector::Id(Bson::Int64(id))
    }
}

/// Options for [`DatabaseObject::create`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Replace an existing record with the same identity instead of failing.
    pub overwrite: bool,
    /// Discard any supplied identity and let the store assign one.
    pub random_id: bool,
}

impl CreateOptions {
    pub fn overwrite() -> Self {
        Self { overwrite: true, random_id: false }
    }

    pub fn random_id() -> Self {
        Self { overwrite: false, random_id: true }
    }
}

/// A single record of a collection, bound to a model and a connection.
#[derive(Debug, Clone)]
pub struct DatabaseObject {
    connection: Connection,
    model: ModelRef,
    data: Document,
    state: ObjectState,
}

impl DatabaseObject {
    /// Loads the single record matching `selector`.
    ///
    /// An object whose query matched nothing is returned in the
    /// [`ObjectState::NonExistent`] state; every field access on it fails.
    ///
    /// # Errors
    ///
    /// - [`DocMapError::TemplateDatabase`] if the model is a template.
    /// - [`DocMapError::DatabaseConflict`] if more than one record matches.
    pub async fn load(
        connection: &Connection,
        model: &ModelRef,
        selector: impl Into<Selector>,
    ) -> DocMapResult<Self> {
        let (backend, ns) = store_for(connection, model).await?;
        let filter = selector.into().into_filter();

        let mut matches = backend
            .find(&ns, FindQuery::builder().filter(filter.clone()).limit(2).build())
            .await?;
        debug!(namespace = %ns, matched = matches.len(), "loaded object");

        if matches.len() > 1 {
            return Err(DocMapError::DatabaseConflict(format!(
                "more than one database object matches {filter} in {model}"
            )));
        }

        Ok(match matches.pop() {
            Some(data) => Self::from_document(connection, model, data),
            None => Self {
                connection: connection.clone(),
                model: model.clone(),
                data: Document::new(),
                state: ObjectState::NonExistent,
            },
        })
    }

    /// Wraps data already in hand; no store round trip.
    pub fn from_document(connection: &Connection, model: &ModelRef, data: Document) -> Self {
        Self {
            connection: connection.clone(),
            model: model.clone(),
            data,
            state: ObjectState::Loaded,
        }
    }

    /// Whether any record matches `selector`. With no selector, returns `false`.
    pub async fn exists(
        connection: &Connection,
        model: &ModelRef,
        selector: Option<Selector>,
    ) -> DocMapResult<bool> {
        let Some(selector) = selector else {
            return Ok(false);
        };

        let (backend, ns) = store_for(connection, model).await?;

        Ok(backend.find_one(&ns, selector.into_filter()).await?.is_some())
    }

    /// Validates `data` and persists it as a new record.
    ///
    /// Every non-identity field goes through the defaults-handling and type-checking
    /// policies, then missing schema defaults are filled in as [`save`](Self::save)
    /// does. With `overwrite`, an existing record with the same identity is replaced;
    /// otherwise the record is inserted and the store-assigned identity captured.
    ///
    /// # Errors
    ///
    /// - [`DocMapError::MalformedObject`] if there is no identity and `random_id` is off,
    ///   or a required field has no value.
    /// - [`DocMapError::DatabaseConflict`] if the identity is taken and neither
    ///   `overwrite` nor `random_id` is set.
    /// - [`DocMapError::InvalidKey`] / [`DocMapError::InvalidType`] per policy.
    pub async fn create(
        connection: &Connection,
        model: &ModelRef,
        data: Document,
        options: CreateOptions,
    ) -> DocMapResult<Self> {
        let path = model.path()?;
        let settings = connection.settings();
        let context = path.to_string();

        for (key, value) in &data {
            if key == ID_KEY {
                continue;
            }
            validate_key(key)?;
            TypeChecker::check_key(model.schema(), key, settings.defaults_handling, &context)?;
            TypeChecker::check_type(
                model.schema(),
                key,
                value,
                settings.type_checking,
                CheckMode::Enforce,
                &context,
            )?;
        }

        let mut object = Self::from_document(connection, model, data);

        if options.random_id {
            object.data.remove(ID_KEY);
        } else {
            let Some(id) = object.data.get(ID_KEY).cloned() else {
                return Err(DocMapError::MalformedObject(format!(
                    "no {ID_KEY} key in item for {context}"
                )));
            };
            if !options.overwrite && Self::exists(connection, model, Some(Selector::Id(id.clone()))).await? {
                return Err(DocMapError::DatabaseConflict(format!(
                    "{ID_KEY} \"{id}\" already exists in collection {context}"
                )));
            }
        }

        object.fill_defaults()?;

        let (backend, ns) = object.store().await?;
        match object.data.get(ID_KEY).cloned() {
            Some(id) if options.overwrite => {
                backend
                    .replace_one(&ns, doc! { ID_KEY: id.clone() }, object.data.clone(), true)
                    .await?;
                debug!(namespace = %ns, id = %id, "overwrote object");
            }
            _ => {
                let id = backend.insert_one(&ns, object.data.clone()).await?;
                debug!(namespace = %ns, id = %id, "created object");
                object.data.insert(ID_KEY, id);
            }
        }

        Ok(object)
    }

    /// Creates a record from a JSON payload, with a store-assigned identity.
    ///
    /// With `ignore_non_defaults` and a non-empty schema, top-level keys the schema does
    /// not declare are dropped before creation.
    pub async fn create_from_json(
        connection: &Connection,
        model: &ModelRef,
        json: &str,
        ignore_non_defaults: bool,
    ) -> DocMapResult<Self> {
        let schema = model.schema();
        let data = keep_fields(codec::from_json_str(json)?, |key| {
            !ignore_non_defaults || schema.is_empty() || schema.contains(key)
        });

        Self::create(connection, model, data, CreateOptions::random_id()).await
    }

    pub fn state(&self) -> ObjectState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ObjectState::Loaded
    }

    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The identity of this object, if it has one yet.
    pub fn id(&self) -> Option<&Bson> {
        self.data.get(ID_KEY)
    }

    /// The raw in-memory contents, without default resolution.
    pub fn document(&self) -> &Document {
        &self.data
    }

    pub fn into_document(self) -> Document {
        self.data
    }

    /// Reads `field`, resolving and caching its schema default when absent.
    ///
    /// A stored value whose type disagrees with the schema only produces a warning.
    ///
    /// # Errors
    ///
    /// - [`DocMapError::NonexistentObject`] if the object does not exist or was removed.
    /// - [`DocMapError::MalformedObject`] if the field is required and has no value.
    /// - [`DocMapError::KeyNotFound`] if the field is absent and has no default.
    pub fn get(&mut self, field: &str) -> DocMapResult<Bson> {
        self.ensure_live()?;

        if field == ID_KEY {
            return self
                .data
                .get(ID_KEY)
                .cloned()
                .ok_or_else(|| DocMapError::KeyNotFound(ID_KEY.to_string()));
        }

        if let Some(value) = self.data.get(field) {
            TypeChecker::check_type(
                self.model.schema(),
                field,
                value,
                self.connection.settings().type_checking,
                CheckMode::WarnOnly,
                &self.model.to_string(),
            )?;
            return Ok(value.clone());
        }

        let value = self.model.schema().resolve(field).map_err(|err| match err {
            DocMapError::RequiredKey(field) => DocMapError::MalformedObject(format!(
                "'{field}' is a required key of {}",
                self.model
            )),
            other => other,
        })?;
        self.data.insert(field, value.clone());

        Ok(value)
    }

    /// Writes `field` in memory after applying the connection's policies.
    ///
    /// # Errors
    ///
    /// - [`DocMapError::NonexistentObject`] if the object does not exist or was removed.
    /// - [`DocMapError::ProtectedKey`] if `field` is the identity field.
    /// - [`DocMapError::InvalidKey`] for keys the store cannot hold, or for fields outside
    ///   the schema under the `error` defaults-handling policy.
    /// - [`DocMapError::InvalidType`] per the type-checking policy.
    pub fn set(&mut self, field: &str, value: impl Into<Bson>) -> DocMapResult<()> {
        self.ensure_live()?;
        if field == ID_KEY {
            return Err(DocMapError::ProtectedKey(ID_KEY.to_string()));
        }
        validate_key(field)?;

        let value = value.into();
        let settings = self.connection.settings();
        let context = self.model.to_string();
        TypeChecker::check_key(self.model.schema(), field, settings.defaults_handling, &context)?;
        TypeChecker::check_type(
            self.model.schema(),
            field,
            &value,
            settings.type_checking,
            CheckMode::Enforce,
            &context,
        )?;

        self.data.insert(field, value);
        Ok(())
    }

    /// Removes `field` from memory; absent fields are a no-op.
    pub fn delete(&mut self, field: &str) -> DocMapResult<Option<Bson>> {
        self.ensure_live()?;
        if field == ID_KEY {
            return Err(DocMapError::ProtectedKey(ID_KEY.to_string()));
        }

        Ok(self.data.remove(field))
    }

    /// Replaces the whole stored record with the in-memory contents.
    ///
    /// Missing schema fields are filled from their defaults first. Fields outside the
    /// schema are persisted as they are. Not safe against concurrent writers of the same
    /// record; prefer [`update`](Self::update) for field-scoped writes.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::MalformedObject`] if a required field has no value.
    pub async fn save(&mut self) -> DocMapResult<()> {
        self.fill_defaults()?;
        let filter = self.id_filter()?;

        let (backend, ns) = self.store().await?;
        backend.replace_one(&ns, filter, self.data.clone(), false).await?;
        debug!(namespace = %ns, id = ?self.id(), "saved object");

        Ok(())
    }

    /// Sets exactly the given fields, in memory and in the store.
    ///
    /// Sibling fields in the store are left untouched.
    ///
    /// # Errors
    ///
    /// - [`DocMapError::ProtectedKey`] if `fields` contains the identity field.
    /// - [`DocMapError::InvalidType`] per the type-checking policy.
    pub async fn update(&mut self, fields: Document) -> DocMapResult<()> {
        self.ensure_live()?;
        let filter = self.id_filter()?;
        let settings = self.connection.settings();
        let context = self.model.to_string();

        for (key, value) in &fields {
            if key == ID_KEY {
                return Err(DocMapError::ProtectedKey(ID_KEY.to_string()));
            }
            TypeChecker::check_type(
                self.model.schema(),
                key,
                value,
                settings.type_checking,
                CheckMode::Enforce,
                &context,
            )?;
        }

        for (key, value) in &fields {
            self.data.insert(key.clone(), value.clone());
        }

        let (backend, ns) = self.store().await?;
        backend.update_one(&ns, filter, doc! { "$set": fields }).await?;
        debug!(namespace = %ns, id = ?self.id(), "updated object");

        Ok(())
    }

    /// Applies an arbitrary update document, then reloads the object from the store.
    ///
    /// No type checking is performed on raw updates.
    pub async fn update_raw(&mut self, update: Document) -> DocMapResult<()> {
        self.ensure_live()?;
        let filter = self.id_filter()?;

        let (backend, ns) = self.store().await?;
        backend.update_one(&ns, filter.clone(), update).await?;

        match backend.find_one(&ns, filter).await? {
            Some(data) => {
                self.data = data;
                Ok(())
            }
            None => {
                self.data.clear();
                self.state = ObjectState::NonExistent;
                Err(DocMapError::NonexistentObject(format!(
                    "record vanished from {} during update",
                    self.model
                )))
            }
        }
    }

    /// Moves this record to a new identity.
    ///
    /// The record is written under `new_id` first and only then deleted under the old
    /// identity; a failure in between leaves both copies in the store.
    pub async fn rename(&mut self, new_id: impl Into<Bson>) -> DocMapResult<()> {
        self.ensure_live()?;
        let old_filter = self.id_filter()?;
        let new_id = new_id.into();
        if self.id() == Some(&new_id) {
            return Ok(());
        }

        let (backend, ns) = self.store().await?;
        let mut renamed = self.data.clone();
        renamed.insert(ID_KEY, new_id.clone());
        backend
            .replace_one(&ns, doc! { ID_KEY: new_id.clone() }, renamed.clone(), true)
            .await?;
        backend.remove(&ns, old_filter).await?;
        self.data = renamed;
        debug!(namespace = %ns, id = %new_id, "renamed object");

        Ok(())
    }

    /// Deletes the record from the store and clears the in-memory contents.
    pub async fn remove(&mut self) -> DocMapResult<()> {
        self.ensure_live()?;
        let filter = self.id_filter()?;

        let (backend, ns) = self.store().await?;
        backend.remove(&ns, filter).await?;
        debug!(namespace = %ns, id = ?self.id(), "removed object");

        self.data.clear();
        self.state = ObjectState::Removed;

        Ok(())
    }

    /// Creates a duplicate of this record, merged with `overrides`.
    ///
    /// Without `new_id` the copy gets a store-assigned identity.
    pub async fn copy(&self, new_id: Option<Bson>, overrides: Document) -> DocMapResult<Self> {
        self.ensure_live()?;

        let mut data = self.data.clone();
        for (key, value) in overrides {
            data.insert(key, value);
        }

        match new_id {
            Some(id) => {
                data.insert(ID_KEY, id);
                Self::create(&self.connection, &self.model, data, CreateOptions::default()).await
            }
            None => {
                data.remove(ID_KEY);
                Self::create(&self.connection, &self.model, data, CreateOptions::random_id()).await
            }
        }
    }

    /// Encodes the in-memory contents as JSON.
    pub fn to_json(&self) -> DocMapResult<String> {
        codec::to_json_string(&self.data)
    }

    /// Updates the object from a JSON payload.
    ///
    /// The identity field and every key in `exclude` are dropped. With
    /// `ignore_non_defaults` and a non-empty schema, keys the schema does not declare
    /// are dropped too.
    pub async fn json_update(
        &mut self,
        json: &str,
        exclude: &[&str],
        ignore_non_defaults: bool,
    ) -> DocMapResult<()> {
        let schema = self.model.schema();
        let fields = keep_fields(codec::from_json_str(json)?, |key| {
            key != ID_KEY
                && !exclude.contains(&key)
                && (!ignore_non_defaults || schema.is_empty() || schema.contains(key))
        });

        self.update(fields).await
    }

    /// Updates only the listed fields from a JSON payload; the identity is never updated.
    pub async fn json_update_fields(&mut self, json: &str, fields_to_update: &[&str]) -> DocMapResult<()> {
        let fields = keep_fields(codec::from_json_str(json)?, |key| {
            key != ID_KEY && fields_to_update.contains(&key)
        });

        self.update(fields).await
    }

    /// Resolves every schema field missing from memory; update-only fields stay absent.
    fn fill_defaults(&mut self) -> DocMapResult<()> {
        self.ensure_live()?;

        let missing: Vec<String> = self
            .model
            .schema()
            .fields()
            .filter(|field| !self.data.contains_key(*field))
            .map(str::to_string)
            .collect();

        for field in missing {
            match self.get(&field) {
                Ok(_) | Err(DocMapError::KeyNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    fn ensure_live(&self) -> DocMapResult<()> {
        match self.state {
            ObjectState::Loaded => Ok(()),
            ObjectState::NonExistent => Err(DocMapError::NonexistentObject(format!(
                "no matching record in {}",
                self.model
            ))),
            ObjectState::Removed => Err(DocMapError::NonexistentObject(format!(
                "record was removed from {}",
                self.model
            ))),
        }
    }

    fn id_filter(&self) -> DocMapResult<Document> {
        match self.data.get(ID_KEY) {
            Some(id) => Ok(doc! { ID_KEY: id.clone() }),
            None => Err(DocMapError::MalformedObject(format!(
                "object of {} has no {ID_KEY}",
                self.model
            ))),
        }
    }

    async fn store(&self) -> DocMapResult<(Arc<dyn StoreBackend>, Namespace)> {
        store_for(&self.connection, &self.model).await
    }
}

/// Resolves the backend and namespace a model's records live in.
pub(crate) async fn store_for(
    connection: &Connection,
    model: &ModelRef,
) -> DocMapResult<(Arc<dyn StoreBackend>, Namespace)> {
    let ns = connection.namespace(model.path()?);
    let backend = connection.backend().await?;

    Ok((backend, ns))
}

fn keep_fields(document: Document, keep: impl Fn(&str) -> bool) -> Document {
    document.into_iter().filter(|(key, _)| keep(key)).collect()
}

/// Rejects keys a document store cannot hold.
fn validate_key(key: &str) -> DocMapResult<()> {
    if key.is_empty() || key.contains('\0') {
        return Err(DocMapError::InvalidKey(format!(
            "documents must have non-empty keys without NUL bytes, key was {key:?}"
        )));
    }
    Ok(())
}
