//! Collection views: query-backed lists of document objects.
//!
//! A [`DatabaseCollection`] is a snapshot of the records matching a query, computed when
//! it is built. Each contained [`DatabaseObject`] can be saved back on its own. Listing
//! can also return raw (projected) records or a single field per record, see
//! [`DatabaseCollection::list`].
//!
//! For full-collection scans use [`DatabaseCollection::iterator`], which pages through
//! the collection in identity order with bounded memory.
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//! use bson::doc;
//!
//! let active = DatabaseCollection::load(
//!     &conn,
//!     &users,
//!     ListOptions::new()
//!         .query(doc! { "active": true })
//!         .sort_by("name", true)
//!         .page(0, 50),
//! )
//! .await?;
//!
//! let mut cursor = DatabaseCollection::iterator(&conn, &users, doc! {}, 1000);
//! while let Some(user) = cursor.next().await? {
//!     println!("{:?}", user.id());
//! }
//! ```

use std::{
    collections::VecDeque,
    ops::{Deref, DerefMut},
};

use bson::{Bson, Document, doc};
use futures::{Stream, stream};
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    DEFAULT_ITERATOR_PAGE_SIZE, ID_KEY, codec,
    connection::Connection,
    error::DocMapResult,
    model::{ModelRef, ObjectModel},
    object::{CreateOptions, DatabaseObject, store_for},
    page::Pagination,
    path::Path,
    query::{FindQuery, Projection, Sort, SortDirection},
};

/// Shape and window of a collection listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOptions {
    /// Filter records must match; empty matches everything.
    pub query: Document,
    /// Sort keys in order; empty leaves the store's natural order.
    pub sort: Vec<Sort>,
    pub pagination: Pagination,
    /// Return raw records instead of document objects.
    pub read_only: bool,
    /// Fields to return; implies `read_only`.
    pub projection: Option<Projection>,
    /// Return only this field of each record, skipping records without it.
    pub field: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            query: Document::new(),
            sort: vec![Sort::new(ID_KEY, SortDirection::Asc)],
            pagination: Pagination::disabled(),
            read_only: false,
            projection: None,
            field: None,
        }
    }
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: Document) -> Self {
        self.query = query;
        self
    }

    /// Sorts by a single key.
    pub fn sort_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort = vec![Sort::new(field, SortDirection::from_ascending(ascending))];
        self
    }

    /// Sorts by several keys, in order.
    pub fn sort(mut self, sort: Vec<Sort>) -> Self {
        self.sort = sort;
        self
    }

    pub fn unsorted(mut self) -> Self {
        self.sort.clear();
        self
    }

    /// Returns only page `page` (0-indexed) of `page_size` records; `0` disables paging.
    pub fn page(mut self, page: u64, page_size: u64) -> Self {
        self.pagination = Pagination::new(page, page_size);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    fn find_query(&self, projection: Option<Projection>) -> FindQuery {
        let mut builder = FindQuery::builder()
            .filter(self.query.clone())
            .sort_by(self.sort.clone());
        if let Some(projection) = projection {
            builder = builder.projection(projection);
        }
        if let Some((skip, limit)) = self.pagination.window() {
            builder = builder.skip(skip).limit(limit);
        }
        builder.build()
    }
}

/// Result of [`DatabaseCollection::list`], shaped by its options.
#[derive(Debug, Clone)]
pub enum Listing {
    Objects(DatabaseCollection),
    Records(Vec<Document>),
    Values(Vec<Bson>),
}

impl Listing {
    pub fn len(&self) -> usize {
        match self {
            Listing::Objects(collection) => collection.len(),
            Listing::Records(records) => records.len(),
            Listing::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An ordered snapshot of the document objects matching a query.
#[derive(Debug, Clone)]
pub struct DatabaseCollection {
    connection: Connection,
    model: ModelRef,
    items: Vec<DatabaseObject>,
}

impl DatabaseCollection {
    /// An empty view over `model`'s collection.
    pub fn empty(connection: &Connection, model: &ModelRef) -> Self {
        Self {
            connection: connection.clone(),
            model: model.clone(),
            items: Vec::new(),
        }
    }

    /// Lists matching records in the shape the options ask for.
    ///
    /// `field` wins over `projection`, which wins over `read_only`; without any of
    /// them the records are materialized as document objects.
    pub async fn list(
        connection: &Connection,
        model: &ModelRef,
        options: ListOptions,
    ) -> DocMapResult<Listing> {
        if let Some(field) = options.field.clone() {
            return Ok(Listing::Values(Self::load_field(connection, model, options, &field).await?));
        }
        if options.read_only || options.projection.is_some() {
            let projection = options.projection.clone();
            return Ok(Listing::Records(
                Self::load_records(connection, model, options, projection).await?,
            ));
        }

        Ok(Listing::Objects(Self::load(connection, model, options).await?))
    }

    /// Loads every matching record as a document object.
    ///
    /// The `read_only`, `projection` and `field` options are ignored here.
    pub async fn load(
        connection: &Connection,
        model: &ModelRef,
        options: ListOptions,
    ) -> DocMapResult<Self> {
        let records = fetch(connection, model, options.find_query(None)).await?;

        Ok(Self {
            connection: connection.clone(),
            model: model.clone(),
            items: records
                .into_iter()
                .map(|record| DatabaseObject::from_document(connection, model, record))
                .collect(),
        })
    }

    /// Loads matching records as plain documents, optionally projected.
    pub async fn load_records(
        connection: &Connection,
        model: &ModelRef,
        options: ListOptions,
        projection: Option<Projection>,
    ) -> DocMapResult<Vec<Document>> {
        fetch(connection, model, options.find_query(projection)).await
    }

    /// Loads one field of every matching record; records lacking it are skipped.
    ///
    /// The identity field is projected on its own; any other field is projected without
    /// the identity.
    pub async fn load_field(
        connection: &Connection,
        model: &ModelRef,
        options: ListOptions,
        field: &str,
    ) -> DocMapResult<Vec<Bson>> {
        let projection = if field == ID_KEY {
            Projection::Fields(vec![ID_KEY.to_string()])
        } else {
            Projection::Document(doc! { field: true, ID_KEY: false })
        };

        let records = fetch(connection, model, options.find_query(Some(projection))).await?;

        Ok(records
            .into_iter()
            .filter_map(|mut record| record.remove(field))
            .collect())
    }

    /// Counts matching records without loading them.
    pub async fn count(connection: &Connection, model: &ModelRef, query: Document) -> DocMapResult<u64> {
        let (backend, ns) = store_for(connection, model).await?;
        backend.count(&ns, query).await
    }

    /// The matching record with the greatest identity, if any.
    pub async fn get_last(
        connection: &Connection,
        model: &ModelRef,
        query: Document,
    ) -> DocMapResult<Option<DatabaseObject>> {
        let options = ListOptions::new().query(query).sort_by(ID_KEY, false).page(0, 1);
        let mut last = Self::load(connection, model, options).await?;

        Ok(last.items.pop())
    }

    /// A forward-only cursor over every matching record, in ascending identity order.
    ///
    /// Records are fetched `page_size` at a time; a page size of zero falls back to
    /// [`DEFAULT_ITERATOR_PAGE_SIZE`]. Every call starts a fresh scan.
    pub fn iterator(
        connection: &Connection,
        model: &ModelRef,
        query: Document,
        page_size: u64,
    ) -> CollectionCursor {
        CollectionCursor {
            connection: connection.clone(),
            model: model.clone(),
            query,
            page_size: if page_size == 0 { DEFAULT_ITERATOR_PAGE_SIZE } else { page_size },
            last_id: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Creates a record through [`DatabaseObject::create`] and appends it to this view.
    pub async fn insert(&mut self, data: Document, options: CreateOptions) -> DocMapResult<&DatabaseObject> {
        let object = DatabaseObject::create(&self.connection, &self.model, data, options).await?;
        self.items.push(object);

        Ok(&self.items[self.items.len() - 1])
    }

    /// Copies every contained record to `new_path`, then deletes the originals.
    ///
    /// Records are copied as stored, without schema validation or default filling.
    /// The returned view is bound to this view's schema at the new path.
    ///
    /// Maintenance use only. Nothing is rolled back: an interruption can leave records
    /// in both places or split between them. Returns the view over the new path.
    pub async fn move_to(self, new_path: &str) -> DocMapResult<Self> {
        let path = Path::parse(new_path)?;
        let target = self.model.at(path.clone()).into_ref();
        // Copies bypass the schema: records move exactly as stored.
        let raw = ObjectModel::with_path(path).into_ref();
        let mut moved = Self::empty(&self.connection, &target);

        for object in &self.items {
            let copied = DatabaseObject::create(
                &self.connection,
                &raw,
                object.document().clone(),
                CreateOptions::default(),
            )
            .await?;
            moved.items.push(DatabaseObject::from_document(
                &self.connection,
                &target,
                copied.into_document(),
            ));
        }

        let (backend, ns) = store_for(&self.connection, &self.model).await?;
        for object in &self.items {
            if let Some(id) = object.id() {
                backend.remove(&ns, doc! { ID_KEY: id.clone() }).await?;
            }
        }
        debug!(from = %ns, to = new_path, moved = moved.len(), "moved collection");

        Ok(moved)
    }

    /// Encodes every contained record as a JSON array.
    pub fn to_json(&self) -> DocMapResult<String> {
        let items = self
            .items
            .iter()
            .map(|object| codec::encode_document(object.document()))
            .collect();

        Ok(serde_json::to_string(&Value::Array(items))?)
    }

    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    pub fn into_vec(self) -> Vec<DatabaseObject> {
        self.items
    }
}

impl Deref for DatabaseCollection {
    type Target = [DatabaseObject];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl DerefMut for DatabaseCollection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.items
    }
}

impl IntoIterator for DatabaseCollection {
    type Item = DatabaseObject;
    type IntoIter = std::vec::IntoIter<DatabaseObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a DatabaseCollection {
    type Item = &'a DatabaseObject;
    type IntoIter = std::slice::Iter<'a, DatabaseObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Paging cursor returned by [`DatabaseCollection::iterator`].
///
/// Each page is fetched with a "greater than the last identity seen" filter, so memory
/// stays bounded by the page size. Records inserted or removed while the scan runs may
/// be missed or seen, depending on where they fall relative to the cursor.
#[derive(Debug)]
pub struct CollectionCursor {
    connection: Connection,
    model: ModelRef,
    query: Document,
    page_size: u64,
    last_id: Option<Bson>,
    buffer: VecDeque<Document>,
    exhausted: bool,
}

impl CollectionCursor {
    /// Returns the next object, fetching the next page when the current one runs out.
    pub async fn next(&mut self) -> DocMapResult<Option<DatabaseObject>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }

        Ok(self
            .buffer
            .pop_front()
            .map(|record| DatabaseObject::from_document(&self.connection, &self.model, record)))
    }

    /// Collects the remaining objects.
    pub async fn collect(mut self) -> DocMapResult<Vec<DatabaseObject>> {
        let mut objects = Vec::new();
        while let Some(object) = self.next().await? {
            objects.push(object);
        }
        Ok(objects)
    }

    /// Turns the cursor into a stream of objects.
    pub fn into_stream(self) -> impl Stream<Item = DocMapResult<DatabaseObject>> {
        stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.next().await?.map(|object| (object, cursor)))
        })
    }

    async fn fetch_page(&mut self) -> DocMapResult<()> {
        let query = FindQuery::builder()
            .filter(self.page_filter())
            .sort(ID_KEY, SortDirection::Asc)
            .limit(self.page_size)
            .build();
        let page = fetch(&self.connection, &self.model, query).await?;
        trace!(records = page.len(), after = ?self.last_id, "fetched cursor page");

        if (page.len() as u64) < self.page_size {
            self.exhausted = true;
        }
        match page.last().and_then(|record| record.get(ID_KEY)) {
            Some(id) => self.last_id = Some(id.clone()),
            None => self.exhausted = true,
        }
        self.buffer.extend(page);

        Ok(())
    }

    fn page_filter(&self) -> Document {
        let Some(last_id) = &self.last_id else {
            return self.query.clone();
        };

        let after = doc! { "$gt": last_id.clone() };
        if self.query.contains_key(ID_KEY) {
            let both = vec![
                Bson::Document(self.query.clone()),
                Bson::Document(doc! { ID_KEY: after }),
            ];
            doc! { "$and": both }
        } else {
            let mut filter = self.query.clone();
            filter.insert(ID_KEY, after);
            filter
        }
    }
}

async fn fetch(connection: &Connection, model: &ModelRef, query: FindQuery) -> DocMapResult<Vec<Document>> {
    let (backend, ns) = store_for(connection, model).await?;
    let records = backend.find(&ns, query).await?;
    debug!(namespace = %ns, records = records.len(), "listed records");

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listing_sorts_by_identity() {
        let query = ListOptions::new().find_query(None);
        assert_eq!(query.sort_document(), Some(doc! { "_id": 1 }));
        assert_eq!(query.limit, None);
    }

    #[test]
    fn pagination_becomes_skip_and_limit() {
        let query = ListOptions::new().unsorted().page(2, 10).find_query(None);
        assert_eq!(query.skip, Some(20));
        assert_eq!(query.limit, Some(10));
        assert!(query.sort_document().is_none());
    }
}
