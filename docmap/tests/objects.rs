mod common;

use std::sync::atomic::Ordering;

use async_trait::async_trait;
use docmap::{
    backend::{Credentials, NewUser},
    bson::{Bson, Document, doc, oid::ObjectId},
    memory::InMemoryStore,
    path::Namespace,
    prelude::*,
    query::FindQuery,
};

use common::{connection, counting_default, model, user_schema};

#[tokio::test]
async fn missing_required_field_fails_create() {
    let (conn, _) = connection();
    let users = model("app.users", user_schema());

    let err = DatabaseObject::create(
        &conn,
        &users,
        doc! { "_id": "alice", "password": "pw" },
        CreateOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DocMapError::MalformedObject(_)), "{err}");
    assert!(!DatabaseObject::exists(&conn, &users, Some("alice".into())).await.unwrap());

    DatabaseObject::create(
        &conn,
        &users,
        doc! { "_id": "alice", "email": "a@example.com", "password": "pw" },
        CreateOptions::default(),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn saving_without_required_field_fails() {
    let (conn, _) = connection();
    let users = model("app.users", user_schema());

    let mut user = DatabaseObject::from_document(&conn, &users, doc! { "_id": "bob" });
    assert!(matches!(user.save().await, Err(DocMapError::MalformedObject(_))));

    user.set("email", "b@example.com").unwrap();
    user.set("password", "pw").unwrap();
    DatabaseObject::create(&conn, &users, user.document().clone(), CreateOptions::default())
        .await
        .unwrap();
    user.save().await.unwrap();
}

#[tokio::test]
async fn create_exists_load_round_trip() {
    let (conn, _) = connection();
    let users = model("app.users", user_schema());

    DatabaseObject::create(
        &conn,
        &users,
        doc! { "_id": "a", "email": "a@example.com", "password": "pw", "age": 41 },
        CreateOptions::default(),
    )
    .await
    .unwrap();

    assert!(DatabaseObject::exists(&conn, &users, Some("a".into())).await.unwrap());
    assert!(!DatabaseObject::exists(&conn, &users, None).await.unwrap());

    let mut loaded = DatabaseObject::load(&conn, &users, "a").await.unwrap();
    assert!(loaded.is_loaded());
    assert_eq!(loaded.get("email").unwrap(), Bson::String("a@example.com".into()));
    assert_eq!(loaded.get("age").unwrap(), Bson::Int32(41));
    // Defaults were filled in by create and persisted.
    assert_eq!(loaded.document().get("name"), Some(&Bson::String("anonymous".into())));
    assert_eq!(loaded.document().get("tags"), Some(&Bson::Array(vec![])));
    assert!(!loaded.document().contains_key("last_login"));
}

#[tokio::test]
async fn random_ids_are_assigned_by_the_store() {
    let (conn, _) = connection();
    let notes = model("app.notes", Schema::new());

    let note = DatabaseObject::create(
        &conn,
        &notes,
        doc! { "_id": "ignored", "text": "hi" },
        CreateOptions::random_id(),
    )
    .await
    .unwrap();

    let Some(Bson::ObjectId(id)) = note.id().cloned() else {
        panic!("expected an object id, got {:?}", note.id());
    };
    assert!(DatabaseObject::exists(&conn, &notes, Some(id.into())).await.unwrap());
    assert!(!DatabaseObject::exists(&conn, &notes, Some("ignored".into())).await.unwrap());
}

#[tokio::test]
async fn create_without_identity_is_malformed() {
    let (conn, _) = connection();
    let notes = model("app.notes", Schema::new());

    let err = DatabaseObject::create(&conn, &notes, doc! { "text": "hi" }, CreateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocMapError::MalformedObject(_)));
}

#[tokio::test]
async fn duplicate_identity_conflicts_unless_overwriting() {
    let (conn, _) = connection();
    let notes = model("app.notes", Schema::new());

    DatabaseObject::create(&conn, &notes, doc! { "_id": 1, "v": "first" }, CreateOptions::default())
        .await
        .unwrap();

    let err = DatabaseObject::create(&conn, &notes, doc! { "_id": 1, "v": "second" }, CreateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocMapError::DatabaseConflict(_)));

    DatabaseObject::create(&conn, &notes, doc! { "_id": 1, "v": "third" }, CreateOptions::overwrite())
        .await
        .unwrap();

    let mut loaded = DatabaseObject::load(&conn, &notes, 1).await.unwrap();
    assert_eq!(loaded.get("v").unwrap(), Bson::String("third".into()));
    assert_eq!(DatabaseCollection::count(&conn, &notes, doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn missing_record_loads_as_nonexistent() {
    let (conn, _) = connection();
    let notes = model("app.notes", Schema::new());

    let mut ghost = DatabaseObject::load(&conn, &notes, "nobody").await.unwrap();
    assert_eq!(ghost.state(), ObjectState::NonExistent);
    assert!(matches!(ghost.get("x"), Err(DocMapError::NonexistentObject(_))));
    assert!(matches!(ghost.set("x", 1), Err(DocMapError::NonexistentObject(_))));
    assert!(matches!(ghost.delete("x"), Err(DocMapError::NonexistentObject(_))));
    assert!(matches!(ghost.save().await, Err(DocMapError::NonexistentObject(_))));
}

#[tokio::test]
async fn ambiguous_query_is_a_conflict() {
    let (conn, _) = connection();
    let notes = model("app.notes", Schema::new());

    for id in ["a", "b"] {
        DatabaseObject::create(&conn, &notes, doc! { "_id": id, "kind": "memo" }, CreateOptions::default())
            .await
            .unwrap();
    }

    let err = DatabaseObject::load(&conn, &notes, doc! { "kind": "memo" }).await.unwrap_err();
    assert!(matches!(err, DocMapError::DatabaseConflict(_)));

    let single = DatabaseObject::load(&conn, &notes, doc! { "kind": "memo", "_id": "b" }).await.unwrap();
    assert_eq!(single.id(), Some(&Bson::String("b".into())));
}

#[tokio::test]
async fn function_defaults_resolve_once_and_never_alias() {
    let (conn, _) = connection();
    let (calls, spec) = counting_default();
    let stats = model("app.stats", Schema::new().with_field("meta", spec));

    let mut first = DatabaseObject::from_document(&conn, &stats, doc! { "_id": 1 });
    let mut second = DatabaseObject::from_document(&conn, &stats, doc! { "_id": 2 });

    let value = first.get("meta").unwrap();
    assert_eq!(first.get("meta").unwrap(), value);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    first.set("meta", doc! { "visits": 10 }).unwrap();
    assert_eq!(second.get("meta").unwrap(), Bson::Document(doc! { "visits": 0 }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn update_changes_only_the_given_fields() {
    let (conn, _) = connection();
    let points = model("app.points", Schema::new());

    let mut writer = DatabaseObject::create(
        &conn,
        &points,
        doc! { "_id": "p", "x": 0, "y": 5 },
        CreateOptions::default(),
    )
    .await
    .unwrap();

    // Another handle changes a sibling field in the meantime.
    let mut other = DatabaseObject::load(&conn, &points, "p").await.unwrap();
    other.update(doc! { "y": 6 }).await.unwrap();

    writer.update(doc! { "x": 1 }).await.unwrap();
    assert_eq!(writer.get("x").unwrap(), Bson::Int32(1));

    let mut fresh = DatabaseObject::load(&conn, &points, "p").await.unwrap();
    assert_eq!(fresh.get("x").unwrap(), Bson::Int32(1));
    assert_eq!(fresh.get("y").unwrap(), Bson::Int32(6));
}

#[tokio::test]
async fn update_never_touches_identity() {
    let (conn, _) = connection();
    let points = model("app.points", Schema::new());
    let mut point = DatabaseObject::create(&conn, &points, doc! { "_id": "p" }, CreateOptions::default())
        .await
        .unwrap();

    assert!(matches!(
        point.update(doc! { "_id": "q" }).await,
        Err(DocMapError::ProtectedKey(_))
    ));
}

#[tokio::test]
async fn raw_updates_reload_the_object() {
    let (conn, _) = connection();
    let counters = model("app.counters", Schema::new());
    let mut counter = DatabaseObject::create(&conn, &counters, doc! { "_id": "c", "n": 1 }, CreateOptions::default())
        .await
        .unwrap();

    counter
        .update_raw(doc! { "$inc": { "n": 2 }, "$set": { "label": "three" } })
        .await
        .unwrap();

    assert_eq!(counter.get("n").unwrap(), Bson::Int32(3));
    assert_eq!(counter.get("label").unwrap(), Bson::String("three".into()));
}

#[tokio::test]
async fn rename_moves_the_record() {
    let (conn, _) = connection();
    let notes = model("app.notes", Schema::new());
    let mut note = DatabaseObject::create(&conn, &notes, doc! { "_id": "old", "text": "t" }, CreateOptions::default())
        .await
        .unwrap();

    note.rename("new").await.unwrap();

    assert_eq!(note.id(), Some(&Bson::String("new".into())));
    assert!(!DatabaseObject::exists(&conn, &notes, Some("old".into())).await.unwrap());
    assert!(DatabaseObject::exists(&conn, &notes, Some("new".into())).await.unwrap());

    let mut moved = DatabaseObject::load(&conn, &notes, "new").await.unwrap();
    assert_eq!(moved.get("text").unwrap(), Bson::String("t".into()));
}

/// Delegates to an in-memory store but refuses every removal.
#[derive(Debug)]
struct NoRemovals(InMemoryStore);

#[async_trait]
impl StoreBackend for NoRemovals {
    async fn find_one(&self, ns: &Namespace, filter: Document) -> DocMapResult<Option<Document>> {
        self.0.find_one(ns, filter).await
    }

    async fn find(&self, ns: &Namespace, query: FindQuery) -> DocMapResult<Vec<Document>> {
        self.0.find(ns, query).await
    }

    async fn count(&self, ns: &Namespace, filter: Document) -> DocMapResult<u64> {
        self.0.count(ns, filter).await
    }

    async fn insert_one(&self, ns: &Namespace, document: Document) -> DocMapResult<Bson> {
        self.0.insert_one(ns, document).await
    }

    async fn replace_one(&self, ns: &Namespace, filter: Document, document: Document, upsert: bool) -> DocMapResult<()> {
        self.0.replace_one(ns, filter, document, upsert).await
    }

    async fn update_one(&self, ns: &Namespace, filter: Document, update: Document) -> DocMapResult<()> {
        self.0.update_one(ns, filter, update).await
    }

    async fn remove(&self, _ns: &Namespace, _filter: Document) -> DocMapResult<u64> {
        Err(DocMapError::Backend("removals refused".into()))
    }

    async fn list_databases(&self) -> DocMapResult<Vec<String>> {
        self.0.list_databases().await
    }

    async fn list_collections(&self, database: &str) -> DocMapResult<Vec<String>> {
        self.0.list_collections(database).await
    }

    async fn drop_database(&self, database: &str) -> DocMapResult<()> {
        self.0.drop_database(database).await
    }

    async fn authenticate(&self, credentials: Credentials) -> DocMapResult<()> {
        self.0.authenticate(credentials).await
    }

    async fn add_user(&self, user: NewUser) -> DocMapResult<()> {
        self.0.add_user(user).await
    }
}

#[tokio::test]
async fn failed_rename_keeps_the_old_identity() {
    let conn = Connection::new(NoRemovals(InMemoryStore::new()));
    let notes = model("app.notes", Schema::new());
    let mut note = DatabaseObject::create(&conn, &notes, doc! { "_id": "old", "text": "t" }, CreateOptions::default())
        .await
        .unwrap();

    assert!(matches!(note.rename("new").await, Err(DocMapError::Backend(_))));

    assert_eq!(note.id(), Some(&Bson::String("old".into())));
    // The new copy was written before the removal failed.
    assert!(DatabaseObject::exists(&conn, &notes, Some("new".into())).await.unwrap());
    note.update(doc! { "text": "u" }).await.unwrap();
    let mut stored = DatabaseObject::load(&conn, &notes, "old").await.unwrap();
    assert_eq!(stored.get("text").unwrap(), Bson::String("u".into()));
}

#[tokio::test]
async fn remove_deletes_and_clears() {
    let (conn, _) = connection();
    let notes = model("app.notes", Schema::new());
    let mut note = DatabaseObject::create(&conn, &notes, doc! { "_id": "n", "text": "t" }, CreateOptions::default())
        .await
        .unwrap();

    note.remove().await.unwrap();

    assert_eq!(note.state(), ObjectState::Removed);
    assert!(note.document().is_empty());
    assert!(matches!(note.get("text"), Err(DocMapError::NonexistentObject(_))));
    assert!(!DatabaseObject::exists(&conn, &notes, Some("n".into())).await.unwrap());
}

#[tokio::test]
async fn copy_goes_through_create() {
    let (conn, _) = connection();
    let users = model("app.users", user_schema());
    let original = DatabaseObject::create(
        &conn,
        &users,
        doc! { "_id": "a", "email": "a@example.com", "password": "pw" },
        CreateOptions::default(),
    )
    .await
    .unwrap();

    let mut named = original
        .copy(Some(Bson::String("b".into())), doc! { "name": "copy" })
        .await
        .unwrap();
    assert_eq!(named.get("name").unwrap(), Bson::String("copy".into()));
    assert_eq!(named.get("email").unwrap(), Bson::String("a@example.com".into()));

    let random = original.copy(None, doc! {}).await.unwrap();
    assert!(matches!(random.id(), Some(Bson::ObjectId(_))));

    assert!(matches!(
        original.copy(Some(Bson::String("b".into())), doc! {}).await,
        Err(DocMapError::DatabaseConflict(_))
    ));
    assert!(matches!(
        original.copy(None, doc! { "password": 12 }).await,
        Err(DocMapError::InvalidType(_))
    ));
    assert_eq!(DatabaseCollection::count(&conn, &users, doc! {}).await.unwrap(), 3);
}

#[tokio::test]
async fn required_type_is_enforced_regardless_of_policy() {
    let (conn, _) = connection();
    conn.set_type_checking(AlertLevel::None);
    let users = model("app.users", user_schema());

    let err = DatabaseObject::create(
        &conn,
        &users,
        doc! { "_id": "a", "email": "a@example.com", "password": 1234 },
        CreateOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DocMapError::InvalidType(_)));

    let mut user = DatabaseObject::from_document(&conn, &users, doc! { "_id": "a" });
    assert!(matches!(user.set("password", 1234), Err(DocMapError::InvalidType(_))));
    // Inferred types are not checked under the `none` policy.
    user.set("age", "old").unwrap();
}

#[tokio::test]
async fn inferred_types_follow_the_policy() {
    let (conn, _) = connection();
    let users = model("app.users", user_schema());
    let mut user = DatabaseObject::from_document(&conn, &users, doc! { "_id": "a" });

    conn.set_type_checking(AlertLevel::Error);
    assert!(matches!(user.set("age", "old"), Err(DocMapError::InvalidType(_))));
    assert!(matches!(
        user.update(doc! { "name": 7 }).await,
        Err(DocMapError::InvalidType(_))
    ));

    conn.set_type_checking(AlertLevel::Warning);
    user.set("age", "old").unwrap();
    // Reads of mismatched values only warn.
    conn.set_type_checking(AlertLevel::Error);
    assert_eq!(user.get("age").unwrap(), Bson::String("old".into()));
}

#[tokio::test]
async fn unknown_fields_follow_defaults_handling() {
    let (conn, _) = connection();
    let users = model("app.users", user_schema());
    let data = doc! { "_id": "a", "email": "a@example.com", "password": "pw", "nickname": "al" };

    conn.set_defaults_handling(AlertLevel::Error);
    let err = DatabaseObject::create(&conn, &users, data.clone(), CreateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocMapError::InvalidKey(_)));

    conn.set_defaults_handling(AlertLevel::Warning);
    let mut user = DatabaseObject::create(&conn, &users, data, CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(user.get("nickname").unwrap(), Bson::String("al".into()));
}

#[tokio::test]
async fn save_persists_fields_outside_the_schema() {
    let (conn, _) = connection();
    let users = model("app.users", user_schema());
    let mut user = DatabaseObject::create(
        &conn,
        &users,
        doc! { "_id": "a", "email": "a@example.com", "password": "pw" },
        CreateOptions::default(),
    )
    .await
    .unwrap();

    user.set("nickname", "al").unwrap();
    user.delete("tags").unwrap();
    user.save().await.unwrap();

    let mut loaded = DatabaseObject::load(&conn, &users, "a").await.unwrap();
    assert_eq!(loaded.get("nickname").unwrap(), Bson::String("al".into()));
    // The deleted default was filled back in before saving.
    assert_eq!(loaded.document().get("tags"), Some(&Bson::Array(vec![])));
}

#[tokio::test]
async fn update_only_fields_have_no_default() {
    let (conn, _) = connection();
    let users = model("app.users", user_schema());
    let mut user = DatabaseObject::from_document(&conn, &users, doc! { "_id": "a" });

    assert!(matches!(user.get("last_login"), Err(DocMapError::KeyNotFound(_))));
    assert!(matches!(user.get("email"), Err(DocMapError::MalformedObject(_))));
}

#[tokio::test]
async fn template_models_are_not_collections() {
    let (conn, _) = connection();
    let base = ObjectModel::template(Schema::new().with_default("kind", "base")).into_ref();

    assert!(matches!(
        DatabaseObject::exists(&conn, &base, Some("x".into())).await,
        Err(DocMapError::TemplateDatabase)
    ));
    assert!(matches!(
        DatabaseCollection::count(&conn, &base, doc! {}).await,
        Err(DocMapError::TemplateDatabase)
    ));

    let derived = base
        .extend("app.things", Schema::new().with_required("name"))
        .unwrap()
        .into_ref();
    let mut thing = DatabaseObject::create(
        &conn,
        &derived,
        doc! { "_id": ObjectId::new(), "name": "widget" },
        CreateOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(thing.get("kind").unwrap(), Bson::String("base".into()));
}
