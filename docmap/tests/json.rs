mod common;

use chrono::{TimeZone, Utc};
use docmap::{
    bson::{Bson, DateTime, doc, oid::ObjectId},
    codec,
    prelude::*,
};
use serde_json::json;

use common::{connection, model};

fn profile_schema() -> Schema {
    Schema::new()
        .with_required("name")
        .with_default("bio", "")
        .with_default_fn("joined", || Bson::DateTime(DateTime::now()))
        .with_required_type("owner", FieldType::ObjectId)
}

#[tokio::test]
async fn create_from_json_decodes_tagged_values() {
    let (conn, _) = connection();
    let profiles = model("app.profiles", profile_schema());
    let owner = ObjectId::new();

    let payload = json!({
        "_id": "ignored",
        "name": "ann",
        "owner": { "$oid": owner.to_hex() },
        "joined": { "$iso": "2024-05-01T12:30:00.000Z" },
        "session": "dropped",
    })
    .to_string();

    let mut profile = DatabaseObject::create_from_json(&conn, &profiles, &payload, true)
        .await
        .unwrap();

    assert!(matches!(profile.id(), Some(Bson::ObjectId(_))));
    assert_eq!(profile.get("owner").unwrap(), Bson::ObjectId(owner));
    let joined = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
    assert_eq!(profile.get("joined").unwrap(), Bson::DateTime(DateTime::from_chrono(joined)));
    assert!(!profile.document().contains_key("session"));
    assert_eq!(profile.get("bio").unwrap(), Bson::String(String::new()));
}

#[tokio::test]
async fn create_from_json_keeps_unknown_fields_when_asked() {
    let (conn, _) = connection();
    let profiles = model("app.profiles", profile_schema());
    let payload = json!({ "name": "ann", "owner": { "$oid": ObjectId::new().to_hex() }, "session": "kept" });

    let mut profile = DatabaseObject::create_from_json(&conn, &profiles, &payload.to_string(), false)
        .await
        .unwrap();
    assert_eq!(profile.get("session").unwrap(), Bson::String("kept".into()));

    let bad = json!({ "name": "ann", "owner": { "$oid": "not-hex" } }).to_string();
    assert!(matches!(
        DatabaseObject::create_from_json(&conn, &profiles, &bad, false).await,
        Err(DocMapError::Serialization(_))
    ));
}

#[tokio::test]
async fn to_json_tags_ids_and_timestamps() {
    let (conn, _) = connection();
    let profiles = model("app.profiles", profile_schema());
    let owner = ObjectId::new();
    let joined = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();

    let profile = DatabaseObject::create(
        &conn,
        &profiles,
        doc! {
            "_id": "ann",
            "name": "ann",
            "owner": owner,
            "joined": DateTime::from_chrono(joined),
        },
        CreateOptions::default(),
    )
    .await
    .unwrap();

    let encoded: serde_json::Value = serde_json::from_str(&profile.to_json().unwrap()).unwrap();
    assert_eq!(
        encoded,
        json!({
            "_id": "ann",
            "name": "ann",
            "bio": "",
            "owner": { "$oid": owner.to_hex() },
            "joined": { "$iso": "2023-01-02T03:04:05.000Z" },
        })
    );
}

#[tokio::test]
async fn json_update_skips_identity_and_excluded_keys() {
    let (conn, _) = connection();
    let profiles = model("app.profiles", profile_schema());
    let mut profile = DatabaseObject::create(
        &conn,
        &profiles,
        doc! { "_id": "ann", "name": "ann", "owner": ObjectId::new() },
        CreateOptions::default(),
    )
    .await
    .unwrap();

    let payload = json!({ "_id": "bob", "name": "bob", "bio": "hi", "session": "s" }).to_string();
    profile.json_update(&payload, &["name"], true).await.unwrap();

    let mut stored = DatabaseObject::load(&conn, &profiles, "ann").await.unwrap();
    assert_eq!(stored.get("name").unwrap(), Bson::String("ann".into()));
    assert_eq!(stored.get("bio").unwrap(), Bson::String("hi".into()));
    assert!(!stored.document().contains_key("session"));
    assert!(!DatabaseObject::exists(&conn, &profiles, Some("bob".into())).await.unwrap());

    profile.json_update(&payload, &[], false).await.unwrap();
    let mut stored = DatabaseObject::load(&conn, &profiles, "ann").await.unwrap();
    assert_eq!(stored.get("name").unwrap(), Bson::String("bob".into()));
    assert_eq!(stored.get("session").unwrap(), Bson::String("s".into()));
}

#[tokio::test]
async fn json_update_fields_only_touches_listed_keys() {
    let (conn, _) = connection();
    let profiles = model("app.profiles", profile_schema());
    let mut profile = DatabaseObject::create(
        &conn,
        &profiles,
        doc! { "_id": "ann", "name": "ann", "owner": ObjectId::new() },
        CreateOptions::default(),
    )
    .await
    .unwrap();

    let payload = json!({ "_id": "bob", "name": "bob", "bio": "hi" }).to_string();
    profile
        .json_update_fields(&payload, &["bio", "_id"])
        .await
        .unwrap();

    let mut stored = DatabaseObject::load(&conn, &profiles, "ann").await.unwrap();
    assert_eq!(stored.get("name").unwrap(), Bson::String("ann".into()));
    assert_eq!(stored.get("bio").unwrap(), Bson::String("hi".into()));
}

#[test]
fn codec_preserves_nested_tagged_values() {
    let owner = ObjectId::new();
    let count: i64 = 3 << 40;
    let document = doc! {
        "owners": [owner, { "nested": owner }],
        "count": count,
        "ratio": 0.5,
        "none": Bson::Null,
    };

    let json = codec::to_json_string(&document).unwrap();
    assert_eq!(codec::from_json_str(&json).unwrap(), document);

    // Objects with more than one key are plain documents even if one key is a tag.
    let plain = codec::from_json_str(r#"{ "v": { "$oid": "x", "other": 1 } }"#).unwrap();
    assert_eq!(plain, doc! { "v": { "$oid": "x", "other": 1 } });

    assert!(matches!(codec::from_json_str("[1, 2]"), Err(DocMapError::Serialization(_))));
}
