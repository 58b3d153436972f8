//! JSON encoding of documents with extended value types.
//!
//! Object ids and timestamps have no JSON representation of their own, so they are
//! written as single-key tagged objects:
//!
//! - `ObjectId("5717fc0d78ba2f1d6c41919a")` ⇄ `{"$oid": "5717fc0d78ba2f1d6c41919a"}`
//! - a timestamp ⇄ `{"$iso": "2016-04-20T18:28:12.000Z"}`
//!
//! Decoding turns those shapes back into native values; every other JSON shape passes
//! through unchanged.

use bson::{Bson, DateTime, Document, oid::ObjectId};
use chrono::{DateTime as ChronoDateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::error::{DocMapError, DocMapResult};

/// Tag of an encoded object id.
pub const OBJECTID_IDENTIFIER: &str = "$oid";

/// Tag of an encoded ISO-8601 timestamp.
pub const ISO_8601_IDENTIFIER: &str = "$iso";

/// Encodes a BSON value as JSON, tagging object ids and timestamps.
///
/// Values with no natural JSON form (binary data, regexes, ...) fall back to their
/// display string.
pub fn encode(value: &Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => tagged(OBJECTID_IDENTIFIER, oid.to_hex()),
        Bson::DateTime(dt) => tagged(
            ISO_8601_IDENTIFIER,
            dt.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        Bson::Document(document) => Value::Object(encode_map(document)),
        Bson::Array(items) => Value::Array(items.iter().map(encode).collect()),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Bson::Null | Bson::Undefined => Value::Null,
        other => Value::String(other.to_string()),
    }
}

/// Encodes a whole document as a JSON object.
pub fn encode_document(document: &Document) -> Value {
    Value::Object(encode_map(document))
}

/// Decodes a JSON value, reconstituting tagged object ids and timestamps.
///
/// # Errors
///
/// Returns [`DocMapError::Serialization`] if a tagged value carries an invalid hex
/// string or timestamp.
pub fn decode(value: Value) -> DocMapResult<Bson> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => decode_number(&n)?,
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(
            items
                .into_iter()
                .map(decode)
                .collect::<DocMapResult<Vec<_>>>()?,
        ),
        Value::Object(map) => decode_object(map)?,
    })
}

/// Decodes a JSON value that must be an object.
///
/// # Errors
///
/// Returns [`DocMapError::Serialization`] if the value is not an object (or is a tagged
/// scalar), or if any tagged value is invalid.
pub fn decode_document(value: Value) -> DocMapResult<Document> {
    match decode(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(DocMapError::Serialization(format!(
            "expected a JSON object, found {other}"
        ))),
    }
}

/// Encodes a document to a JSON string.
pub fn to_json_string(document: &Document) -> DocMapResult<String> {
    Ok(serde_json::to_string(&encode_document(document))?)
}

/// Parses a JSON string into a document.
pub fn from_json_str(json: &str) -> DocMapResult<Document> {
    decode_document(serde_json::from_str(json)?)
}

fn tagged(tag: &str, value: String) -> Value {
    let mut map = Map::new();
    map.insert(tag.to_string(), Value::String(value));
    Value::Object(map)
}

fn encode_map(document: &Document) -> Map<String, Value> {
    document
        .iter()
        .map(|(key, value)| (key.clone(), encode(value)))
        .collect()
}

fn decode_number(n: &Number) -> DocMapResult<Bson> {
    if let Some(i) = n.as_i64() {
        return Ok(match i32::try_from(i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(i),
        });
    }

    n.as_f64()
        .map(Bson::Double)
        .ok_or_else(|| DocMapError::Serialization(format!("number {n} is out of range")))
}

fn decode_object(map: Map<String, Value>) -> DocMapResult<Bson> {
    if map.len() == 1 {
        if let Some(Value::String(hex)) = map.get(OBJECTID_IDENTIFIER) {
            return ObjectId::parse_str(hex)
                .map(Bson::ObjectId)
                .map_err(|e| DocMapError::Serialization(format!("invalid object id \"{hex}\": {e}")));
        }
        if let Some(Value::String(iso)) = map.get(ISO_8601_IDENTIFIER) {
            return Ok(Bson::DateTime(parse_iso_8601(iso)?));
        }
    }

    let mut document = Document::new();
    for (key, value) in map {
        document.insert(key, decode(value)?);
    }
    Ok(Bson::Document(document))
}

/// Parses an ISO-8601 timestamp; values without an offset are taken as UTC.
fn parse_iso_8601(iso: &str) -> DocMapResult<DateTime> {
    if let Ok(dt) = ChronoDateTime::parse_from_rfc3339(iso) {
        return Ok(DateTime::from_chrono(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(DateTime::from_chrono(naive.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::from_chrono(midnight.and_utc()));
        }
    }

    Err(DocMapError::Serialization(format!("invalid ISO-8601 timestamp \"{iso}\"")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    #[test]
    fn object_ids_round_trip() {
        let oid = ObjectId::parse_str("5717fc0d78ba2f1d6c41919a").unwrap();
        let encoded = encode(&Bson::ObjectId(oid));

        assert_eq!(encoded, json!({ "$oid": "5717fc0d78ba2f1d6c41919a" }));
        assert_eq!(decode(encoded).unwrap(), Bson::ObjectId(oid));
    }

    #[test]
    fn timestamps_round_trip() {
        let dt = DateTime::from_millis(1_461_176_892_123);
        let encoded = encode(&Bson::DateTime(dt));

        assert_eq!(encoded, json!({ "$iso": "2016-04-20T18:28:12.123Z" }));
        assert_eq!(decode(encoded).unwrap(), Bson::DateTime(dt));
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let decoded = decode(json!({ "$iso": "2016-04-20T18:28:12" })).unwrap();
        assert_eq!(decoded, Bson::DateTime(DateTime::from_millis(1_461_176_892_000)));
    }

    #[test]
    fn plain_shapes_pass_through() {
        let value = json!({
            "name": "x",
            "n": 3,
            "big": 5_000_000_000i64,
            "ratio": 0.5,
            "tags": ["a", null],
            "nested": { "$oid": "not used", "other": 1 },
        });
        let decoded = decode_document(value).unwrap();

        assert_eq!(
            decoded,
            doc! {
                "name": "x",
                "n": 3,
                "big": 5_000_000_000i64,
                "ratio": 0.5,
                "tags": ["a", Bson::Null],
                "nested": { "$oid": "not used", "other": 1 },
            }
        );
    }

    #[test]
    fn invalid_tags_are_errors() {
        assert!(matches!(
            decode(json!({ "$oid": "zz" })),
            Err(DocMapError::Serialization(_))
        ));
        assert!(matches!(
            decode(json!({ "$iso": "yesterday" })),
            Err(DocMapError::Serialization(_))
        ));
        assert!(decode_document(json!([1, 2])).is_err());
    }

    #[test]
    fn json_strings_round_trip_documents() {
        let oid = ObjectId::new();
        let document = doc! { "_id": oid, "when": DateTime::from_millis(0), "n": 1 };
        let json = to_json_string(&document).unwrap();
        assert_eq!(from_json_str(&json).unwrap(), document);
    }
}
