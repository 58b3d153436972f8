//! Filter and update evaluation for in-memory documents.
//!
//! This module interprets the subset of MongoDB filter and update documents the mapper
//! emits: comparison operators, membership, existence, logical combinators and the
//! `$set`/`$unset`/`$inc` update operators. Dotted field paths reach into embedded
//! documents and arrays.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docmap_core::{
    ID_KEY,
    error::{DocMapError, DocMapResult},
    query::{Sort, SortDirection},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so that `1`, `1i64` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values with no meaningful ordering (binary, regex, ...); equal to nothing.
    Opaque,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Opaque,
        }
    }
}

impl Comparable<'_> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Opaque => 8,
        }
    }

    /// Total order used for sorting: by type rank first, then by value.
    fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Looks up a possibly dotted field path.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;

    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Evaluates a filter document against a record.
pub(crate) fn matches(document: &Document, filter: &Document) -> DocMapResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(document, key, condition)?,
            "$nor" => !any_clause(document, key, condition)?,
            op if op.starts_with('$') => return Err(unsupported(op)),
            field => matches_field(lookup(document, field), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Keeps the records matching `filter`, in their original order.
pub(crate) fn filter_documents<'a>(
    documents: impl IntoIterator<Item = &'a Document>,
    filter: &Document,
) -> DocMapResult<Vec<&'a Document>> {
    let mut matched = Vec::new();
    for document in documents {
        if matches(document, filter)? {
            matched.push(document);
        }
    }
    Ok(matched)
}

/// Sorts records by each sort key in turn; missing fields sort as null.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &[Sort]) {
    documents.sort_by(|a, b| {
        for key in sort {
            let left = lookup(a, &key.field).map(Comparable::from).unwrap_or(Comparable::Null);
            let right = lookup(b, &key.field).map(Comparable::from).unwrap_or(Comparable::Null);

            let ordering = match key.direction {
                SortDirection::Asc => left.sort_cmp(&right),
                SortDirection::Desc => right.sort_cmp(&left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Whether two values are equal under the evaluator's numeric normalization.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    Comparable::from(a) == Comparable::from(b)
}

/// Applies an operator update document to a record.
///
/// # Errors
///
/// Fails for replacement-style documents, unsupported operators, `$inc` of non-numeric
/// values, and changes to the identity field.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> DocMapResult<()> {
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(DocMapError::Backend(format!("{op} expects a document")));
        };

        for (path, value) in fields {
            if path == ID_KEY && !(op == "$set" && document.get(ID_KEY).is_some_and(|id| values_equal(id, value))) {
                return Err(DocMapError::Backend(format!(
                    "performing an update on the path '{ID_KEY}' would modify the immutable field '{ID_KEY}'"
                )));
            }

            match op.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$unset" => unset_path(document, path),
                "$inc" => {
                    let current = lookup(document, path).cloned();
                    set_path(document, path, increment(current, value, path)?)?;
                }
                other if other.starts_with('$') => return Err(unsupported(other)),
                _ => {
                    return Err(DocMapError::Backend(
                        "update document must contain only update operators".to_string(),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn matches_field(value: Option<&Bson>, condition: &Bson) -> DocMapResult<bool> {
    match condition {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
            for (op, operand) in ops {
                if !apply_operator(value, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals(value, condition)),
    }
}

fn apply_operator(value: Option<&Bson>, op: &str, operand: &Bson) -> DocMapResult<bool> {
    Ok(match op {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => compares(value, operand, |o| o == Ordering::Greater),
        "$gte" => compares(value, operand, |o| o != Ordering::Less),
        "$lt" => compares(value, operand, |o| o == Ordering::Less),
        "$lte" => compares(value, operand, |o| o != Ordering::Greater),
        "$in" => candidates(op, operand)?.iter().any(|candidate| equals(value, candidate)),
        "$nin" => !candidates(op, operand)?.iter().any(|candidate| equals(value, candidate)),
        "$exists" => value.is_some() == truthy(operand),
        "$not" => !matches_field(value, operand)?,
        other => return Err(unsupported(other)),
    })
}

/// Equality with array membership; a missing field equals null.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    let expected = Comparable::from(expected);
    match value {
        None => expected == Comparable::Null,
        Some(value) => {
            let actual = Comparable::from(value);
            if actual == expected {
                return true;
            }
            match actual {
                Comparable::Array(items) => items.iter().any(|item| item == &expected),
                _ => false,
            }
        }
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let operand = Comparable::from(operand);
    let test = |candidate: &Comparable<'_>| candidate.partial_cmp(&operand).is_some_and(&accept);

    match Comparable::from(value) {
        Comparable::Array(items) => items.iter().any(test),
        single => test(&single),
    }
}

fn candidates<'a>(op: &str, operand: &'a Bson) -> DocMapResult<&'a Vec<Bson>> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(DocMapError::Backend(format!("{op} needs an array"))),
    }
}

fn clauses<'a>(op: &str, condition: &'a Bson) -> DocMapResult<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(DocMapError::Backend(format!("{op} must be an array")));
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(clause) => Ok(clause),
            _ => Err(DocMapError::Backend(format!("{op} entries must be documents"))),
        })
        .collect()
}

fn any_clause(document: &Document, op: &str, condition: &Bson) -> DocMapResult<bool> {
    for clause in clauses(op, condition)? {
        if matches(document, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn increment(current: Option<Bson>, by: &Bson, path: &str) -> DocMapResult<Bson> {
    let not_numeric = || DocMapError::Backend(format!("cannot apply $inc to non-numeric field '{path}'"));

    Ok(match (current.unwrap_or(Bson::Int32(0)), by) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(a as i64 + *b as i64),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(a as i64 + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + *b as i64),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + *b as f64),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(a as f64 + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(a as f64 + b),
        _ => return Err(not_numeric()),
    })
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DocMapResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(DocMapError::Backend(format!(
                    "cannot create field '{rest}' in non-document element '{head}'"
                ))),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn unsupported(op: &str) -> DocMapError {
    DocMapError::Backend(format!("unsupported operator {op}"))
}
