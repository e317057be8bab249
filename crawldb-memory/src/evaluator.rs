//! Filter evaluation and ordering for in-memory documents.
//!
//! Supports the query operators crawl bookkeeping relies on: equality,
//! `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`,
//! `$size`, `$not`, and the logical `$and`, `$or` and `$nor`. Dotted paths
//! reach into embedded documents and arrays. Anything else is rejected rather
//! than silently ignored.

use std::cmp::Ordering;

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use crate::error::MemoryStoreError;

/// Type-erased, comparable view of a BSON value.
///
/// Numbers of every width compare as `f64`. Values of different kinds order
/// by kind first, following the store's cross-type sort order.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Comparable<'a> {
    MinKey,
    Null,
    Number(f64),
    String(&'a str),
    Map(&'a Document),
    Array(&'a [Bson]),
    Binary(&'a [u8]),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    Timestamp(u32, u32),
    /// Regular expressions, code and other kinds without a useful order.
    Opaque,
    MaxKey,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::MinKey => Comparable::MinKey,
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::String(value) | Bson::Symbol(value) => Comparable::String(value),
            Bson::Document(doc) => Comparable::Map(doc),
            Bson::Array(items) => Comparable::Array(items),
            Bson::Binary(binary) => Comparable::Binary(&binary.bytes),
            Bson::ObjectId(id) => Comparable::ObjectId(*id),
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::Timestamp(ts) => Comparable::Timestamp(ts.time, ts.increment),
            Bson::MaxKey => Comparable::MaxKey,
            _ => Comparable::Opaque,
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::MinKey => 0,
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::Binary(_) => 6,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Timestamp(..) => 10,
            Comparable::Opaque => 11,
            Comparable::MaxKey => 12,
        }
    }

    /// Whether both values are of the same kind, so range operators apply.
    pub(crate) fn same_kind(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }

    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Map(a), Comparable::Map(b)) => compare_documents(a, b),
            (Comparable::Array(a), Comparable::Array(b)) => compare_arrays(a, b),
            (Comparable::Binary(a), Comparable::Binary(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => {
                a.timestamp_millis().cmp(&b.timestamp_millis())
            }
            (Comparable::Timestamp(at, ai), Comparable::Timestamp(bt, bi)) => {
                (at, ai).cmp(&(bt, bi))
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.total_cmp(other))
    }
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        let ordering = Comparable::from(va)
            .total_cmp(&Comparable::from(vb))
            .then_with(|| ka.cmp(kb));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

fn compare_arrays(a: &[Bson], b: &[Bson]) -> Ordering {
    for (va, vb) in a.iter().zip(b.iter()) {
        let ordering = Comparable::from(va).total_cmp(&Comparable::from(vb));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

/// Resolves a dotted path to every value it reaches.
///
/// Arrays along the path fan out: `tags.name` reaches the `name` of every
/// embedded document in `tags`. Numeric segments index into arrays. An empty
/// result means the field is missing.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut found = Vec::new();

    if let Some(value) = document.get(segments[0]) {
        collect(value, &segments[1..], &mut found);
    }
    found
}

fn collect<'a>(value: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((segment, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(*segment) {
                collect(next, rest, found);
            }
        }
        Bson::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    collect(next, rest, found);
                }
            }
            for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                collect(item, segments, found);
            }
        }
        _ => {}
    }
}

/// Evaluates a filter document against a document.
///
/// An empty filter matches every document.
pub(crate) fn matches(document: &Document, filter: &Document) -> Result<bool, MemoryStoreError> {
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
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(MemoryStoreError::UnsupportedOperator(op.to_string()));
            }
            path => matches_field(&lookup(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn clauses<'a>(op: &str, condition: &'a Bson) -> Result<Vec<&'a Document>, MemoryStoreError> {
    let invalid = || {
        MemoryStoreError::InvalidFilter(format!("{op} needs a non-empty array of documents"))
    };

    let items = condition.as_array().ok_or_else(invalid)?;
    if items.is_empty() {
        return Err(invalid());
    }
    items
        .iter()
        .map(|item| item.as_document().ok_or_else(invalid))
        .collect()
}

/// Whether a condition is an operator document such as `{ "$gt": 3 }`.
pub(crate) fn is_operator_document(condition: &Document) -> bool {
    condition
        .keys()
        .next()
        .is_some_and(|key| key.starts_with('$'))
}

fn matches_field(values: &[&Bson], condition: &Bson) -> Result<bool, MemoryStoreError> {
    match condition {
        Bson::Document(ops) if is_operator_document(ops) => {
            for (op, operand) in ops {
                if !apply_operator(values, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals_any(values, condition)),
    }
}

fn apply_operator(values: &[&Bson], op: &str, operand: &Bson) -> Result<bool, MemoryStoreError> {
    match op {
        "$eq" => Ok(equals_any(values, operand)),
        "$ne" => Ok(!equals_any(values, operand)),
        "$gt" => Ok(compare_any(values, operand, |o| o == Ordering::Greater)),
        "$gte" => Ok(compare_any(values, operand, |o| o != Ordering::Less)),
        "$lt" => Ok(compare_any(values, operand, |o| o == Ordering::Less)),
        "$lte" => Ok(compare_any(values, operand, |o| o != Ordering::Greater)),
        "$in" => in_array(values, op, operand),
        "$nin" => in_array(values, op, operand).map(|found| !found),
        "$exists" => Ok(!values.is_empty() == truthy(operand)),
        "$size" => {
            let size = match operand {
                Bson::Int32(n) => *n as i64,
                Bson::Int64(n) => *n,
                Bson::Double(n) if n.fract() == 0.0 => *n as i64,
                _ => return Err(MemoryStoreError::InvalidFilter("$size needs an integer".into())),
            };
            Ok(values
                .iter()
                .any(|value| matches!(value, Bson::Array(items) if items.len() as i64 == size)))
        }
        "$not" => match operand {
            Bson::Document(ops) if is_operator_document(ops) => {
                Ok(!matches_field(values, operand)?)
            }
            _ => Err(MemoryStoreError::InvalidFilter(
                "$not needs an operator document".into(),
            )),
        },
        other => Err(MemoryStoreError::UnsupportedOperator(other.to_string())),
    }
}

fn in_array(values: &[&Bson], op: &str, operand: &Bson) -> Result<bool, MemoryStoreError> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| MemoryStoreError::InvalidFilter(format!("{op} needs an array")))?;

    Ok(candidates.iter().any(|candidate| equals_any(values, candidate)))
}

/// Equality as the store defines it: a field matches when its value equals
/// the target, or when it is an array holding the target. `null` also
/// matches a missing field.
fn equals_any(values: &[&Bson], target: &Bson) -> bool {
    if values.is_empty() {
        return matches!(target, Bson::Null);
    }

    let target = Comparable::from(target);
    values.iter().any(|value| {
        Comparable::from(*value) == target
            || matches!(
                value,
                Bson::Array(items) if items.iter().any(|item| Comparable::from(item) == target)
            )
    })
}

fn compare_any(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let operand = Comparable::from(operand);
    let check = |value: &Bson| {
        let value = Comparable::from(value);
        value.same_kind(&operand) && accept(value.total_cmp(&operand))
    };

    values.iter().any(|value| match value {
        Bson::Array(items) => items.iter().any(check),
        other => check(*other),
    })
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// One key of a sort specification.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SortKey {
    path: String,
    descending: bool,
}

/// Parses an ordered sort document such as `{ "key": 1, "at": -1 }`.
pub(crate) fn parse_sort(sort: &Document) -> Result<Vec<SortKey>, MemoryStoreError> {
    sort.iter()
        .map(|(path, direction)| {
            let descending = match direction {
                Bson::Int32(1) | Bson::Int64(1) => false,
                Bson::Int32(-1) | Bson::Int64(-1) => true,
                Bson::Double(d) if *d == 1.0 => false,
                Bson::Double(d) if *d == -1.0 => true,
                other => {
                    return Err(MemoryStoreError::InvalidSort(format!(
                        "direction for {path} must be 1 or -1, got {other}"
                    )));
                }
            };
            Ok(SortKey {
                path: path.clone(),
                descending,
            })
        })
        .collect()
}

/// Orders two documents by the sort keys, in key order.
pub(crate) fn compare_by(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = sort_value(a, key);
        let right = sort_value(b, key);
        let ordering = if key.descending {
            right.total_cmp(&left)
        } else {
            left.total_cmp(&right)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// The value a document sorts by: the smallest element of an array when
/// ascending, the largest when descending, `null` when missing.
fn sort_value<'a>(document: &'a Document, key: &SortKey) -> Comparable<'a> {
    let mut candidates = Vec::new();
    for value in lookup(document, &key.path) {
        match value {
            Bson::Array(items) if !items.is_empty() => {
                candidates.extend(items.iter().map(Comparable::from));
            }
            other => candidates.push(Comparable::from(other)),
        }
    }

    let picked = if key.descending {
        candidates.into_iter().max_by(|a, b| a.total_cmp(b))
    } else {
        candidates.into_iter().min_by(|a, b| a.total_cmp(b))
    };
    picked.unwrap_or(Comparable::Null)
}
