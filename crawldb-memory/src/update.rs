//! Update operators, replacements and upsert seeding.

use bson::{Bson, Document};

use crate::{
    error::MemoryStoreError,
    evaluator::is_operator_document,
};

/// Applies an update document such as `{ "$set": { "status": "done" } }`.
///
/// Supported operators: `$set`, `$unset`, `$inc`, `$rename`, `$push` and,
/// when `inserting` is true, `$setOnInsert`.
pub(crate) fn apply_update(
    document: &mut Document,
    update: &Document,
    inserting: bool,
) -> Result<(), MemoryStoreError> {
    validate_update(update)?;

    for (op, fields) in update {
        let fields = match fields {
            Bson::Document(fields) if op.starts_with('$') => fields,
            _ if !op.starts_with('$') => {
                return Err(MemoryStoreError::InvalidUpdate(format!(
                    "{op} is not an update operator; use replace for whole documents"
                )));
            }
            _ => {
                return Err(MemoryStoreError::InvalidUpdate(format!(
                    "{op} needs a document of fields"
                )));
            }
        };

        for (path, value) in fields {
            if path == "_id" || path.starts_with("_id.") {
                return Err(MemoryStoreError::ImmutableId);
            }

            match op.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$setOnInsert" => {
                    if inserting {
                        set_path(document, path, value.clone())?;
                    }
                }
                "$unset" => {
                    remove_path(document, path);
                }
                "$inc" => increment(document, path, value)?,
                "$rename" => {
                    let target = value.as_str().ok_or_else(|| {
                        MemoryStoreError::InvalidUpdate(format!(
                            "$rename target for {path} must be a string"
                        ))
                    })?;
                    if target == "_id" {
                        return Err(MemoryStoreError::ImmutableId);
                    }
                    if let Some(moved) = remove_path(document, path) {
                        set_path(document, target, moved)?;
                    }
                }
                "$push" => push(document, path, value.clone())?,
                other => return Err(MemoryStoreError::UnsupportedOperator(other.to_string())),
            }
        }
    }

    Ok(())
}

/// Replaces `document` with `replacement`, keeping the original `_id` first.
pub(crate) fn apply_replacement(
    document: &mut Document,
    replacement: &Document,
) -> Result<(), MemoryStoreError> {
    validate_replacement(replacement)?;

    let id = document.get("_id").cloned();
    if let (Some(id), Some(new_id)) = (&id, replacement.get("_id")) {
        if id != new_id {
            return Err(MemoryStoreError::ImmutableId);
        }
    }

    let mut replaced = Document::new();
    if let Some(id) = id {
        replaced.insert("_id", id);
    }
    for (key, value) in replacement {
        if key != "_id" {
            replaced.insert(key.clone(), value.clone());
        }
    }
    *document = replaced;

    Ok(())
}

/// Rejects empty updates and updates without operators before any document
/// is touched.
pub(crate) fn validate_update(update: &Document) -> Result<(), MemoryStoreError> {
    if update.is_empty() {
        return Err(MemoryStoreError::InvalidUpdate("update document is empty".into()));
    }
    if !is_operator_document(update) {
        return Err(MemoryStoreError::InvalidUpdate(
            "update documents need operators; use replace for whole documents".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_replacement(replacement: &Document) -> Result<(), MemoryStoreError> {
    match replacement.keys().find(|key| key.starts_with('$')) {
        Some(op) => Err(MemoryStoreError::InvalidUpdate(format!(
            "replacement documents cannot contain operator {op}"
        ))),
        None => Ok(()),
    }
}

/// Builds the starting document of an upsert from the equality conditions of
/// the filter, e.g. `{ "url": "x", "depth": { "$gt": 1 } }` seeds `{ "url": "x" }`.
pub(crate) fn seed_from_filter(filter: &Document) -> Result<Document, MemoryStoreError> {
    let mut seed = Document::new();
    collect_equalities(filter, &mut seed)?;
    Ok(seed)
}

fn collect_equalities(filter: &Document, seed: &mut Document) -> Result<(), MemoryStoreError> {
    for (key, condition) in filter {
        if key == "$and" {
            for clause in condition.as_array().into_iter().flatten() {
                if let Bson::Document(clause) = clause {
                    collect_equalities(clause, seed)?;
                }
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }

        match condition {
            Bson::Document(ops) if is_operator_document(ops) => {
                if let Some(value) = ops.get("$eq") {
                    set_path(seed, key, value.clone())?;
                }
            }
            value => set_path(seed, key, value.clone())?,
        }
    }
    Ok(())
}

/// Sets a dotted path, creating embedded documents along the way.
pub(crate) fn set_path(
    document: &mut Document,
    path: &str,
    value: Bson,
) -> Result<(), MemoryStoreError> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            match child {
                Bson::Document(child) => set_path(child, rest, value),
                _ => Err(MemoryStoreError::InvalidUpdate(format!(
                    "cannot create field {rest} inside non-document field {head}"
                ))),
            }
        }
    }
}

/// Removes a dotted path and returns the value it held.
pub(crate) fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(child) => remove_path(child, rest),
            _ => None,
        },
    }
}

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(child) => get_path(child, rest),
            _ => None,
        },
    }
}

fn increment(document: &mut Document, path: &str, by: &Bson) -> Result<(), MemoryStoreError> {
    let overflow = || MemoryStoreError::InvalidUpdate(format!("$inc on {path} overflows"));

    let sum = match (get_path(document, path), by) {
        (None, by) if as_f64(by).is_some() => by.clone(),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Some(Bson::Int32(a)), Bson::Int64(b)) => {
            Bson::Int64(i64::from(*a).checked_add(*b).ok_or_else(overflow)?)
        }
        (Some(Bson::Int64(a)), Bson::Int32(b)) => {
            Bson::Int64(a.checked_add(i64::from(*b)).ok_or_else(overflow)?)
        }
        (Some(Bson::Int64(a)), Bson::Int64(b)) => {
            Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?)
        }
        (Some(current), by) => match (as_f64(current), as_f64(by)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => {
                return Err(MemoryStoreError::InvalidUpdate(format!(
                    "$inc on {path} needs numeric values"
                )));
            }
        },
        (None, _) => {
            return Err(MemoryStoreError::InvalidUpdate(format!(
                "$inc on {path} needs a numeric amount"
            )));
        }
    };

    set_path(document, path, sum)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn push(document: &mut Document, path: &str, value: Bson) -> Result<(), MemoryStoreError> {
    match get_path(document, path) {
        None => set_path(document, path, Bson::Array(vec![value])),
        Some(Bson::Array(items)) => {
            let mut items = items.clone();
            items.push(value);
            set_path(document, path, Bson::Array(items))
        }
        Some(_) => Err(MemoryStoreError::InvalidUpdate(format!(
            "$push on {path} needs an array field"
        ))),
    }
}
