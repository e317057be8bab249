//! Index definitions.

use bson::{Bson, Document, doc};

use crate::query::SortDirection;

/// Name of the index every collection has on `_id`.
pub const PRIMARY_INDEX_NAME: &str = "_id_";

/// An index specification: ordered keys plus options.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    /// Ordered mapping of field to direction (`1`, `-1`) or index type.
    pub keys: Document,
    /// Explicit name. Generated from the keys when absent.
    pub name: Option<String>,
    pub unique: bool,
}

impl IndexModel {
    pub fn new(keys: Document) -> Self {
        Self {
            keys,
            name: None,
            unique: false,
        }
    }

    /// Single-field index.
    pub fn on(field: impl Into<String>, direction: SortDirection) -> Self {
        let mut keys = Document::new();
        keys.insert(field.into(), direction);
        Self::new(keys)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// The explicit name, or the store's default name derived from the keys
    /// (`{ key: 1, at: -1 }` becomes `key_1_at_-1`).
    pub fn resolved_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        self.keys
            .iter()
            .map(|(field, value)| format!("{field}_{}", key_suffix(value)))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// The index specification as the store lists it.
    pub fn to_document(&self) -> Document {
        let mut spec = doc! {
            "v": 2,
            "key": self.keys.clone(),
            "name": self.resolved_name(),
        };
        if self.unique {
            spec.insert("unique", true);
        }
        spec
    }
}

fn key_suffix(value: &Bson) -> String {
    match value {
        Bson::Int32(v) => v.to_string(),
        Bson::Int64(v) => v.to_string(),
        Bson::Double(v) => (*v as i64).to_string(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_name_follows_key_order() {
        let index = IndexModel::new(doc! { "key": 1, "at": -1 });
        assert_eq!(index.resolved_name(), "key_1_at_-1");

        let text = IndexModel::new(doc! { "body": "text" });
        assert_eq!(text.resolved_name(), "body_text");
    }

    #[test]
    fn explicit_name_wins() {
        let index = IndexModel::on("key", SortDirection::Asc)
            .with_name("by_key")
            .unique();

        assert_eq!(index.resolved_name(), "by_key");
        assert_eq!(
            index.to_document(),
            doc! { "v": 2, "key": { "key": 1 }, "name": "by_key", "unique": true }
        );
    }
}
