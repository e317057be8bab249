//! Query options and filter construction.
//!
//! Filters are BSON documents in the store's query language. [`Filter`] offers
//! shorthands for the common operators so call sites don't have to spell out
//! `$gt` and friends:
//!
//! ```ignore
//! use crawldb_core::query::{Filter, FindOptions, SortDirection};
//!
//! let filter = Filter::and([
//!     Filter::eq("status", "active"),
//!     Filter::gte("depth", 2),
//! ]);
//! let options = FindOptions::builder()
//!     .skip(5)
//!     .limit(5)
//!     .sort("key", SortDirection::Asc)
//!     .build();
//! ```
//!
//! Raw documents built with [`bson::doc!`] are accepted everywhere a filter is.

use bson::{Bson, Document, doc};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The numeric form used in sort and index key documents.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

impl From<SortDirection> for Bson {
    fn from(direction: SortDirection) -> Self {
        Bson::Int32(direction.as_i32())
    }
}

/// Options for [`Collection::find`](crate::collection::Collection::find).
///
/// A `limit` of zero means unlimited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Number of matching documents to skip.
    pub skip: u64,
    /// Maximum number of documents to return.
    pub limit: i64,
    /// Ordered sort keys, each mapped to `1` or `-1`.
    pub sort: Option<Document>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = skip;
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: i64) -> Self {
        self.options.limit = limit;
        self
    }

    /// Appends a sort key. Keys apply in the order they are added.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.options
            .sort
            .get_or_insert_with(Document::new)
            .insert(field.into(), direction);
        self
    }

    /// Replaces the sort specification with a raw sort document.
    pub fn sort_document(mut self, sort: Document) -> Self {
        self.options.sort = Some(sort);
        self
    }

    pub fn build(self) -> FindOptions {
        self.options
    }
}

/// Options for update and replace operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a new document when nothing matches the filter.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Options for delete operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Name of the index the store should use to find matching documents.
    pub hint: Option<String>,
}

impl DeleteOptions {
    pub fn with_hint(hint: impl Into<String>) -> Self {
        Self { hint: Some(hint.into()) }
    }
}

/// Helper for constructing filter documents.
///
/// All methods accept field names and values as `Into<String>` and
/// `Into<Bson>`. Dotted field names address nested documents.
pub struct Filter;

impl Filter {
    /// Matches every document.
    pub fn all() -> Document {
        Document::new()
    }

    /// Matches the document with the given identifier.
    pub fn by_id(id: impl Into<Bson>) -> Document {
        doc! { "_id": id.into() }
    }

    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        let mut filter = Document::new();
        filter.insert(field.into(), value.into());
        filter
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::operator(field, "$ne", value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::operator(field, "$gt", value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::operator(field, "$gte", value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::operator(field, "$lt", value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::operator(field, "$lte", value.into())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of<I, V>(field: impl Into<String>, values: I) -> Document
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Self::operator(field, "$in", Self::array(values))
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of<I, V>(field: impl Into<String>, values: I) -> Document
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Self::operator(field, "$nin", Self::array(values))
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Document {
        Self::operator(field, "$exists", Bson::Boolean(true))
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(field: impl Into<String>) -> Document {
        Self::operator(field, "$exists", Bson::Boolean(false))
    }

    /// All filters must match.
    pub fn and(filters: impl IntoIterator<Item = Document>) -> Document {
        doc! { "$and": Self::array(filters) }
    }

    /// At least one filter must match.
    pub fn or(filters: impl IntoIterator<Item = Document>) -> Document {
        doc! { "$or": Self::array(filters) }
    }

    fn operator(field: impl Into<String>, op: &str, value: Bson) -> Document {
        let mut condition = Document::new();
        condition.insert(op, value);
        let mut filter = Document::new();
        filter.insert(field.into(), condition);
        filter
    }

    fn array<I, V>(values: I) -> Bson
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Bson::Array(values.into_iter().map(Into::into).collect())
    }
}
