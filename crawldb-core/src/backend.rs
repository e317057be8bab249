//! Storage backend abstraction.
//!
//! This module defines the traits every document store driver implements so the
//! rest of the crate can stay driver-agnostic:
//!
//! - [`StoreBackend`]: the shared client handle. Cheap to clone, safe for
//!   concurrent use, and able to run operations inside an optional session.
//! - [`Connector`]: builds a connected [`StoreBackend`] from a resolved
//!   [`ConnectionDescriptor`]. The connection manager calls it repeatedly
//!   under backoff until it succeeds.
//!
//! Filters, updates and replacements are plain BSON documents in the query
//! language of the store. An empty filter document matches every document.

use std::fmt::{self, Debug};

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::{
    config::ConnectionDescriptor,
    error::StoreResult,
    index::IndexModel,
    query::{DeleteOptions, FindOptions, UpdateOptions},
};

/// A fully qualified collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Result of an update or replace operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Number of documents matched by the filter.
    pub matched: u64,
    /// Number of documents actually changed.
    pub modified: u64,
    /// Identifier of the document created by an upsert, if any.
    pub upserted_id: Option<Bson>,
}

/// Abstract interface for document store drivers.
///
/// Implementations are handles onto a shared connection pool: cloning must be
/// cheap and every clone must talk to the same pool.
///
/// # Sessions
///
/// Document operations take an optional session. When a session with an
/// active transaction is given, the operation joins that transaction and its
/// effects stay invisible to other sessions until
/// [`commit_transaction`](StoreBackend::commit_transaction). Index and
/// collection administration always runs outside any session.
///
/// # Errors
///
/// Driver failures are reported as
/// [`StoreError::StoreOperation`](crate::error::StoreError::StoreOperation)
/// carrying the driver error unchanged.
#[async_trait]
pub trait StoreBackend: Clone + Send + Sync + Debug + 'static {
    /// Driver session used for transactions.
    type Session: Send + 'static;
    /// Server-side cursor over the results of [`find`](StoreBackend::find).
    type Cursor: Send + 'static;

    /// Inserts one document and returns the identifier the store assigned to it.
    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<Bson>;

    /// Inserts documents in order and returns their identifiers in the same order.
    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<Vec<Bson>>;

    /// Applies an update document to the first document matching `filter`.
    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<UpdateOutcome>;

    /// Applies an update document to every document matching `filter`.
    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<UpdateOutcome>;

    /// Replaces the first document matching `filter`, keeping its identifier.
    async fn replace_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        replacement: Document,
        options: UpdateOptions,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<UpdateOutcome>;

    /// Deletes the first document matching `filter` and returns the number removed.
    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: DeleteOptions,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<u64>;

    /// Deletes every document matching `filter` and returns the number removed.
    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: DeleteOptions,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<u64>;

    /// Opens a cursor over the documents matching `filter`.
    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: FindOptions,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<Self::Cursor>;

    /// Advances a cursor. Returns `None` once it is exhausted.
    ///
    /// The session must be the one the cursor was opened with.
    async fn next_document(
        &self,
        cursor: &mut Self::Cursor,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<Option<Document>>;

    /// Returns the first document matching `filter`.
    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<Option<Document>>;

    /// Counts the documents matching `filter`.
    async fn count_documents(
        &self,
        namespace: &Namespace,
        filter: Document,
        session: Option<&mut Self::Session>,
    ) -> StoreResult<u64>;

    /// Creates indexes and returns their names.
    async fn create_indexes(
        &self,
        namespace: &Namespace,
        indexes: Vec<IndexModel>,
    ) -> StoreResult<Vec<String>>;

    /// Drops one index by name.
    async fn drop_index(&self, namespace: &Namespace, name: &str) -> StoreResult<()>;

    /// Drops every index except the primary key index.
    async fn drop_indexes(&self, namespace: &Namespace) -> StoreResult<()>;

    /// Lists index specifications, including the primary key index `_id_`.
    async fn list_indexes(&self, namespace: &Namespace) -> StoreResult<Vec<Document>>;

    /// Creates an empty collection.
    async fn create_collection(&self, namespace: &Namespace) -> StoreResult<()>;

    /// Lists the collection names of a database.
    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>>;

    /// Drops a database and everything in it.
    async fn drop_database(&self, database: &str) -> StoreResult<()>;

    /// Starts a new session.
    async fn start_session(&self) -> StoreResult<Self::Session>;

    /// Starts a transaction on the session.
    async fn start_transaction(&self, session: &mut Self::Session) -> StoreResult<()>;

    /// Commits the session's transaction. On failure nothing becomes visible.
    async fn commit_transaction(&self, session: &mut Self::Session) -> StoreResult<()>;

    /// Aborts the session's transaction, discarding its effects.
    async fn abort_transaction(&self, session: &mut Self::Session) -> StoreResult<()>;

    /// Closes the connection pool.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Factory for connected backends.
///
/// Called once per connection attempt. Implementations should verify the
/// connection (for example with a ping) rather than return a lazily
/// connecting handle, so that the retry loop observes real failures.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    type Backend: StoreBackend;

    /// Builds driver options from `descriptor` and connects.
    ///
    /// Return [`StoreError::ConfigurationIncomplete`](crate::error::StoreError::ConfigurationIncomplete)
    /// when the descriptor itself is unusable; every other error is treated as
    /// transient and retried.
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> StoreResult<Self::Backend>;
}
