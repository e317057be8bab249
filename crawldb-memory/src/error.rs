//! Errors raised by the in-memory backend.
//!
//! They reach callers wrapped in
//! [`StoreError::StoreOperation`](crawldb_core::error::StoreError::StoreOperation);
//! use [`StoreError::store_source`](crawldb_core::error::StoreError::store_source)
//! and downcast to inspect them.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryStoreError {
    #[error("Duplicate key in {namespace}: index {index} already holds {key}")]
    DuplicateKey {
        namespace: String,
        index: String,
        key: String,
    },
    #[error("Namespace {0} does not exist")]
    NamespaceNotFound(String),
    #[error("Collection {0} already exists")]
    NamespaceExists(String),
    #[error("Index {name} not found in {namespace}")]
    IndexNotFound { name: String, namespace: String },
    #[error("Index {name} already exists in {namespace} with different keys")]
    IndexConflict { name: String, namespace: String },
    #[error("Cannot drop the primary key index of {0}")]
    PrimaryIndex(String),
    #[error("Hint {0} does not name an existing index")]
    BadHint(String),
    #[error("Unsupported operator {0}")]
    UnsupportedOperator(String),
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
    #[error("Invalid sort specification: {0}")]
    InvalidSort(String),
    #[error("Field _id is immutable")]
    ImmutableId,
    #[error("Write conflict: the store changed since the transaction started")]
    WriteConflict,
    #[error("Transaction already in progress")]
    TransactionInProgress,
    #[error("No transaction started")]
    NoTransaction,
    #[error("Store is not accepting connections")]
    Unavailable,
}
