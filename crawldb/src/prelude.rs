//! Convenient re-exports of commonly used types from crawldb.
//!
//! ```ignore
//! use crawldb::prelude::*;
//! ```

pub use crawldb_core::{
    backend::{Connector, StoreBackend},
    backoff::BackoffPolicy,
    collection::Collection,
    config::{ConfigSource, ConnectOptions, EnvConfigSource, LayeredConfigSource, ValueConfigSource},
    connection::ConnectionManager,
    context::ExecutionContext,
    database::Database,
    error::{StoreError, StoreResult},
    index::IndexModel,
    query::{DeleteOptions, Filter, FindOptions, SortDirection, UpdateOptions},
    result::QueryResult,
    shipper::LogShipper,
    transaction::TransactionRunner,
};
