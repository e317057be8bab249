//! Document store access for crawler control planes.
//!
//! `crawldb` gives every service of a crawler fleet the same way to reach its
//! document store: connection settings come from configuration, the shared
//! client is established lazily and exactly once, transient outages are ridden
//! out with exponential backoff, and every operation can run either on its own
//! or inside a session transaction.
//!
//! # Features
//!
//! - **Layered configuration** - Explicit options override configuration keys under `database.*`
//! - **Resilient connection** - One shared client per process, retried until the store answers
//! - **Collection operations** - Insert, update, replace, delete, find, count and index management
//! - **Deferred decoding** - Queries return a [`QueryResult`](result::QueryResult) decoded on demand as one record or all records
//! - **Transactions** - Units of work that commit together or leave no trace
//! - **Log shipping** - Forwarding of log lines into a collection until the producer goes quiet
//!
//! # Quick Start
//!
//! ```ignore
//! use crawldb::{prelude::*, memory::InMemoryConnector};
//! use bson::{doc, oid::ObjectId};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Page {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub url: String,
//!     pub depth: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let manager = ConnectionManager::new(InMemoryConnector::default(), EnvConfigSource::default());
//!     let pages = manager.collection("pages").await?;
//!
//!     let id = pages
//!         .insert(&Page { id: None, url: "https://example.com/".into(), depth: 0 })
//!         .await?;
//!
//!     pages.update_by_id(id, doc! { "$set": { "depth": 1 } }).await?;
//!
//!     let page: Page = pages.find_by_id(id).await.one().await?;
//!     println!("{page:?}");
//!
//!     let shallow: Vec<Page> = pages
//!         .find(
//!             Some(Filter::lte("depth", 1)),
//!             Some(FindOptions::builder().sort("url", SortDirection::Asc).limit(50).build()),
//!         )
//!         .await
//!         .all()
//!         .await?;
//!     println!("{} shallow pages", shallow.len());
//!
//!     manager.shutdown().await
//! }
//! ```
//!
//! # Transactions
//!
//! ```ignore
//! let database = manager.database("").await?;
//!
//! manager
//!     .run_transaction(|context| {
//!         let frontier = database.collection_with_context("frontier", context.clone());
//!         let pages = database.collection_with_context("pages", context);
//!         async move {
//!             frontier.delete_by_id(next).await?;
//!             pages.insert(&fetched).await?;
//!             Ok(())
//!         }
//!     })
//!     .await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process store for development and testing
//! - [`mongodb`] - MongoDB through the official driver (requires `mongodb` feature)

pub mod prelude;

pub use crawldb_core::{
    backend, backoff, collection, config, connection, context, database, error, index, query,
    result, shipper, sql, transaction,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use crawldb_memory::{InMemoryConnector, InMemoryStore, MemoryStoreError};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use crawldb_mongodb::{MongoDbConnector, MongoDbStore, MongoDbStoreError};
}
