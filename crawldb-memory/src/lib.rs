//! In-memory document storage backend for crawldb.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreBackend` trait. It uses async-aware read-write locks for concurrent
//! access and is meant for development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Query language subset** - Comparison, membership, existence and logical operators with dotted paths
//! - **Update operators** - `$set`, `$unset`, `$inc`, `$rename`, `$push`, `$setOnInsert`, upserts and replacements
//! - **Indexes** - Named indexes with uniqueness enforcement and the implicit `_id_` index
//! - **Snapshot transactions** - Sessions whose writes stay private until commit
//!
//! # Quick Start
//!
//! ```ignore
//! use crawldb_core::{config::ValueConfigSource, connection::ConnectionManager};
//! use crawldb_memory::InMemoryConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ConnectionManager::new(InMemoryConnector::default(), ValueConfigSource::new());
//!     let pages = manager.collection("pages").await?;
//!
//!     pages.insert(&bson::doc! { "url": "https://example.com" }).await?;
//!     assert_eq!(pages.count(None).await?, 1);
//!
//!     Ok(())
//! }
//! ```

pub mod connector;
pub mod error;
mod evaluator;
pub mod store;
mod update;

pub use connector::InMemoryConnector;
pub use error::MemoryStoreError;
pub use store::{InMemoryStore, MemoryCursor, MemorySession};
