//! A resilient document store access layer for crawler control planes.
//!
//! This crate is the core of the crawldb project and provides:
//!
//! - **Configuration** ([`config`]) - Layered connection settings resolved into a connection descriptor
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing document store drivers
//! - **Connection management** ([`connection`]) - A lazily established shared client with retry under [`backoff`]
//! - **Databases and collections** ([`database`], [`collection`]) - CRUD, counting and index management
//! - **Query results** ([`result`]) - Deferred decoding of one or all matching records
//! - **Transactions** ([`transaction`]) - Units of work that commit or abort atomically
//! - **Query options** ([`query`], [`index`]) - Find options, filter helpers and index models
//! - **Log shipping** ([`shipper`]) - Timestamped log records written from a channel
//! - **SQL connection strings** ([`sql`]) - Formats for relational export targets
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use crawldb_core::{config::EnvConfigSource, connection::ConnectionManager};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! pub struct Task {
//!     pub spider: String,
//!     pub status: String,
//! }
//!
//! # async fn example(connector: impl crawldb_core::backend::Connector) -> crawldb_core::error::StoreResult<()> {
//! let manager = ConnectionManager::new(connector, EnvConfigSource::default());
//! let tasks = manager.collection("tasks").await?;
//! let id = tasks.insert(&Task { spider: "news".into(), status: "pending".into() }).await?;
//! let task: Task = tasks.find_by_id(id).one().await?;
//! # Ok(()) }
//! ```

pub mod backend;
pub mod backoff;
pub mod collection;
pub mod config;
pub mod connection;
pub mod context;
pub mod database;
pub mod error;
pub mod index;
pub mod query;
pub mod result;
pub mod shipper;
pub mod sql;
pub mod transaction;
