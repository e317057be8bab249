//! MongoDB backend for crawldb.
//!
//! This crate implements the `StoreBackend` and `Connector` traits on top of
//! the official asynchronous MongoDB driver. Sessions map onto driver
//! sessions, so multi-document transactions need a replica set or sharded
//! deployment.
//!
//! Enable it through the `mongodb` feature of the `crawldb` crate:
//!
//! ```toml
//! [dependencies]
//! crawldb = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use crawldb_core::{config::EnvConfigSource, connection::ConnectionManager};
//! use crawldb_mongodb::MongoDbConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ConnectionManager::new(MongoDbConnector::new(), EnvConfigSource::default());
//!     let frontier = manager.collection("frontier").await?;
//!
//!     println!("{} queued urls", frontier.count(None).await?);
//!     Ok(())
//! }
//! ```

pub mod connector;
pub mod error;
pub mod store;

pub use connector::MongoDbConnector;
pub use error::MongoDbStoreError;
pub use store::{MongoDbCursor, MongoDbStore};
