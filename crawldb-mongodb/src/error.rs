//! Errors raised by the MongoDB backend itself, as opposed to the driver.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MongoDbStoreError {
    #[error("Cursor was opened inside a session and needs that session to advance")]
    SessionRequired,
}
