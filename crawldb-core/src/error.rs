//! Error types and result types for data-access operations.
//!
//! Use [`StoreResult<T>`] as the return type for fallible operations. Backend
//! failures are wrapped in [`StoreError::StoreOperation`] together with the
//! source location that converted them, so a failure can be traced back to the
//! driver call that produced it without losing the original error.

use std::panic::Location;

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Boxed error type carried by pass-through variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Represents all possible errors that can occur when talking to the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The resolved connection descriptor was rejected by the driver
    /// (missing or malformed target, unknown auth mechanism, ...).
    #[error("Incomplete configuration: {0}")]
    ConfigurationIncomplete(String),
    /// Connecting kept failing until the backoff policy gave up.
    ///
    /// Never returned under the default policy, which retries forever.
    #[error("Connection failed after {attempts} attempts: {source}")]
    ConnectionTransient {
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },
    /// The store returned an identifier of an unexpected shape.
    #[error("Invalid type: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    /// An error reported by the underlying driver or backend.
    #[error("Store operation failed at {location}: {source}")]
    StoreOperation {
        #[source]
        source: BoxError,
        location: &'static Location<'static>,
    },
    /// The unit of work or its commit failed; the transaction was aborted.
    #[error("Transaction aborted: {source}")]
    TransactionAborted {
        #[source]
        source: Box<StoreError>,
    },
    /// A single record was requested but none is available.
    #[error("No record available")]
    NoRecord,
    /// The operation does not apply to the shape of this result.
    #[error("Invalid result shape: {0}")]
    InvalidResultShape(&'static str),
    /// Serialization/deserialization error when converting between caller types and BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// No connection string format exists for the requested data source.
    #[error("{0} is not implemented")]
    UnsupportedDataSource(String),
}

/// A specialized `Result` type for data-access operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Wraps a driver or backend error, recording the caller's location.
    #[track_caller]
    pub fn operation<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        StoreError::StoreOperation {
            source: err.into(),
            location: Location::caller(),
        }
    }

    /// Returns `true` for errors produced by the backend itself.
    pub fn is_store_operation(&self) -> bool {
        matches!(self, StoreError::StoreOperation { .. })
    }

    /// Returns the wrapped backend error, if any.
    pub fn store_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            StoreError::StoreOperation { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_records_caller_location() {
        let err = StoreError::operation("boom");

        match &err {
            StoreError::StoreOperation { location, .. } => {
                assert_eq!(location.file(), file!());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_store_operation());
        assert_eq!(err.store_source().map(|e| e.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn transaction_aborted_keeps_source() {
        let err = StoreError::TransactionAborted {
            source: Box::new(StoreError::NoRecord),
        };

        assert_eq!(err.to_string(), "Transaction aborted: No record available");
        assert!(std::error::Error::source(&err).is_some());
    }
}
