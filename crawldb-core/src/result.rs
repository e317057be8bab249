//! Query results.
//!
//! A [`QueryResult`] is exactly one of: an open cursor (from
//! [`Collection::find`](crate::collection::Collection::find)), a single
//! document (from [`find_by_id`](crate::collection::Collection::find_by_id)),
//! or the error the query failed with. Decoding is deferred until the caller
//! asks for [`one`](QueryResult::one) or [`all`](QueryResult::all).

use std::fmt;

use bson::Document;
use serde::de::DeserializeOwned;

use crate::{
    backend::StoreBackend,
    context::ExecutionContext,
    error::{StoreError, StoreResult},
};

/// The outcome of a find operation.
pub enum QueryResult<B: StoreBackend> {
    /// An open cursor positioned before its next document.
    Cursor {
        backend: B,
        cursor: B::Cursor,
        context: ExecutionContext<B>,
    },
    /// A single fetched document.
    Single(Document),
    /// The query failed.
    Error(StoreError),
}

impl<B: StoreBackend> QueryResult<B> {
    pub(crate) fn from_cursor(
        backend: B,
        context: ExecutionContext<B>,
        cursor: StoreResult<B::Cursor>,
    ) -> Self {
        match cursor {
            Ok(cursor) => QueryResult::Cursor {
                backend,
                cursor,
                context,
            },
            Err(err) => QueryResult::Error(err),
        }
    }

    pub(crate) fn from_single(document: StoreResult<Option<Document>>) -> Self {
        match document {
            Ok(Some(document)) => QueryResult::Single(document),
            Ok(None) => QueryResult::Error(StoreError::NoRecord),
            Err(err) => QueryResult::Error(err),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error(_))
    }

    /// The error the query failed with, if it did.
    pub fn error(&self) -> Option<&StoreError> {
        match self {
            QueryResult::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Decodes one document into `T`.
    ///
    /// For a cursor this is the next document at the cursor's position; an
    /// exhausted cursor yields [`StoreError::NoRecord`].
    pub async fn one<T: DeserializeOwned>(self) -> StoreResult<T> {
        match self {
            QueryResult::Cursor {
                backend,
                mut cursor,
                context,
            } => {
                let mut session = context.lock().await;
                match backend
                    .next_document(&mut cursor, session.as_deref_mut())
                    .await?
                {
                    Some(document) => decode(document),
                    None => Err(StoreError::NoRecord),
                }
            }
            QueryResult::Single(document) => decode(document),
            QueryResult::Error(err) => Err(err),
        }
    }

    /// Drains the cursor and decodes every remaining document into `T`.
    ///
    /// Only valid for cursor results; a single-document result yields
    /// [`StoreError::InvalidResultShape`].
    pub async fn all<T: DeserializeOwned>(self) -> StoreResult<Vec<T>> {
        match self {
            QueryResult::Cursor {
                backend,
                mut cursor,
                context,
            } => {
                let mut session = context.lock().await;
                let mut records = Vec::new();
                while let Some(document) = backend
                    .next_document(&mut cursor, session.as_deref_mut())
                    .await?
                {
                    records.push(decode(document)?);
                }
                Ok(records)
            }
            QueryResult::Single(_) => Err(StoreError::InvalidResultShape(
                "a single-document result cannot be read with all()",
            )),
            QueryResult::Error(err) => Err(err),
        }
    }
}

fn decode<T: DeserializeOwned>(document: Document) -> StoreResult<T> {
    Ok(bson::de::deserialize_from_document(document)?)
}

impl<B: StoreBackend> fmt::Debug for QueryResult<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Cursor { context, .. } => f
                .debug_struct("Cursor")
                .field("context", context)
                .finish_non_exhaustive(),
            QueryResult::Single(document) => f.debug_tuple("Single").field(document).finish(),
            QueryResult::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}
