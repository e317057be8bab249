//! Session transactions.
//!
//! [`TransactionRunner::run`] wraps a unit of work in one store transaction.
//! The work receives a session-bound [`ExecutionContext`]; collections
//! obtained with [`Database::collection_with_context`](crate::database::Database::collection_with_context)
//! from that context join the transaction.
//!
//! ```ignore
//! manager
//!     .run_transaction(|context| async move {
//!         let pages = database.collection_with_context("pages", context);
//!         pages.insert(&first).await?;
//!         pages.insert(&second).await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```

use std::{future::Future, sync::Arc};

use mea::mutex::Mutex;
use tracing::{debug, warn};

use crate::{
    backend::StoreBackend,
    context::ExecutionContext,
    error::{StoreError, StoreResult},
};

/// Runs units of work inside session transactions.
#[derive(Debug, Clone)]
pub struct TransactionRunner<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> TransactionRunner<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Starts a session and a transaction, runs `work`, and commits.
    ///
    /// If `work` or the commit fails, the transaction is aborted and the
    /// failure is returned as [`StoreError::TransactionAborted`]. Nothing the
    /// work did is visible outside the session afterwards. The session is
    /// released once `work` has dropped every clone of its context.
    ///
    /// Errors from starting the session or the transaction are returned as is.
    pub async fn run<F, Fut, T>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(ExecutionContext<B>) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut session = self.backend.start_session().await?;
        self.backend.start_transaction(&mut session).await?;

        let session = Arc::new(Mutex::new(session));
        let outcome = work(ExecutionContext::shared(Arc::clone(&session))).await;

        let mut guard = session.lock().await;
        match outcome {
            Ok(value) => match self.backend.commit_transaction(&mut guard).await {
                Ok(()) => {
                    debug!("transaction committed");
                    Ok(value)
                }
                Err(err) => {
                    warn!(error = %err, "transaction commit failed");
                    Err(StoreError::TransactionAborted {
                        source: Box::new(err),
                    })
                }
            },
            Err(err) => {
                if let Err(abort_err) = self.backend.abort_transaction(&mut guard).await {
                    warn!(error = %abort_err, "failed to abort transaction");
                }
                debug!(error = %err, "transaction aborted");
                Err(StoreError::TransactionAborted {
                    source: Box::new(err),
                })
            }
        }
    }
}
