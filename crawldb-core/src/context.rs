//! Execution contexts.
//!
//! Every collection operation runs inside an [`ExecutionContext`]. A detached
//! context runs each operation on its own; a session-bound context routes all
//! operations through one driver session so they join its transaction.

use std::{fmt, sync::Arc};

use mea::mutex::{Mutex, MutexGuard};

use crate::backend::StoreBackend;

/// The session scope operations run in.
///
/// Cloning a session-bound context shares the session. The session is
/// released when the last clone is dropped.
pub struct ExecutionContext<B: StoreBackend> {
    session: Option<Arc<Mutex<B::Session>>>,
}

impl<B: StoreBackend> ExecutionContext<B> {
    /// A context that is not bound to any session.
    pub fn detached() -> Self {
        Self { session: None }
    }

    /// A context whose operations all go through `session`.
    pub fn with_session(session: B::Session) -> Self {
        Self::shared(Arc::new(Mutex::new(session)))
    }

    pub(crate) fn shared(session: Arc<Mutex<B::Session>>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn is_session_bound(&self) -> bool {
        self.session.is_some()
    }

    /// Locks the session for the duration of one operation.
    ///
    /// Operations of a session-bound context are serialized; a driver session
    /// does not support concurrent use.
    pub(crate) async fn lock(&self) -> Option<MutexGuard<'_, B::Session>> {
        match &self.session {
            Some(session) => Some(session.lock().await),
            None => None,
        }
    }
}

impl<B: StoreBackend> Clone for ExecutionContext<B> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl<B: StoreBackend> Default for ExecutionContext<B> {
    fn default() -> Self {
        Self::detached()
    }
}

impl<B: StoreBackend> fmt::Debug for ExecutionContext<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("session_bound", &self.is_session_bound())
            .finish()
    }
}
