//! Connector handing out an [`InMemoryStore`].

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tracing::debug;

use crawldb_core::{
    backend::Connector,
    config::ConnectionDescriptor,
    error::{StoreError, StoreResult},
};

use crate::{error::MemoryStoreError, store::InMemoryStore};

/// Connects to a shared [`InMemoryStore`].
///
/// Every successful connection returns a clone of the same store. The
/// connector can be told to refuse its first attempts, which makes it useful
/// for exercising retry behavior without a real server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    store: InMemoryStore,
    refusals: usize,
    attempts: Arc<AtomicUsize>,
}

impl InMemoryConnector {
    pub fn new(store: InMemoryStore) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    /// Refuses the first `attempts` connection attempts.
    pub fn refusing_first(mut self, attempts: usize) -> Self {
        self.refusals = attempts;
        self
    }

    /// Number of connection attempts made so far, across clones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    type Backend = InMemoryStore;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> StoreResult<InMemoryStore> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(attempt, database = %descriptor.database, "connecting to in-memory store");

        if attempt <= self.refusals {
            return Err(StoreError::operation(MemoryStoreError::Unavailable));
        }

        Ok(self.store.clone())
    }
}
