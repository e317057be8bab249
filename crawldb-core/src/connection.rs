//! Lazily established shared client.
//!
//! A [`ConnectionManager`] owns the one client handle of a process (or of any
//! scope that holds the manager). The first call that needs the client resolves
//! the connection descriptor and connects, retrying under a [`BackoffPolicy`];
//! every later call gets the cached handle without any I/O.
//!
//! ```ignore
//! use crawldb_core::{config::{ConnectOptions, EnvConfigSource}, connection::ConnectionManager};
//!
//! let manager = ConnectionManager::new(connector, EnvConfigSource::default());
//! let pages = manager.collection("pages").await?;
//! ```

use std::{
    fmt,
    future::Future,
    sync::{Arc, OnceLock},
};

use mea::mutex::Mutex;
use tracing::{info, warn};

use crate::{
    backend::{Connector, StoreBackend},
    backoff::BackoffPolicy,
    collection::Collection,
    config::{ConfigResolver, ConfigSource, ConnectOptions, ConnectionDescriptor, keys},
    context::ExecutionContext,
    database::{Database, resolve_database_name},
    error::{StoreError, StoreResult},
    transaction::TransactionRunner,
};

/// Owns the shared client and its one-time initialization.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    source: Arc<dyn ConfigSource>,
    resolver: ConfigResolver,
    policy: BackoffPolicy,
    client: OnceLock<C::Backend>,
    init: Mutex<()>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, source: impl ConfigSource + 'static) -> Self {
        Self {
            connector,
            source: Arc::new(source),
            resolver: ConfigResolver::default(),
            policy: BackoffPolicy::default(),
            client: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// Replaces the retry schedule used while connecting.
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the resolver, e.g. to change the application name used as
    /// the default database.
    pub fn with_resolver(mut self, resolver: ConfigResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config_source(&self) -> &dyn ConfigSource {
        self.source.as_ref()
    }

    /// Returns `true` once a client has been established.
    pub fn is_connected(&self) -> bool {
        self.client.get().is_some()
    }

    /// Returns the shared client, connecting on first use.
    ///
    /// Only the first successful call consults `options`. Once a client
    /// exists it is returned as is, and options passed to later calls are
    /// ignored; this manager never reconnects with different settings.
    ///
    /// Concurrent first callers do not race: one of them runs the connect
    /// loop while the others wait for it and then receive the same handle.
    ///
    /// # Errors
    ///
    /// With the default policy this only returns an error when the connector
    /// reports [`StoreError::ConfigurationIncomplete`]; transient failures are
    /// retried forever. With a bounded policy, exhaustion yields
    /// [`StoreError::ConnectionTransient`].
    pub async fn get_client(&self, options: &ConnectOptions) -> StoreResult<C::Backend> {
        if let Some(client) = self.client.get() {
            return Ok(client.clone());
        }

        let _guard = self.init.lock().await;
        if let Some(client) = self.client.get() {
            return Ok(client.clone());
        }

        let descriptor = self.resolver.resolve(options, self.source.as_ref());
        let client = self.connect_with_retry(&descriptor).await?;
        info!(descriptor = ?descriptor, "connected to document store");

        Ok(self.client.get_or_init(|| client).clone())
    }

    /// Returns the shared client using only configured settings.
    pub async fn client(&self) -> StoreResult<C::Backend> {
        self.get_client(&ConnectOptions::default()).await
    }

    async fn connect_with_retry(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> StoreResult<C::Backend> {
        let mut backoff = self.policy.start();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let err = match self.connector.connect(descriptor).await {
                Ok(client) => return Ok(client),
                Err(err @ StoreError::ConfigurationIncomplete(_)) => return Err(err),
                Err(err) => err,
            };

            match backoff.next_backoff() {
                Some(wait) => {
                    warn!(
                        error = %err,
                        attempt = attempts,
                        retry_in_secs = wait.as_secs_f64(),
                        "waiting for document store connection"
                    );
                    tokio::time::sleep(wait).await;
                }
                None => {
                    return Err(StoreError::ConnectionTransient {
                        attempts,
                        source: Box::new(err),
                    });
                }
            }
        }
    }

    /// Returns a handle onto `name`, or onto the configured database when
    /// `name` is empty, falling back to `"test"`.
    pub async fn database(&self, name: &str) -> StoreResult<Database<C::Backend>> {
        let client = self.client().await?;
        let configured = self.source.get_string(keys::DB);
        let name = resolve_database_name(Some(name), configured.as_deref());

        Ok(Database::new(client, name))
    }

    /// Returns a detached collection of the configured database.
    pub async fn collection(&self, name: &str) -> StoreResult<Collection<C::Backend>> {
        Ok(self.database("").await?.collection(name))
    }

    pub async fn transaction_runner(&self) -> StoreResult<TransactionRunner<C::Backend>> {
        Ok(TransactionRunner::new(self.client().await?))
    }

    /// Runs `work` in a transaction on the shared client.
    ///
    /// See [`TransactionRunner::run`].
    pub async fn run_transaction<F, Fut, T>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(ExecutionContext<C::Backend>) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.transaction_runner().await?.run(work).await
    }

    /// Closes the shared client, if one was established.
    ///
    /// Handles cloned from the client before shutdown stop working once the
    /// backend has closed its pool.
    pub async fn shutdown(&self) -> StoreResult<()> {
        match self.client.get() {
            Some(client) => {
                info!("shutting down document store client");
                client.shutdown().await
            }
            None => Ok(()),
        }
    }
}

impl<C: Connector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connector", &self.connector)
            .field("policy", &self.policy)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use bson::{Bson, Document};

    use super::*;
    use crate::{
        backend::{Namespace, UpdateOutcome},
        config::ValueConfigSource,
        index::IndexModel,
        query::{DeleteOptions, FindOptions, UpdateOptions},
    };

    /// A backend that only carries an identity, enough to compare handles.
    #[derive(Debug, Clone)]
    struct TokenBackend {
        token: usize,
        shutdowns: Arc<AtomicUsize>,
    }

    impl TokenBackend {
        fn token(&self) -> usize {
            self.token
        }
    }

    #[async_trait]
    impl StoreBackend for TokenBackend {
        type Session = ();
        type Cursor = ();

        async fn insert_one(
            &self,
            _: &Namespace,
            _: Document,
            _: Option<&mut ()>,
        ) -> StoreResult<Bson> {
            unimplemented!()
        }

        async fn insert_many(
            &self,
            _: &Namespace,
            _: Vec<Document>,
            _: Option<&mut ()>,
        ) -> StoreResult<Vec<Bson>> {
            unimplemented!()
        }

        async fn update_one(
            &self,
            _: &Namespace,
            _: Document,
            _: Document,
            _: UpdateOptions,
            _: Option<&mut ()>,
        ) -> StoreResult<UpdateOutcome> {
            unimplemented!()
        }

        async fn update_many(
            &self,
            _: &Namespace,
            _: Document,
            _: Document,
            _: UpdateOptions,
            _: Option<&mut ()>,
        ) -> StoreResult<UpdateOutcome> {
            unimplemented!()
        }

        async fn replace_one(
            &self,
            _: &Namespace,
            _: Document,
            _: Document,
            _: UpdateOptions,
            _: Option<&mut ()>,
        ) -> StoreResult<UpdateOutcome> {
            unimplemented!()
        }

        async fn delete_one(
            &self,
            _: &Namespace,
            _: Document,
            _: DeleteOptions,
            _: Option<&mut ()>,
        ) -> StoreResult<u64> {
            unimplemented!()
        }

        async fn delete_many(
            &self,
            _: &Namespace,
            _: Document,
            _: DeleteOptions,
            _: Option<&mut ()>,
        ) -> StoreResult<u64> {
            unimplemented!()
        }

        async fn find(
            &self,
            _: &Namespace,
            _: Document,
            _: FindOptions,
            _: Option<&mut ()>,
        ) -> StoreResult<()> {
            unimplemented!()
        }

        async fn next_document(
            &self,
            _: &mut (),
            _: Option<&mut ()>,
        ) -> StoreResult<Option<Document>> {
            unimplemented!()
        }

        async fn find_one(
            &self,
            _: &Namespace,
            _: Document,
            _: Option<&mut ()>,
        ) -> StoreResult<Option<Document>> {
            unimplemented!()
        }

        async fn count_documents(
            &self,
            _: &Namespace,
            _: Document,
            _: Option<&mut ()>,
        ) -> StoreResult<u64> {
            unimplemented!()
        }

        async fn create_indexes(
            &self,
            _: &Namespace,
            _: Vec<IndexModel>,
        ) -> StoreResult<Vec<String>> {
            unimplemented!()
        }

        async fn drop_index(&self, _: &Namespace, _: &str) -> StoreResult<()> {
            unimplemented!()
        }

        async fn drop_indexes(&self, _: &Namespace) -> StoreResult<()> {
            unimplemented!()
        }

        async fn list_indexes(&self, _: &Namespace) -> StoreResult<Vec<Document>> {
            unimplemented!()
        }

        async fn create_collection(&self, _: &Namespace) -> StoreResult<()> {
            unimplemented!()
        }

        async fn list_collection_names(&self, _: &str) -> StoreResult<Vec<String>> {
            unimplemented!()
        }

        async fn drop_database(&self, _: &str) -> StoreResult<()> {
            unimplemented!()
        }

        async fn start_session(&self) -> StoreResult<()> {
            unimplemented!()
        }

        async fn start_transaction(&self, _: &mut ()) -> StoreResult<()> {
            unimplemented!()
        }

        async fn commit_transaction(&self, _: &mut ()) -> StoreResult<()> {
            unimplemented!()
        }

        async fn abort_transaction(&self, _: &mut ()) -> StoreResult<()> {
            unimplemented!()
        }

        async fn shutdown(&self) -> StoreResult<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails the first `failures` attempts, then hands out a backend tagged
    /// with the attempt number.
    #[derive(Debug, Default)]
    struct CountingConnector {
        attempts: AtomicUsize,
        failures: usize,
        seen_hosts: std::sync::Mutex<Vec<String>>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl CountingConnector {
        fn failing(failures: usize) -> Self {
            Self {
                failures,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Backend = TokenBackend;

        async fn connect(&self, descriptor: &ConnectionDescriptor) -> StoreResult<TokenBackend> {
            self.seen_hosts.lock().unwrap().push(descriptor.host.clone());
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(10)).await;

            if attempt <= self.failures {
                return Err(StoreError::operation(format!(
                    "connection refused (attempt {attempt})"
                )));
            }
            Ok(TokenBackend {
                token: attempt,
                shutdowns: Arc::clone(&self.shutdowns),
            })
        }
    }

    #[derive(Debug)]
    struct MisconfiguredConnector;

    #[async_trait]
    impl Connector for MisconfiguredConnector {
        type Backend = TokenBackend;

        async fn connect(&self, _: &ConnectionDescriptor) -> StoreResult<TokenBackend> {
            Err(StoreError::ConfigurationIncomplete("unknown auth mechanism".into()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_callers_connect_once() {
        let manager = Arc::new(ConnectionManager::new(
            CountingConnector::default(),
            ValueConfigSource::new(),
        ));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.client().await })
            })
            .collect();

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(manager.connector.attempts.load(Ordering::SeqCst), 1);
        assert!(clients.iter().all(|c| c.token() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_connected() {
        let manager =
            ConnectionManager::new(CountingConnector::failing(5), ValueConfigSource::new());

        let client = manager.client().await.unwrap();

        assert_eq!(client.token(), 6);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_policy_gives_up_with_last_error() {
        let policy = BackoffPolicy::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_elapsed_time(Some(Duration::from_secs(3)));
        let manager =
            ConnectionManager::new(CountingConnector::failing(usize::MAX), ValueConfigSource::new())
                .with_backoff(policy);

        let err = manager.client().await.unwrap_err();

        match err {
            StoreError::ConnectionTransient { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(source.to_string().contains("attempt 3"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn configuration_errors_are_not_retried() {
        let manager = ConnectionManager::new(MisconfiguredConnector, ValueConfigSource::new());

        let err = manager.client().await.unwrap_err();

        assert!(matches!(err, StoreError::ConfigurationIncomplete(_)));
    }

    #[tokio::test]
    async fn later_options_are_ignored() {
        let manager =
            ConnectionManager::new(CountingConnector::default(), ValueConfigSource::new());

        let first = manager
            .get_client(&ConnectOptions::new().with_host("first"))
            .await
            .unwrap();
        let second = manager
            .get_client(&ConnectOptions::new().with_host("second"))
            .await
            .unwrap();

        assert_eq!(first.token(), second.token());
        assert_eq!(
            *manager.connector.seen_hosts.lock().unwrap(),
            vec!["first".to_string()]
        );
    }

    #[tokio::test]
    async fn database_name_falls_back_to_configuration() {
        let mut source = ValueConfigSource::new();
        source.set(keys::DB, "crawler");
        let manager = ConnectionManager::new(CountingConnector::default(), source);

        assert_eq!(manager.database("").await.unwrap().name(), "crawler");
        assert_eq!(manager.database("archive").await.unwrap().name(), "archive");

        let unconfigured =
            ConnectionManager::new(CountingConnector::default(), ValueConfigSource::new());
        assert_eq!(unconfigured.database("").await.unwrap().name(), "test");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shared_manager_shuts_down_its_client() {
        let manager = Arc::new(ConnectionManager::new(
            CountingConnector::default(),
            ValueConfigSource::new(),
        ));
        let shutdowns = Arc::clone(&manager.connector.shutdowns);

        manager.shutdown().await.unwrap();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 0);

        let worker = Arc::clone(&manager);
        tokio::spawn(async move { worker.client().await })
            .await
            .unwrap()
            .unwrap();

        manager.shutdown().await.unwrap();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }
}
