//! Connection lifecycle management.
//!
//! A [`ConnectionManager`] owns the single connection handle of a
//! coordinator. Connecting is single-flight: the first caller starts the
//! backend's connect primitive and every concurrent caller awaits the same
//! shared future, so the primitive runs at most once per connect cycle.
//!
//! Adapters never hold the raw handle. They hold a [`ConnectionHandle`] and
//! resolve the current connection on every call, which makes reconnecting a
//! matter of replacing the manager's state.

use futures::future::{BoxFuture, FutureExt, Shared};
use mea::mutex::Mutex;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tracing::debug;

use crate::{
    backend::Backend,
    config::ConnectionSettings,
    error::{StoreError, StoreResult},
};

type PendingConnection<C> = Shared<BoxFuture<'static, StoreResult<Arc<C>>>>;

fn has_failed<C>(pending: &PendingConnection<C>) -> bool {
    matches!(pending.peek(), Some(Err(_)))
}

/// Owns the connection state of one coordinator.
pub struct ConnectionManager<B: Backend> {
    backend: Arc<B>,
    settings: Arc<ConnectionSettings>,
    state: Mutex<Option<PendingConnection<B::Connection>>>,
    /// Number of connect attempts that have failed so far.
    failures: Arc<AtomicUsize>,
}

impl<B: Backend> ConnectionManager<B> {
    pub fn new(backend: Arc<B>, settings: ConnectionSettings) -> Self {
        Self {
            backend,
            settings: Arc::new(settings),
            state: Mutex::new(None),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Returns the pending or established connection, starting one if needed.
    ///
    /// Callers issued while an attempt is in flight share its outcome, failure
    /// included. A failed attempt is replaced by the first call issued after
    /// it settled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the backend requires a
    /// database name and none is configured, or whatever the backend's
    /// connect primitive failed with.
    pub async fn connect(&self) -> StoreResult<Arc<B::Connection>> {
        let failures_seen = self.failures.load(Ordering::SeqCst);

        let pending = {
            let mut state = self.state.lock().await;

            match state.as_ref() {
                Some(pending) if !has_failed(pending) => pending.clone(),
                Some(pending) if self.failures.load(Ordering::SeqCst) != failures_seen => pending.clone(),
                _ => {
                    if self.backend.requires_database() && self.settings.database().is_none() {
                        return Err(StoreError::Connection(format!(
                            "Database name must be specified for the {} backend",
                            self.backend.name()
                        )));
                    }

                    debug!(backend = self.backend.name(), database = ?self.settings.database(), "connecting");

                    let backend = self.backend.clone();
                    let settings = self.settings.clone();
                    let failures = self.failures.clone();
                    let pending = async move {
                        let result = backend.connect(&settings).await.map(Arc::new);

                        if result.is_err() {
                            failures.fetch_add(1, Ordering::SeqCst);
                        }

                        result
                    }
                    .boxed()
                    .shared();

                    *state = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Tears the connection down and resets to the absent state.
    ///
    /// Calling this without a connection is a no-op.
    pub async fn disconnect(&self) -> StoreResult<()> {
        let pending = self.state.lock().await.take();

        match pending {
            Some(pending) => match pending.await {
                Ok(connection) => {
                    debug!(backend = self.backend.name(), "disconnecting");
                    self.backend.disconnect(connection).await
                }
                // Never established, nothing to release.
                Err(_) => Ok(()),
            },
            None => Ok(()),
        }
    }

    /// Returns `true` while a connection is pending or established.
    pub async fn is_connected(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .is_some_and(|pending| !has_failed(pending))
    }
}

impl<B: Backend> fmt::Debug for ConnectionManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("backend", &self.backend)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Long-lived provider of the current connection, shared with adapters.
pub struct ConnectionHandle<B: Backend> {
    manager: Arc<ConnectionManager<B>>,
}

impl<B: Backend> ConnectionHandle<B> {
    pub fn new(manager: Arc<ConnectionManager<B>>) -> Self {
        Self { manager }
    }

    /// Resolves the current connection, connecting lazily if needed.
    pub async fn get(&self) -> StoreResult<Arc<B::Connection>> {
        self.manager.connect().await
    }

    pub fn settings(&self) -> &ConnectionSettings {
        self.manager.settings()
    }
}

impl<B: Backend> Clone for ConnectionHandle<B> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for ConnectionHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionHandle")
            .field(&self.manager.backend().name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::future::join_all;

    use crate::{
        backend::{Adapter, AdapterContext, Capabilities, KeyedRecord, ModelScope},
        record::{Options, Record, RecordId, WriteResult},
    };

    #[derive(Debug, Default)]
    struct CountingBackend {
        attempts: AtomicUsize,
        fail_first: usize,
        released: AtomicUsize,
    }

    #[derive(Debug)]
    struct NoopAdapter {
        scope: ModelScope,
    }

    #[async_trait]
    impl Adapter for NoopAdapter {
        fn scope(&self) -> &ModelScope {
            &self.scope
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }

        async fn create_with_id(&self, id: &RecordId, _data: Record, _options: &Options) -> StoreResult<WriteResult> {
            Ok(WriteResult::new(id.clone(), None))
        }

        async fn upsert(&self, id: &RecordId, _data: Record, _options: &Options) -> StoreResult<WriteResult> {
            Ok(WriteResult::new(id.clone(), None))
        }

        async fn delete(&self, _id: &RecordId, _options: &Options) -> StoreResult<bool> {
            Ok(false)
        }

        async fn get(&self, id: &RecordId, _options: &Options) -> StoreResult<Record> {
            Err(StoreError::not_found(&self.scope.model, id))
        }

        async fn list_all(&self, _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl Backend for CountingBackend {
        type Connection = usize;
        type Adapter = NoopAdapter;

        fn name(&self) -> &'static str {
            "counting"
        }

        fn requires_database(&self) -> bool {
            true
        }

        async fn connect(&self, _settings: &ConnectionSettings) -> StoreResult<usize> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;

            if attempt < self.fail_first {
                return Err(StoreError::Connection("refused".to_string()));
            }

            Ok(attempt)
        }

        async fn disconnect(&self, _connection: Arc<usize>) -> StoreResult<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn adapter(&self, context: AdapterContext<Self>) -> NoopAdapter {
            NoopAdapter { scope: context.scope }
        }
    }

    fn manager(fail_first: usize, database: Option<&str>) -> ConnectionManager<CountingBackend> {
        let backend = CountingBackend {
            fail_first,
            ..CountingBackend::default()
        };
        let settings = match database {
            Some(database) => ConnectionSettings::builder().database(database).build(),
            None => ConnectionSettings::default(),
        };

        ConnectionManager::new(Arc::new(backend), settings)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_attempt() {
        let manager = manager(0, Some("db"));

        let connections = join_all((0..4).map(|_| manager.connect())).await;

        assert_eq!(manager.backend().attempts.load(Ordering::SeqCst), 1);
        assert!(connections.iter().all(|c| matches!(c, Ok(c) if **c == 0)));
    }

    #[tokio::test]
    async fn failures_are_shared_then_forgotten() {
        let manager = manager(1, Some("db"));

        let failed = join_all((0..3).map(|_| manager.connect())).await;
        assert!(failed.iter().all(Result::is_err));
        assert_eq!(manager.backend().attempts.load(Ordering::SeqCst), 1);
        assert!(!manager.is_connected().await);

        assert_eq!(*manager.connect().await.unwrap(), 1);
        assert_eq!(manager.backend().attempts.load(Ordering::SeqCst), 2);
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn missing_database_fails_before_connecting() {
        let manager = manager(0, None);

        assert!(matches!(manager.connect().await, Err(StoreError::Connection(_))));
        assert_eq!(manager.backend().attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disconnect_releases_once() {
        let manager = manager(0, Some("db"));

        manager.disconnect().await.unwrap();
        manager.connect().await.unwrap();
        manager.disconnect().await.unwrap();
        manager.disconnect().await.unwrap();

        assert_eq!(manager.backend().released.load(Ordering::SeqCst), 1);
        assert!(!manager.is_connected().await);
    }
}
