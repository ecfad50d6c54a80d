//! Backend handle cache using moka
//!
//! Keeps at most one live handle per `(kind, scope)`. Construction goes
//! through moka's `try_get_with`, which coalesces concurrent misses on the
//! same key: one caller connects, the rest wait for its result. Misses on
//! different keys connect in parallel, and no lock is held while a
//! connection is being opened. A failed connect is not cached.
//!
//! Eviction closes the handle. The cache is unbounded; handles leave it
//! only through [`BackendCache::evict_graph`], [`BackendCache::evict_documents`]
//! and [`BackendCache::evict_all`].

use crate::clients::BackendClients;
use crate::error::{BackendError, BackendResult};
use crate::registry::BackendRegistry;
use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{BackendHandle, ConnectTarget, DocumentStore, GraphBackend};
use moka::future::Cache;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Cache key: backend kind plus scope (scenario id or dataset prefix)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Backend kind
    pub kind: String,
    /// Scenario id or dataset scope prefix
    pub scope: String,
}

impl CacheKey {
    /// Create key
    pub fn new(kind: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            scope: scope.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.scope)
    }
}

/// Outcome of closing every cached handle
#[derive(Debug, Default)]
pub struct EvictionReport {
    /// Handles closed cleanly
    pub closed: usize,
    /// Handles whose close failed
    pub failed: Vec<(CacheKey, BackendError)>,
}

/// Handles of one backend family
pub struct HandleCache<H: ?Sized + BackendHandle + 'static> {
    family: &'static str,
    inner: Cache<CacheKey, Arc<H>>,
}

impl<H: ?Sized + BackendHandle + 'static> HandleCache<H> {
    /// Create empty, unbounded cache
    #[must_use]
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            inner: Cache::builder().build(),
        }
    }

    /// Cached handle for `key`, connecting on a miss
    ///
    /// Concurrent callers for one key share a single `connect` run.
    ///
    /// # Errors
    /// Returns the connect error; nothing is cached in that case.
    pub async fn get_or_connect<F>(&self, key: CacheKey, connect: F) -> BackendResult<Arc<H>>
    where
        F: Future<Output = BackendResult<Arc<H>>>,
    {
        let family = self.family;
        let label = key.to_string();
        self.inner
            .try_get_with(key, async move {
                let handle = connect.await?;
                tracing::info!(family, key = %label, "opened backend handle");
                Ok::<_, BackendError>(handle)
            })
            .await
            .map_err(|e| Arc::try_unwrap(e).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Cached handle without connecting
    pub async fn peek(&self, key: &CacheKey) -> Option<Arc<H>> {
        self.inner.get(key).await
    }

    /// Drop and close the handle for `key`
    ///
    /// Returns `false` when nothing was cached. A failed close is logged.
    pub async fn evict(&self, key: &CacheKey) -> bool {
        let Some(handle) = self.inner.remove(key).await else {
            return false;
        };
        if let Err(e) = handle.close().await {
            tracing::warn!(family = self.family, key = %key, error = %e, "closing evicted handle failed");
        } else {
            tracing::info!(family = self.family, key = %key, "evicted backend handle");
        }
        true
    }

    /// Drop and close every handle, collecting close failures
    pub async fn evict_all(&self, report: &mut EvictionReport) {
        let entries: Vec<(Arc<CacheKey>, Arc<H>)> = self.inner.iter().collect();
        self.inner.invalidate_all();
        for (key, handle) in entries {
            match handle.close().await {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    tracing::warn!(family = self.family, key = %key, error = %e, "closing handle failed");
                    report.failed.push(((*key).clone(), e));
                }
            }
        }
        self.inner.run_pending_tasks().await;
    }

    /// Number of live handles
    pub async fn live_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

impl<H: ?Sized + BackendHandle + 'static> fmt::Debug for HandleCache<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleCache")
            .field("family", &self.family)
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

/// Registry-backed cache for both backend families
///
/// Connect attempts are retried under `connect_retry`; transient failures
/// while opening a handle are absorbed here rather than by every caller.
#[derive(Debug)]
pub struct BackendCache {
    registry: Arc<BackendRegistry>,
    clients: BackendClients,
    connect_retry: RetryPolicy,
    graphs: HandleCache<dyn GraphBackend>,
    documents: HandleCache<dyn DocumentStore>,
}

impl BackendCache {
    /// Create cache over `registry`
    #[must_use]
    pub fn new(registry: Arc<BackendRegistry>, clients: BackendClients) -> Self {
        Self {
            registry,
            clients,
            connect_retry: RetryPolicy::default(),
            graphs: HandleCache::new("graph"),
            documents: HandleCache::new("document"),
        }
    }

    /// Set retry policy for connect attempts
    #[must_use]
    pub fn with_connect_retry(mut self, policy: RetryPolicy) -> Self {
        self.connect_retry = policy;
        self
    }

    /// Backend registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Clients handed to factories
    #[inline]
    #[must_use]
    pub fn clients(&self) -> &BackendClients {
        &self.clients
    }

    /// Graph handle for `kind` bound to `target`
    ///
    /// Handles are keyed by `(kind, target.scope)` only. The first target
    /// to connect in a scope fixes the handle's resource; later targets in
    /// the same scope get that handle and their `resource` is ignored.
    ///
    /// # Errors
    /// Returns [`BackendError::UnknownKind`] for unregistered kinds, or the
    /// connect failure.
    pub async fn graph(&self, kind: &str, target: &ConnectTarget) -> BackendResult<Arc<dyn GraphBackend>> {
        let factory = self.registry.graph_factory(kind)?;
        let key = CacheKey::new(kind, &target.scope);
        let (clients, policy) = (&self.clients, &self.connect_retry);
        self.graphs
            .get_or_connect(key, async move {
                with_retry(policy, "connect", BackendError::default_retryability, |_| {
                    factory.connect(target, clients)
                })
                .await
            })
            .await
    }

    /// Document store handle for `kind` bound to `target`
    ///
    /// Keyed like [`BackendCache::graph`]: `target.resource` does not
    /// select a handle.
    ///
    /// # Errors
    /// As [`BackendCache::graph`].
    pub async fn documents(
        &self,
        kind: &str,
        target: &ConnectTarget,
    ) -> BackendResult<Arc<dyn DocumentStore>> {
        let factory = self.registry.document_factory(kind)?;
        let key = CacheKey::new(kind, &target.scope);
        let (clients, policy) = (&self.clients, &self.connect_retry);
        self.documents
            .get_or_connect(key, async move {
                with_retry(policy, "connect", BackendError::default_retryability, |_| {
                    factory.connect(target, clients)
                })
                .await
            })
            .await
    }

    /// Drop and close the graph handle for `(kind, scope)`
    pub async fn evict_graph(&self, kind: &str, scope: &str) -> bool {
        self.graphs.evict(&CacheKey::new(kind, scope)).await
    }

    /// Drop and close the document handle for `(kind, scope)`
    pub async fn evict_documents(&self, kind: &str, scope: &str) -> bool {
        self.documents.evict(&CacheKey::new(kind, scope)).await
    }

    /// Close every handle; failures are logged and reported, never raised
    pub async fn evict_all(&self) -> EvictionReport {
        let mut report = EvictionReport::default();
        self.graphs.evict_all(&mut report).await;
        self.documents.evict_all(&mut report).await;
        tracing::info!(
            closed = report.closed,
            failed = report.failed.len(),
            "closed all backend handles"
        );
        report
    }

    /// Live graph handles
    pub async fn live_graphs(&self) -> u64 {
        self.graphs.live_count().await
    }

    /// Live document handles
    pub async fn live_documents(&self) -> u64 {
        self.documents.live_count().await
    }

    /// Live handles across both families
    pub async fn live_count(&self) -> u64 {
        self.live_graphs().await + self.live_documents().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MockGraphBackend;
    use crate::traits::GraphBackendFactory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct SlowFactory {
        connects: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl GraphBackendFactory for SlowFactory {
        async fn connect(
            &self,
            _target: &ConnectTarget,
            _clients: &BackendClients,
        ) -> BackendResult<Arc<dyn GraphBackend>> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if n < self.fail_first {
                return Err(BackendError::Timeout("connect".into()));
            }
            Ok(Arc::new(MockGraphBackend::empty()))
        }
    }

    fn cache_with(factory: Arc<SlowFactory>) -> BackendCache {
        let mut registry = BackendRegistry::new();
        registry.register_graph("slow", factory).unwrap();
        BackendCache::new(Arc::new(registry), BackendClients::new())
            .with_connect_retry(RetryPolicy::default().with_base_delay(Duration::from_millis(10)))
    }

    #[tokio::test(start_paused = true)]
    async fn resource_does_not_split_a_scope() {
        let factory = Arc::new(SlowFactory::default());
        let cache = cache_with(Arc::clone(&factory));

        let first = cache
            .graph("slow", &ConnectTarget::new("telco", "telco-topology"))
            .await
            .unwrap();
        let second = cache
            .graph("slow", &ConnectTarget::new("telco", "telco-other"))
            .await
            .unwrap();

        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_connect_once() {
        let factory = Arc::new(SlowFactory::default());
        let cache = Arc::new(cache_with(Arc::clone(&factory)));
        let target = ConnectTarget::new("telco", "telco-topology");

        let gets = (0..16).map(|_| {
            let cache = Arc::clone(&cache);
            let target = target.clone();
            tokio::spawn(async move { cache.graph("slow", &target).await })
        });
        let handles: Vec<_> = futures::future::join_all(gets)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.live_graphs().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_scopes_get_distinct_handles() {
        let factory = Arc::new(SlowFactory::default());
        let cache = cache_with(Arc::clone(&factory));

        let a = cache.graph("slow", &ConnectTarget::new("a", "a-topology")).await.unwrap();
        let b = cache.graph("slow", &ConnectTarget::new("b", "b-topology")).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_connect_failures_are_retried() {
        let factory = Arc::new(SlowFactory {
            fail_first: 2,
            ..SlowFactory::default()
        });
        let cache = cache_with(Arc::clone(&factory));

        cache.graph("slow", &ConnectTarget::new("t", "t-topology")).await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_is_not_cached() {
        let factory = Arc::new(SlowFactory {
            fail_first: 3,
            ..SlowFactory::default()
        });
        let cache = cache_with(Arc::clone(&factory));
        let target = ConnectTarget::new("t", "t-topology");

        let err = cache.graph("slow", &target).await.err().unwrap();
        assert!(matches!(err, BackendError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(cache.live_graphs().await, 0);

        cache.graph("slow", &target).await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn evict_then_get_reconnects() {
        let factory = Arc::new(SlowFactory::default());
        let cache = cache_with(Arc::clone(&factory));
        let target = ConnectTarget::new("t", "t-topology");

        let first = cache.graph("slow", &target).await.unwrap();
        assert!(cache.evict_graph("slow", "t").await);
        assert!(!cache.evict_graph("slow", "t").await);
        let second = cache.graph("slow", &target).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn evict_all_closes_everything() {
        let factory = Arc::new(SlowFactory::default());
        let cache = cache_with(Arc::clone(&factory));
        for scope in ["a", "b", "c"] {
            cache
                .graph("slow", &ConnectTarget::new(scope, format!("{scope}-topology")))
                .await
                .unwrap();
        }

        let report = cache.evict_all().await;
        assert_eq!(report.closed, 3);
        assert!(report.failed.is_empty());
        assert_eq!(cache.live_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_kind_fails_without_caching() {
        let cache = BackendCache::new(Arc::new(BackendRegistry::new()), BackendClients::new());
        let err = cache
            .graph("nope", &ConnectTarget::new("t", "t-topology"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::UnknownKind { .. }));
        assert_eq!(cache.live_count().await, 0);
    }
}
