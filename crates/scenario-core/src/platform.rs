//! Platform wiring
//!
//! One [`Platform`] per process: it owns the registry, the handle cache,
//! the scenario catalog, the ingestion engine and the query executor, all
//! built from one [`PlatformConfig`].

use crate::access::BackendAccess;
use crate::config::PlatformConfig;
use crate::context::{ContextResolver, ScenarioCatalog};
use crate::error::{IngestResult, PlatformError};
use crate::ingest::{IngestJob, IngestRun, IngestionEngine, IngestionResult};
use crate::query::{QueryExecutor, QueryRequest, QueryResponse};
use scenario_backend::{BackendCache, BackendClients, BackendRegistry, BlockingPool, EvictionReport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Configured platform
#[derive(Debug)]
pub struct Platform {
    config: PlatformConfig,
    cache: Arc<BackendCache>,
    catalog: Arc<ScenarioCatalog>,
    engine: Arc<IngestionEngine>,
    executor: QueryExecutor,
}

impl Platform {
    /// Build with the built-in backend kinds
    ///
    /// # Errors
    /// Returns [`PlatformError`] for invalid configuration or a configured
    /// backend kind that is not registered.
    pub fn new(config: PlatformConfig) -> Result<Self, PlatformError> {
        config.validate()?;
        let registry = BackendRegistry::with_builtins()?;
        Self::with_registry(config, registry)
    }

    /// Build with a caller-populated registry
    ///
    /// # Errors
    /// As [`Platform::new`].
    pub fn with_registry(config: PlatformConfig, registry: BackendRegistry) -> Result<Self, PlatformError> {
        config.validate()?;
        registry.graph_factory(&config.graph_backend)?;
        registry.document_factory(&config.document_backend)?;

        let mut clients = BackendClients::new().with_blocking_pool(BlockingPool::new(config.blocking_pool_size));
        if let Some(root) = &config.document_root {
            clients = clients.with_document_root(root.clone());
        }
        let cache = Arc::new(BackendCache::new(Arc::new(registry), clients).with_connect_retry(config.retry));
        let access = Arc::new(BackendAccess::new(Arc::clone(&cache), config.retry));
        let catalog = Arc::new(ScenarioCatalog::new());

        let engine = IngestionEngine::new(Arc::clone(&access), Arc::clone(&catalog))
            .with_graph_kind(&config.graph_backend)
            .with_document_kind(&config.document_backend)
            .with_progress_capacity(config.progress_capacity);
        let executor = QueryExecutor::new(
            access,
            ContextResolver::new(Arc::clone(&catalog), &config.fallback_scope),
            &config.graph_backend,
            &config.document_backend,
        );

        tracing::info!(
            graph = %config.graph_backend,
            documents = %config.document_backend,
            fallback_scope = %config.fallback_scope,
            "platform ready"
        );
        Ok(Self {
            config,
            cache,
            catalog,
            engine: Arc::new(engine),
            executor,
        })
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Handle cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<BackendCache> {
        &self.cache
    }

    /// Scenarios ingested by this process
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &Arc<ScenarioCatalog> {
        &self.catalog
    }

    /// Ingestion engine
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<IngestionEngine> {
        &self.engine
    }

    /// Query executor
    #[inline]
    #[must_use]
    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Run an ingestion to its end
    ///
    /// # Errors
    /// See [`IngestionEngine::ingest`].
    pub async fn ingest(&self, job: IngestJob, cancel: &CancellationToken) -> IngestResult<IngestionResult> {
        self.engine.ingest(job, cancel).await
    }

    /// Spawn an ingestion with a progress stream
    #[must_use]
    pub fn start(&self, job: IngestJob, cancel: CancellationToken) -> IngestRun {
        self.engine.start(job, cancel)
    }

    /// Answer a query request addressed by graph identifier
    pub async fn query(&self, graph_header: &str, request: QueryRequest) -> QueryResponse {
        self.executor.handle(graph_header, request).await
    }

    /// Close every cached handle
    pub async fn shutdown(&self) -> EvictionReport {
        let report = self.cache.evict_all().await;
        tracing::debug!(closed = report.closed, "platform shut down");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_backend::BackendError;

    #[test]
    fn unknown_backend_kind_is_rejected_at_startup() {
        let config = PlatformConfig::new().with_graph_backend("neptune");
        let err = Platform::new(config).unwrap_err();
        assert!(matches!(err, PlatformError::Backend(BackendError::UnknownKind { .. })), "{err}");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PlatformConfig::new().with_blocking_pool_size(0);
        assert!(matches!(Platform::new(config), Err(PlatformError::Config(_))));
    }

    #[tokio::test]
    async fn shutdown_evicts_cached_handles() {
        let platform = Platform::new(PlatformConfig::new()).unwrap();
        let ctx = platform.executor().resolve("telco-topology");
        platform
            .cache()
            .graph(&ctx.backend_kind, &ctx.graph_target())
            .await
            .unwrap();
        assert_eq!(platform.cache().live_count().await, 1);

        platform.shutdown().await;
        assert_eq!(platform.cache().live_count().await, 0);
    }
}
