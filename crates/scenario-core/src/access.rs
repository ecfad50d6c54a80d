//! Retried backend calls scoped to a scenario
//!
//! Each attempt fetches the handle from the cache, so a handle evicted after
//! a lost connection is replaced on the next attempt instead of being reused.
//! Failures are classified by the backend that raised them.

use crate::context::ScenarioContext;
use scenario_backend::{
    with_retry_cancellable, BackendCache, BackendError, BackendHandle, BackendResult,
    DocumentStore, GraphBackend, RetryPolicy,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cache plus retry policy
#[derive(Debug)]
pub struct BackendAccess {
    cache: Arc<BackendCache>,
    retry: RetryPolicy,
}

impl BackendAccess {
    /// Create access over `cache`
    #[must_use]
    pub fn new(cache: Arc<BackendCache>, retry: RetryPolicy) -> Self {
        Self { cache, retry }
    }

    /// Handle cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<BackendCache> {
        &self.cache
    }

    /// Retry policy applied to every call
    #[inline]
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Cached graph handle for `ctx`
    ///
    /// # Errors
    /// Returns unknown-kind and connect failures.
    pub async fn graph(&self, ctx: &ScenarioContext) -> BackendResult<Arc<dyn GraphBackend>> {
        self.cache.graph(&ctx.backend_kind, &ctx.graph_target()).await
    }

    /// Cached document store for `ctx` under `kind`
    ///
    /// # Errors
    /// Returns unknown-kind and connect failures.
    pub async fn documents(
        &self,
        kind: &str,
        ctx: &ScenarioContext,
    ) -> BackendResult<Arc<dyn DocumentStore>> {
        self.cache.documents(kind, &ctx.document_target()).await
    }

    /// Run `call` against the scenario graph under the retry policy
    ///
    /// # Errors
    /// Returns the first fatal error, [`BackendError::RetriesExhausted`], or
    /// [`BackendError::Cancelled`].
    pub async fn graph_call<T, F, Fut>(
        &self,
        ctx: &ScenarioContext,
        operation: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> BackendResult<T>
    where
        F: Fn(Arc<dyn GraphBackend>) -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let classifier = self.graph(ctx).await?;
        let (this, call) = (self, &call);
        with_retry_cancellable(
            &self.retry,
            operation,
            cancel,
            |e| classifier.classify(e),
            move |_| async move {
                let handle = this.graph(ctx).await?;
                let result = call(handle).await;
                if let Err(e) = &result {
                    if e.is_connection_lost() {
                        tracing::warn!(scenario = %ctx.scenario_id, kind = %ctx.backend_kind, "graph connection lost, evicting handle");
                        this.cache.evict_graph(&ctx.backend_kind, &ctx.scenario_id).await;
                    }
                }
                result
            },
        )
        .await
    }

    /// Run `call` against the scenario's document store under the retry policy
    ///
    /// # Errors
    /// As [`BackendAccess::graph_call`].
    pub async fn document_call<T, F, Fut>(
        &self,
        kind: &str,
        ctx: &ScenarioContext,
        operation: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> BackendResult<T>
    where
        F: Fn(Arc<dyn DocumentStore>) -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let classifier = self.documents(kind, ctx).await?;
        let (this, call) = (self, &call);
        with_retry_cancellable(
            &self.retry,
            operation,
            cancel,
            |e| classifier.classify(e),
            move |_| async move {
                let store = this.documents(kind, ctx).await?;
                let result = call(store).await;
                if let Err(e) = &result {
                    if e.is_connection_lost() {
                        tracing::warn!(scope = %ctx.dataset_scope_prefix, kind, "document connection lost, evicting handle");
                        this.cache.evict_documents(kind, &ctx.dataset_scope_prefix).await;
                    }
                }
                result
            },
        )
        .await
    }
}

/// Whether a backend failure ends a whole run rather than one row or call
///
/// Exhausted retries, auth failures, unsupported capabilities and
/// cancellation stop the run; everything else is local to the item.
#[must_use]
pub fn is_run_terminating(error: &BackendError) -> bool {
    matches!(error, BackendError::RetriesExhausted { .. })
        || matches!(
            error.root(),
            BackendError::Auth(_)
                | BackendError::Unsupported { .. }
                | BackendError::Cancelled
                | BackendError::UnknownKind { .. }
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_backend::{BackendClients, BackendRegistry, QueryParams, RawResult};
    use scenario_test_utils::{registry_with_graph, FaultyGraph, Operation, QueuedGraphFactory};
    use serde_json::json;
    use std::time::Duration;

    fn access(registry: BackendRegistry) -> BackendAccess {
        let cache = BackendCache::new(Arc::new(registry), BackendClients::new());
        BackendAccess::new(
            Arc::new(cache),
            RetryPolicy::default().with_base_delay(Duration::from_millis(10)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_is_replaced_between_attempts() {
        let broken = Arc::new(FaultyGraph::over_mock());
        broken.fail_always(Operation::Execute, BackendError::ConnectionLost("reset".into()));
        let healthy = Arc::new(FaultyGraph::over_mock());
        let factory = Arc::new(QueuedGraphFactory::new(vec![
            broken.clone() as Arc<dyn GraphBackend>,
            healthy.clone(),
        ]));
        let access = access(registry_with_graph("flaky", factory.clone()));
        let ctx = ScenarioContext::for_scenario("telco", "flaky");

        let result = access
            .graph_call(&ctx, "query", &CancellationToken::new(), |g| async move {
                g.execute("count vertices", &QueryParams::new()).await
            })
            .await
            .unwrap();

        assert_eq!(result, RawResult::Scalars(vec![json!(0)]));
        assert_eq!(factory.connects(), 2);
        assert_eq!(broken.closes(), 1);
        assert_eq!(healthy.calls(Operation::Execute), 1);
    }

    #[test]
    fn terminating_errors() {
        let exhausted = BackendError::RetriesExhausted {
            attempts: 3,
            source: Box::new(BackendError::Throttled("429".into())),
        };
        assert!(is_run_terminating(&exhausted));
        assert!(is_run_terminating(&BackendError::Auth("403".into())));
        assert!(is_run_terminating(&BackendError::unsupported("mock", "x")));
        assert!(!is_run_terminating(&BackendError::InvalidRecord("no vertex".into())));
        assert!(!is_run_terminating(&BackendError::NotFound("c".into())));
    }
}
