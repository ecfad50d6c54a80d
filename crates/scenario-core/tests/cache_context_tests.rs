use async_trait::async_trait;
use mockall::{mock, Sequence};
use pretty_assertions::assert_eq;
use scenario_backend::graph::{MockGraphBackend, MockGraphFactory};
use scenario_backend::{
    BackendCache, BackendClients, BackendError, BackendResult, ConnectTarget, GraphBackend,
    GraphBackendFactory, QueryParams, RetryPolicy, VertexRecord,
};
use scenario_core::prelude::*;
use scenario_core::{BackendAccess, ContextResolver, QueryExecutor, ScenarioCatalog};
use scenario_test_utils::{registry_with_graph, router_scenario, CountingGraphFactory, FaultyGraph, Operation};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

mock! {
    Factory {}

    #[async_trait]
    impl GraphBackendFactory for Factory {
        async fn connect(
            &self,
            target: &ConnectTarget,
            clients: &BackendClients,
        ) -> BackendResult<Arc<dyn GraphBackend>>;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_use_connects_once() {
    let factory = Arc::new(
        CountingGraphFactory::new(Arc::new(MockGraphFactory::new())).with_delay(Duration::from_millis(50)),
    );
    let registry = registry_with_graph("counting", factory.clone());
    let cache = Arc::new(BackendCache::new(Arc::new(registry), BackendClients::new()));
    let target = ConnectTarget::new("telco-noc", "telco-noc-topology");

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let target = target.clone();
            tokio::spawn(async move { cache.graph("counting", &target).await })
        })
        .collect();
    let handles: Vec<Arc<dyn GraphBackend>> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(factory.connects(), 1);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
}

#[tokio::test]
async fn scopes_get_their_own_handles() {
    let factory = Arc::new(CountingGraphFactory::new(Arc::new(MockGraphFactory::new())));
    let registry = registry_with_graph("counting", factory.clone());
    let cache = BackendCache::new(Arc::new(registry), BackendClients::new());

    let noc = cache
        .graph("counting", &ConnectTarget::new("telco-noc", "telco-noc-topology"))
        .await
        .unwrap();
    let lab = cache
        .graph("counting", &ConnectTarget::new("telco-lab", "telco-lab-topology"))
        .await
        .unwrap();
    let again = cache
        .graph("counting", &ConnectTarget::new("telco-noc", "telco-noc-topology"))
        .await
        .unwrap();

    assert_eq!(factory.connects(), 2);
    assert!(!Arc::ptr_eq(&noc, &lab));
    assert!(Arc::ptr_eq(&noc, &again));
}

#[tokio::test]
async fn lost_connection_is_replaced_on_retry() {
    let broken = Arc::new(FaultyGraph::over_mock());
    broken.fail_always(Operation::Execute, BackendError::ConnectionLost("socket closed".into()));
    let healthy = MockGraphBackend::empty();
    healthy
        .upsert_vertex(&VertexRecord::new("R1", "Router", "net"))
        .await
        .unwrap();

    let mut factory = MockFactory::new();
    let mut seq = Sequence::new();
    let first: Arc<dyn GraphBackend> = broken.clone();
    let second: Arc<dyn GraphBackend> = Arc::new(healthy);
    factory
        .expect_connect()
        .times(1)
        .in_sequence(&mut seq)
        .return_once(move |_, _| Ok(first));
    factory
        .expect_connect()
        .times(1)
        .in_sequence(&mut seq)
        .return_once(move |_, _| Ok(second));

    let registry = registry_with_graph("scripted", Arc::new(factory));
    let cache = Arc::new(BackendCache::new(Arc::new(registry), BackendClients::new()));
    let retry = RetryPolicy::default().with_base_delay(Duration::from_millis(1));
    let access = Arc::new(BackendAccess::new(cache, retry));
    let resolver = ContextResolver::new(Arc::new(ScenarioCatalog::new()), "default");
    let executor = QueryExecutor::new(access, resolver, "scripted", "memory");

    let ctx = executor.resolve("telco-noc-topology");
    let result = executor
        .execute(&ctx, "count vertices", &QueryParams::new())
        .await
        .unwrap();

    assert_eq!(result.single_value(), Some(&json!(1)));
    assert_eq!(broken.calls(Operation::Execute), 1);
    assert_eq!(broken.closes(), 1);
}

#[tokio::test]
async fn identifiers_resolve_without_a_catalog_entry() {
    let platform = Platform::new(PlatformConfig::new().with_fallback_scope("shared")).unwrap();

    let scoped = platform.executor().resolve("telco-noc-topology");
    assert_eq!(scoped.scenario_id, "telco-noc");
    assert_eq!(scoped.graph_name, "telco-noc-topology");
    assert_eq!(scoped.dataset_scope_prefix, "telco-noc");
    assert_eq!(scoped.backend_kind, "mock");

    let bare = platform.executor().resolve("legacy");
    assert_eq!(bare.scenario_id, "legacy");
    assert_eq!(bare.graph_name, "legacy");
    assert_eq!(bare.dataset_scope_prefix, "shared");
    assert_eq!(bare.container("Alerts"), "shared-Alerts");
}

#[tokio::test]
async fn ingested_scenarios_resolve_to_their_backend() {
    let platform = Platform::new(PlatformConfig::new()).unwrap();
    let fixture = router_scenario();
    let job = IngestJob::new("telco-noc", fixture.manifest(), fixture.root()).with_graph_kind("graph");
    platform.ingest(job, &CancellationToken::new()).await.unwrap();

    let ctx = platform.executor().resolve("telco-noc-topology");
    assert_eq!(ctx.backend_kind, "graph");

    let response = platform
        .query("telco-noc-topology", QueryRequest::new("g.V().hasLabel('Router').count()"))
        .await;
    assert_eq!(response.table().and_then(NormalizedResult::single_value), Some(&json!(2)));
}

#[tokio::test]
async fn shutdown_closes_every_handle() {
    let platform = Platform::new(PlatformConfig::new()).unwrap();
    let fixture = router_scenario();
    let job = IngestJob::new("telco-noc", fixture.manifest(), fixture.root());
    platform.ingest(job, &CancellationToken::new()).await.unwrap();
    assert_eq!(platform.cache().live_count().await, 2);

    let report = platform.shutdown().await;

    assert_eq!(report.closed, 2);
    assert!(report.failed.is_empty());
    assert_eq!(platform.cache().live_count().await, 0);
}
