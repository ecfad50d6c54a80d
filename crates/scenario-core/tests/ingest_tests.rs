use pretty_assertions::assert_eq;
use scenario_backend::{BackendError, GraphBackend, QueryParams, RetryPolicy};
use scenario_core::prelude::*;
use scenario_core::{IngestError, ProvisionSummary, RowFailure};
use scenario_test_utils::{
    registry_with_graph, router_scenario, FaultyGraph, Operation, QueuedGraphFactory,
    ScenarioFixture, ROUTER_MANIFEST,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn platform() -> Platform {
    Platform::new(PlatformConfig::new()).unwrap()
}

/// Platform whose `faulty` graph kind always hands out `graph`
fn faulty_platform(graph: &Arc<FaultyGraph>, retry: RetryPolicy) -> Platform {
    let handle: Arc<dyn GraphBackend> = graph.clone();
    let registry = registry_with_graph("faulty", Arc::new(QueuedGraphFactory::new(vec![handle])));
    let config = PlatformConfig::new()
        .with_graph_backend("faulty")
        .with_retry(retry);
    Platform::with_registry(config, registry).unwrap()
}

fn job(fixture: &ScenarioFixture) -> IngestJob {
    IngestJob::new("telco-noc", fixture.manifest(), fixture.root())
}

async fn count(platform: &Platform, query: &str) -> serde_json::Value {
    let response = platform
        .query("telco-noc-topology", QueryRequest::new(query))
        .await;
    response.table().and_then(NormalizedResult::single_value).cloned().unwrap()
}

#[tokio::test]
async fn router_scenario_loads_end_to_end() {
    let platform = platform();
    let fixture = router_scenario();

    let result = platform.ingest(job(&fixture), &CancellationToken::new()).await.unwrap();

    assert_eq!(result.state, IngestState::Complete);
    assert_eq!((result.vertices, result.edges, result.documents), (2, 1, 2));
    assert!(result.is_clean());
    assert_eq!(result.graph_name, "telco-noc-topology");
    assert_eq!(
        result.provisioning,
        ProvisionSummary {
            created: 1,
            already_existed: 0,
            skipped: 1,
        }
    );
    assert_eq!(count(&platform, "count vertices labeled Router").await, json!(2));
    assert_eq!(count(&platform, "count edges labeled connects_to").await, json!(1));
    assert!(platform.catalog().lookup("telco-noc-topology").is_some());
}

#[tokio::test]
async fn reingesting_overwrites_instead_of_duplicating() {
    let platform = Platform::new(PlatformConfig::new().with_graph_backend("graph")).unwrap();
    let fixture = router_scenario();

    let first = platform.ingest(job(&fixture), &CancellationToken::new()).await.unwrap();
    let second = platform.ingest(job(&fixture), &CancellationToken::new()).await.unwrap();

    assert_eq!(first.provisioning.created, 4);
    assert_eq!(second.provisioning.created, 0);
    assert_eq!(second.provisioning.already_existed, 4);
    assert_eq!(
        (second.vertices, second.edges, second.documents),
        (first.vertices, first.edges, first.documents)
    );
    assert_eq!(count(&platform, "g.V().count()").await, json!(2));
    assert_eq!(count(&platform, "g.E().count()").await, json!(1));

    let ctx = platform.executor().resolve("telco-noc-topology");
    let alerts = platform
        .executor()
        .query_documents(&ctx, "Alerts", "SELECT VALUE COUNT(1) FROM c", &QueryParams::new())
        .await
        .unwrap();
    assert_eq!(alerts.single_value(), Some(&json!(2)));
}

#[tokio::test]
async fn unmappable_rows_are_recorded_and_skipped() {
    let platform = platform();
    let fixture = ScenarioFixture::new(ROUTER_MANIFEST)
        .with_file("routers.csv", "RouterId,City\nR1,Sydney\nR2,\nR3,Perth\n")
        .with_file("links.csv", "From,To\nR1,R3\n")
        .with_file("alerts.csv", "AlertId,RouterId,Severity\nA1,R1,3\nA2,R3,high\n");

    let result = platform.ingest(job(&fixture), &CancellationToken::new()).await.unwrap();

    assert_eq!(result.state, IngestState::Complete);
    assert_eq!((result.vertices, result.edges, result.documents), (2, 1, 1));
    assert_eq!(result.failures.len(), 2);
    assert_eq!(result.failures[0].row, 1);
    assert_eq!(result.failures[0].file, "routers.csv");
    assert!(result.failures[0].reason.contains("City"), "{}", result.failures[0].reason);
    assert_eq!(result.failures[1].row, 1);
    assert_eq!(result.failures[1].file, "alerts.csv");
    assert!(!result.is_clean());
}

#[tokio::test]
async fn edge_to_missing_vertex_fails_only_that_row() {
    let platform = platform();
    let fixture = ScenarioFixture::new(ROUTER_MANIFEST)
        .with_file("routers.csv", "RouterId,City\nR1,Sydney\nR2,Melbourne\n")
        .with_file("links.csv", "From,To\nR1,R9\nR1,R2\n")
        .with_file("alerts.csv", "AlertId,RouterId,Severity\n");

    let result = platform.ingest(job(&fixture), &CancellationToken::new()).await.unwrap();

    assert_eq!(result.edges, 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!((result.failures[0].row, result.failures[0].file.as_str()), (0, "links.csv"));
}

const FILTERED_MANIFEST: &str = r"
data_dir: data
vertices:
  - label: Router
    csv_file: routers.csv
    id_column: RouterId
    partition_key: network
    properties: [RouterId]
edges:
  - label: core_link
    csv_file: links.csv
    source: {label: Router, property: RouterId, column: From}
    target: {label: Router, property: RouterId, column: To}
    filter: {column: Type, value: core}
  - label: access_link
    csv_file: links.csv
    source: {label: Router, property: RouterId, column: From}
    target: {label: Router, property: RouterId, column: To}
    filter: {column: Type, value: core, negate: true}
";

#[tokio::test]
async fn row_filters_split_one_file_across_edge_types() {
    let platform = platform();
    let fixture = ScenarioFixture::new(FILTERED_MANIFEST)
        .with_file("routers.csv", "RouterId\nR1\nR2\nR3\n")
        .with_file("links.csv", "From,To,Type\nR1,R2,core\nR2,R3,access\nR3,R1,\n");

    let result = platform.ingest(job(&fixture), &CancellationToken::new()).await.unwrap();

    assert_eq!(result.edges, 3);
    assert_eq!(result.filtered, 3);
    assert!(result.failures.is_empty());
    assert_eq!(count(&platform, "count edges labeled core_link").await, json!(1));
    assert_eq!(count(&platform, "count edges labeled access_link").await, json!(2));
}

#[tokio::test]
async fn invalid_manifest_fails_before_any_write() {
    let platform = platform();
    let fixture = ScenarioFixture::new(ROUTER_MANIFEST)
        .with_file("routers.csv", "RouterId,Town\nR1,Sydney\n")
        .with_file("links.csv", "From,To\nR1,R1\n")
        .with_file("alerts.csv", "AlertId,RouterId,Severity\n");

    let failure = platform
        .ingest(job(&fixture), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, IngestError::Manifest(_)), "{failure}");
    assert_eq!(failure.partial.state, IngestState::Failed);
    assert_eq!(failure.partial.written(), 0);
    assert!(platform.catalog().is_empty());
}

#[tokio::test]
async fn invalid_scenario_id_is_rejected() {
    let platform = platform();
    let fixture = router_scenario();

    let failure = platform
        .ingest(IngestJob::new("Telco NOC", fixture.manifest(), fixture.root()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, IngestError::Naming(_)), "{failure}");
}

#[tokio::test]
async fn cancelled_token_stops_before_provisioning() {
    let platform = platform();
    let fixture = router_scenario();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = platform.ingest(job(&fixture), &cancel).await.unwrap();

    assert_eq!(result.state, IngestState::Cancelled);
    assert_eq!(result.written(), 0);
    assert_eq!(result.provisioning, ProvisionSummary::default());
}

#[tokio::test(start_paused = true)]
async fn throttling_past_the_budget_fails_the_run() {
    let graph = Arc::new(FaultyGraph::over_mock());
    graph.fail_always(Operation::UpsertVertex, BackendError::Throttled("429".into()));
    let retry = RetryPolicy::default()
        .with_max_attempts(3)
        .with_base_delay(Duration::from_secs(1));
    let platform = faulty_platform(&graph, retry);
    let fixture = router_scenario();

    let started = tokio::time::Instant::now();
    let failure = platform
        .ingest(job(&fixture), &CancellationToken::new())
        .await
        .unwrap_err();
    let waited = started.elapsed();

    assert!(
        matches!(failure.error, IngestError::Backend(BackendError::RetriesExhausted { attempts: 3, .. })),
        "{failure}"
    );
    assert_eq!(graph.calls(Operation::UpsertVertex), 3);
    assert_eq!(failure.partial.state, IngestState::Failed);
    assert_eq!(failure.partial.vertices, 0);
    // 1s after the first failure, 2s after the second, none after the last
    assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn transient_failures_within_budget_are_absorbed() {
    let graph = Arc::new(FaultyGraph::over_mock());
    graph
        .fail_next(Operation::UpsertVertex, BackendError::Timeout("408".into()))
        .fail_next(Operation::UpsertVertex, BackendError::Throttled("429".into()));
    let platform = faulty_platform(&graph, RetryPolicy::default());
    let fixture = router_scenario();

    let result = platform.ingest(job(&fixture), &CancellationToken::new()).await.unwrap();

    assert!(result.is_clean());
    assert_eq!(result.vertices, 2);
    assert_eq!(graph.calls(Operation::UpsertVertex), 4);
}

#[tokio::test]
async fn auth_failure_ends_the_run_with_partial_counts() {
    let graph = Arc::new(FaultyGraph::over_mock());
    graph.fail_record("R2", BackendError::Auth("403".into()));
    let platform = faulty_platform(&graph, RetryPolicy::no_retry());
    let fixture = router_scenario();

    let failure = platform
        .ingest(job(&fixture), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.partial.vertices, 1);
    assert_eq!(failure.partial.edges, 0);
    assert!(failure.to_string().contains("authentication failed"), "{failure}");
}

#[tokio::test]
async fn rejected_record_is_a_row_failure() {
    let graph = Arc::new(FaultyGraph::over_mock());
    graph.fail_record("R1", BackendError::InvalidRecord("bad partition".into()));
    let platform = faulty_platform(&graph, RetryPolicy::no_retry());
    let fixture = router_scenario();

    let result = platform.ingest(job(&fixture), &CancellationToken::new()).await.unwrap();

    assert_eq!(result.state, IngestState::Complete);
    assert_eq!(result.vertices, 1);
    // the only link starts at R1, which was never written
    assert_eq!(result.edges, 0);
    assert_eq!(
        result.failures.iter().map(|f| (f.row, f.file.as_str())).collect::<Vec<_>>(),
        vec![(0, "routers.csv"), (0, "links.csv")]
    );
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_backoff_stops_the_run() {
    let graph = Arc::new(FaultyGraph::over_mock());
    graph.fail_always(Operation::UpsertVertex, BackendError::Throttled("429".into()));
    let retry = RetryPolicy::default()
        .with_max_attempts(5)
        .with_base_delay(Duration::from_secs(10))
        .with_max_delay(Duration::from_secs(60));
    let platform = faulty_platform(&graph, retry);
    let fixture = router_scenario();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.cancel();
    });
    let result = platform.ingest(job(&fixture), &cancel).await.unwrap();

    assert_eq!(result.state, IngestState::Cancelled);
    assert_eq!(graph.calls(Operation::UpsertVertex), 2);
}

#[tokio::test]
async fn started_run_streams_phases_then_result() {
    let platform = platform();
    let fixture = router_scenario();

    let (events, outcome) = platform
        .start(job(&fixture), CancellationToken::new())
        .collect()
        .await
        .unwrap();
    let result = outcome.unwrap();

    let mut phases: Vec<IngestState> = events
        .iter()
        .filter_map(|e| match e {
            IngestEvent::Progress { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect();
    phases.dedup();
    assert_eq!(
        phases,
        vec![
            IngestState::Validating,
            IngestState::Provisioning,
            IngestState::WritingVertices,
            IngestState::WritingEdges,
            IngestState::WritingDocuments,
            IngestState::Complete,
        ]
    );

    let (last, rest) = events.split_last().unwrap();
    assert_eq!(last, &IngestEvent::Result { result });
    assert!(rest.iter().all(|e| !e.is_terminal()));
    assert!(matches!(
        rest.last(),
        Some(IngestEvent::Progress { percent: 100, .. })
    ));
}

#[tokio::test]
async fn failed_run_streams_error_event() {
    let graph = Arc::new(FaultyGraph::over_mock());
    graph.fail_always(Operation::UpsertEdge, BackendError::Auth("expired".into()));
    let platform = faulty_platform(&graph, RetryPolicy::no_retry());
    let fixture = router_scenario();

    let (events, outcome) = platform
        .start(job(&fixture), CancellationToken::new())
        .collect()
        .await
        .unwrap();

    let failure = outcome.unwrap_err();
    match events.last() {
        Some(IngestEvent::Error { message, partial }) => {
            assert!(message.contains("expired"), "{message}");
            assert_eq!(partial.vertices, 2);
            assert_eq!(partial, &failure.partial);
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

#[test]
fn row_failures_serialize_flat() {
    let value = serde_json::to_value(RowFailure::new(3, "routers.csv", "missing value for column 'City'")).unwrap();
    assert_eq!(
        value,
        json!({"row": 3, "file": "routers.csv", "reason": "missing value for column 'City'"})
    );
}
