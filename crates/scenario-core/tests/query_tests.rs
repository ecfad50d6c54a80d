use pretty_assertions::assert_eq;
use scenario_backend::{QueryParams, TopologyRequest};
use scenario_core::prelude::*;
use scenario_core::{ColumnType, QueryResponse};
use scenario_test_utils::router_scenario;
use serde_json::json;

async fn loaded(config: PlatformConfig) -> Platform {
    let platform = Platform::new(config).unwrap();
    let fixture = router_scenario();
    let job = IngestJob::new("telco-noc", fixture.manifest(), fixture.root());
    platform.ingest(job, &CancellationToken::new()).await.unwrap();
    platform
}

#[tokio::test]
async fn gremlin_elements_normalize_to_columns() {
    let platform = loaded(PlatformConfig::new().with_graph_backend("graph")).await;

    let response = platform
        .query(
            "telco-noc-topology",
            QueryRequest::new("g.V().has('City', city)").with_param("city", "Sydney"),
        )
        .await;

    let table = response.table().unwrap();
    assert_eq!(table.column_names(), vec!["id", "label", "RouterId", "City", "partitionKey"]);
    assert_eq!(table.rows[0]["id"], json!("R1"));
    assert_eq!(table.rows[0]["label"], json!("Router"));
    assert!(table.columns.iter().all(|c| c.kind == ColumnType::String));
}

#[tokio::test]
async fn edges_carry_endpoint_columns() {
    let platform = loaded(PlatformConfig::new().with_graph_backend("graph")).await;

    let response = platform
        .query("telco-noc-topology", QueryRequest::new("g.E().hasLabel('connects_to')"))
        .await;

    let table = response.table().unwrap();
    assert_eq!(table.rows[0]["id"], json!("connects_to:R1->R2"));
    assert_eq!(table.rows[0]["out_v"], json!("R1"));
    assert_eq!(table.rows[0]["in_v"], json!("R2"));
}

#[tokio::test]
async fn unsupported_steps_come_back_as_error_body() {
    let platform = loaded(PlatformConfig::new().with_graph_backend("graph")).await;

    let response = platform
        .query("telco-noc-topology", QueryRequest::new("g.V().repeat(out())"))
        .await;

    let error = response.error().unwrap();
    assert!(error.contains("does not support traversal step 'repeat'"), "{error}");
    assert_eq!(serde_json::to_value(&response).unwrap(), json!({ "error": error }));
}

#[tokio::test]
async fn request_body_round_trips_through_json() {
    let platform = loaded(PlatformConfig::new()).await;
    let request: QueryRequest = serde_json::from_value(json!({
        "query": "vertex $id",
        "kwargs": {"id": "R2"},
    }))
    .unwrap();

    let body = serde_json::to_value(platform.query("telco-noc-topology", request).await).unwrap();

    assert_eq!(body["columns"][0], json!({"name": "id", "type": "string"}));
    assert_eq!(body["rows"][0]["City"], json!("Melbourne"));
    let back: QueryResponse = serde_json::from_value(body).unwrap();
    assert!(back.table().is_some());
}

#[tokio::test]
async fn documents_are_queried_in_the_scenario_scope() {
    let platform = loaded(PlatformConfig::new()).await;
    let ctx = platform.executor().resolve("telco-noc-topology");
    assert_eq!(ctx.container("Alerts"), "telco-noc-Alerts");

    let mut params = QueryParams::new();
    params.insert("sev".into(), json!(2));
    let table = platform
        .executor()
        .query_documents(
            &ctx,
            "Alerts",
            "SELECT c.AlertId, c.Severity FROM c WHERE c.Severity > @sev",
            &params,
        )
        .await
        .unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(table.rows[0]["AlertId"], json!("A1"));
    assert_eq!(table.rows[0]["Severity"], json!(3));
    assert_eq!(table.columns[1].kind, ColumnType::Integer);
}

#[tokio::test]
async fn other_scopes_see_nothing() {
    let platform = loaded(PlatformConfig::new()).await;
    let other = platform.executor().resolve("telco-lab-topology");

    let result = platform
        .executor()
        .execute(&other, "count vertices", &QueryParams::new())
        .await
        .unwrap();
    assert_eq!(result.single_value(), Some(&json!(0)));
}

#[tokio::test]
async fn topology_filters_by_label() -> anyhow::Result<()> {
    let platform = loaded(PlatformConfig::new().with_graph_backend("graph")).await;
    let ctx = platform.executor().resolve("telco-noc-topology");

    let all = platform
        .executor()
        .topology(&ctx, &TopologyRequest::default())
        .await?;
    assert_eq!((all.nodes.len(), all.edges.len()), (2, 1));

    let scoped = platform
        .executor()
        .topology(
            &ctx,
            &TopologyRequest {
                vertex_labels: vec![],
                query: Some("g.V().has('City', 'Sydney')".into()),
            },
        )
        .await?;
    assert_eq!(scoped.nodes.len(), 1);
    assert!(scoped.edges.is_empty());
    Ok(())
}
