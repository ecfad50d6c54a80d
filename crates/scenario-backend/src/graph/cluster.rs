//! `graph` kind: Gremlin over the shared in-memory cluster
//!
//! Handles are thin: they name a graph in the [`MemoryCluster`] and carry a
//! closed flag. Data lives in the cluster, so a replacement handle sees
//! everything its predecessor wrote. This backend owns a control plane and
//! creates graphs and schema labels on request.

use crate::clients::BackendClients;
use crate::error::{BackendError, BackendResult, RegistryError};
use crate::graph::gremlin;
use crate::memory::{MemoryCluster, SharedGraph};
use crate::registry::BackendRegistry;
use crate::traits::{BackendHandle, ConnectTarget, GraphBackend, GraphBackendFactory, Provisioner};
use crate::types::{
    EdgeRecord, GraphElement, ProvisionOutcome, QueryParams, RawResult, ResourceSpec, Topology,
    TopologyRequest, VertexRecord,
};
use async_trait::async_trait;
use indexmap::IndexSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Registered kind
pub const KIND: &str = "graph";

/// Handle bound to one graph in the cluster
#[derive(Debug)]
pub struct ClusterGraphBackend {
    graph_name: String,
    cluster: Arc<MemoryCluster>,
    closed: AtomicBool,
}

impl ClusterGraphBackend {
    /// Bind to `graph_name`; the graph need not exist yet
    pub fn new(cluster: Arc<MemoryCluster>, graph_name: impl Into<String>) -> Self {
        Self {
            graph_name: graph_name.into(),
            cluster,
            closed: AtomicBool::new(false),
        }
    }

    /// Bound graph name
    #[inline]
    #[must_use]
    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    fn graph(&self) -> BackendResult<SharedGraph> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::ConnectionLost(format!(
                "handle for '{}' is closed",
                self.graph_name
            )));
        }
        self.cluster.graph(&self.graph_name)
    }
}

#[async_trait]
impl BackendHandle for ClusterGraphBackend {
    fn kind(&self) -> &str {
        KIND
    }

    async fn close(&self) -> BackendResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl GraphBackend for ClusterGraphBackend {
    async fn upsert_vertex(&self, vertex: &VertexRecord) -> BackendResult<()> {
        self.graph()?.write().upsert_vertex(vertex);
        Ok(())
    }

    async fn upsert_edge(&self, edge: &EdgeRecord) -> BackendResult<()> {
        self.graph()?.write().upsert_edge(edge)
    }

    async fn execute(&self, query: &str, params: &QueryParams) -> BackendResult<RawResult> {
        let traversal = gremlin::parse(query)?;
        let graph = self.graph()?;
        let guard = graph.read();
        gremlin::evaluate(&traversal, &guard, params)
    }

    async fn topology(&self, request: &TopologyRequest) -> BackendResult<Topology> {
        let graph = self.graph()?;
        let guard = graph.read();
        let Some(query) = &request.query else {
            return Ok(guard.topology(&request.vertex_labels));
        };

        let RawResult::Elements(elements) = gremlin::run(query, &guard, &QueryParams::new())? else {
            return Err(BackendError::InvalidQuery(
                "topology query must return vertices".into(),
            ));
        };
        let nodes: Vec<GraphElement> = elements
            .into_iter()
            .filter(|e| !e.is_edge())
            .filter(|e| {
                request.vertex_labels.is_empty() || request.vertex_labels.contains(&e.label)
            })
            .collect();
        let kept: IndexSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let edges = guard
            .edge_ids()
            .filter(|id| {
                guard.edge(id).is_some_and(|e| {
                    kept.contains(e.out_v.as_str()) && kept.contains(e.in_v.as_str())
                })
            })
            .filter_map(|id| guard.edge_element(id))
            .collect();
        Ok(Topology { nodes, edges })
    }

    fn provisioner(&self) -> Option<&dyn Provisioner> {
        Some(self)
    }
}

#[async_trait]
impl Provisioner for ClusterGraphBackend {
    async fn ensure_exists(&self, spec: &ResourceSpec) -> BackendResult<ProvisionOutcome> {
        match spec {
            ResourceSpec::Graph {
                name,
                partition_key,
            } => self.cluster.create_graph(name, partition_key)?,
            ResourceSpec::VertexLabel { graph, label } => {
                if !self.cluster.graph(graph)?.write().declare_vertex_label(label) {
                    return Err(BackendError::Conflict(spec.to_string()));
                }
            }
            ResourceSpec::EdgeLabel { graph, label } => {
                if !self.cluster.graph(graph)?.write().declare_edge_label(label) {
                    return Err(BackendError::Conflict(spec.to_string()));
                }
            }
            ResourceSpec::Container { .. } => {
                return Err(BackendError::unsupported(KIND, "document containers"));
            }
        }
        tracing::info!(resource = %spec, "provisioned");
        Ok(ProvisionOutcome::Created)
    }
}

/// Factory for [`ClusterGraphBackend`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ClusterGraphFactory;

#[async_trait]
impl GraphBackendFactory for ClusterGraphFactory {
    async fn connect(
        &self,
        target: &ConnectTarget,
        clients: &BackendClients,
    ) -> BackendResult<Arc<dyn GraphBackend>> {
        tracing::debug!(graph = %target.resource, "opening graph handle");
        Ok(Arc::new(ClusterGraphBackend::new(
            Arc::clone(clients.cluster()),
            target.resource.clone(),
        )))
    }
}

/// Register this kind
///
/// # Errors
/// Fails if the kind is already registered.
pub fn register(registry: &mut BackendRegistry) -> Result<(), RegistryError> {
    registry.register_graph(KIND, Arc::new(ClusterGraphFactory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ensure_exists;
    use crate::types::{EndpointRef, Properties};
    use serde_json::json;

    async fn provisioned() -> ClusterGraphBackend {
        let backend = ClusterGraphBackend::new(Arc::new(MemoryCluster::new()), "telco-topology");
        let spec = ResourceSpec::Graph {
            name: "telco-topology".into(),
            partition_key: "partitionKey".into(),
        };
        ensure_exists(&backend, &spec).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn writes_before_provisioning_are_not_found() {
        let backend = ClusterGraphBackend::new(Arc::new(MemoryCluster::new()), "x-topology");
        let err = backend
            .upsert_vertex(&VertexRecord::new("R1", "Router", "net"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn provisioning_twice_is_idempotent() {
        let backend = provisioned().await;
        let again = ensure_exists(
            &backend,
            &ResourceSpec::Graph {
                name: "telco-topology".into(),
                partition_key: "partitionKey".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(again, ProvisionOutcome::AlreadyExists);

        let label = ResourceSpec::VertexLabel {
            graph: "telco-topology".into(),
            label: "Router".into(),
        };
        assert_eq!(ensure_exists(&backend, &label).await.unwrap(), ProvisionOutcome::Created);
        assert_eq!(
            ensure_exists(&backend, &label).await.unwrap(),
            ProvisionOutcome::AlreadyExists
        );
    }

    #[tokio::test]
    async fn upsert_then_query() {
        let backend = provisioned().await;
        for id in ["R1", "R2"] {
            backend
                .upsert_vertex(&VertexRecord::new(id, "Router", "net").with_property("RouterId", id))
                .await
                .unwrap();
        }
        backend
            .upsert_edge(&EdgeRecord {
                id: "connects_to:R1->R2".into(),
                label: "connects_to".into(),
                source: EndpointRef::new("Router", "RouterId", "R1"),
                target: EndpointRef::new("Router", "RouterId", "R2"),
                properties: Properties::new(),
            })
            .await
            .unwrap();

        let count = backend
            .execute("g.V().hasLabel('Router').count()", &QueryParams::new())
            .await
            .unwrap();
        assert_eq!(count, RawResult::Scalars(vec![json!(2)]));

        let scoped = backend
            .topology(&TopologyRequest {
                vertex_labels: vec![],
                query: Some("g.V('R1')".into()),
            })
            .await
            .unwrap();
        assert_eq!((scoped.nodes.len(), scoped.edges.len()), (1, 0));
    }

    #[tokio::test]
    async fn closed_handle_reports_connection_lost() {
        let backend = provisioned().await;
        backend.close().await.unwrap();
        let err = backend
            .execute("g.V().count()", &QueryParams::new())
            .await
            .unwrap_err();
        assert!(err.is_connection_lost());
    }
}
