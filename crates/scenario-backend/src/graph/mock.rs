//! `mock` kind: phrase queries over a factory-local graph
//!
//! Used by tests and demos. Graphs live inside the factory, one per bound
//! resource, and are created on connect. There is no control plane, and
//! topology reads accept a label filter but not a scoping query.

use crate::clients::BackendClients;
use crate::error::{BackendError, BackendResult, RegistryError};
use crate::graph::phrase;
use crate::memory::{PropertyGraph, SharedGraph};
use crate::registry::BackendRegistry;
use crate::traits::{BackendHandle, ConnectTarget, GraphBackend, GraphBackendFactory};
use crate::types::{EdgeRecord, QueryParams, RawResult, Topology, TopologyRequest, VertexRecord};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Registered kind
pub const KIND: &str = "mock";

/// Partition key property used by mock graphs
pub const PARTITION_KEY: &str = "partitionKey";

/// Mock handle
#[derive(Debug)]
pub struct MockGraphBackend {
    graph: SharedGraph,
}

impl MockGraphBackend {
    /// Wrap a graph
    #[must_use]
    pub fn new(graph: SharedGraph) -> Self {
        Self { graph }
    }

    /// Standalone handle over an empty graph
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Arc::new(RwLock::new(PropertyGraph::new(PARTITION_KEY))))
    }
}

#[async_trait]
impl BackendHandle for MockGraphBackend {
    fn kind(&self) -> &str {
        KIND
    }

    async fn close(&self) -> BackendResult<()> {
        Ok(())
    }
}

#[async_trait]
impl GraphBackend for MockGraphBackend {
    async fn upsert_vertex(&self, vertex: &VertexRecord) -> BackendResult<()> {
        self.graph.write().upsert_vertex(vertex);
        Ok(())
    }

    async fn upsert_edge(&self, edge: &EdgeRecord) -> BackendResult<()> {
        self.graph.write().upsert_edge(edge)
    }

    async fn execute(&self, query: &str, params: &QueryParams) -> BackendResult<RawResult> {
        phrase::run(query, &self.graph.read(), params)
    }

    async fn topology(&self, request: &TopologyRequest) -> BackendResult<Topology> {
        if request.query.is_some() {
            return Err(BackendError::unsupported(KIND, "query-scoped topology"));
        }
        Ok(self.graph.read().topology(&request.vertex_labels))
    }
}

/// Factory for [`MockGraphBackend`]; keeps graphs across reconnects
#[derive(Debug, Default)]
pub struct MockGraphFactory {
    graphs: Mutex<HashMap<String, SharedGraph>>,
}

impl MockGraphFactory {
    /// Create factory with no graphs
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphBackendFactory for MockGraphFactory {
    async fn connect(
        &self,
        target: &ConnectTarget,
        _clients: &BackendClients,
    ) -> BackendResult<Arc<dyn GraphBackend>> {
        let graph = Arc::clone(
            self.graphs
                .lock()
                .entry(target.resource.clone())
                .or_insert_with(|| Arc::new(RwLock::new(PropertyGraph::new(PARTITION_KEY)))),
        );
        Ok(Arc::new(MockGraphBackend::new(graph)))
    }
}

/// Register this kind
///
/// # Errors
/// Fails if the kind is already registered.
pub fn register(registry: &mut BackendRegistry) -> Result<(), RegistryError> {
    registry.register_graph(KIND, Arc::new(MockGraphFactory::new()))
}
