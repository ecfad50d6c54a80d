//! In-memory property graph
//!
//! Vertices and edges are keyed by id and kept in insertion order.
//! Adjacency sets are maintained on every edge upsert so traversals never
//! scan the edge list.

use crate::error::{BackendError, BackendResult};
use crate::types::{
    EdgeRecord, ElementKind, EndpointRef, GraphElement, Properties, Topology, VertexRecord,
};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::collections::HashMap;

/// A stored vertex
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVertex {
    /// Label
    pub label: String,
    /// Properties, including the partition key property
    pub properties: Properties,
}

/// A stored edge
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    /// Label
    pub label: String,
    /// Outgoing vertex id
    pub out_v: String,
    /// Incoming vertex id
    pub in_v: String,
    /// Properties
    pub properties: Properties,
}

/// A labelled property graph
#[derive(Debug, Clone, Default)]
pub struct PropertyGraph {
    partition_key: String,
    vertex_labels: IndexSet<String>,
    edge_labels: IndexSet<String>,
    vertices: IndexMap<String, StoredVertex>,
    edges: IndexMap<String, StoredEdge>,
    out_edges: HashMap<String, IndexSet<String>>,
    in_edges: HashMap<String, IndexSet<String>>,
}

impl PropertyGraph {
    /// Create empty graph partitioned on `partition_key`
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            ..Self::default()
        }
    }

    /// Name of the partition key property
    #[inline]
    #[must_use]
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Record a vertex label in the schema; `false` if already declared
    pub fn declare_vertex_label(&mut self, label: &str) -> bool {
        self.vertex_labels.insert(label.to_string())
    }

    /// Record an edge label in the schema; `false` if already declared
    pub fn declare_edge_label(&mut self, label: &str) -> bool {
        self.edge_labels.insert(label.to_string())
    }

    /// Insert or replace a vertex
    ///
    /// Edges attached to the vertex survive a replace.
    pub fn upsert_vertex(&mut self, record: &VertexRecord) {
        let mut properties = record.properties.clone();
        properties.insert(
            self.partition_key.clone(),
            Value::String(record.partition_key.clone()),
        );
        self.vertices.insert(
            record.id.clone(),
            StoredVertex {
                label: record.label.clone(),
                properties,
            },
        );
    }

    /// Resolve an endpoint to a vertex id
    ///
    /// A vertex whose id equals the lookup value wins; otherwise the first
    /// vertex in insertion order whose property matches.
    ///
    /// # Errors
    /// Returns [`BackendError::InvalidRecord`] when nothing matches.
    pub fn resolve(&self, endpoint: &EndpointRef) -> BackendResult<String> {
        if let Some(vertex) = self.vertices.get(&endpoint.value) {
            if vertex.label == endpoint.label
                && vertex
                    .properties
                    .get(&endpoint.property)
                    .is_some_and(|v| value_text(v) == endpoint.value)
            {
                return Ok(endpoint.value.clone());
            }
        }
        self.vertices
            .iter()
            .find(|(_, v)| {
                v.label == endpoint.label
                    && v.properties
                        .get(&endpoint.property)
                        .is_some_and(|p| value_text(p) == endpoint.value)
            })
            .map(|(id, _)| id.clone())
            .ok_or_else(|| BackendError::InvalidRecord(format!("no vertex matches {endpoint}")))
    }

    /// Insert or replace an edge, resolving its endpoints
    ///
    /// # Errors
    /// Returns [`BackendError::InvalidRecord`] when an endpoint is missing.
    pub fn upsert_edge(&mut self, record: &EdgeRecord) -> BackendResult<()> {
        let out_v = self.resolve(&record.source)?;
        let in_v = self.resolve(&record.target)?;

        if let Some(previous) = self.edges.get(&record.id) {
            let (old_out, old_in) = (previous.out_v.clone(), previous.in_v.clone());
            if let Some(set) = self.out_edges.get_mut(&old_out) {
                set.shift_remove(&record.id);
            }
            if let Some(set) = self.in_edges.get_mut(&old_in) {
                set.shift_remove(&record.id);
            }
        }

        self.out_edges
            .entry(out_v.clone())
            .or_default()
            .insert(record.id.clone());
        self.in_edges
            .entry(in_v.clone())
            .or_default()
            .insert(record.id.clone());
        self.edges.insert(
            record.id.clone(),
            StoredEdge {
                label: record.label.clone(),
                out_v,
                in_v,
                properties: record.properties.clone(),
            },
        );
        Ok(())
    }

    /// Vertex by id
    #[must_use]
    pub fn vertex(&self, id: &str) -> Option<&StoredVertex> {
        self.vertices.get(id)
    }

    /// Edge by id
    #[must_use]
    pub fn edge(&self, id: &str) -> Option<&StoredEdge> {
        self.edges.get(id)
    }

    /// Vertex ids in insertion order
    pub fn vertex_ids(&self) -> impl Iterator<Item = &str> {
        self.vertices.keys().map(String::as_str)
    }

    /// Edge ids in insertion order
    pub fn edge_ids(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Ids of edges leaving `vertex`
    pub fn out_edge_ids(&self, vertex: &str) -> impl Iterator<Item = &str> {
        self.out_edges
            .get(vertex)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Ids of edges entering `vertex`
    pub fn in_edge_ids(&self, vertex: &str) -> impl Iterator<Item = &str> {
        self.in_edges
            .get(vertex)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Number of vertices
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Vertex as a result element
    #[must_use]
    pub fn vertex_element(&self, id: &str) -> Option<GraphElement> {
        let vertex = self.vertices.get(id)?;
        Some(GraphElement {
            id: id.to_string(),
            label: vertex.label.clone(),
            kind: ElementKind::Vertex,
            properties: listify(&vertex.properties),
        })
    }

    /// Edge as a result element
    #[must_use]
    pub fn edge_element(&self, id: &str) -> Option<GraphElement> {
        let edge = self.edges.get(id)?;
        Some(GraphElement {
            id: id.to_string(),
            label: edge.label.clone(),
            kind: ElementKind::Edge {
                out_v: edge.out_v.clone(),
                in_v: edge.in_v.clone(),
            },
            properties: listify(&edge.properties),
        })
    }

    /// Vertices with one of `labels` (all when empty) and edges between them
    #[must_use]
    pub fn topology(&self, labels: &[String]) -> Topology {
        let keep = |label: &str| labels.is_empty() || labels.iter().any(|l| l == label);
        let nodes: Vec<GraphElement> = self
            .vertices
            .iter()
            .filter(|(_, v)| keep(&v.label))
            .filter_map(|(id, _)| self.vertex_element(id))
            .collect();
        let kept: IndexSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let edges = self
            .edges
            .iter()
            .filter(|(_, e)| kept.contains(e.out_v.as_str()) && kept.contains(e.in_v.as_str()))
            .filter_map(|(id, _)| self.edge_element(id))
            .collect();
        Topology { nodes, edges }
    }
}

/// Text form used for endpoint and filter comparison
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn listify(properties: &Properties) -> IndexMap<String, Vec<Value>> {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), vec![v.clone()]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn router(id: &str) -> VertexRecord {
        VertexRecord::new(id, "Router", "net").with_property("RouterId", id)
    }

    fn link(src: &str, dst: &str) -> EdgeRecord {
        EdgeRecord {
            id: format!("connects_to:{src}->{dst}"),
            label: "connects_to".into(),
            source: EndpointRef::new("Router", "RouterId", src),
            target: EndpointRef::new("Router", "RouterId", dst),
            properties: Properties::new(),
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut graph = PropertyGraph::new("partitionKey");
        graph.upsert_vertex(&router("R1"));
        graph.upsert_vertex(&router("R2"));
        graph.upsert_edge(&link("R1", "R2")).unwrap();
        graph.upsert_vertex(&router("R1"));
        graph.upsert_edge(&link("R1", "R2")).unwrap();

        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.out_edge_ids("R1").count(), 1);
        assert_eq!(
            graph.vertex("R1").unwrap().properties.get("partitionKey"),
            Some(&json!("net"))
        );
    }

    #[test]
    fn unresolved_endpoint_is_rejected() {
        let mut graph = PropertyGraph::new("partitionKey");
        graph.upsert_vertex(&router("R1"));
        let err = graph.upsert_edge(&link("R1", "R9")).unwrap_err();
        assert!(err.to_string().contains("Router[RouterId=R9]"));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn resolve_by_non_id_property() {
        let mut graph = PropertyGraph::new("pk");
        graph.upsert_vertex(&router("R1").with_property("Hostname", "core-1"));
        let id = graph
            .resolve(&EndpointRef::new("Router", "Hostname", "core-1"))
            .unwrap();
        assert_eq!(id, "R1");
    }

    #[test]
    fn topology_filters_by_label_and_keeps_inner_edges() {
        let mut graph = PropertyGraph::new("pk");
        graph.upsert_vertex(&router("R1"));
        graph.upsert_vertex(&router("R2"));
        graph.upsert_vertex(&VertexRecord::new("S1", "Site", "net").with_property("SiteId", "S1"));
        graph.upsert_edge(&link("R1", "R2")).unwrap();

        let all = graph.topology(&[]);
        assert_eq!((all.nodes.len(), all.edges.len()), (3, 1));

        let sites = graph.topology(&["Site".to_string()]);
        assert_eq!((sites.nodes.len(), sites.edges.len()), (1, 0));
    }

    #[test]
    fn schema_labels_report_first_declaration() {
        let mut graph = PropertyGraph::new("pk");
        assert!(graph.declare_vertex_label("Router"));
        assert!(!graph.declare_vertex_label("Router"));
        assert!(graph.declare_edge_label("connects_to"));
    }
}
