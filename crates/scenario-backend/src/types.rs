//! Records, results and provisioning types exchanged with backends

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named query parameters, bound into query text by the backend
pub type QueryParams = Map<String, Value>;

/// Property bag in insertion order
pub type Properties = IndexMap<String, Value>;

/// A vertex to upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexRecord {
    /// Stable id, unique within the graph
    pub id: String,
    /// Vertex label
    pub label: String,
    /// Value of the graph partition key property
    pub partition_key: String,
    /// Properties to set
    pub properties: Properties,
}

impl VertexRecord {
    /// Create record with no properties
    pub fn new(id: impl Into<String>, label: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            partition_key: partition_key.into(),
            properties: Properties::new(),
        }
    }

    /// Add a property
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// How an edge endpoint is found: the vertex with `label` whose
/// `property` equals `value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRef {
    /// Vertex label
    pub label: String,
    /// Property compared
    pub property: String,
    /// Value looked up
    pub value: String,
}

impl EndpointRef {
    /// Create endpoint lookup
    pub fn new(label: impl Into<String>, property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            property: property.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}={}]", self.label, self.property, self.value)
    }
}

/// An edge to upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Deterministic id; re-upserting the same id replaces the edge
    pub id: String,
    /// Edge label
    pub label: String,
    /// Outgoing endpoint
    pub source: EndpointRef,
    /// Incoming endpoint
    pub target: EndpointRef,
    /// Properties to set
    pub properties: Properties,
}

/// A document to upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Id, unique within its partition
    pub id: String,
    /// Partition key value
    pub partition_key: String,
    /// Full body, including `id`
    pub body: Properties,
}

impl Document {
    /// Build document, writing `id` into the body
    pub fn new(id: impl Into<String>, partition_key: impl Into<String>, mut body: Properties) -> Self {
        let id = id.into();
        body.insert("id".to_string(), Value::String(id.clone()));
        Self {
            id,
            partition_key: partition_key.into(),
            body,
        }
    }
}

/// Element kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementKind {
    /// A vertex
    Vertex,
    /// An edge with its endpoint vertex ids
    Edge {
        /// Outgoing vertex id
        out_v: String,
        /// Incoming vertex id
        in_v: String,
    },
}

/// A vertex or edge as returned by a graph backend
///
/// Property values are lists: a property may carry several values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphElement {
    /// Element id
    pub id: String,
    /// Element label
    pub label: String,
    /// Vertex or edge
    #[serde(flatten)]
    pub kind: ElementKind,
    /// Property values by name
    pub properties: IndexMap<String, Vec<Value>>,
}

impl GraphElement {
    /// Whether this is an edge
    #[inline]
    #[must_use]
    pub fn is_edge(&self) -> bool {
        matches!(self.kind, ElementKind::Edge { .. })
    }
}

/// Raw result of a backend query, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// Graph elements
    Elements(Vec<GraphElement>),
    /// Plain values (counts, property values, ids)
    Scalars(Vec<Value>),
    /// Key/value rows (documents, projections, value maps)
    Rows(Vec<Properties>),
    /// Anything the backend could not shape
    Unrecognized(Value),
}

impl RawResult {
    /// Number of top-level items
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Elements(items) => items.len(),
            Self::Scalars(items) => items.len(),
            Self::Rows(items) => items.len(),
            Self::Unrecognized(_) => 1,
        }
    }

    /// Whether the result holds nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Unrecognized(v) => v.is_null(),
            _ => self.len() == 0,
        }
    }
}

/// A resource that provisioning ensures exists
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "snake_case")]
pub enum ResourceSpec {
    /// A graph
    Graph {
        /// Graph name
        name: String,
        /// Name of the partition key property
        partition_key: String,
    },
    /// A vertex label in a graph's schema
    VertexLabel {
        /// Graph name
        graph: String,
        /// Label
        label: String,
    },
    /// An edge label in a graph's schema
    EdgeLabel {
        /// Graph name
        graph: String,
        /// Label
        label: String,
    },
    /// A document container
    Container {
        /// Physical container name
        name: String,
        /// Partition key path, e.g. `/RouterId`
        partition_key_path: String,
    },
}

impl std::fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Graph { name, .. } => write!(f, "graph '{name}'"),
            Self::VertexLabel { graph, label } => write!(f, "vertex label '{label}' in '{graph}'"),
            Self::EdgeLabel { graph, label } => write!(f, "edge label '{label}' in '{graph}'"),
            Self::Container { name, .. } => write!(f, "container '{name}'"),
        }
    }
}

/// Outcome of an ensure-exists call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// Resource was created
    Created,
    /// Resource was already there
    AlreadyExists,
}

/// Topology request
///
/// `query` is a backend-native scoping query; backends that cannot scope
/// by query reject it instead of ignoring it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyRequest {
    /// Keep only elements with one of these labels (all when empty)
    #[serde(default)]
    pub vertex_labels: Vec<String>,
    /// Native scoping query
    #[serde(default)]
    pub query: Option<String>,
}

/// Vertices and edges of a (possibly filtered) graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    /// Vertices
    pub nodes: Vec<GraphElement>,
    /// Edges whose endpoints are both in `nodes`
    pub edges: Vec<GraphElement>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_body_carries_id() {
        let doc = Document::new("A1", "R1", Properties::new());
        assert_eq!(doc.body.get("id"), Some(&json!("A1")));
    }

    #[test]
    fn element_serializes_kind_flat() {
        let element = GraphElement {
            id: "e1".into(),
            label: "connects_to".into(),
            kind: ElementKind::Edge {
                out_v: "R1".into(),
                in_v: "R2".into(),
            },
            properties: IndexMap::new(),
        };
        let value = serde_json::to_value(&element).unwrap();
        assert_eq!(value["type"], "edge");
        assert_eq!(value["out_v"], "R1");
        assert!(element.is_edge());
    }

    #[test]
    fn raw_result_emptiness() {
        assert!(RawResult::Scalars(vec![]).is_empty());
        assert!(!RawResult::Scalars(vec![json!(0)]).is_empty());
        assert!(RawResult::Unrecognized(Value::Null).is_empty());
    }
}
