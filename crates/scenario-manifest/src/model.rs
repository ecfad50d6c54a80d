//! Manifest model
//!
//! In-memory form of a scenario manifest: the vertex types, edge types and
//! document containers a scenario declares, plus where their rows live.
//! Pure data; loading and validation live in [`crate::validate`] and
//! [`crate::table`].

use crate::error::{ManifestError, ManifestResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Declarative description of one scenario's datasets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Optional display name (not used for scoping)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Directory holding the data files, relative to the ingestion data root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Vertex types, written before any edges
    #[serde(default)]
    pub vertices: Vec<VertexTypeDef>,
    /// Edge types
    #[serde(default)]
    pub edges: Vec<EdgeTypeDef>,
    /// Document containers
    #[serde(default)]
    pub documents: Vec<DocumentContainerDef>,
}

impl Manifest {
    /// Parse manifest from YAML text
    ///
    /// # Errors
    /// Returns [`ManifestError::Parse`] if the text does not match the manifest shape.
    pub fn from_yaml_str(text: &str) -> ManifestResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a manifest file
    ///
    /// # Errors
    /// Returns [`ManifestError::Io`] or [`ManifestError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> ManifestResult<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| ManifestError::io_error(path, e))?;
        Self::from_yaml_str(&text)
    }

    /// Directory data files resolve against
    ///
    /// An absolute `data_dir` wins; a relative one is joined onto `root`.
    #[must_use]
    pub fn data_root(&self, root: &Path) -> PathBuf {
        match &self.data_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        }
    }

    /// Look up a vertex type by label
    #[must_use]
    pub fn vertex(&self, label: &str) -> Option<&VertexTypeDef> {
        self.vertices.iter().find(|v| v.label == label)
    }

    /// Every data file the manifest references, in declaration order, without duplicates
    #[must_use]
    pub fn referenced_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        let all = self
            .vertices
            .iter()
            .map(|v| v.source_file.as_str())
            .chain(self.edges.iter().map(|e| e.source_file.as_str()))
            .chain(self.documents.iter().filter_map(DocumentContainerDef::source_file));
        for file in all {
            if !files.contains(&file) {
                files.push(file);
            }
        }
        files
    }

    /// Total number of declared datasets
    #[inline]
    #[must_use]
    pub fn dataset_count(&self) -> usize {
        self.vertices.len() + self.edges.len() + self.documents.len()
    }
}

/// A vertex type: one row of `source_file` becomes one vertex
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexTypeDef {
    /// Vertex label, unique within the manifest
    pub label: String,
    /// Row-oriented dataset the vertices come from
    #[serde(rename = "csv_file")]
    pub source_file: String,
    /// Column holding the vertex id
    pub id_column: String,
    /// Static partition key value stamped on every vertex
    #[serde(rename = "partition_key")]
    pub partition_key_value: String,
    /// Columns copied into the vertex property bag (includes `id_column`)
    #[serde(rename = "properties")]
    pub property_columns: Vec<String>,
}

/// How an edge endpoint is found from a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLookup {
    /// Label of the vertex at this end
    pub label: String,
    /// Vertex property matched against the column value
    pub property: String,
    /// Column supplying the lookup value
    pub column: String,
}

/// Where an edge property value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMapping {
    /// Property name; defaults to `column` for copy mappings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Copy from this column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Static literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Resolved form of a valid [`PropertyMapping`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertySource<'a> {
    /// Copy the named column
    Column(&'a str),
    /// Use the literal as-is
    Literal(&'a Value),
}

impl PropertyMapping {
    /// Mapping that copies a column under its own name
    #[must_use]
    pub fn column(column: impl Into<String>) -> Self {
        Self {
            name: None,
            column: Some(column.into()),
            value: None,
        }
    }

    /// Mapping that stamps a literal under `name`
    #[must_use]
    pub fn literal(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: Some(name.into()),
            column: None,
            value: Some(value),
        }
    }

    /// Property name this mapping writes
    #[must_use]
    pub fn property_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.column.as_deref())
    }

    /// Value source, or `None` when both or neither of `column`/`value` are set
    #[must_use]
    pub fn source(&self) -> Option<PropertySource<'_>> {
        match (&self.column, &self.value) {
            (Some(column), None) => Some(PropertySource::Column(column)),
            (None, Some(value)) => Some(PropertySource::Literal(value)),
            _ => None,
        }
    }
}

/// Row filter applied before an edge row is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    /// Column tested
    pub column: String,
    /// Value compared against (scalars compare by their text form)
    pub value: Value,
    /// Keep rows that do NOT match instead
    #[serde(default)]
    pub negate: bool,
}

impl RowFilter {
    /// Whether a row whose `column` holds `cell` is kept
    ///
    /// A missing cell never equals the filter value.
    #[must_use]
    pub fn keeps(&self, cell: Option<&str>) -> bool {
        let expected = literal_text(&self.value);
        let equal = cell.is_some_and(|c| c == expected);
        equal != self.negate
    }
}

/// Text form of a scalar literal (strings unquoted)
#[must_use]
pub fn literal_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// An edge type: each kept row of `source_file` becomes one edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeTypeDef {
    /// Edge label (several defs may share one)
    pub label: String,
    /// Row-oriented dataset the edges come from
    #[serde(rename = "csv_file")]
    pub source_file: String,
    /// Outgoing endpoint
    pub source: EndpointLookup,
    /// Incoming endpoint
    pub target: EndpointLookup,
    /// Edge properties
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
    /// Optional row filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<RowFilter>,
}

/// A document container (telemetry, tickets, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContainerDef {
    /// Logical container name, scoped per scenario at write time
    pub name: String,
    /// Partition key path, e.g. `/DeviceId`
    #[serde(rename = "partition_key")]
    pub partition_key_path: String,
    /// CSV source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_file: Option<String>,
    /// JSON array or JSON Lines source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_file: Option<String>,
    /// Column used as document id; see [`DocumentContainerDef::id_strategy`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
    /// Every numeric column, coerced to JSON numbers on write
    #[serde(default)]
    pub numeric_fields: Vec<String>,
}

/// How document ids are derived for a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdStrategy {
    /// Use this column
    Field(String),
    /// Join the first two declared columns with a hyphen
    Composite(Vec<String>),
}

impl DocumentContainerDef {
    /// The configured data file, whichever format
    #[must_use]
    pub fn source_file(&self) -> Option<&str> {
        self.csv_file.as_deref().or(self.json_file.as_deref())
    }

    /// Field named by the partition key path (leading `/` stripped)
    #[must_use]
    pub fn partition_key_field(&self) -> &str {
        self.partition_key_path
            .strip_prefix('/')
            .unwrap_or(&self.partition_key_path)
    }

    /// Id derivation given the dataset's header
    ///
    /// `id_field` wins; otherwise a column literally named `id`; otherwise the
    /// first two header columns (or the only one).
    #[must_use]
    pub fn id_strategy(&self, headers: &[String]) -> IdStrategy {
        if let Some(field) = &self.id_field {
            return IdStrategy::Field(field.clone());
        }
        if headers.iter().any(|h| h == "id") {
            return IdStrategy::Field("id".to_string());
        }
        IdStrategy::Composite(headers.iter().take(2).cloned().collect())
    }
}
