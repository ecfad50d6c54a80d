//! Result normalization
//!
//! Whatever a backend returns becomes `{columns: [{name, type}], rows: [...]}`:
//!
//! - graph elements: `id` and `label` first (edges add `out_v` / `in_v`),
//!   then properties, single-valued lists unwrapped
//! - scalars: one `value` column
//! - rows: as returned
//! - anything else: its text in one `value` column
//!
//! Every row carries every column, `null` where it had no value. Column
//! types are inferred from the non-null values in the column.

use indexmap::{IndexMap, IndexSet};
use scenario_backend::{ElementKind, GraphElement, RawResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the single column scalar and unrecognized results use
pub const VALUE_COLUMN: &str = "value";

/// Inferred column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Text
    String,
    /// Whole numbers
    Integer,
    /// Numbers with a fraction anywhere in the column
    Float,
    /// Booleans
    Boolean,
    /// Objects, arrays, or mixed types
    Json,
    /// No non-null value
    Null,
}

impl ColumnType {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_f64() => Self::Float,
            Value::Number(_) => Self::Integer,
            Value::String(_) => Self::String,
            Value::Array(_) | Value::Object(_) => Self::Json,
        }
    }

    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Null, t) | (t, Self::Null) => t,
            (Self::Integer, Self::Float) | (Self::Float, Self::Integer) => Self::Float,
            _ => Self::Json,
        }
    }
}

/// Column descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Inferred type
    #[serde(rename = "type")]
    pub kind: ColumnType,
}

/// Backend-agnostic tabular result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    /// Columns in first-seen order
    pub columns: Vec<Column>,
    /// Rows keyed by column name, in column order
    pub rows: Vec<IndexMap<String, Value>>,
}

impl NormalizedResult {
    /// Build from rows, inferring columns
    #[must_use]
    pub fn from_rows(rows: Vec<IndexMap<String, Value>>) -> Self {
        let names: IndexSet<String> = rows.iter().flat_map(|r| r.keys().cloned()).collect();
        let columns: Vec<Column> = names
            .iter()
            .map(|name| Column {
                name: name.clone(),
                kind: rows
                    .iter()
                    .filter_map(|r| r.get(name))
                    .map(ColumnType::of)
                    .fold(ColumnType::Null, ColumnType::merge),
            })
            .collect();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                names
                    .iter()
                    .map(|name| (name.clone(), row.swap_remove(name).unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Value of the only cell, when the result is 1x1
    #[must_use]
    pub fn single_value(&self) -> Option<&Value> {
        match (self.columns.as_slice(), self.rows.as_slice()) {
            ([column], [row]) => row.get(&column.name),
            _ => None,
        }
    }
}

/// Flatten one graph element into a row
#[must_use]
pub fn element_row(element: GraphElement) -> IndexMap<String, Value> {
    let mut row = IndexMap::new();
    row.insert("id".to_string(), Value::String(element.id));
    row.insert("label".to_string(), Value::String(element.label));
    if let ElementKind::Edge { out_v, in_v } = element.kind {
        row.insert("out_v".to_string(), Value::String(out_v));
        row.insert("in_v".to_string(), Value::String(in_v));
    }
    for (key, mut values) in element.properties {
        let value = match values.len() {
            0 => Value::Null,
            1 => values.swap_remove(0),
            _ => Value::Array(values),
        };
        row.entry(key).or_insert(value);
    }
    row
}

fn value_row(value: Value) -> IndexMap<String, Value> {
    IndexMap::from([(VALUE_COLUMN.to_string(), value)])
}

/// Normalize a raw backend result
#[must_use]
pub fn normalize(raw: RawResult) -> NormalizedResult {
    let rows = match raw {
        RawResult::Elements(elements) => elements.into_iter().map(element_row).collect(),
        RawResult::Scalars(values) => values.into_iter().map(value_row).collect(),
        RawResult::Rows(rows) => rows,
        RawResult::Unrecognized(value) => {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            vec![value_row(Value::String(text))]
        }
    };
    NormalizedResult::from_rows(rows)
}
