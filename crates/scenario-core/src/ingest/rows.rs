//! Row to record mapping
//!
//! Pure functions from one data row to the record written for it. A row
//! that cannot be mapped yields a [`RowError`], which the engine records as
//! a row failure before moving on.

use scenario_backend::{Document, EdgeRecord, EndpointRef, Properties, VertexRecord};
use scenario_manifest::{
    cell_text, DocumentContainerDef, EdgeTypeDef, EndpointLookup, IdStrategy, PropertySource,
    Record, VertexTypeDef,
};
use serde_json::{Number, Value};

/// Why a row could not be mapped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// A required cell is absent, null or blank
    #[error("missing value for column '{0}'")]
    MissingValue(String),

    /// A numeric field holds something else
    #[error("non-numeric value '{value}' in numeric field '{field}'")]
    NotNumeric { field: String, value: String },

    /// The dataset has no columns to build an id from
    #[error("no columns to derive a document id from")]
    NoIdColumns,

    /// A property mapping sets both or neither of column and value
    #[error("property mapping {0} must set exactly one of column or value")]
    AmbiguousMapping(usize),
}

fn required(row: &Record, column: &str) -> Result<String, RowError> {
    match cell_text(row, column) {
        Some(text) if !text.trim().is_empty() => Ok(text.into_owned()),
        _ => Err(RowError::MissingValue(column.to_string())),
    }
}

fn required_value(row: &Record, column: &str) -> Result<Value, RowError> {
    required(row, column)?;
    Ok(row.get(column).cloned().unwrap_or(Value::Null))
}

/// Deterministic edge id: `<label>:<source>-><target>`
#[must_use]
pub fn edge_id(label: &str, source: &str, target: &str) -> String {
    format!("{label}:{source}->{target}")
}

/// Vertex for one row of `def.source_file`
///
/// # Errors
/// Returns [`RowError::MissingValue`] when the id or any property column is empty.
pub fn vertex_record(def: &VertexTypeDef, row: &Record) -> Result<VertexRecord, RowError> {
    let id = required(row, &def.id_column)?;
    let mut vertex = VertexRecord::new(id, &def.label, &def.partition_key_value);
    for column in &def.property_columns {
        let value = required_value(row, column)?;
        vertex.properties.insert(column.clone(), value);
    }
    Ok(vertex)
}

fn endpoint(lookup: &EndpointLookup, row: &Record) -> Result<EndpointRef, RowError> {
    let value = required(row, &lookup.column)?;
    Ok(EndpointRef::new(&lookup.label, &lookup.property, value))
}

/// Edge for one row of `def.source_file`, or `None` when the row filter drops it
///
/// # Errors
/// Returns [`RowError`] for empty endpoint columns or copy-mapped property columns.
pub fn edge_record(def: &EdgeTypeDef, row: &Record) -> Result<Option<EdgeRecord>, RowError> {
    if let Some(filter) = &def.filter {
        if !filter.keeps(cell_text(row, &filter.column).as_deref()) {
            return Ok(None);
        }
    }

    let source = endpoint(&def.source, row)?;
    let target = endpoint(&def.target, row)?;

    let mut properties = Properties::new();
    for (i, mapping) in def.properties.iter().enumerate() {
        let (Some(name), Some(source)) = (mapping.property_name(), mapping.source()) else {
            return Err(RowError::AmbiguousMapping(i));
        };
        let value = match source {
            PropertySource::Column(column) => required_value(row, column)?,
            PropertySource::Literal(value) => value.clone(),
        };
        properties.insert(name.to_string(), value);
    }

    Ok(Some(EdgeRecord {
        id: edge_id(&def.label, &source.value, &target.value),
        label: def.label.clone(),
        source,
        target,
        properties,
    }))
}

/// Parse numeric text as an integer if possible, else a finite float
#[must_use]
pub fn coerce_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Document id for a row under `strategy`
///
/// # Errors
/// Returns [`RowError`] when an id column is empty or there are none.
pub fn document_id(strategy: &IdStrategy, row: &Record) -> Result<String, RowError> {
    match strategy {
        IdStrategy::Field(field) => required(row, field),
        IdStrategy::Composite(columns) if columns.is_empty() => Err(RowError::NoIdColumns),
        IdStrategy::Composite(columns) => {
            let parts = columns
                .iter()
                .map(|c| required(row, c))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(parts.join("-"))
        }
    }
}

/// Document for one row of a container's data file
///
/// Numeric fields are coerced to JSON numbers.
///
/// # Errors
/// Returns [`RowError`] for an empty id, partition or numeric field, or a
/// numeric field that does not parse.
pub fn document_record(
    def: &DocumentContainerDef,
    strategy: &IdStrategy,
    row: &Record,
) -> Result<Document, RowError> {
    let id = document_id(strategy, row)?;
    let partition = required(row, def.partition_key_field())?;

    let mut body: Properties = row.clone();
    for field in &def.numeric_fields {
        let value = match row.get(field) {
            Some(Value::Number(n)) => Value::Number(n.clone()),
            Some(Value::String(text)) if !text.trim().is_empty() => {
                coerce_number(text).ok_or_else(|| RowError::NotNumeric {
                    field: field.clone(),
                    value: text.clone(),
                })?
            }
            Some(Value::Null) | None => return Err(RowError::MissingValue(field.clone())),
            Some(Value::String(_)) => return Err(RowError::MissingValue(field.clone())),
            Some(other) => {
                return Err(RowError::NotNumeric {
                    field: field.clone(),
                    value: other.to_string(),
                })
            }
        };
        body.insert(field.clone(), value);
    }

    Ok(Document::new(id, partition, body))
}
