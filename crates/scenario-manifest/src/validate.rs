//! Manifest validation
//!
//! Checks the cross-reference invariants of a manifest before any backend
//! is touched. Every violation is collected; a manifest is either fully
//! valid or rejected with the complete list of [`FieldError`]s.
//!
//! # Rules
//!
//! - vertex labels unique and non-empty, `id_column` among `properties`,
//!   `properties` free of duplicates and present in the file header
//! - edge endpoints reference declared vertex labels and one of that
//!   vertex type's columns; lookup, mapping and filter columns exist
//! - each property mapping sets exactly one of `column` / `value`, and
//!   literal mappings carry a `name`
//! - document containers are uniquely named, have exactly one data file,
//!   a `/`-prefixed partition key, and every referenced field exists

use crate::error::{FieldError, ManifestError};
use crate::model::{DocumentContainerDef, EdgeTypeDef, Manifest, VertexTypeDef};
use crate::table::{Table, TableSet};
use std::collections::HashSet;

/// Validate `manifest` against its loaded data files
///
/// # Errors
/// Returns [`ManifestError::Invalid`] with every violation found.
pub fn validate(manifest: &Manifest, tables: &TableSet) -> Result<(), ManifestError> {
    let mut errors = Vec::new();

    let mut labels = HashSet::new();
    for (i, vertex) in manifest.vertices.iter().enumerate() {
        let path = format!("vertices[{i}]");
        if !vertex.label.is_empty() && !labels.insert(vertex.label.as_str()) {
            errors.push(FieldError::new(
                format!("{path}.label"),
                format!("duplicate vertex label '{}'", vertex.label),
            ));
        }
        check_vertex(&path, vertex, tables, &mut errors);
    }

    for (i, edge) in manifest.edges.iter().enumerate() {
        check_edge(&format!("edges[{i}]"), edge, manifest, tables, &mut errors);
    }

    let mut containers = HashSet::new();
    for (i, document) in manifest.documents.iter().enumerate() {
        let path = format!("documents[{i}]");
        if !document.name.is_empty() && !containers.insert(document.name.as_str()) {
            errors.push(FieldError::new(
                format!("{path}.name"),
                format!("duplicate container name '{}'", document.name),
            ));
        }
        check_document(&path, document, tables, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ManifestError::Invalid(errors))
    }
}

fn check_vertex(path: &str, vertex: &VertexTypeDef, tables: &TableSet, errors: &mut Vec<FieldError>) {
    require_non_empty(&format!("{path}.label"), &vertex.label, errors);
    require_non_empty(&format!("{path}.partition_key"), &vertex.partition_key_value, errors);

    if !vertex.property_columns.contains(&vertex.id_column) {
        errors.push(FieldError::new(
            format!("{path}.id_column"),
            format!("'{}' must be listed in properties", vertex.id_column),
        ));
    }

    let mut seen = HashSet::new();
    for (j, column) in vertex.property_columns.iter().enumerate() {
        if !seen.insert(column.as_str()) {
            errors.push(FieldError::new(
                format!("{path}.properties[{j}]"),
                format!("duplicate property column '{column}'"),
            ));
        }
    }

    let Some(table) = table_for(&format!("{path}.csv_file"), &vertex.source_file, tables, errors)
    else {
        return;
    };
    for (j, column) in vertex.property_columns.iter().enumerate() {
        require_column(&format!("{path}.properties[{j}]"), table, column, errors);
    }
}

fn check_edge(
    path: &str,
    edge: &EdgeTypeDef,
    manifest: &Manifest,
    tables: &TableSet,
    errors: &mut Vec<FieldError>,
) {
    require_non_empty(&format!("{path}.label"), &edge.label, errors);

    for (end, lookup) in [("source", &edge.source), ("target", &edge.target)] {
        match manifest.vertex(&lookup.label) {
            None => errors.push(FieldError::new(
                format!("{path}.{end}.label"),
                format!("references undeclared vertex label '{}'", lookup.label),
            )),
            Some(vertex) => {
                let known = lookup.property == vertex.id_column
                    || vertex.property_columns.contains(&lookup.property);
                if !known {
                    errors.push(FieldError::new(
                        format!("{path}.{end}.property"),
                        format!(
                            "'{}' is not a property of vertex label '{}'",
                            lookup.property, lookup.label
                        ),
                    ));
                }
            }
        }
    }

    for (j, mapping) in edge.properties.iter().enumerate() {
        let mapping_path = format!("{path}.properties[{j}]");
        if mapping.source().is_none() {
            errors.push(FieldError::new(
                &mapping_path,
                "must set exactly one of 'column' or 'value'",
            ));
        } else if mapping.column.is_none() && mapping.name.is_none() {
            errors.push(FieldError::new(
                format!("{mapping_path}.name"),
                "literal mappings need a property name",
            ));
        }
    }

    let Some(table) = table_for(&format!("{path}.csv_file"), &edge.source_file, tables, errors)
    else {
        return;
    };
    require_column(&format!("{path}.source.column"), table, &edge.source.column, errors);
    require_column(&format!("{path}.target.column"), table, &edge.target.column, errors);
    for (j, mapping) in edge.properties.iter().enumerate() {
        if let (Some(column), None) = (&mapping.column, &mapping.value) {
            require_column(&format!("{path}.properties[{j}].column"), table, column, errors);
        }
    }
    if let Some(filter) = &edge.filter {
        require_column(&format!("{path}.filter.column"), table, &filter.column, errors);
    }
}

fn check_document(
    path: &str,
    document: &DocumentContainerDef,
    tables: &TableSet,
    errors: &mut Vec<FieldError>,
) {
    require_non_empty(&format!("{path}.name"), &document.name, errors);

    if !document.partition_key_path.starts_with('/') || document.partition_key_path.len() < 2 {
        errors.push(FieldError::new(
            format!("{path}.partition_key"),
            format!("'{}' must be a path like '/Field'", document.partition_key_path),
        ));
    }

    let (file_field, file) = match (&document.csv_file, &document.json_file) {
        (Some(csv), None) => ("csv_file", csv),
        (None, Some(json)) => ("json_file", json),
        _ => {
            errors.push(FieldError::new(
                path,
                "must set exactly one of 'csv_file' or 'json_file'",
            ));
            return;
        }
    };

    let Some(table) = table_for(&format!("{path}.{file_field}"), file, tables, errors) else {
        return;
    };
    if document.partition_key_path.len() > 1 {
        require_column(
            &format!("{path}.partition_key"),
            table,
            document.partition_key_field(),
            errors,
        );
    }
    if let Some(id_field) = &document.id_field {
        require_column(&format!("{path}.id_field"), table, id_field, errors);
    }
    for (j, field) in document.numeric_fields.iter().enumerate() {
        require_column(&format!("{path}.numeric_fields[{j}]"), table, field, errors);
    }
}

fn table_for<'t>(
    path: &str,
    file: &str,
    tables: &'t TableSet,
    errors: &mut Vec<FieldError>,
) -> Option<&'t Table> {
    if file.is_empty() {
        errors.push(FieldError::new(path, "must not be empty"));
        return None;
    }
    match tables.get(file) {
        Some(table) => Some(table),
        None => {
            let reason = tables.failure(file).unwrap_or("file was not loaded");
            errors.push(FieldError::new(path, format!("cannot read '{file}': {reason}")));
            None
        }
    }
}

fn require_column(path: &str, table: &Table, column: &str, errors: &mut Vec<FieldError>) {
    if !table.has_column(column) {
        errors.push(FieldError::new(
            path,
            format!("column '{column}' not found in {}", table.path().display()),
        ));
    }
}

fn require_non_empty(path: &str, value: &str, errors: &mut Vec<FieldError>) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(path, "must not be empty"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    fn tables() -> TableSet {
        let mut set = TableSet::default();
        set.insert(
            "routers.csv",
            Table::from_csv_reader("routers.csv", "RouterId,City\nR1,Sydney\n".as_bytes()).unwrap(),
        );
        set.insert(
            "links.csv",
            Table::from_csv_reader("links.csv", "From,To,Type\nR1,R2,core\n".as_bytes()).unwrap(),
        );
        set.insert(
            "metrics.csv",
            Table::from_csv_reader("metrics.csv", "LinkId,Ts,Latency\nL1,1,2.5\n".as_bytes()).unwrap(),
        );
        set
    }

    fn manifest(extra_edges: &str) -> Manifest {
        Manifest::from_yaml_str(&format!(
            r"
vertices:
  - {{label: Router, csv_file: routers.csv, id_column: RouterId, partition_key: net, properties: [RouterId, City]}}
edges:
  - label: connects_to
    csv_file: links.csv
    source: {{label: Router, property: RouterId, column: From}}
    target: {{label: Router, property: RouterId, column: To}}
    filter: {{column: Type, value: core}}
{extra_edges}
documents:
  - {{name: LinkMetrics, partition_key: /LinkId, csv_file: metrics.csv, numeric_fields: [Latency]}}
"
        ))
        .unwrap()
    }

    #[test]
    fn valid_manifest_passes() {
        assert!(validate(&manifest(""), &tables()).is_ok());
    }

    #[test]
    fn undeclared_endpoint_label_is_reported() {
        let m = manifest(
            r"
  - label: hosts
    csv_file: links.csv
    source: {label: Host, property: HostId, column: From}
    target: {label: Router, property: RouterId, column: To}",
        );
        let err = validate(&m, &tables()).unwrap_err();
        let paths: Vec<_> = err.field_errors().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["edges[1].source.label"]);
    }

    #[test]
    fn id_column_must_be_a_property() {
        let mut m = manifest("");
        m.vertices[0].property_columns = vec!["City".to_string()];
        let err = validate(&m, &tables()).unwrap_err();
        assert!(err
            .field_errors()
            .iter()
            .any(|e| e.path == "vertices[0].id_column"));
    }

    #[test]
    fn missing_header_columns_are_reported_per_field() {
        let mut m = manifest("");
        m.vertices[0].property_columns.push("Region".to_string());
        m.documents[0].numeric_fields.push("Jitter".to_string());
        let err = validate(&m, &tables()).unwrap_err();
        let paths: Vec<_> = err.field_errors().iter().map(|e| e.path.clone()).collect();
        assert!(paths.contains(&"vertices[0].properties[2]".to_string()));
        assert!(paths.contains(&"documents[0].numeric_fields[1]".to_string()));
    }

    #[test]
    fn mapping_with_both_sources_is_rejected() {
        let m = manifest(
            r"
  - label: tagged
    csv_file: links.csv
    source: {label: Router, property: RouterId, column: From}
    target: {label: Router, property: RouterId, column: To}
    properties:
      - {column: Type, value: x}
      - {value: 3}",
        );
        let err = validate(&m, &tables()).unwrap_err();
        let paths: Vec<_> = err.field_errors().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["edges[1].properties[0]", "edges[1].properties[1].name"]);
    }

    #[test]
    fn duplicate_labels_and_unreadable_files() {
        let mut m = manifest("");
        let mut dup = m.vertices[0].clone();
        dup.source_file = "missing.csv".to_string();
        m.vertices.push(dup);
        let err = validate(&m, &tables()).unwrap_err();
        let paths: Vec<_> = err.field_errors().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["vertices[1].label", "vertices[1].csv_file"]);
    }

    #[test]
    fn document_partition_key_must_be_a_path() {
        let mut m = manifest("");
        m.documents[0].partition_key_path = "LinkId".to_string();
        let err = validate(&m, &tables()).unwrap_err();
        assert_eq!(err.field_errors()[0].path, "documents[0].partition_key");
    }
}
