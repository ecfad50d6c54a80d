//! Tabular payload reading
//!
//! Loads the CSV and JSON files a manifest references into a uniform
//! [`Table`]: an ordered header plus one ordered record per data row. CSV
//! cells become JSON strings; JSON sources keep their value types.
//! Short CSV rows are kept with the trailing cells absent so that the
//! ingestion engine can report them as per-row failures.

use crate::error::TableError;
use crate::model::Manifest;
use indexmap::IndexMap;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One data row, keyed by header column in header order
pub type Record = IndexMap<String, Value>;

/// A loaded data file
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    /// Build table from parts
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, headers: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            path: path.into(),
            headers,
            rows,
        }
    }

    /// Read a file, picking the format from its extension
    ///
    /// `.json` and `.jsonl` are read as JSON, anything else as CSV.
    ///
    /// # Errors
    /// Returns [`TableError`] when the file cannot be read or parsed.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json" | "jsonl") => Self::read_json(path),
            _ => Self::read_csv(path),
        }
    }

    /// Read a CSV file with a header row
    ///
    /// # Errors
    /// Returns [`TableError::Csv`] for malformed CSV and
    /// [`TableError::MissingHeader`] for an empty file.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(path, file)
    }

    /// Parse CSV from any reader
    ///
    /// # Errors
    /// See [`Table::read_csv`].
    pub fn from_csv_reader(
        path: impl Into<PathBuf>,
        reader: impl std::io::Read,
    ) -> Result<Self, TableError> {
        let path = path.into();
        let csv_error = |e: csv::Error| TableError::Csv {
            path: path.clone(),
            message: e.to_string(),
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(TableError::MissingHeader(path.clone()));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let row: Record = headers
                .iter()
                .zip(record.iter())
                .map(|(h, cell)| (h.clone(), Value::String(cell.to_string())))
                .collect();
            rows.push(row);
        }

        Ok(Self {
            path,
            headers,
            rows,
        })
    }

    /// Read a JSON array of objects, or JSON Lines
    ///
    /// Headers are the union of object keys in first-seen order.
    ///
    /// # Errors
    /// Returns [`TableError::Json`] when the file is not a list of objects.
    pub fn read_json(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(path, &text)
    }

    /// Parse JSON array or JSON Lines text
    ///
    /// # Errors
    /// See [`Table::read_json`].
    pub fn from_json_str(path: impl Into<PathBuf>, text: &str) -> Result<Self, TableError> {
        let path = path.into();
        let json_error = |message: String| TableError::Json {
            path: path.clone(),
            message,
        };

        let values: Vec<Value> = if text.trim_start().starts_with('[') {
            serde_json::from_str(text).map_err(|e| json_error(e.to_string()))?
        } else {
            text.lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(n, line)| {
                    serde_json::from_str(line).map_err(|e| json_error(format!("line {}: {e}", n + 1)))
                })
                .collect::<Result<_, _>>()?
        };

        let mut headers: Vec<String> = Vec::new();
        let mut rows = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            let Value::Object(object) = value else {
                return Err(json_error(format!("item {index} is not an object")));
            };
            for key in object.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
            rows.push(object.into_iter().collect::<Record>());
        }

        Ok(Self {
            path,
            headers,
            rows,
        })
    }

    /// Source path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header columns in file order
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Whether the header contains `column`
    #[inline]
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Data rows in file order
    #[inline]
    #[must_use]
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Number of data rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the file has no data rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Text form of a cell, `None` when absent or null
#[must_use]
pub fn cell_text<'a>(record: &'a Record, column: &str) -> Option<Cow<'a, str>> {
    match record.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        other => Some(Cow::Owned(other.to_string())),
    }
}

/// Every table a manifest references, loaded once
#[derive(Debug, Default)]
pub struct TableSet {
    tables: HashMap<String, Table>,
    failures: HashMap<String, String>,
}

impl TableSet {
    /// Load all files referenced by `manifest` under `data_root`
    ///
    /// Unreadable files are recorded rather than returned as errors so that
    /// validation can report them alongside every other problem.
    #[must_use]
    pub fn load(manifest: &Manifest, data_root: &Path) -> Self {
        let mut set = Self::default();
        for file in manifest.referenced_files() {
            match Table::read(data_root.join(file)) {
                Ok(table) => {
                    tracing::debug!(file, rows = table.len(), "loaded data file");
                    set.tables.insert(file.to_string(), table);
                }
                Err(e) => {
                    tracing::debug!(file, error = %e, "data file unreadable");
                    set.failures.insert(file.to_string(), e.to_string());
                }
            }
        }
        set
    }

    /// Insert table under a file reference
    pub fn insert(&mut self, file: impl Into<String>, table: Table) {
        self.tables.insert(file.into(), table);
    }

    /// Loaded table for a file reference
    #[must_use]
    pub fn get(&self, file: &str) -> Option<&Table> {
        self.tables.get(file)
    }

    /// Load failure for a file reference
    #[must_use]
    pub fn failure(&self, file: &str) -> Option<&str> {
        self.failures.get(file).map(String::as_str)
    }

    /// Total rows across all loaded tables
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Table::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn csv_rows_keep_header_order() {
        let table =
            Table::from_csv_reader("routers.csv", "RouterId,City\nR1,Sydney\nR2, Melbourne\n".as_bytes())
                .unwrap();

        assert_eq!(table.headers(), &["RouterId".to_string(), "City".to_string()]);
        assert_eq!(table.len(), 2);
        let keys: Vec<_> = table.rows()[1].keys().cloned().collect();
        assert_eq!(keys, vec!["RouterId", "City"]);
        assert_eq!(cell_text(&table.rows()[1], "City").as_deref(), Some("Melbourne"));
    }

    #[test]
    fn short_csv_rows_leave_cells_absent() {
        let table =
            Table::from_csv_reader("routers.csv", "RouterId,City\nR1,Sydney\nR2\n".as_bytes())
                .unwrap();

        assert_eq!(table.len(), 2);
        assert!(cell_text(&table.rows()[1], "City").is_none());
        assert_eq!(cell_text(&table.rows()[1], "RouterId").as_deref(), Some("R2"));
    }

    #[test]
    fn empty_csv_has_no_header() {
        let err = Table::from_csv_reader("empty.csv", "".as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::MissingHeader(_)));
    }

    #[test]
    fn json_array_and_lines() {
        let array = Table::from_json_str(
            "t.json",
            r#"[{"a": 1, "b": "x"}, {"a": 2, "c": true}]"#,
        )
        .unwrap();
        assert_eq!(array.headers(), &["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(cell_text(&array.rows()[0], "a").as_deref(), Some("1"));
        assert!(cell_text(&array.rows()[1], "b").is_none());

        let lines = Table::from_json_str("t.jsonl", "{\"a\": 1}\n\n{\"a\": 2}\n").unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn json_rejects_non_objects() {
        let err = Table::from_json_str("t.json", "[1, 2]").unwrap_err();
        assert!(err.to_string().contains("item 0 is not an object"));
    }

    #[test]
    fn table_set_records_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("routers.csv"), "RouterId\nR1\n").unwrap();
        let manifest = Manifest::from_yaml_str(
            r"
vertices:
  - {label: Router, csv_file: routers.csv, id_column: RouterId, partition_key: p, properties: [RouterId]}
  - {label: Switch, csv_file: switches.csv, id_column: SwitchId, partition_key: p, properties: [SwitchId]}
",
        )
        .unwrap();

        let set = TableSet::load(&manifest, dir.path());

        assert_eq!(set.get("routers.csv").map(Table::len), Some(1));
        assert!(set.get("switches.csv").is_none());
        assert!(set.failure("switches.csv").is_some());
        assert_eq!(set.total_rows(), 1);
    }
}
