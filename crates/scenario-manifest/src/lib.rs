//! Scenario manifests
//!
//! A scenario is described by a YAML manifest plus flat data files. This
//! crate owns everything about that description that needs no backend:
//!
//! - **Model**: vertex types, edge types and document containers ([`model`])
//! - **Payloads**: CSV / JSON files loaded into ordered tables ([`table`])
//! - **Validation**: cross-reference rules checked before any write ([`validate`])
//! - **Naming**: the one shared mapping between scenario ids and derived
//!   resource names ([`naming`])
//!
//! # Example
//!
//! ```rust,ignore
//! use scenario_manifest::{Manifest, PreparedManifest};
//!
//! let manifest = Manifest::load("scenarios/telco-noc/scenario.yaml")?;
//! let prepared = PreparedManifest::prepare(manifest, "scenarios/telco-noc".as_ref())?;
//! println!("{} rows to load", prepared.tables().total_rows());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod model;
pub mod naming;
pub mod table;
pub mod validate;

pub use error::{FieldError, ManifestError, ManifestResult, NamingError, TableError};
pub use model::{
    DocumentContainerDef, EdgeTypeDef, EndpointLookup, IdStrategy, Manifest, PropertyMapping,
    PropertySource, RowFilter, VertexTypeDef,
};
pub use table::{cell_text, Record, Table, TableSet};

use std::path::{Path, PathBuf};

/// A manifest whose data files are loaded and whose invariants hold
#[derive(Debug)]
pub struct PreparedManifest {
    manifest: Manifest,
    data_root: PathBuf,
    tables: TableSet,
}

impl PreparedManifest {
    /// Load every referenced file under `root` and validate
    ///
    /// # Errors
    /// Returns [`ManifestError::Invalid`] listing every violated rule,
    /// including unreadable files.
    pub fn prepare(manifest: Manifest, root: &Path) -> ManifestResult<Self> {
        let data_root = manifest.data_root(root);
        let tables = TableSet::load(&manifest, &data_root);
        validate::validate(&manifest, &tables)?;
        Ok(Self {
            manifest,
            data_root,
            tables,
        })
    }

    /// Validate against already-loaded tables
    ///
    /// # Errors
    /// Returns [`ManifestError::Invalid`] listing every violated rule.
    pub fn from_parts(manifest: Manifest, data_root: PathBuf, tables: TableSet) -> ManifestResult<Self> {
        validate::validate(&manifest, &tables)?;
        Ok(Self {
            manifest,
            data_root,
            tables,
        })
    }

    /// The validated manifest
    #[inline]
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Resolved data directory
    #[inline]
    #[must_use]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Loaded data files
    #[inline]
    #[must_use]
    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    /// Table for a file the manifest references
    ///
    /// Always present for a prepared manifest.
    #[must_use]
    pub fn table(&self, file: &str) -> Option<&Table> {
        self.tables.get(file)
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
