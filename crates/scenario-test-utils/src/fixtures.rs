//! Scenario directories on disk

use scenario_manifest::Manifest;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Two routers, one link, one alert container
pub const ROUTER_MANIFEST: &str = r"
name: telco-noc
data_dir: data
vertices:
  - label: Router
    csv_file: routers.csv
    id_column: RouterId
    partition_key: network
    properties: [RouterId, City]
edges:
  - label: connects_to
    csv_file: links.csv
    source: {label: Router, property: RouterId, column: From}
    target: {label: Router, property: RouterId, column: To}
documents:
  - name: Alerts
    partition_key: /RouterId
    csv_file: alerts.csv
    numeric_fields: [Severity]
";

/// A scenario written to a temporary directory
pub struct ScenarioFixture {
    dir: TempDir,
    manifest: String,
}

impl ScenarioFixture {
    /// Empty fixture with `manifest` as its YAML
    pub fn new(manifest: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("scenario.yaml"), manifest).unwrap();
        Self {
            dir,
            manifest: manifest.to_string(),
        }
    }

    /// Write a data file under `data/`
    #[must_use]
    pub fn with_file(self, name: &str, contents: &str) -> Self {
        fs::write(self.data_dir().join(name), contents).unwrap();
        self
    }

    /// Scenario root (holds `scenario.yaml`)
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Data directory
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Parsed manifest
    pub fn manifest(&self) -> Manifest {
        Manifest::from_yaml_str(&self.manifest).unwrap()
    }
}

/// The two-router scenario
pub fn router_scenario() -> ScenarioFixture {
    ScenarioFixture::new(ROUTER_MANIFEST)
        .with_file("routers.csv", "RouterId,City\nR1,Sydney\nR2,Melbourne\n")
        .with_file("links.csv", "From,To\nR1,R2\n")
        .with_file(
            "alerts.csv",
            "AlertId,RouterId,Severity\nA1,R1,3\nA2,R2,1\n",
        )
}
