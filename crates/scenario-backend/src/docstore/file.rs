//! `file` kind: one JSON file per document on local disk
//!
//! Layout: `<root>/<container>/<partition>/<id>.json`. Path components are
//! percent-encoded so any partition or id maps to one safe file name. All
//! disk access runs on the [`BlockingPool`].

use crate::blocking::BlockingPool;
use crate::clients::BackendClients;
use crate::docstore::query;
use crate::error::{BackendError, BackendResult, RegistryError};
use crate::registry::BackendRegistry;
use crate::traits::{BackendHandle, ConnectTarget, DocumentStore, DocumentStoreFactory, Provisioner};
use crate::types::{Document, Properties, ProvisionOutcome, QueryParams, RawResult, ResourceSpec};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Registered kind
pub const KIND: &str = "file";

/// Encode a path component: keep `[A-Za-z0-9_.-]`, escape the rest as `%XX`
#[must_use]
pub fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => out.push(char::from(byte)),
            b'.' if !out.is_empty() => out.push('.'),
            _ => {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    if out.is_empty() {
        out.push_str("%00");
    }
    out
}

/// Handle over a directory of containers
#[derive(Debug)]
pub struct FileDocumentStore {
    root: PathBuf,
    pool: BlockingPool,
    closed: AtomicBool,
}

impl FileDocumentStore {
    /// Create handle rooted at `root`
    pub fn new(root: impl Into<PathBuf>, pool: BlockingPool) -> Self {
        Self {
            root: root.into(),
            pool,
            closed: AtomicBool::new(false),
        }
    }

    fn container_dir(&self, container: &str) -> BackendResult<PathBuf> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::ConnectionLost("document handle is closed".into()));
        }
        Ok(self.root.join(encode_component(container)))
    }
}

fn require_dir(dir: &Path) -> BackendResult<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(BackendError::NotFound(format!(
            "container directory {} is not provisioned",
            dir.display()
        )))
    }
}

fn write_document(dir: &Path, document: &Document) -> BackendResult<()> {
    require_dir(dir)?;
    let partition = dir.join(encode_component(&document.partition_key));
    fs::create_dir_all(&partition)?;
    let path = partition.join(format!("{}.json", encode_component(&document.id)));
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(&document.body)?)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

fn read_documents(dir: &Path) -> BackendResult<Vec<Properties>> {
    require_dir(dir)?;
    let mut files = Vec::new();
    for partition in fs::read_dir(dir)? {
        let partition = partition?.path();
        if !partition.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&partition)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
    }
    files.sort();
    files
        .iter()
        .map(|path| {
            let bytes = fs::read(path)?;
            serde_json::from_slice(&bytes).map_err(|e| {
                BackendError::Io(format!("corrupt document {}: {e}", path.display()))
            })
        })
        .collect()
}

#[async_trait]
impl BackendHandle for FileDocumentStore {
    fn kind(&self) -> &str {
        KIND
    }

    async fn close(&self) -> BackendResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn upsert(&self, container: &str, document: &Document) -> BackendResult<()> {
        let dir = self.container_dir(container)?;
        let document = document.clone();
        self.pool.run(move || write_document(&dir, &document)).await
    }

    async fn query(&self, container: &str, text: &str, params: &QueryParams) -> BackendResult<RawResult> {
        let parsed = query::parse(text)?;
        let dir = self.container_dir(container)?;
        let bodies = self.pool.run(move || read_documents(&dir)).await?;
        parsed.evaluate(&bodies, params)
    }

    fn provisioner(&self) -> Option<&dyn Provisioner> {
        Some(self)
    }
}

#[async_trait]
impl Provisioner for FileDocumentStore {
    async fn ensure_exists(&self, spec: &ResourceSpec) -> BackendResult<ProvisionOutcome> {
        let ResourceSpec::Container { name, .. } = spec else {
            return Err(BackendError::unsupported(KIND, format!("provisioning {spec}")));
        };
        let root = self.root.clone();
        let dir = self.container_dir(name)?;
        self.pool
            .run(move || {
                fs::create_dir_all(&root)?;
                fs::create_dir(&dir)?;
                Ok(())
            })
            .await?;
        tracing::info!(resource = %spec, "provisioned");
        Ok(ProvisionOutcome::Created)
    }
}

/// Factory for [`FileDocumentStore`]; needs a document root in the clients
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDocumentFactory;

#[async_trait]
impl DocumentStoreFactory for FileDocumentFactory {
    async fn connect(
        &self,
        target: &ConnectTarget,
        clients: &BackendClients,
    ) -> BackendResult<Arc<dyn DocumentStore>> {
        let root = clients.document_root().ok_or_else(|| {
            BackendError::Io("file document store needs a document root".into())
        })?;
        tracing::debug!(scope = %target.scope, root = %root.display(), "opening file document store");
        Ok(Arc::new(FileDocumentStore::new(root, clients.blocking().clone())))
    }
}

/// Register this kind
///
/// # Errors
/// Fails if the kind is already registered.
pub fn register(registry: &mut BackendRegistry) -> Result<(), RegistryError> {
    registry.register_documents(KIND, Arc::new(FileDocumentFactory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ensure_exists;
    use serde_json::json;

    fn alerts() -> ResourceSpec {
        ResourceSpec::Container {
            name: "telco-Alerts".into(),
            partition_key_path: "/RouterId".into(),
        }
    }

    fn alert(id: &str, router: &str, severity: i64) -> Document {
        let mut body = Properties::new();
        body.insert("RouterId".into(), json!(router));
        body.insert("Severity".into(), json!(severity));
        Document::new(id, router, body)
    }

    #[test]
    fn components_are_encoded() {
        assert_eq!(encode_component("R1"), "R1");
        assert_eq!(encode_component("a/b c"), "a%2Fb%20c");
        assert_eq!(encode_component(".."), "%2E.");
        assert_eq!(encode_component(""), "%00");
    }

    #[tokio::test]
    async fn round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path().join("docs"), BlockingPool::new(2));

        assert_eq!(ensure_exists(&store, &alerts()).await.unwrap(), ProvisionOutcome::Created);
        assert_eq!(
            ensure_exists(&store, &alerts()).await.unwrap(),
            ProvisionOutcome::AlreadyExists
        );

        store.upsert("telco-Alerts", &alert("A1", "R1", 3)).await.unwrap();
        store.upsert("telco-Alerts", &alert("A2", "R2", 1)).await.unwrap();
        store.upsert("telco-Alerts", &alert("A1", "R1", 4)).await.unwrap();

        let result = store
            .query(
                "telco-Alerts",
                "SELECT VALUE c.Severity FROM c ORDER BY c.Severity",
                &QueryParams::new(),
            )
            .await
            .unwrap();
        assert_eq!(result, RawResult::Scalars(vec![json!(1), json!(4)]));
        assert!(dir.path().join("docs/telco-Alerts/R1/A1.json").is_file());
    }

    #[tokio::test]
    async fn upsert_into_missing_container_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path(), BlockingPool::default());
        let err = store.upsert("nope", &alert("A1", "R1", 1)).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn factory_requires_document_root() {
        let err = FileDocumentFactory
            .connect(&ConnectTarget::new("telco", "telco"), &BackendClients::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::Io(_)));
    }
}
