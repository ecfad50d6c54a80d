//! Ingestion engine
//!
//! Drives one scenario's manifest and data files into its backends:
//!
//! 1. **Validating**: scenario id, manifest cross-references and data files
//!    are checked before anything is written
//! 2. **Provisioning**: graph, labels and scoped document containers are
//!    ensured; resources that already exist count as success
//! 3. **Writing**: vertices, then edges, then documents, row by row
//!
//! A row that cannot be mapped or written is recorded and skipped. Only
//! validation failures, exhausted retries, auth failures and unsupported
//! capabilities end a run early. Nothing is rolled back; ids are
//! deterministic, so re-running a failed ingestion overwrites instead of
//! duplicating.

mod result;
mod rows;
mod state;

pub use result::{IngestEvent, IngestionResult, ProvisionSummary, RowFailure};
pub use rows::{
    coerce_number, document_id, document_record, edge_id, edge_record, vertex_record, RowError,
};
pub use state::{allowed_transitions, validate_transition, IngestState};

use crate::access::{is_run_terminating, BackendAccess};
use crate::context::{ScenarioCatalog, ScenarioContext};
use crate::error::{IngestError, IngestFailure, IngestResult};
use scenario_backend::{
    ensure_exists, BackendError, BackendResult, DocumentStore, GraphBackend, ProvisionOutcome,
    ResourceSpec,
};
use scenario_manifest::{naming, Manifest, PreparedManifest};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Name of the partition key property on provisioned graphs
pub const PARTITION_KEY: &str = "partitionKey";

/// One ingestion request
#[derive(Debug, Clone)]
pub struct IngestJob {
    /// Target scenario
    pub scenario_id: String,
    /// Declared datasets
    pub manifest: Manifest,
    /// Directory the manifest's `data_dir` resolves against
    pub root: PathBuf,
    /// Graph backend kind; engine default when unset
    pub graph_kind: Option<String>,
    /// Document store kind; engine default when unset
    pub document_kind: Option<String>,
}

impl IngestJob {
    /// Create job with the engine's default backends
    pub fn new(scenario_id: impl Into<String>, manifest: Manifest, root: impl Into<PathBuf>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            manifest,
            root: root.into(),
            graph_kind: None,
            document_kind: None,
        }
    }

    /// With graph backend kind
    #[inline]
    #[must_use]
    pub fn with_graph_kind(mut self, kind: impl Into<String>) -> Self {
        self.graph_kind = Some(kind.into());
        self
    }

    /// With document store kind
    #[inline]
    #[must_use]
    pub fn with_document_kind(mut self, kind: impl Into<String>) -> Self {
        self.document_kind = Some(kind.into());
        self
    }
}

/// Why a run stopped before completing
enum Stop {
    Cancelled,
    Failed(IngestError),
}

impl From<IngestError> for Stop {
    fn from(error: IngestError) -> Self {
        Self::Failed(error)
    }
}

impl From<BackendError> for Stop {
    fn from(error: BackendError) -> Self {
        if matches!(error.root(), BackendError::Cancelled) {
            Self::Cancelled
        } else {
            Self::Failed(IngestError::Backend(error))
        }
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), Stop> {
    if cancel.is_cancelled() {
        Err(Stop::Cancelled)
    } else {
        Ok(())
    }
}

fn provisioning_stop(spec: &ResourceSpec, error: BackendError) -> Stop {
    if matches!(error.root(), BackendError::Cancelled) {
        return Stop::Cancelled;
    }
    Stop::Failed(IngestError::Provisioning {
        resource: spec.to_string(),
        source: error,
    })
}

/// Mutable state of one run
struct Run<'a> {
    state: IngestState,
    result: IngestionResult,
    started: Instant,
    events: Option<&'a mpsc::Sender<IngestEvent>>,
    total_rows: usize,
    handled_rows: usize,
}

impl<'a> Run<'a> {
    fn new(ctx: &ScenarioContext, events: Option<&'a mpsc::Sender<IngestEvent>>) -> Self {
        Self {
            state: IngestState::Validating,
            result: IngestionResult::start(&ctx.scenario_id, &ctx.graph_name, &ctx.backend_kind),
            started: Instant::now(),
            events,
            total_rows: 0,
            handled_rows: 0,
        }
    }

    fn advance(&mut self, to: IngestState) -> Result<(), IngestError> {
        validate_transition(self.state, to)?;
        tracing::info!(scenario = %self.result.scenario_id, from = %self.state, to = %to, "ingestion phase");
        self.state = to;
        self.result.state = to;
        Ok(())
    }

    fn percent(&self) -> u8 {
        if self.total_rows == 0 {
            return if self.state.is_terminal() { 100 } else { 0 };
        }
        let pct = (self.handled_rows.min(self.total_rows) * 100) / self.total_rows;
        u8::try_from(pct).unwrap_or(100)
    }

    async fn progress(&self, detail: impl Into<String>) {
        let Some(tx) = self.events else { return };
        let event = IngestEvent::Progress {
            phase: self.state,
            detail: detail.into(),
            percent: self.percent(),
        };
        if tx.send(event).await.is_err() {
            tracing::debug!("progress receiver dropped");
        }
    }

    /// Record the outcome of one row write; `Ok(true)` when written
    fn absorb(&mut self, row: usize, file: &str, outcome: BackendResult<()>) -> Result<bool, Stop> {
        match outcome {
            Ok(()) => Ok(true),
            Err(e) if is_run_terminating(&e) => Err(Stop::from(e)),
            Err(e) => {
                self.reject(row, file, e.to_string());
                Ok(false)
            }
        }
    }

    fn reject(&mut self, row: usize, file: &str, reason: String) {
        tracing::warn!(file, row, reason = %reason, "row not written");
        self.result.failures.push(RowFailure::new(row, file, reason));
    }

    fn finish(mut self) -> IngestionResult {
        self.result.duration = self.started.elapsed();
        self.result
    }
}

/// Loads scenarios into their backends
#[derive(Debug)]
pub struct IngestionEngine {
    access: Arc<BackendAccess>,
    catalog: Arc<ScenarioCatalog>,
    graph_kind: String,
    document_kind: String,
    progress_capacity: usize,
}

impl IngestionEngine {
    /// Create engine with `mock` graphs and `memory` documents by default
    #[must_use]
    pub fn new(access: Arc<BackendAccess>, catalog: Arc<ScenarioCatalog>) -> Self {
        Self {
            access,
            catalog,
            graph_kind: "mock".to_string(),
            document_kind: "memory".to_string(),
            progress_capacity: 64,
        }
    }

    /// With default graph backend kind
    #[inline]
    #[must_use]
    pub fn with_graph_kind(mut self, kind: impl Into<String>) -> Self {
        self.graph_kind = kind.into();
        self
    }

    /// With default document store kind
    #[inline]
    #[must_use]
    pub fn with_document_kind(mut self, kind: impl Into<String>) -> Self {
        self.document_kind = kind.into();
        self
    }

    /// With progress channel capacity
    #[inline]
    #[must_use]
    pub fn with_progress_capacity(mut self, capacity: usize) -> Self {
        self.progress_capacity = capacity.max(1);
        self
    }

    /// Run an ingestion to its end without progress events
    ///
    /// Cancellation yields `Ok` with state [`IngestState::Cancelled`].
    ///
    /// # Errors
    /// Returns [`IngestFailure`] carrying the partial result when the run fails.
    pub async fn ingest(&self, job: IngestJob, cancel: &CancellationToken) -> IngestResult<IngestionResult> {
        self.run(job, cancel, None).await
    }

    /// Spawn an ingestion, streaming its progress
    ///
    /// The stream ends with one terminal [`IngestEvent::Result`] or
    /// [`IngestEvent::Error`].
    #[must_use]
    pub fn start(self: &Arc<Self>, job: IngestJob, cancel: CancellationToken) -> IngestRun {
        let (tx, rx) = mpsc::channel(self.progress_capacity);
        let engine = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let outcome = engine.run(job, &token, Some(&tx)).await;
            let terminal = match &outcome {
                Ok(result) => IngestEvent::Result {
                    result: result.clone(),
                },
                Err(failure) => IngestEvent::Error {
                    message: failure.error.to_string(),
                    partial: failure.partial.clone(),
                },
            };
            if tx.send(terminal).await.is_err() {
                tracing::debug!("progress receiver dropped before terminal event");
            }
            outcome
        });
        IngestRun {
            events: rx,
            handle,
            cancel,
        }
    }

    #[tracing::instrument(skip_all, fields(scenario = %job.scenario_id))]
    async fn run(
        &self,
        job: IngestJob,
        cancel: &CancellationToken,
        events: Option<&mpsc::Sender<IngestEvent>>,
    ) -> IngestResult<IngestionResult> {
        let graph_kind = job.graph_kind.clone().unwrap_or_else(|| self.graph_kind.clone());
        let document_kind = job
            .document_kind
            .clone()
            .unwrap_or_else(|| self.document_kind.clone());
        let ctx = ScenarioContext::for_scenario(&job.scenario_id, graph_kind);
        let mut run = Run::new(&ctx, events);
        run.progress("validating manifest").await;

        let terminal = match self.drive(job, &ctx, &document_kind, cancel, &mut run).await {
            Ok(()) => IngestState::Complete,
            Err(Stop::Cancelled) => IngestState::Cancelled,
            Err(Stop::Failed(error)) => {
                if let Err(e) = run.advance(IngestState::Failed) {
                    tracing::error!(error = %e, "could not record failure state");
                }
                tracing::error!(error = %error, "ingestion failed");
                return Err(IngestFailure {
                    error,
                    partial: run.finish(),
                });
            }
        };

        if let Err(error) = run.advance(terminal) {
            return Err(IngestFailure {
                error,
                partial: run.finish(),
            });
        }
        run.progress(terminal.as_str()).await;
        let result = run.finish();
        tracing::info!(
            state = %result.state,
            vertices = result.vertices,
            edges = result.edges,
            documents = result.documents,
            failures = result.failures.len(),
            elapsed_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            "ingestion finished"
        );
        Ok(result)
    }

    async fn drive(
        &self,
        job: IngestJob,
        ctx: &ScenarioContext,
        document_kind: &str,
        cancel: &CancellationToken,
        run: &mut Run<'_>,
    ) -> Result<(), Stop> {
        naming::validate_scenario_id(&job.scenario_id).map_err(IngestError::from)?;
        let prepared = self.prepare(job.manifest, job.root).await?;
        run.total_rows = prepared.tables().total_rows();

        checkpoint(cancel)?;
        run.advance(IngestState::Provisioning)?;
        run.progress(format!("provisioning {}", ctx.graph_name)).await;
        self.provision(ctx, document_kind, prepared.manifest(), cancel, run)
            .await?;

        checkpoint(cancel)?;
        run.advance(IngestState::WritingVertices)?;
        run.progress("writing vertices").await;
        self.write_vertices(ctx, &prepared, cancel, run).await?;

        checkpoint(cancel)?;
        run.advance(IngestState::WritingEdges)?;
        run.progress("writing edges").await;
        self.write_edges(ctx, &prepared, cancel, run).await?;

        checkpoint(cancel)?;
        run.advance(IngestState::WritingDocuments)?;
        run.progress("writing documents").await;
        self.write_documents(ctx, document_kind, &prepared, cancel, run)
            .await?;
        Ok(())
    }

    /// Load and validate on the blocking pool
    async fn prepare(&self, manifest: Manifest, root: PathBuf) -> Result<PreparedManifest, IngestError> {
        let pool = self.access.cache().clients().blocking();
        let prepared = pool
            .run(move || Ok(PreparedManifest::prepare(manifest, &root)))
            .await?;
        Ok(prepared?)
    }

    async fn provision(
        &self,
        ctx: &ScenarioContext,
        document_kind: &str,
        manifest: &Manifest,
        cancel: &CancellationToken,
        run: &mut Run<'_>,
    ) -> Result<(), Stop> {
        let graph = self.access.graph(ctx).await?;
        if graph.provisioner().is_some() {
            for spec in graph_resources(ctx, manifest) {
                let outcome = self
                    .access
                    .graph_call(ctx, "provision", cancel, |g| {
                        let spec = &spec;
                        async move {
                            match g.provisioner() {
                                Some(p) => ensure_exists(p, spec).await,
                                None => Ok(ProvisionOutcome::AlreadyExists),
                            }
                        }
                    })
                    .await
                    .map_err(|e| provisioning_stop(&spec, e))?;
                count_outcome(run, outcome);
            }
        } else {
            tracing::debug!(kind = %ctx.backend_kind, "graph backend has no control plane, skipping provisioning");
            run.result.provisioning.skipped += 1;
        }

        if !manifest.documents.is_empty() {
            let store = self.access.documents(document_kind, ctx).await?;
            if store.provisioner().is_some() {
                for def in &manifest.documents {
                    let spec = ResourceSpec::Container {
                        name: ctx.container(&def.name),
                        partition_key_path: def.partition_key_path.clone(),
                    };
                    let outcome = self
                        .access
                        .document_call(document_kind, ctx, "provision", cancel, |s| {
                            let spec = &spec;
                            async move {
                                match s.provisioner() {
                                    Some(p) => ensure_exists(p, spec).await,
                                    None => Ok(ProvisionOutcome::AlreadyExists),
                                }
                            }
                        })
                        .await
                        .map_err(|e| provisioning_stop(&spec, e))?;
                    count_outcome(run, outcome);
                }
            } else {
                tracing::debug!(kind = document_kind, "document store has no control plane, skipping provisioning");
                run.result.provisioning.skipped += 1;
            }
        }

        self.catalog.record(ctx.clone());
        Ok(())
    }

    async fn write_vertices(
        &self,
        ctx: &ScenarioContext,
        prepared: &PreparedManifest,
        cancel: &CancellationToken,
        run: &mut Run<'_>,
    ) -> Result<(), Stop> {
        for def in &prepared.manifest().vertices {
            let Some(table) = prepared.table(&def.source_file) else {
                continue;
            };
            for (i, row) in table.rows().iter().enumerate() {
                checkpoint(cancel)?;
                let vertex = match vertex_record(def, row) {
                    Ok(vertex) => vertex,
                    Err(e) => {
                        run.reject(i, &def.source_file, e.to_string());
                        continue;
                    }
                };
                let outcome = self
                    .access
                    .graph_call(ctx, "upsert_vertex", cancel, |g| {
                        let vertex = &vertex;
                        async move { g.upsert_vertex(vertex).await }
                    })
                    .await;
                if run.absorb(i, &def.source_file, outcome)? {
                    run.result.vertices += 1;
                }
            }
            run.handled_rows += table.len();
            run.progress(format!("{} rows of {}", table.len(), def.source_file))
                .await;
        }
        Ok(())
    }

    async fn write_edges(
        &self,
        ctx: &ScenarioContext,
        prepared: &PreparedManifest,
        cancel: &CancellationToken,
        run: &mut Run<'_>,
    ) -> Result<(), Stop> {
        for def in &prepared.manifest().edges {
            let Some(table) = prepared.table(&def.source_file) else {
                continue;
            };
            for (i, row) in table.rows().iter().enumerate() {
                checkpoint(cancel)?;
                let edge = match edge_record(def, row) {
                    Ok(Some(edge)) => edge,
                    Ok(None) => {
                        run.result.filtered += 1;
                        continue;
                    }
                    Err(e) => {
                        run.reject(i, &def.source_file, e.to_string());
                        continue;
                    }
                };
                let outcome = self
                    .access
                    .graph_call(ctx, "upsert_edge", cancel, |g| {
                        let edge = &edge;
                        async move { g.upsert_edge(edge).await }
                    })
                    .await;
                if run.absorb(i, &def.source_file, outcome)? {
                    run.result.edges += 1;
                }
            }
            run.handled_rows += table.len();
            run.progress(format!("{} rows of {}", table.len(), def.source_file))
                .await;
        }
        Ok(())
    }

    async fn write_documents(
        &self,
        ctx: &ScenarioContext,
        document_kind: &str,
        prepared: &PreparedManifest,
        cancel: &CancellationToken,
        run: &mut Run<'_>,
    ) -> Result<(), Stop> {
        for def in &prepared.manifest().documents {
            let Some(file) = def.source_file() else {
                continue;
            };
            let Some(table) = prepared.table(file) else {
                continue;
            };
            let strategy = def.id_strategy(table.headers());
            let container = ctx.container(&def.name);
            for (i, row) in table.rows().iter().enumerate() {
                checkpoint(cancel)?;
                let document = match document_record(def, &strategy, row) {
                    Ok(document) => document,
                    Err(e) => {
                        run.reject(i, file, e.to_string());
                        continue;
                    }
                };
                let outcome = self
                    .access
                    .document_call(document_kind, ctx, "upsert_document", cancel, |s| {
                        let (container, document) = (&container, &document);
                        async move { s.upsert(container, document).await }
                    })
                    .await;
                if run.absorb(i, file, outcome)? {
                    run.result.documents += 1;
                }
            }
            run.handled_rows += table.len();
            run.progress(format!("{} rows of {file}", table.len())).await;
        }
        Ok(())
    }
}

/// Graph, then every vertex label, then every distinct edge label
fn graph_resources(ctx: &ScenarioContext, manifest: &Manifest) -> Vec<ResourceSpec> {
    let mut specs = vec![ResourceSpec::Graph {
        name: ctx.graph_name.clone(),
        partition_key: PARTITION_KEY.to_string(),
    }];
    for def in &manifest.vertices {
        specs.push(ResourceSpec::VertexLabel {
            graph: ctx.graph_name.clone(),
            label: def.label.clone(),
        });
    }
    let mut edge_labels: Vec<&str> = manifest.edges.iter().map(|e| e.label.as_str()).collect();
    edge_labels.sort_unstable();
    edge_labels.dedup();
    for label in edge_labels {
        specs.push(ResourceSpec::EdgeLabel {
            graph: ctx.graph_name.clone(),
            label: label.to_string(),
        });
    }
    specs
}

fn count_outcome(run: &mut Run<'_>, outcome: ProvisionOutcome) {
    match outcome {
        ProvisionOutcome::Created => run.result.provisioning.created += 1,
        ProvisionOutcome::AlreadyExists => run.result.provisioning.already_existed += 1,
    }
}

/// A spawned ingestion
#[derive(Debug)]
pub struct IngestRun {
    events: mpsc::Receiver<IngestEvent>,
    handle: JoinHandle<IngestResult<IngestionResult>>,
    cancel: CancellationToken,
}

impl IngestRun {
    /// Next progress or terminal event; `None` once the run has ended
    pub async fn next_event(&mut self) -> Option<IngestEvent> {
        self.events.recv().await
    }

    /// Stop starting new rows and phases
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancellation token of this run
    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for the outcome, discarding unread events
    ///
    /// # Errors
    /// Returns the [`JoinError`] if the run task panicked.
    pub async fn join(mut self) -> Result<IngestResult<IngestionResult>, JoinError> {
        self.events.close();
        self.handle.await
    }

    /// Read every event, then the outcome
    ///
    /// # Errors
    /// Returns the [`JoinError`] if the run task panicked.
    pub async fn collect(mut self) -> Result<(Vec<IngestEvent>, IngestResult<IngestionResult>), JoinError> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let outcome = self.handle.await?;
        Ok((events, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MANIFEST: &str = r"
vertices:
  - label: Router
    csv_file: routers.csv
    id_column: RouterId
    partition_key: network
    properties: [RouterId]
  - label: Site
    csv_file: sites.csv
    id_column: SiteId
    partition_key: network
    properties: [SiteId]
edges:
  - label: located_at
    csv_file: routers.csv
    source: {label: Router, property: RouterId, column: RouterId}
    target: {label: Site, property: SiteId, column: SiteId}
  - label: connects_to
    csv_file: links.csv
    source: {label: Router, property: RouterId, column: From}
    target: {label: Router, property: RouterId, column: To}
  - label: connects_to
    csv_file: backup_links.csv
    source: {label: Router, property: RouterId, column: From}
    target: {label: Router, property: RouterId, column: To}
";

    #[test]
    fn graph_resources_dedup_edge_labels() {
        let manifest = Manifest::from_yaml_str(MANIFEST).unwrap();
        let ctx = ScenarioContext::for_scenario("telco", "graph");

        let names: Vec<String> = graph_resources(&ctx, &manifest)
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(names.len(), 5);
        assert_eq!(
            graph_resources(&ctx, &manifest)[0],
            ResourceSpec::Graph {
                name: "telco-topology".into(),
                partition_key: PARTITION_KEY.into(),
            }
        );
        assert_eq!(
            graph_resources(&ctx, &manifest)[3..],
            [
                ResourceSpec::EdgeLabel {
                    graph: "telco-topology".into(),
                    label: "connects_to".into(),
                },
                ResourceSpec::EdgeLabel {
                    graph: "telco-topology".into(),
                    label: "located_at".into(),
                },
            ]
        );
    }

    #[test]
    fn percent_tracks_handled_rows() {
        let ctx = ScenarioContext::for_scenario("telco", "mock");
        let mut run = Run::new(&ctx, None);
        assert_eq!(run.percent(), 0);

        run.total_rows = 8;
        run.handled_rows = 2;
        assert_eq!(run.percent(), 25);
        run.handled_rows = 9;
        assert_eq!(run.percent(), 100);
    }

    #[test]
    fn cancelled_backend_error_stops_as_cancellation() {
        let wrapped = BackendError::RetriesExhausted {
            attempts: 2,
            source: Box::new(BackendError::Cancelled),
        };
        assert!(matches!(Stop::from(wrapped), Stop::Cancelled));
        assert!(matches!(
            Stop::from(BackendError::Auth("403".into())),
            Stop::Failed(IngestError::Backend(_))
        ));
    }
}
