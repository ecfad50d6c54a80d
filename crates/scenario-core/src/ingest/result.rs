//! Run records and progress events

use super::state::IngestState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One row that could not be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    /// 0-based data row index within `file` (header excluded)
    pub row: usize,
    /// Data file the row came from
    pub file: String,
    /// Why the row was rejected
    pub reason: String,
}

impl RowFailure {
    /// Create failure record
    pub fn new(row: usize, file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            row,
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// What provisioning did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionSummary {
    /// Resources created by this run
    pub created: usize,
    /// Resources that were already there
    pub already_existed: usize,
    /// Backends without a control plane, skipped
    pub skipped: usize,
}

/// Per-run record
///
/// Each run builds a fresh one; nothing is merged into earlier results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionResult {
    /// Scenario ingested
    pub scenario_id: String,
    /// Graph written to
    pub graph_name: String,
    /// Graph backend kind
    pub backend_kind: String,
    /// Final (or current) state
    pub state: IngestState,
    /// Vertices written
    pub vertices: usize,
    /// Edges written
    pub edges: usize,
    /// Documents written
    pub documents: usize,
    /// Edge rows dropped by row filters
    pub filtered: usize,
    /// Rows that could not be written
    pub failures: Vec<RowFailure>,
    /// Provisioning outcome
    pub provisioning: ProvisionSummary,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration
    pub duration: Duration,
}

impl IngestionResult {
    /// Empty record for a run starting now
    pub(crate) fn start(scenario_id: &str, graph_name: &str, backend_kind: &str) -> Self {
        Self {
            scenario_id: scenario_id.to_string(),
            graph_name: graph_name.to_string(),
            backend_kind: backend_kind.to_string(),
            state: IngestState::Validating,
            vertices: 0,
            edges: 0,
            documents: 0,
            filtered: 0,
            failures: Vec::new(),
            provisioning: ProvisionSummary::default(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    /// Rows written across all phases
    #[inline]
    #[must_use]
    pub fn written(&self) -> usize {
        self.vertices + self.edges + self.documents
    }

    /// Whether every row was written
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.state == IngestState::Complete && self.failures.is_empty()
    }
}

/// Streamed while a run progresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    /// A phase started or a data file finished
    Progress {
        /// Current state
        phase: IngestState,
        /// Human readable detail
        detail: String,
        /// Share of data rows handled, 0..=100
        percent: u8,
    },
    /// Terminal: run completed or was cancelled
    Result {
        /// Final record
        result: IngestionResult,
    },
    /// Terminal: run failed
    Error {
        /// Failure description
        message: String,
        /// What was written before the failure
        partial: IngestionResult,
    },
}

impl IngestEvent {
    /// Whether this is the last event of a run
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}
