//! Ingestion run states
//!
//! ```text
//! Validating -> Provisioning -> WritingVertices -> WritingEdges -> WritingDocuments -> Complete
//!      \              \                \                  \                \
//!       +--------------+----------------+------------------+----------------+--> Failed | Cancelled
//! ```

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an ingestion run is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    /// Manifest and data files are being checked
    Validating,
    /// Graph, labels and containers are being created
    Provisioning,
    /// Vertex rows are being written
    WritingVertices,
    /// Edge rows are being written
    WritingEdges,
    /// Document rows are being written
    WritingDocuments,
    /// Every phase ran
    Complete,
    /// Stopped by a run-terminating error
    Failed,
    /// Stopped on request
    Cancelled,
}

impl IngestState {
    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Name used in logs and progress events
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Provisioning => "provisioning",
            Self::WritingVertices => "writing_vertices",
            Self::WritingEdges => "writing_edges",
            Self::WritingDocuments => "writing_documents",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a state transition
///
/// # Errors
/// Returns [`IngestError::IllegalTransition`] when `to` is not reachable from `from`.
pub fn validate_transition(from: IngestState, to: IngestState) -> Result<(), IngestError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(IngestError::IllegalTransition { from, to })
    }
}

/// States reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: IngestState) -> Vec<IngestState> {
    use IngestState::*;
    match from {
        Validating => vec![Provisioning, Failed, Cancelled],
        Provisioning => vec![WritingVertices, Failed, Cancelled],
        WritingVertices => vec![WritingEdges, Failed, Cancelled],
        WritingEdges => vec![WritingDocuments, Failed, Cancelled],
        WritingDocuments => vec![Complete, Failed, Cancelled],
        Complete | Failed | Cancelled => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [IngestState; 8] = [
        IngestState::Validating,
        IngestState::Provisioning,
        IngestState::WritingVertices,
        IngestState::WritingEdges,
        IngestState::WritingDocuments,
        IngestState::Complete,
        IngestState::Failed,
        IngestState::Cancelled,
    ];

    #[test]
    fn happy_path_is_linear() {
        let path = &ALL[..6];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn every_running_state_can_fail_or_cancel() {
        for state in ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(validate_transition(*state, IngestState::Failed).is_ok());
            assert!(validate_transition(*state, IngestState::Cancelled).is_ok());
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for state in ALL.iter().filter(|s| s.is_terminal()) {
            assert!(allowed_transitions(*state).is_empty());
        }
    }

    #[test]
    fn edges_never_precede_vertices() {
        assert!(matches!(
            validate_transition(IngestState::Provisioning, IngestState::WritingEdges),
            Err(IngestError::IllegalTransition { .. })
        ));
        assert!(validate_transition(IngestState::WritingEdges, IngestState::WritingVertices).is_err());
    }
}
