//! Error types for backend operations
//!
//! Every backend maps its native failures onto [`BackendError`]. The
//! variants line up with how callers react:
//! - throttling / timeouts / dropped connections are retried
//! - authentication failures and everything unknown are fatal
//! - conflicts are absorbed by idempotent provisioning
//! - unsupported capabilities are reported, never answered with an empty result

/// Errors raised by backends, the registry and the handle cache
///
/// Payloads are plain strings so the error is `Clone`: a failed connection
/// attempt inside the cache is handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Request rate exceeded (HTTP 429 class)
    #[error("throttled: {0}")]
    Throttled(String),

    /// Request timed out (HTTP 408 class)
    #[error("timed out: {0}")]
    Timeout(String),

    /// Credential or permission failure
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Resource already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// Resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The connection behind a handle is gone; the handle must be replaced
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The bound backend does not implement what was asked
    #[error("{backend} backend does not support {capability}")]
    Unsupported { backend: String, capability: String },

    /// Query text could not be parsed or bound
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A single record was rejected (bad endpoint, bad id, ...)
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// No backend registered under this kind
    #[error("unknown {family} backend kind '{kind}' (registered: {known})")]
    UnknownKind {
        family: &'static str,
        kind: String,
        known: String,
    },

    /// Local IO failure (file-backed stores)
    #[error("io error: {0}")]
    Io(String),

    /// Operation abandoned because its caller was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Retryable failures persisted past the attempt budget
    #[error("gave up after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        source: Box<BackendError>,
    },

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

/// Whether a failed call may be attempted again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    /// Transient; retry after backoff
    Retryable,
    /// Permanent; surface immediately
    Fatal,
}

impl BackendError {
    /// Create unsupported-capability error
    pub fn unsupported(backend: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::Unsupported {
            backend: backend.into(),
            capability: capability.into(),
        }
    }

    /// Default classification shared by the built-in backends
    ///
    /// Throttling, timeouts and lost connections are transient; everything
    /// else, including unknown failures, is fatal.
    #[must_use]
    pub fn default_retryability(&self) -> Retryability {
        match self {
            Self::Throttled(_) | Self::Timeout(_) | Self::ConnectionLost(_) => {
                Retryability::Retryable
            }
            _ => Retryability::Fatal,
        }
    }

    /// Whether this error means the handle itself is unusable
    ///
    /// Looks through [`BackendError::RetriesExhausted`].
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::ConnectionLost(_) => true,
            Self::RetriesExhausted { source, .. } => source.is_connection_lost(),
            _ => false,
        }
    }

    /// Whether this is an "already exists" response
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// The innermost error, skipping retry annotations
    #[must_use]
    pub fn root(&self) -> &BackendError {
        match self {
            Self::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::AlreadyExists => Self::Conflict(err.to_string()),
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::Auth(err.to_string()),
            std::io::ErrorKind::TimedOut => Self::Timeout(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("json: {err}"))
    }
}

/// Errors raised while populating the backend registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two constructors registered under one kind
    #[error("{family} backend kind '{kind}' registered twice")]
    Duplicate { family: &'static str, kind: String },
}

/// Result alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_defaults() {
        assert_eq!(
            BackendError::Throttled("429".into()).default_retryability(),
            Retryability::Retryable
        );
        assert_eq!(
            BackendError::Timeout("408".into()).default_retryability(),
            Retryability::Retryable
        );
        assert_eq!(
            BackendError::Auth("401".into()).default_retryability(),
            Retryability::Fatal
        );
        assert_eq!(
            BackendError::Internal("boom".into()).default_retryability(),
            Retryability::Fatal
        );
    }

    #[test]
    fn exhausted_display_names_attempts() {
        let err = BackendError::RetriesExhausted {
            attempts: 3,
            source: Box::new(BackendError::Throttled("slow down".into())),
        };
        assert_eq!(err.to_string(), "gave up after 3 attempt(s): throttled: slow down");
        assert_eq!(err.root(), &BackendError::Throttled("slow down".into()));
    }

    #[test]
    fn connection_lost_is_seen_through_retry_annotation() {
        let err = BackendError::RetriesExhausted {
            attempts: 2,
            source: Box::new(BackendError::ConnectionLost("reset".into())),
        };
        assert!(err.is_connection_lost());
        assert!(!BackendError::Timeout("t".into()).is_connection_lost());
    }

    #[test]
    fn io_errors_map_by_kind() {
        let conflict: BackendError =
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists").into();
        assert!(conflict.is_conflict());

        let denied: BackendError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(denied, BackendError::Auth(_)));
    }

    #[test]
    fn unsupported_display() {
        let err = BackendError::unsupported("mock", "query-scoped topology");
        assert_eq!(err.to_string(), "mock backend does not support query-scoped topology");
    }
}
