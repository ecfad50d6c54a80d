//! Error types for manifest loading and validation
//!
//! Provides error handling for:
//! - Manifest parsing (YAML → [`Manifest`](crate::Manifest))
//! - Cross-reference validation against declared labels and file headers
//! - Reading the tabular payload files a manifest points at
//! - Scenario naming rules

use std::fmt;
use std::path::PathBuf;

/// A single violated manifest rule, located by a dotted field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Location in the manifest, e.g. `edges[1].source.label`
    pub path: String,
    /// What is wrong at that location
    pub message: String,
}

impl FieldError {
    /// Create field error
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors raised while loading or validating a manifest
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest text is not valid YAML for the manifest shape
    #[error("manifest parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// IO error reading the manifest itself
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more validation rules were violated
    #[error("manifest validation failed ({} error(s)): {}", .0.len(), join_errors(.0))]
    Invalid(Vec<FieldError>),

    /// Scenario id rejected by the naming rules
    #[error("invalid scenario id: {0}")]
    Naming(#[from] NamingError),
}

impl ManifestError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Field errors carried by an [`ManifestError::Invalid`], empty otherwise
    #[must_use]
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors reading a CSV or JSON payload file
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// File could not be opened or read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV structure error
    #[error("csv error in {path}: {message}")]
    Csv { path: PathBuf, message: String },

    /// JSON structure error
    #[error("json error in {path}: {message}")]
    Json { path: PathBuf, message: String },

    /// File has no header row
    #[error("{0} has no header row")]
    MissingHeader(PathBuf),
}

/// Scenario naming rule violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamingError {
    /// Length outside the permitted range
    #[error("'{id}' must be between {min} and {max} characters")]
    Length { id: String, min: usize, max: usize },

    /// Characters or hyphen placement not permitted
    #[error("'{0}' must be lowercase letters, digits and single hyphens, starting and ending with a letter or digit")]
    Pattern(String),

    /// Ends with a suffix the platform derives for its own resources
    #[error("'{id}' ends with reserved suffix '{suffix}'")]
    ReservedSuffix { id: String, suffix: &'static str },
}

/// Result alias for manifest operations
pub type ManifestResult<T> = Result<T, ManifestError>;
