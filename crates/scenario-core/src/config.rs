//! Platform configuration
//!
//! Loaded from TOML, then adjusted by environment overrides:
//!
//! ```toml
//! graph_backend = "graph"
//! document_backend = "file"
//! fallback_scope = "shared"
//! document_root = "/var/lib/scenarios"
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 500
//!
//! [logging]
//! filter = "scenario_core=debug,info"
//! format = "json"
//! ```

use crate::error::ConfigError;
use scenario_backend::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides [`PlatformConfig::graph_backend`]
pub const ENV_GRAPH_BACKEND: &str = "SCENARIO_GRAPH_BACKEND";
/// Overrides [`PlatformConfig::document_backend`]
pub const ENV_DOCUMENT_BACKEND: &str = "SCENARIO_DOCUMENT_BACKEND";
/// Overrides [`PlatformConfig::fallback_scope`]
pub const ENV_FALLBACK_SCOPE: &str = "SCENARIO_FALLBACK_SCOPE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Platform configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Graph backend kind used when a scenario names none
    pub graph_backend: String,
    /// Document store kind
    pub document_backend: String,
    /// Document scope for identifiers with no scenario part
    pub fallback_scope: String,
    /// Retry policy for backend calls
    pub retry: RetryPolicy,
    /// Concurrent blocking jobs (file IO, data file parsing)
    pub blocking_pool_size: usize,
    /// Root directory of the `file` document store
    pub document_root: Option<PathBuf>,
    /// Buffered progress events per ingestion run
    pub progress_capacity: usize,
    /// Logging
    pub logging: LogConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            graph_backend: "mock".to_string(),
            document_backend: "memory".to_string(),
            fallback_scope: "default".to_string(),
            retry: RetryPolicy::default(),
            blocking_pool_size: 8,
            document_root: None,
            progress_capacity: 64,
            logging: LogConfig::default(),
        }
    }
}

impl PlatformConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed text and
    /// [`ConfigError::Invalid`] for out-of-range settings.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// As [`PlatformConfig::from_toml_str`], plus [`ConfigError::Io`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `SCENARIO_*` overrides read through `lookup`
    ///
    /// Empty values are ignored.
    #[must_use]
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(kind) = get(ENV_GRAPH_BACKEND) {
            self.graph_backend = kind;
        }
        if let Some(kind) = get(ENV_DOCUMENT_BACKEND) {
            self.document_backend = kind;
        }
        if let Some(scope) = get(ENV_FALLBACK_SCOPE) {
            self.fallback_scope = scope;
        }
        self
    }

    /// Apply overrides from the process environment
    #[must_use]
    pub fn with_process_env(self) -> Self {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Check settings
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.graph_backend.trim().is_empty() {
            return invalid("graph_backend must not be empty");
        }
        if self.document_backend.trim().is_empty() {
            return invalid("document_backend must not be empty");
        }
        if self.fallback_scope.trim().is_empty() {
            return invalid("fallback_scope must not be empty");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.blocking_pool_size == 0 {
            return invalid("blocking_pool_size must be at least 1");
        }
        if self.progress_capacity == 0 {
            return invalid("progress_capacity must be at least 1");
        }
        Ok(())
    }

    /// With graph backend kind
    #[inline]
    #[must_use]
    pub fn with_graph_backend(mut self, kind: impl Into<String>) -> Self {
        self.graph_backend = kind.into();
        self
    }

    /// With document backend kind
    #[inline]
    #[must_use]
    pub fn with_document_backend(mut self, kind: impl Into<String>) -> Self {
        self.document_backend = kind.into();
        self
    }

    /// With fallback scope
    #[inline]
    #[must_use]
    pub fn with_fallback_scope(mut self, scope: impl Into<String>) -> Self {
        self.fallback_scope = scope.into();
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With document root for the `file` store
    #[inline]
    #[must_use]
    pub fn with_document_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.document_root = Some(root.into());
        self
    }

    /// With blocking pool size
    #[inline]
    #[must_use]
    pub fn with_blocking_pool_size(mut self, size: usize) -> Self {
        self.blocking_pool_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let config = PlatformConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.graph_backend, "mock");
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn parses_partial_toml() {
        let config = PlatformConfig::from_toml_str(
            r#"
graph_backend = "graph"
document_root = "/srv/docs"

[retry]
max_attempts = 5
base_delay_ms = 250

[logging]
format = "json"
"#,
        )
        .unwrap();

        assert_eq!(config.graph_backend, "graph");
        assert_eq!(config.document_backend, "memory");
        assert_eq!(config.document_root, Some(PathBuf::from("/srv/docs")));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_delay, Duration::from_secs(30));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let err = PlatformConfig::from_toml_str("blocking_pool_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = PlatformConfig::from_toml_str("[retry]\nmax_attempts = 0").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));

        assert!(matches!(
            PlatformConfig::from_toml_str("graph_backend = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn unknown_retry_keys_fail_to_parse() {
        let err = PlatformConfig::from_toml_str("[retry]\nbase_delay = 250").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err:?}");
    }

    #[test]
    fn env_overrides_apply_through_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_GRAPH_BACKEND, "graph"),
            (ENV_FALLBACK_SCOPE, "shared"),
            (ENV_DOCUMENT_BACKEND, "  "),
        ]
        .into_iter()
        .collect();

        let config =
            PlatformConfig::new().apply_env_overrides(|k| env.get(k).map(ToString::to_string));

        assert_eq!(config.graph_backend, "graph");
        assert_eq!(config.fallback_scope, "shared");
        assert_eq!(config.document_backend, "memory");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PlatformConfig::load(dir.path().join("platform.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
