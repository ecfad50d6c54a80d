//! Scenario naming rules
//!
//! The single place that knows how scenario ids map onto the names of the
//! resources derived from them. Upload-time code (ingestion) and query-time
//! code (context resolution) both go through these functions, so a scenario
//! that provisions cleanly is always reachable afterwards.
//!
//! ```text
//! scenario id      telco-noc
//! graph name       telco-noc-topology        graph_name()
//! split back       (telco-noc, topology)     split_graph_name()
//! container        telco-noc-linkmetrics     scoped_container()
//! ```

use crate::error::NamingError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Separator between a scenario id and a derived suffix
pub const SEPARATOR: char = '-';

/// Suffix of the graph resource derived from a scenario id
pub const TOPOLOGY_SUFFIX: &str = "topology";

/// Suffixes the platform appends to scenario ids for its own resources
pub const RESERVED_SUFFIXES: [&str; 5] = [
    "-topology",
    "-telemetry",
    "-prompts",
    "-runbooks",
    "-tickets",
];

/// Minimum scenario id length
pub const MIN_LEN: usize = 2;

/// Maximum scenario id length (leaves room for the longest derived suffix)
pub const MAX_LEN: usize = 50;

// Lowercase alphanumeric runs joined by single hyphens: rules out leading,
// trailing and consecutive hyphens in one pattern.
static SCENARIO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("scenario id pattern is valid"));

/// Check a bare scenario id against the naming rules
///
/// # Errors
/// - [`NamingError::Length`] outside `MIN_LEN..=MAX_LEN`
/// - [`NamingError::Pattern`] for uppercase, other punctuation, or misplaced hyphens
/// - [`NamingError::ReservedSuffix`] if it ends with a platform suffix
pub fn validate_scenario_id(id: &str) -> Result<(), NamingError> {
    if !(MIN_LEN..=MAX_LEN).contains(&id.len()) {
        return Err(NamingError::Length {
            id: id.to_string(),
            min: MIN_LEN,
            max: MAX_LEN,
        });
    }
    if !SCENARIO_ID.is_match(id) {
        return Err(NamingError::Pattern(id.to_string()));
    }
    if let Some(suffix) = RESERVED_SUFFIXES.iter().find(|s| id.ends_with(**s)) {
        return Err(NamingError::ReservedSuffix {
            id: id.to_string(),
            suffix: *suffix,
        });
    }
    Ok(())
}

/// Graph resource name for a scenario
#[inline]
#[must_use]
pub fn graph_name(scenario_id: &str) -> String {
    format!("{scenario_id}{SEPARATOR}{TOPOLOGY_SUFFIX}")
}

/// Split an inbound graph identifier on its rightmost separator
///
/// Returns `Some((scenario_id, suffix))` when the identifier contains a
/// separator with non-empty text on both sides, `None` otherwise.
#[must_use]
pub fn split_graph_name(raw: &str) -> Option<(&str, &str)> {
    match raw.rsplit_once(SEPARATOR) {
        Some((scenario, suffix)) if !scenario.is_empty() && !suffix.is_empty() => {
            Some((scenario, suffix))
        }
        _ => None,
    }
}

/// Physical container name for a logical container inside a scope
#[inline]
#[must_use]
pub fn scoped_container(scope_prefix: &str, container: &str) -> String {
    format!("{scope_prefix}{SEPARATOR}{container}")
}
