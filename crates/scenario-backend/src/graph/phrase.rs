//! Phrase queries for the `mock` graph backend
//!
//! A tiny fixed vocabulary, enough to assert on graph contents in tests
//! and demos without a traversal language:
//!
//! ```text
//! count vertices [labeled <label>]
//! count edges [labeled <label>]
//! list vertices [labeled <label>] [limit <n>]
//! list edges [labeled <label>] [limit <n>]
//! vertex <id>
//! neighbors of <id> [via <edge label>]
//! ```
//!
//! Keywords are case-insensitive. A `$name` word is replaced by the text of
//! parameter `name`.

use crate::error::{BackendError, BackendResult};
use crate::memory::{value_text, PropertyGraph};
use crate::types::{QueryParams, RawResult};
use indexmap::IndexSet;
use serde_json::Value;

const VOCABULARY: &str = "count vertices|edges [labeled <label>], \
list vertices|edges [labeled <label>] [limit <n>], vertex <id>, \
neighbors of <id> [via <label>]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Vertices,
    Edges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phrase {
    Count {
        target: Target,
        label: Option<String>,
    },
    List {
        target: Target,
        label: Option<String>,
        limit: Option<usize>,
    },
    Vertex(String),
    Neighbors {
        id: String,
        via: Option<String>,
    },
}

fn unrecognized(text: &str) -> BackendError {
    BackendError::InvalidQuery(format!(
        "unrecognized phrase '{text}'; expected one of: {VOCABULARY}"
    ))
}

fn bind(words: &[&str], params: &QueryParams) -> BackendResult<Vec<String>> {
    words
        .iter()
        .map(|w| match w.strip_prefix('$') {
            Some(name) => params
                .get(name)
                .map(value_text)
                .ok_or_else(|| BackendError::InvalidQuery(format!("unbound parameter '{name}'"))),
            None => Ok((*w).to_string()),
        })
        .collect()
}

fn target(word: &str) -> Option<Target> {
    match word.to_ascii_lowercase().as_str() {
        "vertices" => Some(Target::Vertices),
        "edges" => Some(Target::Edges),
        _ => None,
    }
}

/// Parse `[labeled L] [limit N]` in that order
fn modifiers(rest: &[String], allow_limit: bool) -> Option<(Option<String>, Option<usize>)> {
    let mut label = None;
    let mut limit = None;
    let mut i = 0;
    if rest.len() >= i + 2 && rest[i].eq_ignore_ascii_case("labeled") {
        label = Some(rest[i + 1].clone());
        i += 2;
    }
    if allow_limit && rest.len() >= i + 2 && rest[i].eq_ignore_ascii_case("limit") {
        limit = Some(rest[i + 1].parse().ok()?);
        i += 2;
    }
    (i == rest.len()).then_some((label, limit))
}

fn parse(text: &str, params: &QueryParams) -> BackendResult<Phrase> {
    let raw: Vec<&str> = text.split_whitespace().collect();
    let words = bind(&raw, params)?;
    let head = words.first().map(|w| w.to_ascii_lowercase());

    let phrase = match (head.as_deref(), words.get(1)) {
        (Some("count"), Some(t)) => {
            let target = target(t).ok_or_else(|| unrecognized(text))?;
            let (label, _) = modifiers(&words[2..], false).ok_or_else(|| unrecognized(text))?;
            Phrase::Count { target, label }
        }
        (Some("list"), Some(t)) => {
            let target = target(t).ok_or_else(|| unrecognized(text))?;
            let (label, limit) = modifiers(&words[2..], true).ok_or_else(|| unrecognized(text))?;
            Phrase::List {
                target,
                label,
                limit,
            }
        }
        (Some("vertex"), Some(id)) if words.len() == 2 => Phrase::Vertex(id.clone()),
        (Some("neighbors"), Some(of)) if of.eq_ignore_ascii_case("of") && words.len() >= 3 => {
            let id = words[2].clone();
            let via = match &words[3..] {
                [] => None,
                [kw, label] if kw.eq_ignore_ascii_case("via") => Some(label.clone()),
                _ => return Err(unrecognized(text)),
            };
            Phrase::Neighbors { id, via }
        }
        _ => return Err(unrecognized(text)),
    };
    Ok(phrase)
}

fn label_matches(label: &str, want: Option<&String>) -> bool {
    want.map_or(true, |w| w == label)
}

/// Parse and evaluate a phrase against `graph`
///
/// # Errors
/// Returns [`BackendError::InvalidQuery`] for text outside the vocabulary.
pub fn run(text: &str, graph: &PropertyGraph, params: &QueryParams) -> BackendResult<RawResult> {
    let result = match parse(text, params)? {
        Phrase::Count { target, label } => {
            let n = match target {
                Target::Vertices => graph
                    .vertex_ids()
                    .filter_map(|id| graph.vertex(id))
                    .filter(|v| label_matches(&v.label, label.as_ref()))
                    .count(),
                Target::Edges => graph
                    .edge_ids()
                    .filter_map(|id| graph.edge(id))
                    .filter(|e| label_matches(&e.label, label.as_ref()))
                    .count(),
            };
            RawResult::Scalars(vec![Value::from(n)])
        }
        Phrase::List {
            target,
            label,
            limit,
        } => {
            let limit = limit.unwrap_or(usize::MAX);
            let elements = match target {
                Target::Vertices => graph
                    .vertex_ids()
                    .filter(|id| graph.vertex(id).is_some_and(|v| label_matches(&v.label, label.as_ref())))
                    .take(limit)
                    .filter_map(|id| graph.vertex_element(id))
                    .collect(),
                Target::Edges => graph
                    .edge_ids()
                    .filter(|id| graph.edge(id).is_some_and(|e| label_matches(&e.label, label.as_ref())))
                    .take(limit)
                    .filter_map(|id| graph.edge_element(id))
                    .collect(),
            };
            RawResult::Elements(elements)
        }
        Phrase::Vertex(id) => RawResult::Elements(graph.vertex_element(&id).into_iter().collect()),
        Phrase::Neighbors { id, via } => {
            let mut seen = IndexSet::new();
            for edge_id in graph.out_edge_ids(&id).chain(graph.in_edge_ids(&id)) {
                let Some(edge) = graph.edge(edge_id) else { continue };
                if !label_matches(&edge.label, via.as_ref()) {
                    continue;
                }
                let other = if edge.out_v == id { &edge.in_v } else { &edge.out_v };
                seen.insert(other.clone());
            }
            RawResult::Elements(seen.iter().filter_map(|v| graph.vertex_element(v)).collect())
        }
    };
    Ok(result)
}
