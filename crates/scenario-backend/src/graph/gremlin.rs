//! Gremlin traversal subset
//!
//! Parses and evaluates linear traversals of the form
//! `g.V(...).step(...).step(...)` against a [`PropertyGraph`].
//!
//! Supported steps:
//! - filters: `hasLabel`, `has`, `hasId`, `hasNot`, `limit`, `dedup`
//! - navigation: `out`, `in`, `both`, `outE`, `inE`, `bothE`, `outV`, `inV`, `bothV`
//! - projection: `values`, `valueMap`, `elementMap`, `id`, `label`, `count`
//!
//! Arguments are string, number or boolean literals, or bare identifiers
//! bound from the query parameters (`g.V().has('RouterId', rid)`).
//! Anonymous traversals (`out()`, `__.in('x')`) parse as arguments but are
//! not evaluated. Any other step is reported as unsupported.

use crate::error::{BackendError, BackendResult};
use crate::memory::{value_text, PropertyGraph};
use crate::types::{Properties, QueryParams, RawResult};
use indexmap::IndexSet;
use serde_json::Value;

const BACKEND: &str = "graph";

/// A parsed traversal
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    source: Source,
    source_args: Vec<Arg>,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Vertices,
    Edges,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    name: String,
    args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Literal(Value),
    Binding(String),
    Traversal(Vec<Step>),
}

impl Arg {
    fn resolve(&self, params: &QueryParams) -> BackendResult<Value> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Binding(name) => params
                .get(name)
                .cloned()
                .ok_or_else(|| BackendError::InvalidQuery(format!("unbound parameter '{name}'"))),
            Self::Traversal(_) => Err(BackendError::unsupported(BACKEND, "anonymous traversal arguments")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Dot,
    Open,
    Close,
    Comma,
}

fn tokenize(text: &str) -> BackendResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' | '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => {
                            return Err(BackendError::InvalidQuery("unterminated string".into()))
                        }
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => {
                                return Err(BackendError::InvalidQuery("unterminated string".into()))
                            }
                        },
                        Some(q) if q == c => break,
                        Some(other) => s.push(other),
                    }
                }
                tokens.push(Token::Literal(Value::String(s)));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut s = String::new();
                s.push(c);
                chars.next();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Literal(parse_number(&s)?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            other => {
                return Err(BackendError::InvalidQuery(format!(
                    "unexpected character '{other}'"
                )))
            }
        }
    }
    Ok(tokens)
}

fn parse_number(text: &str) -> BackendResult<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| BackendError::InvalidQuery(format!("bad number '{text}'")))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, want: &Token, what: &str) -> BackendResult<()> {
        match self.next() {
            Some(ref t) if t == want => Ok(()),
            Some(t) => Err(BackendError::InvalidQuery(format!("expected {what}, found {t:?}"))),
            None => Err(BackendError::InvalidQuery(format!("expected {what}, found end of query"))),
        }
    }

    fn ident(&mut self) -> BackendResult<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(t) => Err(BackendError::InvalidQuery(format!("expected step name, found {t:?}"))),
            None => Err(BackendError::InvalidQuery("expected step name, found end of query".into())),
        }
    }

    fn args(&mut self) -> BackendResult<Vec<Arg>> {
        self.expect(&Token::Open, "'('")?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::Close) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            let arg = match self.next() {
                Some(Token::Literal(v)) => Arg::Literal(v),
                Some(Token::Ident(name)) if name == "__" || self.peek() == Some(&Token::Open) => {
                    Arg::Traversal(self.anonymous(name)?)
                }
                Some(Token::Ident(name)) => match name.as_str() {
                    "true" => Arg::Literal(Value::Bool(true)),
                    "false" => Arg::Literal(Value::Bool(false)),
                    _ => Arg::Binding(name),
                },
                other => {
                    return Err(BackendError::InvalidQuery(format!(
                        "expected argument, found {other:?}"
                    )))
                }
            };
            args.push(arg);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::Close) => return Ok(args),
                other => {
                    return Err(BackendError::InvalidQuery(format!(
                        "expected ',' or ')', found {other:?}"
                    )))
                }
            }
        }
    }

    /// `first` is either `__` or the first step name
    fn anonymous(&mut self, first: String) -> BackendResult<Vec<Step>> {
        let mut name = if first == "__" {
            self.expect(&Token::Dot, "'.'")?;
            self.ident()?
        } else {
            first
        };
        let mut steps = Vec::new();
        loop {
            let args = self.args()?;
            steps.push(Step { name, args });
            if self.peek() != Some(&Token::Dot) {
                return Ok(steps);
            }
            self.pos += 1;
            name = self.ident()?;
        }
    }
}

/// Parse traversal text
///
/// # Errors
/// Returns [`BackendError::InvalidQuery`] on malformed input.
pub fn parse(text: &str) -> BackendResult<Traversal> {
    let mut parser = Parser {
        tokens: tokenize(text.trim().trim_end_matches(';'))?,
        pos: 0,
    };

    if parser.ident()? != "g" {
        return Err(BackendError::InvalidQuery("traversal must start with 'g'".into()));
    }
    parser.expect(&Token::Dot, "'.'")?;
    let source = match parser.ident()?.as_str() {
        "V" => Source::Vertices,
        "E" => Source::Edges,
        other => {
            return Err(BackendError::unsupported(BACKEND, format!("traversal source '{other}'")))
        }
    };
    let source_args = parser.args()?;

    let mut steps = Vec::new();
    while let Some(token) = parser.next() {
        if token != Token::Dot {
            return Err(BackendError::InvalidQuery(format!("expected '.', found {token:?}")));
        }
        let name = parser.ident()?;
        let args = parser.args()?;
        steps.push(Step { name, args });
    }

    Ok(Traversal {
        source,
        source_args,
        steps,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Traverser {
    Vertex(String),
    Edge(String),
    Value(Value),
    Map(Properties),
}

impl Traverser {
    fn identity(&self) -> String {
        match self {
            Self::Vertex(id) => format!("v:{id}"),
            Self::Edge(id) => format!("e:{id}"),
            Self::Value(v) => format!("x:{v}"),
            Self::Map(m) => format!("m:{}", serde_json::to_string(m).unwrap_or_default()),
        }
    }
}

struct Evaluator<'g> {
    graph: &'g PropertyGraph,
    params: &'g QueryParams,
}

impl Evaluator<'_> {
    fn texts(&self, args: &[Arg]) -> BackendResult<Vec<String>> {
        args.iter()
            .map(|a| a.resolve(self.params).map(|v| value_text(&v)))
            .collect()
    }

    fn label(&self, t: &Traverser) -> Option<&str> {
        match t {
            Traverser::Vertex(id) => self.graph.vertex(id).map(|v| v.label.as_str()),
            Traverser::Edge(id) => self.graph.edge(id).map(|e| e.label.as_str()),
            _ => None,
        }
    }

    fn properties<'a>(&'a self, t: &'a Traverser) -> Option<&'a Properties> {
        match t {
            Traverser::Vertex(id) => self.graph.vertex(id).map(|v| &v.properties),
            Traverser::Edge(id) => self.graph.edge(id).map(|e| &e.properties),
            Traverser::Map(m) => Some(m),
            Traverser::Value(_) => None,
        }
    }

    fn key_text(&self, t: &Traverser, key: &str) -> Option<String> {
        match (key, t) {
            ("id", Traverser::Vertex(id) | Traverser::Edge(id)) => Some(id.clone()),
            ("label", _) => self.label(t).map(str::to_string),
            _ => self.properties(t)?.get(key).map(value_text),
        }
    }

    fn source(&self, source: Source, args: &[Arg]) -> BackendResult<Vec<Traverser>> {
        let ids = self.texts(args)?;
        Ok(match source {
            Source::Vertices if ids.is_empty() => self
                .graph
                .vertex_ids()
                .map(|id| Traverser::Vertex(id.to_string()))
                .collect(),
            Source::Vertices => ids
                .into_iter()
                .filter(|id| self.graph.vertex(id).is_some())
                .map(Traverser::Vertex)
                .collect(),
            Source::Edges if ids.is_empty() => self
                .graph
                .edge_ids()
                .map(|id| Traverser::Edge(id.to_string()))
                .collect(),
            Source::Edges => ids
                .into_iter()
                .filter(|id| self.graph.edge(id).is_some())
                .map(Traverser::Edge)
                .collect(),
        })
    }

    fn require_vertex<'t>(&self, step: &str, t: &'t Traverser) -> BackendResult<&'t str> {
        match t {
            Traverser::Vertex(id) => Ok(id),
            _ => Err(BackendError::InvalidQuery(format!("step '{step}' needs vertices"))),
        }
    }

    fn require_edge<'t>(&self, step: &str, t: &'t Traverser) -> BackendResult<&'t str> {
        match t {
            Traverser::Edge(id) => Ok(id),
            _ => Err(BackendError::InvalidQuery(format!("step '{step}' needs edges"))),
        }
    }

    fn adjacent_edges(&self, vertex: &str, out: bool, inbound: bool, labels: &[String]) -> Vec<String> {
        let mut edges = Vec::new();
        if out {
            edges.extend(self.graph.out_edge_ids(vertex).map(str::to_string));
        }
        if inbound {
            edges.extend(self.graph.in_edge_ids(vertex).map(str::to_string));
        }
        edges.retain(|e| {
            labels.is_empty()
                || self
                    .graph
                    .edge(e)
                    .is_some_and(|edge| labels.iter().any(|l| *l == edge.label))
        });
        edges
    }

    fn step(&self, step: &Step, input: Vec<Traverser>) -> BackendResult<Vec<Traverser>> {
        let name = step.name.as_str();
        let mut out = Vec::new();
        match name {
            "hasLabel" => {
                let labels = self.texts(&step.args)?;
                out = input
                    .into_iter()
                    .filter(|t| self.label(t).is_some_and(|l| labels.iter().any(|x| x == l)))
                    .collect();
            }
            "has" => {
                let args = self.texts(&step.args)?;
                let (label, key, value) = match args.as_slice() {
                    [key] => (None, key.as_str(), None),
                    [key, value] => (None, key.as_str(), Some(value.as_str())),
                    [label, key, value] => (Some(label.as_str()), key.as_str(), Some(value.as_str())),
                    _ => return Err(BackendError::InvalidQuery("has() takes 1 to 3 arguments".into())),
                };
                out = input
                    .into_iter()
                    .filter(|t| label.map_or(true, |l| self.label(t) == Some(l)))
                    .filter(|t| match (self.key_text(t, key), value) {
                        (Some(actual), Some(want)) => actual == want,
                        (Some(_), None) => true,
                        (None, _) => false,
                    })
                    .collect();
            }
            "hasNot" => {
                let keys = self.texts(&step.args)?;
                let [key] = keys.as_slice() else {
                    return Err(BackendError::InvalidQuery("hasNot() takes 1 argument".into()));
                };
                out = input
                    .into_iter()
                    .filter(|t| self.key_text(t, key).is_none())
                    .collect();
            }
            "hasId" => {
                let ids = self.texts(&step.args)?;
                out = input
                    .into_iter()
                    .filter(|t| match t {
                        Traverser::Vertex(id) | Traverser::Edge(id) => ids.contains(id),
                        _ => false,
                    })
                    .collect();
            }
            "out" | "in" | "both" => {
                let labels = self.texts(&step.args)?;
                for t in &input {
                    let vertex = self.require_vertex(name, t)?;
                    let (o, i) = (name != "in", name != "out");
                    for edge_id in self.adjacent_edges(vertex, o, i, &labels) {
                        let Some(edge) = self.graph.edge(&edge_id) else { continue };
                        let other = if edge.out_v == vertex { &edge.in_v } else { &edge.out_v };
                        out.push(Traverser::Vertex(other.clone()));
                    }
                }
            }
            "outE" | "inE" | "bothE" => {
                let labels = self.texts(&step.args)?;
                for t in &input {
                    let vertex = self.require_vertex(name, t)?;
                    let (o, i) = (name != "inE", name != "outE");
                    out.extend(
                        self.adjacent_edges(vertex, o, i, &labels)
                            .into_iter()
                            .map(Traverser::Edge),
                    );
                }
            }
            "outV" | "inV" | "bothV" => {
                for t in &input {
                    let edge_id = self.require_edge(name, t)?;
                    let Some(edge) = self.graph.edge(edge_id) else { continue };
                    if name != "inV" {
                        out.push(Traverser::Vertex(edge.out_v.clone()));
                    }
                    if name != "outV" {
                        out.push(Traverser::Vertex(edge.in_v.clone()));
                    }
                }
            }
            "values" => {
                let keys = self.texts(&step.args)?;
                for t in &input {
                    let Some(props) = self.properties(t) else {
                        return Err(BackendError::InvalidQuery("values() needs elements".into()));
                    };
                    if keys.is_empty() {
                        out.extend(props.values().cloned().map(Traverser::Value));
                    } else {
                        out.extend(
                            keys.iter()
                                .filter_map(|k| props.get(k).cloned())
                                .map(Traverser::Value),
                        );
                    }
                }
            }
            "valueMap" | "elementMap" => {
                let mut with_tokens = name == "elementMap";
                let mut keys = Vec::new();
                for arg in &step.args {
                    match arg.resolve(self.params)? {
                        Value::Bool(b) => with_tokens = b,
                        other => keys.push(value_text(&other)),
                    }
                }
                for t in &input {
                    let Some(props) = self.properties(t) else {
                        return Err(BackendError::InvalidQuery(format!("{name}() needs elements")));
                    };
                    let mut map = Properties::new();
                    if with_tokens {
                        if let Traverser::Vertex(id) | Traverser::Edge(id) = t {
                            map.insert("id".into(), Value::String(id.clone()));
                        }
                        if let Some(label) = self.label(t) {
                            map.insert("label".into(), Value::String(label.to_string()));
                        }
                    }
                    for (k, v) in props {
                        if keys.is_empty() || keys.contains(k) {
                            map.insert(k.clone(), v.clone());
                        }
                    }
                    out.push(Traverser::Map(map));
                }
            }
            "id" => {
                for t in &input {
                    match t {
                        Traverser::Vertex(id) | Traverser::Edge(id) => {
                            out.push(Traverser::Value(Value::String(id.clone())));
                        }
                        _ => return Err(BackendError::InvalidQuery("id() needs elements".into())),
                    }
                }
            }
            "label" => {
                for t in &input {
                    let Some(label) = self.label(t) else {
                        return Err(BackendError::InvalidQuery("label() needs elements".into()));
                    };
                    out.push(Traverser::Value(Value::String(label.to_string())));
                }
            }
            "count" => out.push(Traverser::Value(Value::from(input.len()))),
            "limit" => {
                let n = match step.args.as_slice() {
                    [arg] => arg.resolve(self.params)?.as_u64().ok_or_else(|| {
                        BackendError::InvalidQuery("limit() needs a non-negative integer".into())
                    })?,
                    _ => return Err(BackendError::InvalidQuery("limit() takes 1 argument".into())),
                };
                out = input
                    .into_iter()
                    .take(usize::try_from(n).unwrap_or(usize::MAX))
                    .collect();
            }
            "dedup" => {
                let mut seen = IndexSet::new();
                out = input
                    .into_iter()
                    .filter(|t| seen.insert(t.identity()))
                    .collect();
            }
            other => {
                return Err(BackendError::unsupported(
                    BACKEND,
                    format!("traversal step '{other}'"),
                ))
            }
        }
        Ok(out)
    }

    fn finish(&self, traversers: Vec<Traverser>) -> RawResult {
        if traversers.is_empty() {
            return RawResult::Elements(Vec::new());
        }
        if traversers
            .iter()
            .all(|t| matches!(t, Traverser::Vertex(_) | Traverser::Edge(_)))
        {
            return RawResult::Elements(
                traversers
                    .iter()
                    .filter_map(|t| match t {
                        Traverser::Vertex(id) => self.graph.vertex_element(id),
                        Traverser::Edge(id) => self.graph.edge_element(id),
                        _ => None,
                    })
                    .collect(),
            );
        }
        if traversers.iter().all(|t| matches!(t, Traverser::Value(_))) {
            return RawResult::Scalars(
                traversers
                    .into_iter()
                    .filter_map(|t| match t {
                        Traverser::Value(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            );
        }
        if traversers.iter().all(|t| matches!(t, Traverser::Map(_))) {
            return RawResult::Rows(
                traversers
                    .into_iter()
                    .filter_map(|t| match t {
                        Traverser::Map(m) => Some(m),
                        _ => None,
                    })
                    .collect(),
            );
        }
        RawResult::Unrecognized(Value::Array(
            traversers
                .iter()
                .map(|t| match t {
                    Traverser::Vertex(id) | Traverser::Edge(id) => Value::String(id.clone()),
                    Traverser::Value(v) => v.clone(),
                    Traverser::Map(m) => serde_json::to_value(m).unwrap_or(Value::Null),
                })
                .collect(),
        ))
    }
}

/// Evaluate a parsed traversal
///
/// # Errors
/// Returns [`BackendError::InvalidQuery`] for unbound parameters or
/// misapplied steps and [`BackendError::Unsupported`] for unknown steps.
pub fn evaluate(
    traversal: &Traversal,
    graph: &PropertyGraph,
    params: &QueryParams,
) -> BackendResult<RawResult> {
    let evaluator = Evaluator { graph, params };
    let mut current = evaluator.source(traversal.source, &traversal.source_args)?;
    for step in &traversal.steps {
        current = evaluator.step(step, current)?;
    }
    Ok(evaluator.finish(current))
}

/// Parse and evaluate in one go
///
/// # Errors
/// See [`parse`] and [`evaluate`].
pub fn run(text: &str, graph: &PropertyGraph, params: &QueryParams) -> BackendResult<RawResult> {
    evaluate(&parse(text)?, graph, params)
}
