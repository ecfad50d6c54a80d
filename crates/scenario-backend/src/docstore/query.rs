//! SQL subset for document containers
//!
//! ```text
//! SELECT [TOP n] { * | VALUE COUNT(1) | VALUE <path> | <path> [AS name], ... }
//! FROM <alias>
//! [WHERE <path> <op> <operand> [AND ...]]
//! [ORDER BY <path> [ASC | DESC]]
//! [OFFSET n LIMIT m | LIMIT m]
//! ```
//!
//! Paths are `alias.field(.field)*`. Operands are string, number or
//! boolean literals, `null`, or `@name` parameters. Operators are `=`,
//! `!=`, `<>`, `<`, `<=`, `>`, `>=`. Comparisons between mismatched types
//! never match.

use crate::error::{BackendError, BackendResult};
use crate::types::{Properties, QueryParams, RawResult};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Literal(Value),
    Param(String),
    Op(String),
    Star,
    Comma,
    Dot,
    Open,
    Close,
}

fn invalid(message: impl Into<String>) -> BackendError {
    BackendError::InvalidQuery(message.into())
}

fn tokenize(text: &str) -> BackendResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op("=".into()));
                i += 1;
            }
            '!' | '<' | '>' => {
                let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let op = match two.as_str() {
                    "!=" | "<>" | "<=" | ">=" => two,
                    _ if c == '!' => return Err(invalid("unexpected '!'")),
                    _ => c.to_string(),
                };
                i += op.chars().count();
                tokens.push(Token::Op(op));
            }
            '\'' | '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(invalid("unterminated string")),
                        Some(&q) if q == c => {
                            // doubled quote escapes itself
                            if chars.get(i + 1) == Some(&c) {
                                s.push(c);
                                i += 2;
                                continue;
                            }
                            i += 1;
                            break;
                        }
                        Some(&other) => {
                            s.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::String(s)));
            }
            '@' => {
                let start = i + 1;
                i = start;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if i == start {
                    return Err(invalid("empty parameter name"));
                }
                tokens.push(Token::Param(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<i64>()
                    .map(Value::from)
                    .ok()
                    .or_else(|| {
                        text.parse::<f64>()
                            .ok()
                            .and_then(serde_json::Number::from_f64)
                            .map(Value::Number)
                    })
                    .ok_or_else(|| invalid(format!("bad number '{text}'")))?;
                tokens.push(Token::Literal(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => return Err(invalid(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Projection {
    All,
    Count,
    Value(Vec<String>),
    Fields(Vec<(Vec<String>, String)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Literal(Value),
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    path: Vec<String>,
    op: Op,
    operand: Operand,
}

/// A parsed document query
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    top: Option<usize>,
    projection: Projection,
    conditions: Vec<Condition>,
    order: Option<(Vec<String>, bool)>,
    offset: usize,
    limit: Option<usize>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    alias: Option<String>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn keyword(&mut self, keyword: &str) -> BackendResult<()> {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(invalid(format!("expected {keyword}, found {:?}", self.peek())))
        }
    }

    fn word(&mut self) -> BackendResult<String> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(invalid(format!("expected identifier, found {other:?}"))),
        }
    }

    fn count(&mut self, what: &str) -> BackendResult<usize> {
        match self.next() {
            Some(Token::Literal(Value::Number(n))) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| invalid(format!("{what} must be a non-negative integer"))),
            other => Err(invalid(format!("expected {what}, found {other:?}"))),
        }
    }

    /// `alias.a.b`, returning the segments after the alias
    fn path(&mut self) -> BackendResult<(String, Vec<String>)> {
        let root = self.word()?;
        let mut segments = Vec::new();
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            segments.push(self.word()?);
        }
        if segments.is_empty() {
            return Err(invalid(format!("'{root}' is not a field path; use {root}.<field>")));
        }
        Ok((root, segments))
    }

    fn is_count(&self) -> bool {
        self.peek_keyword("COUNT") && self.tokens.get(self.pos + 1) == Some(&Token::Open)
    }

    fn count_call(&mut self) -> BackendResult<()> {
        self.keyword("COUNT")?;
        if self.next() != Some(Token::Open) {
            return Err(invalid("expected '(' after COUNT"));
        }
        match self.next() {
            Some(Token::Star | Token::Literal(_)) => {}
            other => return Err(invalid(format!("unsupported COUNT argument {other:?}"))),
        }
        if self.next() != Some(Token::Close) {
            return Err(invalid("expected ')' after COUNT argument"));
        }
        Ok(())
    }

    fn projection(&mut self) -> BackendResult<(Projection, Vec<String>)> {
        if self.peek() == Some(&Token::Star) {
            self.pos += 1;
            return Ok((Projection::All, Vec::new()));
        }
        if self.peek_keyword("VALUE") {
            self.pos += 1;
            if self.is_count() {
                self.count_call()?;
                return Ok((Projection::Count, Vec::new()));
            }
            let (root, path) = self.path()?;
            return Ok((Projection::Value(path), vec![root]));
        }
        let mut fields = Vec::new();
        let mut roots = Vec::new();
        loop {
            let (root, path) = self.path()?;
            let name = if self.peek_keyword("AS") {
                self.pos += 1;
                self.word()?
            } else {
                path.last().cloned().unwrap_or_default()
            };
            roots.push(root);
            fields.push((path, name));
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok((Projection::Fields(fields), roots))
    }

    fn condition(&mut self) -> BackendResult<(String, Condition)> {
        let (root, path) = self.path()?;
        let op = match self.next() {
            Some(Token::Op(op)) => match op.as_str() {
                "=" => Op::Eq,
                "!=" | "<>" => Op::Ne,
                "<" => Op::Lt,
                "<=" => Op::Le,
                ">" => Op::Gt,
                ">=" => Op::Ge,
                _ => return Err(invalid(format!("unknown operator '{op}'"))),
            },
            other => return Err(invalid(format!("expected comparison operator, found {other:?}"))),
        };
        let operand = match self.next() {
            Some(Token::Literal(v)) => Operand::Literal(v),
            Some(Token::Param(name)) => Operand::Param(name),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("true") => Operand::Literal(Value::Bool(true)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("false") => Operand::Literal(Value::Bool(false)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("null") => Operand::Literal(Value::Null),
            other => return Err(invalid(format!("expected literal or @parameter, found {other:?}"))),
        };
        Ok((root, Condition { path, op, operand }))
    }

    fn check_alias(&self, root: &str) -> BackendResult<()> {
        match &self.alias {
            Some(alias) if alias == root => Ok(()),
            Some(alias) => Err(invalid(format!("unknown alias '{root}' (FROM {alias})"))),
            None => Ok(()),
        }
    }
}

/// Parse query text
///
/// # Errors
/// Returns [`BackendError::InvalidQuery`] for text outside the subset.
pub fn parse(text: &str) -> BackendResult<DocumentQuery> {
    let mut p = Parser {
        tokens: tokenize(text)?,
        pos: 0,
        alias: None,
    };

    p.keyword("SELECT")?;
    let top = if p.peek_keyword("TOP") {
        p.pos += 1;
        Some(p.count("TOP count")?)
    } else {
        None
    };
    let (projection, roots) = p.projection()?;
    p.keyword("FROM")?;
    p.alias = Some(p.word()?);
    for root in &roots {
        p.check_alias(root)?;
    }

    let mut conditions = Vec::new();
    if p.peek_keyword("WHERE") {
        p.pos += 1;
        loop {
            let (root, condition) = p.condition()?;
            p.check_alias(&root)?;
            conditions.push(condition);
            if p.peek_keyword("AND") {
                p.pos += 1;
            } else {
                break;
            }
        }
    }

    let mut order = None;
    if p.peek_keyword("ORDER") {
        p.pos += 1;
        p.keyword("BY")?;
        let (root, path) = p.path()?;
        p.check_alias(&root)?;
        let descending = if p.peek_keyword("DESC") {
            p.pos += 1;
            true
        } else {
            if p.peek_keyword("ASC") {
                p.pos += 1;
            }
            false
        };
        order = Some((path, descending));
    }

    let mut offset = 0;
    let mut limit = None;
    if p.peek_keyword("OFFSET") {
        p.pos += 1;
        offset = p.count("OFFSET count")?;
        p.keyword("LIMIT")?;
        limit = Some(p.count("LIMIT count")?);
    } else if p.peek_keyword("LIMIT") {
        p.pos += 1;
        limit = Some(p.count("LIMIT count")?);
    }

    if let Some(extra) = p.peek() {
        return Err(invalid(format!("unexpected trailing input at {extra:?}")));
    }

    Ok(DocumentQuery {
        top,
        projection,
        conditions,
        order,
        offset,
        limit,
    })
}

fn lookup<'a>(body: &'a Properties, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = body.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Rank for ordering across types: undefined, null, bool, number, string
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(_) => 5,
    }
}

impl DocumentQuery {
    fn matches(&self, body: &Properties, bound: &[Value]) -> bool {
        self.conditions.iter().zip(bound).all(|(c, want)| {
            let Some(actual) = lookup(body, &c.path) else {
                return false;
            };
            let Some(ordering) = compare(actual, want) else {
                return false;
            };
            match c.op {
                Op::Eq => ordering == Ordering::Equal,
                Op::Ne => ordering != Ordering::Equal,
                Op::Lt => ordering == Ordering::Less,
                Op::Le => ordering != Ordering::Greater,
                Op::Gt => ordering == Ordering::Greater,
                Op::Ge => ordering != Ordering::Less,
            }
        })
    }

    /// Evaluate over document bodies in storage order
    ///
    /// # Errors
    /// Returns [`BackendError::InvalidQuery`] for unbound parameters.
    pub fn evaluate<'a, I>(&self, bodies: I, params: &QueryParams) -> BackendResult<RawResult>
    where
        I: IntoIterator<Item = &'a Properties>,
    {
        let bound: Vec<Value> = self
            .conditions
            .iter()
            .map(|c| match &c.operand {
                Operand::Literal(v) => Ok(v.clone()),
                Operand::Param(name) => params
                    .get(name)
                    .cloned()
                    .ok_or_else(|| invalid(format!("unbound parameter '@{name}'"))),
            })
            .collect::<BackendResult<_>>()?;

        let mut selected: Vec<&Properties> = bodies
            .into_iter()
            .filter(|body| self.matches(body, &bound))
            .collect();

        if self.projection == Projection::Count {
            return Ok(RawResult::Scalars(vec![Value::from(selected.len())]));
        }

        if let Some((path, descending)) = &self.order {
            selected.sort_by(|a, b| {
                let (x, y) = (lookup(a, path), lookup(b, path));
                let ordering = match (x, y) {
                    (Some(x), Some(y)) => compare(x, y),
                    _ => None,
                }
                .unwrap_or_else(|| type_rank(x).cmp(&type_rank(y)));
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let take = self
            .limit
            .unwrap_or(usize::MAX)
            .min(self.top.unwrap_or(usize::MAX));
        let page = selected.into_iter().skip(self.offset).take(take);

        Ok(match &self.projection {
            Projection::All | Projection::Count => RawResult::Rows(page.cloned().collect()),
            Projection::Value(path) => {
                RawResult::Scalars(page.filter_map(|body| lookup(body, path).cloned()).collect())
            }
            Projection::Fields(fields) => RawResult::Rows(
                page.map(|body| {
                    fields
                        .iter()
                        .filter_map(|(path, name)| Some((name.clone(), lookup(body, path)?.clone())))
                        .collect()
                })
                .collect(),
            ),
        })
    }
}

/// Parse and evaluate in one go
///
/// # Errors
/// See [`parse`] and [`DocumentQuery::evaluate`].
pub fn run<'a, I>(text: &str, bodies: I, params: &QueryParams) -> BackendResult<RawResult>
where
    I: IntoIterator<Item = &'a Properties>,
{
    parse(text)?.evaluate(bodies, params)
}
