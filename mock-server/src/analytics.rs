//! A tiny query evaluator standing in for Quirrel.
//!
//! Supports integer arithmetic (`+ - * /` and parentheses) and loading a
//! stored file with `load("/path")` or the `//path` shorthand. Paths are
//! resolved under the request's base path.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{authorize, fail, normalize_path, ApiError, Db, KeyQuery, Store};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Op(char),
    Load(String),
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let n = digits.parse().map_err(|_| format!("integer out of range: {digits}"))?;
                tokens.push(Token::Int(n));
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                let start = i + 1;
                i += 2;
                while i < chars.len() && (chars[i].is_alphanumeric() || "/_-.".contains(chars[i])) {
                    i += 1;
                }
                tokens.push(Token::Load(chars[start..i].iter().collect()));
            }
            '+' | '-' | '*' | '/' | '(' | ')' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            'l' => {
                let rest: String = chars[i..].iter().collect();
                let inner = rest
                    .strip_prefix("load(\"")
                    .and_then(|r| r.split_once("\")"))
                    .map(|(path, _)| path.to_string())
                    .ok_or_else(|| format!("unexpected input at offset {i}"))?;
                i += "load(\"".len() + inner.chars().count() + "\")".len();
                tokens.push(Token::Load(inner));
            }
            other => return Err(format!("unexpected character {other:?}")),
        }
    }
    Ok(tokens)
}

enum Operand {
    Int(i64),
    Set(Vec<Value>),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    base: &'a str,
    store: &'a Store,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Operand, String> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = arith(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Operand, String> {
        let mut lhs = self.atom()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.atom()?;
            lhs = arith(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn atom(&mut self) -> Result<Operand, String> {
        match self.next() {
            Some(Token::Int(n)) => Ok(Operand::Int(n)),
            Some(Token::Op('-')) => match self.atom()? {
                Operand::Int(n) => n
                    .checked_neg()
                    .map(Operand::Int)
                    .ok_or_else(|| "arithmetic overflow".to_string()),
                Operand::Set(_) => Err("cannot negate a set".to_string()),
            },
            Some(Token::Op('(')) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::Op(')')) => Ok(inner),
                    _ => Err("unbalanced parentheses".to_string()),
                }
            }
            Some(Token::Load(path)) => {
                let full = normalize_path(&format!("{}/{path}", self.base));
                let records = self.store.files.get(&full).cloned().unwrap_or_default();
                Ok(Operand::Set(records))
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of query".to_string()),
        }
    }
}

fn arith(op: char, lhs: Operand, rhs: Operand) -> Result<Operand, String> {
    let (Operand::Int(a), Operand::Int(b)) = (lhs, rhs) else {
        return Err(format!("operator {op} needs numbers"));
    };
    let result = match op {
        '+' => a.checked_add(b),
        '-' => a.checked_sub(b),
        '*' => a.checked_mul(b),
        '/' if b == 0 => return Err("division by zero".to_string()),
        _ => a.checked_div(b),
    };
    result.map(Operand::Int).ok_or_else(|| "arithmetic overflow".to_string())
}

/// Evaluate `query` against `store`, returning the result set as a JSON
/// array.
pub fn evaluate(query: &str, base: &str, store: &Store) -> Result<Value, String> {
    let mut parser = Parser {
        tokens: tokenize(query)?,
        pos: 0,
        base,
        store,
    };
    let result = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(format!("unexpected trailing token {token:?}"));
    }
    Ok(match result {
        Operand::Int(n) => json!([n]),
        Operand::Set(records) => Value::Array(records),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub api_key: Option<String>,
    pub q: String,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub format: Option<String>,
    pub base_path: Option<String>,
}

impl AnalyticsQuery {
    fn key(&self) -> KeyQuery {
        KeyQuery {
            api_key: self.api_key.clone(),
        }
    }

    fn window(&self, data: Value) -> Value {
        match data {
            Value::Array(values) => Value::Array(
                values
                    .into_iter()
                    .skip(self.skip.unwrap_or(0))
                    .take(self.limit.unwrap_or(usize::MAX))
                    .collect(),
            ),
            other => other,
        }
    }
}

fn run_query(store: &Store, base: &str, q: &AnalyticsQuery) -> Result<Value, ApiError> {
    let data = evaluate(&q.q, base, store).map_err(|e| fail(StatusCode::BAD_REQUEST, &e))?;
    let data = q.window(data);
    debug!(query = %q.q, %base, "evaluated query");
    Ok(match q.format.as_deref() {
        Some("detailed") => json!({ "data": data, "errors": [], "warnings": [] }),
        _ => data,
    })
}

pub async fn query(
    State(db): State<Db>,
    Path(path): Path<String>,
    Query(q): Query<AnalyticsQuery>,
) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    authorize(&store, &q.key())?;
    run_query(&store, &normalize_path(&path), &q).map(Json)
}

pub async fn root_query(State(db): State<Db>, Query(q): Query<AnalyticsQuery>) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    authorize(&store, &q.key())?;
    run_query(&store, "/", &q).map(Json)
}

/// Jobs are evaluated on submission; polling returns the stored result.
pub async fn submit_job(
    State(db): State<Db>,
    Query(mut q): Query<AnalyticsQuery>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut store = db.write().await;
    authorize(&store, &q.key())?;
    let base = normalize_path(q.base_path.as_deref().unwrap_or("/"));
    q.format = Some("detailed".to_string());
    let result = run_query(&store, &base, &q)?;
    let job_id = uuid::Uuid::new_v4().to_string();
    store.jobs.insert(job_id.clone(), result);
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}

pub async fn job_results(
    State(db): State<Db>,
    Path(job): Path<String>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    authorize(&store, &q)?;
    store
        .jobs
        .get(&job)
        .cloned()
        .map(Json)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "no such job"))
}
