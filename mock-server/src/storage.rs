use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{authorize, fail, normalize_path, ApiError, Db, KeyQuery, Store};

#[derive(Deserialize)]
pub struct IngestQuery {
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
    pub delimiter: Option<String>,
    pub quote: Option<String>,
}

impl IngestQuery {
    fn key(&self) -> KeyQuery {
        KeyQuery {
            api_key: self.api_key.clone(),
        }
    }
}

/// A CSV cell as JSON: numbers and booleans stay typed, everything else is
/// a string with surrounding quotes removed.
fn csv_cell(raw: &str, quote: char) -> Value {
    let trimmed = raw.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
        _ => Value::String(
            trimmed
                .strip_prefix(quote)
                .and_then(|s| s.strip_suffix(quote))
                .unwrap_or(trimmed)
                .to_string(),
        ),
    }
}

fn parse_csv(body: &str, delimiter: char, quote: char) -> Vec<Value> {
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns: Vec<String> = header
        .split(delimiter)
        .map(|c| c.trim().trim_matches(quote).to_string())
        .collect();
    lines
        .map(|line| {
            let record: serde_json::Map<String, Value> = columns
                .iter()
                .cloned()
                .zip(line.split(delimiter).map(|cell| csv_cell(cell, quote)))
                .collect();
            Value::Object(record)
        })
        .collect()
}

/// Decode an upload body into records according to its media type.
fn parse_records(content_type: &str, body: &str, query: &IngestQuery) -> Result<Vec<Value>, String> {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    match mime {
        "application/json" => match serde_json::from_str::<Value>(body) {
            Ok(Value::Array(values)) => Ok(values),
            Ok(value) => Ok(vec![value]),
            // Several concatenated documents, one per line.
            Err(_) => parse_stream(body),
        },
        "application/x-json-stream" => parse_stream(body),
        "text/csv" => {
            let delimiter = query.delimiter.as_deref().and_then(|d| d.chars().next()).unwrap_or(',');
            let quote = query.quote.as_deref().and_then(|q| q.chars().next()).unwrap_or('"');
            Ok(parse_csv(body, delimiter, quote))
        }
        other => Err(format!("unsupported content type {other:?}")),
    }
}

fn parse_stream(body: &str) -> Result<Vec<Value>, String> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| e.to_string()))
        .collect()
}

pub async fn ingest(
    State(db): State<Db>,
    Path((mode, path)): Path<(String, String)>,
    Query(q): Query<IngestQuery>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut store = db.write().await;
    authorize(&store, &q.key())?;
    let status = match mode.as_str() {
        "sync" => StatusCode::OK,
        "async" => StatusCode::ACCEPTED,
        _ => return Err(fail(StatusCode::NOT_FOUND, "ingest mode must be sync or async")),
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");
    let records = parse_records(content_type, &body, &q).map_err(|e| fail(StatusCode::BAD_REQUEST, &e))?;

    let path = normalize_path(&path);
    let ingested = records.len();
    debug!(%path, ingested, "ingested records");
    store.files.entry(path).or_default().extend(records);
    Ok((status, Json(json!({ "ingested": ingested, "errors": [] }))))
}

/// Remove `path` and everything below it. Missing paths are not an error.
pub async fn delete(
    State(db): State<Db>,
    Path((_mode, path)): Path<(String, String)>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut store = db.write().await;
    authorize(&store, &q)?;
    let path = normalize_path(&path);
    let prefix = format!("{path}/");
    store
        .files
        .retain(|name, _| *name != path && !name.starts_with(&prefix));
    Ok(Json(json!({})))
}

/// Immediate children of `dir`, each reported with a trailing `/`.
fn children(store: &Store, dir: &str) -> Vec<String> {
    let prefix = if dir == "/" { "/".to_string() } else { format!("{dir}/") };
    let names: BTreeSet<String> = store
        .files
        .keys()
        .filter_map(|name| name.strip_prefix(&prefix))
        .filter_map(|rest| rest.split('/').next())
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("{segment}/"))
        .collect();
    names.into_iter().collect()
}

pub async fn metadata(
    State(db): State<Db>,
    Path(path): Path<String>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    authorize(&store, &q)?;
    Ok(Json(json!({ "children": children(&store, &normalize_path(&path)) })))
}

pub async fn root_metadata(State(db): State<Db>, Query(q): Query<KeyQuery>) -> Result<Json<Value>, ApiError> {
    let store = db.read().await;
    authorize(&store, &q)?;
    Ok(Json(json!({ "children": children(&store, "/") })))
}
