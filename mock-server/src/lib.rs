//! In-memory imitation of the Precog REST service.
//!
//! Implements the slice of the accounts, security, ingest, meta and analytics
//! services that the client exercises. Everything lives in one `Store`
//! behind a `RwLock`; nothing is persisted.

mod accounts;
mod analytics;
mod security;
mod storage;
mod tunnel;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub use analytics::evaluate;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_id: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
    pub api_key: String,
    pub root_grant_id: String,
    #[serde(skip)]
    pub plan: String,
}

#[derive(Clone, Debug)]
pub struct ApiKey {
    pub api_key: String,
    /// The key that created this one; `None` for account root keys.
    pub issuer: Option<String>,
    pub grants: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Grant {
    pub record: Value,
    pub issuer: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Default)]
pub struct Store {
    pub accounts: Vec<Account>,
    pub api_keys: HashMap<String, ApiKey>,
    pub grants: HashMap<String, Grant>,
    /// Ingested records keyed by absolute path without trailing slash.
    pub files: BTreeMap<String, Vec<Value>>,
    pub jobs: HashMap<String, Value>,
}

impl Store {
    fn insert_grant(&mut self, mut record: Value, issuer: Option<String>, parent: Option<String>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        if let Value::Object(map) = &mut record {
            map.insert("grantId".to_string(), json!(id));
            if let Some(p) = &parent {
                map.insert("parentIds".to_string(), json!([p]));
            }
        }
        self.grants.insert(id.clone(), Grant { record, issuer, parent });
        id
    }

    fn render_key(&self, key: &ApiKey) -> Value {
        let grants: Vec<Value> = key
            .grants
            .iter()
            .filter_map(|id| self.grants.get(id).map(|g| g.record.clone()))
            .collect();
        json!({ "apiKey": key.api_key, "grants": grants })
    }
}

pub type Db = Arc<RwLock<Store>>;

/// Error responses carry a JSON body so clients always see `content`.
pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn fail(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

#[derive(Deserialize)]
pub(crate) struct KeyQuery {
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
}

/// The caller's API key, if it exists in the store.
pub(crate) fn authorize(store: &Store, query: &KeyQuery) -> Result<String, ApiError> {
    match query.api_key.as_deref() {
        Some(key) if store.api_keys.contains_key(key) => Ok(key.to_string()),
        _ => Err(fail(StatusCode::FORBIDDEN, "a valid apiKey is required")),
    }
}

/// Decode `Authorization: Basic ...` into `(user, password)`.
pub(crate) fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// `/a//b/` -> `/a/b`; empty -> `/`.
pub(crate) fn normalize_path(raw: &str) -> String {
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn routes(db: Db) -> Router {
    Router::new()
        .route("/accounts/v1/accounts/", post(accounts::create_account))
        .route("/accounts/v1/accounts/search", get(accounts::search))
        .route("/accounts/v1/accounts/{id}", get(accounts::describe))
        .route("/accounts/v1/accounts/{id}/password/reset", post(accounts::reset_password))
        .route("/accounts/v1/accounts/{id}/grants/", post(accounts::add_grant))
        .route(
            "/accounts/v1/accounts/{id}/plan",
            get(accounts::current_plan)
                .put(accounts::change_plan)
                .delete(accounts::delete_plan),
        )
        .route("/security/v1/apikeys/", get(security::list_keys).post(security::create_key))
        .route(
            "/security/v1/apikeys/{key}",
            get(security::describe_key).delete(security::delete_key),
        )
        .route(
            "/security/v1/apikeys/{key}/grants/",
            get(security::key_grants).post(security::add_key_grant),
        )
        .route(
            "/security/v1/apikeys/{key}/grants/{grant}",
            axum::routing::delete(security::remove_key_grant),
        )
        .route("/security/v1/grants/", post(security::create_grant))
        .route(
            "/security/v1/grants/{grant}",
            get(security::describe_grant).delete(security::delete_grant),
        )
        .route(
            "/security/v1/grants/{grant}/children/",
            get(security::grant_children).post(security::create_grant_child),
        )
        .route("/ingest/v1/{mode}/fs/{*path}", post(storage::ingest).delete(storage::delete))
        .route("/meta/v1/fs/", get(storage::root_metadata))
        .route("/meta/v1/fs/{*path}", get(storage::metadata))
        .route("/analytics/v1/fs/", get(analytics::root_query))
        .route("/analytics/v1/fs/{*path}", get(analytics::query))
        .route("/analytics/v1/queries", post(analytics::submit_job))
        .route("/analytics/v1/queries/{job}", get(analytics::job_results))
        .with_state(db)
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    // Routing happens inside the fallback so tunneled requests are routed
    // by the method they carry, not the GET they arrived as.
    Router::new()
        .fallback_service(routes(db))
        .layer(middleware::from_fn(tunnel::unwrap_callback))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}
