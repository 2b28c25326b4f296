//! Callback-wrapped GET tunnel for runtimes that cannot issue arbitrary
//! cross-origin requests.
//!
//! The real method, headers and body travel as query parameters next to a
//! `callback` name; the server answers `callback(content, meta)` where
//! `meta = {"headers": {..}, "status": {"code": .., "reason": ..}}`.
//!
//! Callback names live in a [`CallbackRegistry`] handed to the transport.
//! A [`CallbackGuard`] releases its name on drop, so the name is freed on
//! success, failure, malformed replies, and when the future is dropped.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{Strategy, Transport};
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest};
use crate::request::{add_query, QueryValue};
use crate::response::RawResponse;

const CALLBACK_PREFIX: &str = "PrecogJsonpCallback";
const SCRIPT_LOAD_FAILED: &str = "Failed to load script from server";

/// Set of callback names currently awaiting a reply.
#[derive(Debug, Clone, Default)]
pub struct CallbackRegistry {
    names: Arc<Mutex<HashSet<String>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh, unique callback name.
    pub fn register(&self) -> CallbackGuard {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        let name = loop {
            let candidate = format!("{CALLBACK_PREFIX}{}", Uuid::new_v4().simple());
            if names.insert(candidate.clone()) {
                break candidate;
            }
        };
        debug!(callback = %name, "registered tunnel callback");
        CallbackGuard {
            name,
            registry: self.clone(),
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, name: &str) {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        debug!(callback = %name, "released tunnel callback");
    }
}

/// Ownership of one registered callback name.
#[derive(Debug)]
pub struct CallbackGuard {
    name: String,
    registry: CallbackRegistry,
}

impl CallbackGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        self.registry.release(&self.name);
    }
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(default)]
    headers: BTreeMap<String, Value>,
    status: MetaStatus,
}

#[derive(Debug, Deserialize)]
struct MetaStatus {
    code: u16,
    #[serde(default)]
    reason: String,
}

/// Extract `(content, meta)` from `name(content, meta)`.
fn parse_callback_body(name: &str, body: &str) -> Result<(Value, Meta)> {
    let malformed = || Error::Deserialization(format!("reply is not a call to {name}"));
    let inner = body
        .trim()
        .trim_end_matches(';')
        .strip_prefix(name)
        .and_then(|rest| rest.trim_start().strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(malformed)?;

    let (content, meta): (Value, Meta) = serde_json::from_str(&format!("[{inner}]"))
        .map_err(|e| Error::Deserialization(e.to_string()))?;
    Ok((content, meta))
}

/// Tunnels every request through a GET issued by `inner`.
#[derive(Debug)]
pub struct ScriptTransport<T> {
    inner: T,
    registry: CallbackRegistry,
}

impl<T: Transport> ScriptTransport<T> {
    pub fn new(inner: T, registry: CallbackRegistry) -> Self {
        Self { inner, registry }
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }
}

#[async_trait]
impl<T: Transport> Transport for ScriptTransport<T> {
    fn strategy(&self) -> Strategy {
        Strategy::Script
    }

    async fn send(&self, request: HttpRequest) -> Result<RawResponse> {
        let guard = self.registry.register();

        let mut query = vec![
            ("method".to_string(), QueryValue::from(request.method.as_str())),
            ("callback".to_string(), QueryValue::from(guard.name())),
        ];
        if !request.headers.is_empty() {
            let headers: BTreeMap<&str, &str> = request
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let encoded =
                serde_json::to_string(&headers).map_err(|e| Error::Serialization(e.to_string()))?;
            query.push(("headers".to_string(), QueryValue::Str(encoded)));
        }
        if let Some(body) = request.body {
            query.push(("content".to_string(), QueryValue::Str(body)));
        }

        let tunneled = HttpRequest {
            method: HttpMethod::Get,
            url: add_query(&request.url, &query),
            headers: Vec::new(),
            body: None,
            sync: request.sync,
        };

        let raw = self.inner.send(tunneled).await.map_err(|e| {
            let message = match e.envelope() {
                Some(envelope) if !envelope.status_text.is_empty() => envelope.status_text.clone(),
                _ => SCRIPT_LOAD_FAILED.to_string(),
            };
            Error::transport(400, message)
        })?;
        if !(200..300).contains(&raw.status) {
            return Err(Error::transport(
                400,
                format!("{SCRIPT_LOAD_FAILED} (status {})", raw.status),
            ));
        }

        let body = raw.body.unwrap_or_default();
        let (content, meta) = parse_callback_body(guard.name(), &body)?;
        drop(guard);

        let mut lines: Vec<String> = meta
            .headers
            .iter()
            .map(|(name, value)| match value {
                Value::String(s) => format!("{name}: {s}"),
                other => format!("{name}: {other}"),
            })
            .collect();
        if !meta
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("Content-Type"))
        {
            lines.push("Content-Type: application/json".to_string());
        }

        Ok(RawResponse {
            status: meta.status.code,
            status_text: meta.status.reason,
            header_blob: lines.join("\n"),
            content_type: Some("application/json".to_string()),
            body: (!content.is_null()).then(|| content.to_string()),
        })
    }
}
