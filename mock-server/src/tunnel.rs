//! Callback tunnel: a GET carrying `method`, `callback`, and optionally
//! `headers` and `content` query parameters is replayed as the request it
//! describes, and the reply is wrapped as `callback(content, meta);`.

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use serde_json::{json, Map, Value};
use tracing::debug;

#[derive(Debug, Default, PartialEq)]
struct Tunnel {
    method: String,
    callback: String,
    headers: Map<String, Value>,
    content: Option<String>,
    /// The URI with the tunnel parameters removed.
    uri: String,
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

impl Tunnel {
    fn from_uri(uri: &Uri) -> Option<Tunnel> {
        let query = uri.query()?;
        let mut tunnel = Tunnel::default();
        let mut kept = Vec::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            match name {
                "method" => tunnel.method = decode(value),
                "callback" => tunnel.callback = decode(value),
                "headers" => {
                    tunnel.headers = serde_json::from_str(&decode(value)).unwrap_or_default();
                }
                "content" => tunnel.content = Some(decode(value)),
                _ => kept.push(pair),
            }
        }
        if tunnel.method.is_empty() || tunnel.callback.is_empty() {
            return None;
        }
        tunnel.uri = if kept.is_empty() {
            uri.path().to_string()
        } else {
            format!("{}?{}", uri.path(), kept.join("&"))
        };
        Some(tunnel)
    }
}

/// Replay tunneled requests; pass everything else through untouched.
pub async fn unwrap_callback(request: Request, next: Next) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }
    let Some(tunnel) = Tunnel::from_uri(request.uri()) else {
        return next.run(request).await;
    };

    let (mut parts, _) = request.into_parts();
    let (Ok(method), Ok(uri)) = (
        Method::from_bytes(tunnel.method.to_uppercase().as_bytes()),
        tunnel.uri.parse::<Uri>(),
    ) else {
        return (StatusCode::BAD_REQUEST, "malformed tunnel request").into_response();
    };
    debug!(%method, %uri, callback = %tunnel.callback, "replaying tunneled request");
    parts.method = method;
    parts.uri = uri;
    for (name, value) in &tunnel.headers {
        let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            parts.headers.insert(name, value);
        }
    }
    let body = tunnel.content.map(Body::from).unwrap_or_else(Body::empty);

    let response = next.run(Request::from_parts(parts, body)).await;
    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();
    let content = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    let headers: Map<String, Value> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), json!(value.to_str().ok()?))))
        .collect();
    let meta = json!({
        "headers": headers,
        "status": {
            "code": parts.status.as_u16(),
            "reason": parts.status.canonical_reason().unwrap_or_default(),
        },
    });

    (
        [(header::CONTENT_TYPE, "application/javascript")],
        format!("{}({content}, {meta});", tunnel.callback),
    )
        .into_response()
}
