//! Request normalization: options in, canonical `HttpRequest` out.
//!
//! # Design
//! Every API call describes itself with a `RequestOptions` value and calls
//! [`RequestOptions::build`]. The builder applies the same rules for every
//! call:
//! - the query string skips null and empty values and is inserted before any
//!   `#fragment`;
//! - a JSON body gets `Content-Type: application/json` unless the caller set
//!   a content type, while a text body is sent verbatim;
//! - Basic credentials become an `Authorization` header merged last.
//!
//! URLs are not validated here. A malformed URL surfaces as a transport
//! error once the request is sent.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::http::{find_header, HttpMethod, HttpRequest};

/// Characters left alone by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A query parameter value. `Null` entries are dropped when serializing.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Null,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl QueryValue {
    /// The textual form sent on the wire, or `None` when the entry is dropped.
    fn render(&self) -> Option<String> {
        let s = match self {
            QueryValue::Null => return None,
            QueryValue::Str(s) => s.clone(),
            QueryValue::Int(i) => i.to_string(),
            QueryValue::Float(f) => f.to_string(),
            QueryValue::Bool(b) => b.to_string(),
        };
        (!s.is_empty()).then_some(s)
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        QueryValue::Str(s.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        QueryValue::Str(s)
    }
}

impl From<&String> for QueryValue {
    fn from(s: &String) -> Self {
        QueryValue::Str(s.clone())
    }
}

impl From<i64> for QueryValue {
    fn from(i: i64) -> Self {
        QueryValue::Int(i)
    }
}

impl From<u64> for QueryValue {
    fn from(i: u64) -> Self {
        match i64::try_from(i) {
            Ok(i) => QueryValue::Int(i),
            Err(_) => QueryValue::Str(i.to_string()),
        }
    }
}

impl From<i32> for QueryValue {
    fn from(i: i32) -> Self {
        QueryValue::Int(i64::from(i))
    }
}

impl From<u32> for QueryValue {
    fn from(i: u32) -> Self {
        QueryValue::Int(i64::from(i))
    }
}

impl From<f64> for QueryValue {
    fn from(f: f64) -> Self {
        QueryValue::Float(f)
    }
}

impl From<bool> for QueryValue {
    fn from(b: bool) -> Self {
        QueryValue::Bool(b)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(QueryValue::Null, Into::into)
    }
}

/// Serialize query pairs as `key=value&...`, percent-encoding both sides and
/// dropping null or empty values.
pub fn build_query(pairs: &[(String, QueryValue)]) -> String {
    pairs
        .iter()
        .filter_map(|(name, value)| {
            value.render().map(|v| {
                format!(
                    "{}={}",
                    utf8_percent_encode(name, COMPONENT),
                    utf8_percent_encode(&v, COMPONENT)
                )
            })
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Append the serialized query to `url`, ahead of any `#fragment`.
pub fn add_query(url: &str, pairs: &[(String, QueryValue)]) -> String {
    let (base, fragment) = match url.rfind('#') {
        Some(pos) => url.split_at(pos),
        None => (url, ""),
    };
    let query = build_query(pairs);
    if query.is_empty() {
        return format!("{base}{fragment}");
    }
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{query}{fragment}")
}

/// `Basic <base64(user:password)>`.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Serialized as JSON.
    Json(Value),
    /// Sent as-is when the caller declares a content type, otherwise
    /// serialized as a JSON string.
    Text(String),
}

/// Loosely specified request, normalized by [`RequestOptions::build`].
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct RequestOptions {
    method: HttpMethod,
    url: String,
    query: Vec<(String, QueryValue)>,
    content: Option<Body>,
    headers: Vec<(String, String)>,
    basic_auth: Option<(String, String)>,
    sync: bool,
}

impl RequestOptions {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn query(mut self, name: &str, value: impl Into<QueryValue>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.content = Some(Body::Json(value));
        self
    }

    pub fn content(mut self, body: Body) -> Self {
        self.content = Some(body);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn basic_auth(mut self, username: &str, password: &str) -> Self {
        self.basic_auth = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn build(self) -> Result<HttpRequest> {
        let url = add_query(&self.url, &self.query);
        let mut headers = self.headers;

        let body = match self.content {
            None => None,
            Some(Body::Text(text)) if find_header(&headers, "Content-Type").is_some() => Some(text),
            Some(Body::Text(text)) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                let text = serde_json::to_string(&text)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                Some(text)
            }
            Some(Body::Json(value)) => {
                if find_header(&headers, "Content-Type").is_none() {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                let text = serde_json::to_string(&value)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                Some(text)
            }
        };

        if let Some((user, pass)) = self.basic_auth {
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Authorization"));
            headers.push(("Authorization".to_string(), basic_auth_header(&user, &pass)));
        }

        Ok(HttpRequest {
            method: self.method,
            url,
            headers,
            body,
            sync: self.sync,
        })
    }
}
