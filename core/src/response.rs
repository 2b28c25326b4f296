//! Response normalization: raw transport output in, `Envelope` out.
//!
//! # Design
//! Every transport reports a `RawResponse` (status, a header blob, body
//! text). [`normalize`] parses headers, decodes JSON bodies, and
//! [`classify`] splits the result into success (2xx) and failure. Both sides
//! carry the same `Envelope`, so a caller can inspect `status` either way.

use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::http::find_header;

/// What to do when a body declared as JSON fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonPolicy {
    /// Keep the raw text and log a warning.
    #[default]
    Lenient,
    /// Fail the call with [`Error::Deserialization`].
    Strict,
}

/// A response exactly as a transport observed it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    /// Header lines separated by `\n` or `\r\n`, each `Name: value`.
    pub header_blob: String,
    /// Fallback used when the blob yields no headers at all.
    pub content_type: Option<String>,
    pub body: Option<String>,
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Content {
    Json(Value),
    Text(String),
    #[default]
    Empty,
}

impl Content {
    /// Collapse into a JSON value. Text becomes a JSON string, nothing
    /// becomes `null`.
    pub fn to_value(&self) -> Value {
        match self {
            Content::Json(v) => v.clone(),
            Content::Text(s) => Value::String(s.clone()),
            Content::Empty => Value::Null,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Content::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// The uniform response shape every transport is normalized into.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    pub headers: Vec<(String, String)>,
    pub content: Content,
    pub status: u16,
    pub status_text: String,
}

impl Envelope {
    /// An envelope that did not come off the wire.
    pub fn synthetic(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Parse a header blob into name/value pairs.
///
/// Lines split at the first colon and both sides are trimmed. When the blob
/// yields nothing, `content_type` (if any) becomes the only header.
pub fn parse_headers(blob: &str, content_type: Option<&str>) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = blob
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(':') {
            Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
            None => (line.trim().to_string(), String::new()),
        })
        .collect();

    if headers.is_empty() {
        if let Some(ct) = content_type {
            headers.push(("Content-Type".to_string(), ct.to_string()));
        }
    }
    headers
}

fn is_json_type(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    mime.eq_ignore_ascii_case("application/json") || mime.eq_ignore_ascii_case("text/json")
}

/// Build an `Envelope` from a raw transport response.
pub fn normalize(raw: RawResponse, policy: JsonPolicy) -> Result<Envelope> {
    let headers = parse_headers(&raw.header_blob, raw.content_type.as_deref());
    let json = find_header(&headers, "Content-Type").is_some_and(is_json_type);

    let content = match raw.body {
        None => Content::Empty,
        Some(text) if json => match serde_json::from_str(&text) {
            Ok(value) => Content::Json(value),
            Err(e) => match policy {
                JsonPolicy::Lenient => {
                    warn!(status = raw.status, error = %e, "response declared JSON but did not parse");
                    Content::Text(text)
                }
                JsonPolicy::Strict => return Err(Error::Deserialization(e.to_string())),
            },
        },
        Some(text) => Content::Text(text),
    };

    Ok(Envelope {
        headers,
        content,
        status: raw.status,
        status_text: raw.status_text,
    })
}

/// Route an envelope to success (`Ok`) or failure (`Err(Error::Http)`).
pub fn classify(envelope: Envelope) -> Result<Envelope> {
    if envelope.is_success() {
        Ok(envelope)
    } else {
        Err(Error::Http(Box::new(envelope)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(status: u16, blob: &str, body: &str) -> RawResponse {
        RawResponse {
            status,
            status_text: "OK".to_string(),
            header_blob: blob.to_string(),
            content_type: None,
            body: Some(body.to_string()),
        }
    }

    #[test]
    fn parse_headers_splits_on_first_colon_and_trims() {
        let headers = parse_headers("Content-Type: application/json\r\nX-Time:  12:30:00 \n\n", None);
        assert_eq!(
            headers,
            vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("X-Time".to_string(), "12:30:00".to_string()),
            ]
        );
    }

    #[test]
    fn parse_headers_falls_back_to_content_type() {
        let headers = parse_headers("", Some("text/json"));
        assert_eq!(headers, vec![("Content-Type".to_string(), "text/json".to_string())]);
        assert!(parse_headers("", None).is_empty());
    }

    #[test]
    fn json_bodies_are_decoded() {
        let env = normalize(raw(200, "Content-Type: application/json; charset=utf-8", r#"{"a":1}"#), JsonPolicy::Lenient).unwrap();
        assert_eq!(env.content, Content::Json(json!({"a": 1})));
    }

    #[test]
    fn non_json_bodies_stay_text() {
        let env = normalize(raw(200, "Content-Type: text/plain", r#"{"a":1}"#), JsonPolicy::Strict).unwrap();
        assert_eq!(env.content, Content::Text(r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn lenient_policy_keeps_unparseable_text() {
        let env = normalize(raw(200, "Content-Type: application/json", "not json"), JsonPolicy::Lenient).unwrap();
        assert_eq!(env.content, Content::Text("not json".to_string()));
    }

    #[test]
    fn strict_policy_rejects_unparseable_json() {
        let err = normalize(raw(200, "Content-Type: text/json", "not json"), JsonPolicy::Strict).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn missing_body_is_empty_content() {
        let mut r = raw(204, "", "");
        r.body = None;
        let env = normalize(r, JsonPolicy::Lenient).unwrap();
        assert_eq!(env.content, Content::Empty);
        assert_eq!(env.content.to_value(), Value::Null);
    }

    #[test]
    fn classification_boundaries() {
        assert!(classify(Envelope::synthetic(200, "OK")).is_ok());
        assert!(classify(Envelope::synthetic(299, "")).is_ok());
        let err = classify(Envelope::synthetic(300, "Multiple Choices")).unwrap_err();
        assert_eq!(err.status(), Some(300));
        let err = classify(Envelope::synthetic(404, "Not Found")).unwrap_err();
        assert!(err.is_not_found());
        assert!(classify(Envelope::synthetic(199, "")).is_err());
    }
}
