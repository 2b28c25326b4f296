use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;

use super::{Strategy, Transport};
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest};
use crate::response::RawResponse;

/// Direct HTTP/HTTPS transport built on reqwest.
///
/// Connection failures become [`Error::Transport`] with status 0, the value a
/// request object reports when no response arrived at all.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    client: reqwest::Client,
    strategy: Strategy,
}

impl Default for SocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// The same transport, reporting itself as the cross-origin strategy.
    pub fn cross_origin() -> Self {
        Self {
            strategy: Strategy::CrossOrigin,
            ..Self::new()
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            strategy: Strategy::Socket,
        }
    }
}

fn to_reqwest(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn strategy(&self) -> Strategy {
        self.strategy
    }

    async fn send(&self, request: HttpRequest) -> Result<RawResponse> {
        let mut builder = self.client.request(to_reqwest(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::transport(0, e.to_string()))?;

        let status = response.status();
        let header_blob = response
            .headers()
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\r\n");
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(0, e.to_string()))?;

        Ok(RawResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            header_blob,
            content_type,
            body: (!text.is_empty()).then_some(text),
        })
    }
}
