//! The request/response contract used by every API method.
//!
//! `PrecogHttp` pairs a selected transport with a JSON policy: options are
//! normalized into an `HttpRequest`, sent, and the raw reply is normalized
//! and classified into `Ok(Envelope)` or `Err(Error::Http)`.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::http::HttpMethod;
use crate::request::RequestOptions;
use crate::response::{classify, normalize, Envelope, JsonPolicy};
use crate::transport::{transport_for, CallbackRegistry, Environment, Strategy, Transport};

#[derive(Debug, Clone)]
pub struct PrecogHttp {
    transport: Arc<dyn Transport>,
    policy: JsonPolicy,
}

impl PrecogHttp {
    pub fn new(transport: Arc<dyn Transport>, policy: JsonPolicy) -> Self {
        Self { transport, policy }
    }

    /// Pick the transport for the current runtime.
    pub fn detect(policy: JsonPolicy) -> Self {
        let strategy = Strategy::select(&Environment::detect());
        Self::new(transport_for(strategy, CallbackRegistry::new()), policy)
    }

    pub fn strategy(&self) -> Strategy {
        self.transport.strategy()
    }

    pub async fn request(&self, options: RequestOptions) -> Result<Envelope> {
        let request = options.build()?;
        // The query string carries API keys; keep it out of the logs.
        let target = request.url.split(['?', '#']).next().unwrap_or_default();
        debug!(method = %request.method, url = %target, "dispatching request");

        let raw = self.transport.send(request).await?;
        let envelope = normalize(raw, self.policy)?;
        debug!(status = envelope.status, "received response");
        classify(envelope)
    }

    pub async fn get(&self, options: RequestOptions) -> Result<Envelope> {
        self.request(options.method(HttpMethod::Get)).await
    }

    pub async fn put(&self, options: RequestOptions) -> Result<Envelope> {
        self.request(options.method(HttpMethod::Put)).await
    }

    pub async fn post(&self, options: RequestOptions) -> Result<Envelope> {
        self.request(options.method(HttpMethod::Post)).await
    }

    pub async fn delete(&self, options: RequestOptions) -> Result<Envelope> {
        self.request(options.method(HttpMethod::Delete)).await
    }

    pub async fn patch(&self, options: RequestOptions) -> Result<Envelope> {
        self.request(options.method(HttpMethod::Patch)).await
    }
}
