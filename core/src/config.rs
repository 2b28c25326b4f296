//! Client configuration.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::response::JsonPolicy;

pub const ENV_ANALYTICS_SERVICE: &str = "PRECOG_ANALYTICS_SERVICE";
pub const ENV_API_KEY: &str = "PRECOG_API_KEY";
pub const ENV_STRICT_JSON: &str = "PRECOG_STRICT_JSON";

/// Where the service lives and how to authorize against it.
///
/// `api_key` is optional because the account endpoints authenticate with
/// email and password instead.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub analytics_service: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub json_policy: JsonPolicy,
}

impl ClientConfig {
    pub fn new(analytics_service: &str) -> Self {
        Self {
            analytics_service: analytics_service.trim_end_matches('/').to_string(),
            api_key: None,
            json_policy: JsonPolicy::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_json_policy(mut self, policy: JsonPolicy) -> Self {
        self.json_policy = policy;
        self
    }

    /// Read `PRECOG_ANALYTICS_SERVICE`, `PRECOG_API_KEY` and
    /// `PRECOG_STRICT_JSON` from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let service = lookup(ENV_ANALYTICS_SERVICE)
            .filter(|s| !s.is_empty())
            .ok_or(Error::MissingConfig("analyticsService"))?;
        let mut config = Self::new(&service);
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.is_empty()) {
            config = config.with_api_key(key);
        }
        if matches!(lookup(ENV_STRICT_JSON).as_deref(), Some("1" | "true")) {
            config = config.with_json_policy(JsonPolicy::Strict);
        }
        Ok(config)
    }

    /// The API key, or [`Error::MissingConfig`].
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(Error::MissingConfig("apiKey"))
    }
}
