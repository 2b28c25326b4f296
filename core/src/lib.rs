//! Async client for the Precog analytics and storage service.
//!
//! # Overview
//! Every API method maps onto one REST endpoint (or a short chain of them):
//! accounts, API keys and grants, filesystem metadata, uploads and appends,
//! and query execution. Requests go through one normalization layer:
//! `RequestOptions` builds the request, a `Transport` executes it, and the
//! reply is normalized into an `Envelope` that is `Ok` for 2xx and
//! `Err(Error::Http)` otherwise.
//!
//! # Design
//! - `Precog` is stateless apart from its `ClientConfig`; nothing is cached.
//! - The transport is picked once per client from the runtime environment
//!   (`Strategy::select`), and can be replaced with any `Transport` for
//!   tests.
//! - Server records are returned as `serde_json::Value`. Only caller inputs
//!   are typed.
//!
//! # Example
//! ```no_run
//! # async fn example() -> precog_core::Result<()> {
//! use precog_core::{ClientConfig, Precog, Query};
//!
//! let precog = Precog::new(ClientConfig::new("https://devapi.precog.com").with_api_key("..."));
//! let results = precog.execute(&Query::new("1 + 2")).await?;
//! assert_eq!(results["data"], serde_json::json!([3]));
//! # Ok(()) }
//! ```

pub mod client;
pub mod config;
pub mod descendants;
pub mod error;
pub mod http;
pub mod path;
pub mod precog_http;
pub mod request;
pub mod response;
pub mod transport;
pub mod types;

pub use client::Precog;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use http::{HttpMethod, HttpRequest};
pub use precog_http::PrecogHttp;
pub use request::{Body, QueryValue, RequestOptions};
pub use response::{Content, Envelope, JsonPolicy, RawResponse};
pub use transport::{Strategy, Transport};
pub use types::{
    AccountCredentials, Append, AsyncQuery, FileContents, FileType, GrantType, Query, UploadFile,
};
