//! Transports and the strategy selector.
//!
//! # Overview
//! A [`Transport`] executes one `HttpRequest` and reports a `RawResponse`.
//! Three strategies exist:
//! - `CrossOrigin`: a browser with cross-origin requests available;
//! - `Script`: a browser without them, tunneling every call through a
//!   callback-wrapped GET;
//! - `Socket`: no browser, plain HTTP/HTTPS over a socket.
//!
//! `CrossOrigin` and `Socket` are both served by [`SocketTransport`]: reqwest
//! on a browser target is backed by `fetch`, which is the cross-origin
//! capable request object there.

mod script;
mod socket;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::http::HttpRequest;
use crate::response::RawResponse;

pub use script::{CallbackGuard, CallbackRegistry, ScriptTransport};
pub use socket::SocketTransport;

/// Executes a single normalized request.
///
/// Implementations buffer the whole body and never retry.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    fn strategy(&self) -> Strategy;

    async fn send(&self, request: HttpRequest) -> Result<RawResponse>;
}

/// What the runtime can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    pub browser: bool,
    pub cross_origin: bool,
}

impl Environment {
    pub const NATIVE: Environment = Environment {
        browser: false,
        cross_origin: false,
    };

    pub fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            Environment {
                browser: true,
                cross_origin: true,
            }
        } else {
            Self::NATIVE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    CrossOrigin,
    Script,
    #[default]
    Socket,
}

impl Strategy {
    pub fn select(env: &Environment) -> Self {
        match (env.browser, env.cross_origin) {
            (false, _) => Strategy::Socket,
            (true, true) => Strategy::CrossOrigin,
            (true, false) => Strategy::Script,
        }
    }
}

/// Build the transport for `strategy`. `registry` is only used by the
/// script strategy.
pub fn transport_for(strategy: Strategy, registry: CallbackRegistry) -> Arc<dyn Transport> {
    debug!(?strategy, "selected transport");
    match strategy {
        Strategy::CrossOrigin => Arc::new(SocketTransport::cross_origin()),
        Strategy::Socket => Arc::new(SocketTransport::new()),
        Strategy::Script => Arc::new(ScriptTransport::new(SocketTransport::new(), registry)),
    }
}
