//! Error types for the Precog client.
//!
//! # Design
//! Validation failures (`MissingField`, `MissingConfig`, `InvalidPath`) are
//! raised before any request leaves the client. Anything the server or the
//! transport reports is carried as a full [`Envelope`] so callers can look at
//! `status` and `status_text` whether the call succeeded or not.

use thiserror::Error;

use crate::response::Envelope;

/// Errors returned by every `Precog` operation.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field or parameter was absent or empty.
    #[error("the field \"{0}\" may not be null or empty")]
    MissingField(&'static str),

    /// The client configuration lacks a value this operation needs.
    #[error("the configuration field \"{0}\" may not be null or empty")]
    MissingConfig(&'static str),

    /// The path names a directory where a file was required.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Descendant listing hit a child that would recurse into its parent.
    #[error("refusing to recurse into child {0:?}")]
    PathRecursion(String),

    /// The target of a create already exists.
    #[error("the file {0} already exists")]
    AlreadyExists(String),

    /// The server answered with a status outside `[200, 300)`.
    #[error("HTTP {}: {}", .0.status, .0.status_text)]
    Http(Box<Envelope>),

    /// The request never produced an HTTP response.
    #[error("transport failure: {}", .0.status_text)]
    Transport(Box<Envelope>),

    /// The request payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body did not have the expected shape.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl Error {
    /// Synthesize an HTTP failure that did not come from the wire, such as
    /// an empty account search.
    pub fn http(status: u16, status_text: impl Into<String>) -> Self {
        Error::Http(Box::new(Envelope::synthetic(status, status_text)))
    }

    pub fn transport(status: u16, message: impl Into<String>) -> Self {
        Error::Transport(Box::new(Envelope::synthetic(status, message)))
    }

    /// The envelope behind an HTTP or transport failure.
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Error::Http(envelope) | Error::Transport(envelope) => Some(envelope),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.envelope().map(|e| e.status)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Http(envelope) if envelope.status == 404)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
