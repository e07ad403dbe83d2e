// src/client/error.rs

use thiserror::Error;

/// Failure of a single remote call, as seen by the transport.
///
/// Every variant is a value; nothing in the transport panics or throws.
/// [`crate::classify::classify`] turns these into the categories the rest of
/// the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The call was aborted locally before a response arrived.
    #[error("request canceled")]
    Canceled,

    /// No response reached us: connection refused, DNS failure, timeout.
    #[error("error calling {url}: {message}")]
    NoResponse { url: String, message: String },

    /// The server answered with a non-success HTTP status.
    #[error("{status}: {message}")]
    Status { status: u16, message: String },

    /// The server answered but the payload did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        TransportError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn no_response(url: impl Into<String>, message: impl Into<String>) -> Self {
        TransportError::NoResponse {
            url: url.into(),
            message: message.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, TransportError>;
