//! Error types for correlated RPC
//!
//! Flat hierarchy. Timeout is an ordinary outcome, ConnectionClosed is fatal,
//! and misuse of the API fails fast with a UsageError.

use std::time::Duration;

use thiserror::Error;

use crate::rpc::protocol::RequestId;
use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    ConnectionClosed,

    /// Only produced when `strict_errors` is enabled.
    #[error("Protocol error: {code} - {message}")]
    Protocol { code: i64, message: String },

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Error::ConnectionClosed)
    }
}

/// Caller mistakes. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("Request {0} is already being awaited")]
    AlreadyAwaiting(RequestId),

    #[error("Cannot send a request expecting a reply after close()")]
    SendAfterClose,

    #[error("Invalid method name: {0:?}")]
    InvalidMethod(String),
}
