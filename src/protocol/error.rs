use std::io;

use thiserror::Error;

use super::transport::TransportError;

/// Errors surfaced by a [`Session`](super::Session) and everything built on it.
#[derive(Debug, Error)]
pub enum FishbowlError {
    #[error("Not connected")]
    NotConnected,

    #[error("failed to connect to {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Connection timeout")]
    Timeout,

    #[error("Connection timeout (after length received)")]
    TimeoutAfterLength,

    #[error("{message}")]
    Status {
        code: Option<String>,
        message: String,
    },

    #[error("No login key in response")]
    MissingKey,

    #[error("response has no '{0}' element")]
    MissingNode(String),

    #[error("malformed response: {0}")]
    Parse(#[from] xmltree::ParseError),

    #[error("text encoding error: {0}")]
    Encoding(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unreadable query rows: {0}")]
    Query(#[from] csv::Error),

    #[error("session lock poisoned")]
    SessionPoisoned,
}

impl FishbowlError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout | Self::TimeoutAfterLength)
    }

    /// Status code carried by a [`FishbowlError::Status`].
    pub fn status_code(&self) -> Option<&str> {
        match self {
            Self::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
