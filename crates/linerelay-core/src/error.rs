//! Error types for the relay.
//!
//! Only startup failures and per-session I/O problems are errors. A timed-out
//! request is an ordinary [`Outcome`](crate::relay::Outcome), not an error.

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for the relay library.
#[derive(Debug, Error)]
pub enum RelayError {
    // Startup errors
    #[error("Cannot connect to peer at {endpoint}: {message}")]
    PeerConnect {
        endpoint: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Cannot bind client listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid peer endpoint: {0}")]
    InvalidEndpoint(String),

    // Session errors
    #[error("Request line exceeds {limit} bytes")]
    RequestTooLong { limit: usize },

    #[error("Request line from {peer:?} is not valid UTF-8")]
    InvalidUtf8 { peer: Option<SocketAddr> },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RelayError {
    /// Whether the error happened while the process was starting up.
    ///
    /// Startup errors are fatal to the process; everything else only ends one
    /// client session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::PeerConnect { .. }
                | RelayError::Bind { .. }
                | RelayError::InvalidEndpoint(_)
        )
    }
}
