//! Centralized configuration for the relay.
//!
//! Compile-time constants live on [`RelayConfig`]. The handful of runtime
//! settings (peer endpoint, listen address, timeout, correlation mode) are
//! carried by [`RelaySettings`].

use crate::{RelayError, Result};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Relay-wide constants.
pub struct RelayConfig;

impl RelayConfig {
    /// How long a client waits for the peer before getting the timeout marker.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Prefix the peer uses for every unsolicited push message.
    ///
    /// Replies look like `{"jsonrpc":"2.0","result":...,"id":...}` or
    /// `{"jsonrpc":"2.0","error":...,"id":...}`; notifications look like
    /// `{"jsonrpc":"2.0","method":"receive","params":...}`.
    pub const NOTIFICATION_PREFIX: &'static str = "{\"jsonrpc\":\"2.0\",\"method\":";

    /// Line sent to a client whose request got no reply in time.
    pub const TIMEOUT_MARKER: &'static str = "Timed out";

    pub const DEFAULT_PEER_SOCKET: &'static str = "/tmp/signal-cli/socket";
    pub const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:5780";

    pub const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const MAX_REQUEST_LINE_BYTES: usize = 1_048_576; // 1MB
}

/// How concurrent client requests share the single peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelationMode {
    /// Requests go out as soon as they arrive. Overlapping requests can
    /// receive each other's replies.
    #[default]
    Shared,
    /// The whole send-wait-receive cycle runs under one lock, so at most one
    /// request is in flight process-wide.
    Serialized,
}

/// Where the peer process listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEndpoint {
    /// `tcp://host:port`, or a bare `host:port` socket address.
    Tcp(String),
    /// Path to a Unix domain socket.
    Unix(PathBuf),
}

impl FromStr for PeerEndpoint {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RelayError::InvalidEndpoint("empty endpoint".to_string()));
        }

        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() {
                return Err(RelayError::InvalidEndpoint(s.to_string()));
            }
            return Ok(PeerEndpoint::Tcp(addr.to_string()));
        }

        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(RelayError::InvalidEndpoint(s.to_string()));
            }
            return Ok(PeerEndpoint::Unix(PathBuf::from(path)));
        }

        if s.parse::<SocketAddr>().is_ok() {
            return Ok(PeerEndpoint::Tcp(s.to_string()));
        }

        Ok(PeerEndpoint::Unix(PathBuf::from(s)))
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEndpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            PeerEndpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Runtime settings for one relay process.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub peer: PeerEndpoint,
    pub listen: String,
    pub timeout: Duration,
    pub mode: CorrelationMode,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            peer: PeerEndpoint::Unix(PathBuf::from(RelayConfig::DEFAULT_PEER_SOCKET)),
            listen: RelayConfig::DEFAULT_LISTEN_ADDR.to_string(),
            timeout: RelayConfig::DEFAULT_TIMEOUT,
            mode: CorrelationMode::Shared,
        }
    }
}
