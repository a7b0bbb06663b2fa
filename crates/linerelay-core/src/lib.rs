//! Linerelay Core - correlation relay in front of a single line-protocol peer.
//!
//! Many short-lived clients each send one request line and get back exactly
//! one line: the peer's reply, or a timeout marker. All requests share one
//! long-lived connection to the peer, which also pushes unsolicited
//! notifications that are routed to a [`NotificationSink`] instead of a
//! client.
//!
//! # Example
//!
//! ```rust,ignore
//! use linerelay_core::{RelayServer, RelaySettings, TracingSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> linerelay_core::Result<()> {
//!     let settings = RelaySettings::default();
//!     let handle = RelayServer::start(&settings, Arc::new(TracingSink)).await?;
//!     println!("Relay listening on {}", handle.addr());
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod relay;

pub use config::{CorrelationMode, PeerEndpoint, RelayConfig, RelaySettings};
pub use error::{RelayError, Result};
pub use relay::{
    classify, handle_session, ChannelSink, Correlator, LineKind, NotificationSink, Outcome,
    PeerLink, PendingReplyQueue, RelayHandle, RelayServer, TracingSink,
};
