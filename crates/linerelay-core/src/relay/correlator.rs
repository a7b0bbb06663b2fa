//! Turns one request line into exactly one outcome.

use super::peer_link::PeerLink;
use super::queue::PendingReplyQueue;
use crate::config::CorrelationMode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Result of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Reply line from the peer, verbatim.
    Reply(String),
    /// No reply arrived within the timeout.
    TimedOut,
}

/// Sends requests over the [`PeerLink`] and waits on the [`PendingReplyQueue`].
pub struct Correlator {
    link: Arc<PeerLink>,
    replies: Arc<PendingReplyQueue>,
    mode: CorrelationMode,
    in_flight: Mutex<()>,
}

impl Correlator {
    pub fn new(
        link: Arc<PeerLink>,
        replies: Arc<PendingReplyQueue>,
        mode: CorrelationMode,
    ) -> Self {
        Self {
            link,
            replies,
            mode,
            in_flight: Mutex::new(()),
        }
    }

    pub fn mode(&self) -> CorrelationMode {
        self.mode
    }

    /// Send `request` to the peer and wait up to `timeout` for a reply.
    ///
    /// A timed-out request is not retracted or resent. Its slot in the queue
    /// stays behind, so when the reply shows up later it is discarded there.
    pub async fn execute(&self, request: &str, timeout: Duration) -> Outcome {
        match self.mode {
            CorrelationMode::Shared => self.round_trip(request, timeout).await,
            CorrelationMode::Serialized => {
                let _guard = self.in_flight.lock().await;
                self.round_trip(request, timeout).await
            }
        }
    }

    async fn round_trip(&self, request: &str, timeout: Duration) -> Outcome {
        // Register before sending so a fast reply has somewhere to go.
        let pending = self.replies.register();
        self.link.send(request);

        let deadline = Instant::now() + timeout;
        match tokio::time::timeout_at(deadline, pending.recv()).await {
            Ok(Some(reply)) => Outcome::Reply(reply),
            Ok(None) => {
                // Peer link is gone; never answer before the deadline.
                tokio::time::sleep_until(deadline).await;
                Outcome::TimedOut
            }
            Err(_) => {
                debug!("No peer reply within {:?}", timeout);
                Outcome::TimedOut
            }
        }
    }
}
