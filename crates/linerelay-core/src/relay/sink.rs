//! Destinations for unsolicited peer notifications.

use tokio::sync::mpsc;
use tracing::{debug, info};

/// Write-only consumer of notification lines.
///
/// `accept` is called from the peer read loop and must not block.
pub trait NotificationSink: Send + Sync + 'static {
    fn accept(&self, line: String);
}

/// Logs every notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn accept(&self, line: String) {
        info!(target: "linerelay::notification", "{}", line);
    }
}

/// Forwards notifications into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    /// Create a sink together with the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn accept(&self, line: String) {
        if self.tx.send(line).is_err() {
            debug!("Notification receiver dropped, discarding line");
        }
    }
}
