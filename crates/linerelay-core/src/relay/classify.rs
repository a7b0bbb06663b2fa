//! Reply/notification classification for peer lines.
//!
//! This is a byte-prefix check, not a parse. Anything that does not start
//! with the peer's notification header is treated as a reply, including
//! lines shorter than the header.

use crate::config::RelayConfig;

/// What a line read from the peer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Answer to a request; goes to whichever session is waiting.
    Reply,
    /// Unsolicited push from the peer; goes to the notification sink.
    Notification,
}

/// Classify one peer line (without its terminator).
pub fn classify(line: &str) -> LineKind {
    classify_with_prefix(line, RelayConfig::NOTIFICATION_PREFIX)
}

/// Classify against an arbitrary notification header.
pub fn classify_with_prefix(line: &str, prefix: &str) -> LineKind {
    if line.len() >= prefix.len() && line.as_bytes().starts_with(prefix.as_bytes()) {
        LineKind::Notification
    } else {
        LineKind::Reply
    }
}
