//! Correlation relay between line clients and one line peer.
//!
//! # Architecture
//!
//! - **Peer link**: owns the one peer connection, classifies inbound lines and
//!   writes outgoing requests
//! - **Correlator**: sends one request and waits for a reply or the timeout
//! - **Session**: one client connection, one line in and one line out
//! - **Server**: accepts clients and spawns a session task per connection
//!
//! ```text
//! client -> session -> correlator -> peer link -> peer
//!                          ^                        |
//!                          +---- reply queue <------+ replies
//!                                 sink       <------+ notifications
//! ```

pub mod classify;
pub mod correlator;
pub mod peer_link;
pub mod queue;
pub mod server;
pub mod session;
pub mod sink;

pub use classify::{classify, LineKind};
pub use correlator::{Correlator, Outcome};
pub use peer_link::PeerLink;
pub use queue::{PendingReply, PendingReplyQueue};
pub use server::{RelayHandle, RelayServer};
pub use session::handle_session;
pub use sink::{ChannelSink, NotificationSink, TracingSink};
