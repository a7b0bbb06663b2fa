//! Rendezvous queue between the peer read loop and waiting sessions.
//!
//! Every request takes a slot at the back of the queue before it goes out,
//! and each reply the peer sends fills the slot at the front. A session that
//! times out keeps its slot: the late reply for its request lands there and
//! is discarded, so it never reaches a later request. This relies on the
//! peer answering every request, in order. A request the peer never answers
//! leaves a dead slot behind and shifts every later reply by one.
//!
//! Nothing ties a reply to the request that caused it. When two requests
//! overlap and the peer answers them out of order, each session gets the
//! other's reply.
//!
//! Once the peer link is gone the queue is closed: all slots are released
//! and new sessions get no slot at all.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct Slots {
    waiters: VecDeque<oneshot::Sender<String>>,
    closed: bool,
}

/// Shared queue of sessions waiting for a reply line.
#[derive(Debug, Default)]
pub struct PendingReplyQueue {
    slots: Mutex<Slots>,
}

/// One session's slot in the [`PendingReplyQueue`].
///
/// Dropping it abandons the wait but not the slot; the reply that fills the
/// slot is discarded.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<String>,
}

impl PendingReply {
    /// Wait for a reply.
    ///
    /// Returns `None` if the queue was closed or dropped before a reply
    /// arrived.
    pub async fn recv(self) -> Option<String> {
        self.rx.await.ok()
    }
}

impl PendingReplyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a slot at the back of the queue.
    pub fn register(&self) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.closed {
            slots.waiters.push_back(tx);
        }
        PendingReply { rx }
    }

    /// Fill the front slot with a reply.
    ///
    /// Returns `false` if the reply was discarded, either because its
    /// session already gave up or because no slot was open.
    pub fn push(&self, line: String) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.waiters.pop_front() {
            Some(waiter) => waiter.send(line).is_ok(),
            None => false,
        }
    }

    /// Release every slot and refuse new ones.
    pub fn close(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.closed = true;
        slots.waiters.clear();
    }

    /// Number of sessions currently waiting.
    pub fn waiting(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.waiters.iter().filter(|waiter| !waiter.is_closed()).count()
    }

    /// Number of replies still owed by the peer, abandoned slots included.
    pub fn owed(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.waiters.len()
    }
}
