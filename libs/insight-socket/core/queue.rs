//! Outbound queue for requests submitted while the connection is down.

use crate::traits::RequestId;
use std::collections::VecDeque;

/// FIFO of request ids waiting for a connection
///
/// Payloads and resolvers stay in the correlator; the queue only fixes the
/// order in which they go out once the connection is back.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: VecDeque<RequestId>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail
    pub fn enqueue(&mut self, id: RequestId) {
        self.entries.push_back(id);
    }

    /// Take the head entry for sending
    pub fn pop_front(&mut self) -> Option<RequestId> {
        self.entries.pop_front()
    }

    /// Put an entry back at the head after a failed send
    pub fn requeue_front(&mut self, id: RequestId) {
        self.entries.push_front(id);
    }

    /// Remove a cancelled entry, keeping the others in order
    pub fn remove(&mut self, id: RequestId) -> bool {
        match self.entries.iter().position(|queued| *queued == id) {
            Some(index) => self.entries.remove(index).is_some(),
            None => false,
        }
    }

    /// Drop every entry (full client reset only)
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
