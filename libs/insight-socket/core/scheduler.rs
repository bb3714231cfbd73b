//! Per-request response timers.
//!
//! Timers live in a [`DelayQueue`] driven by tokio's clock, so tests running
//! with a paused runtime advance them deterministically.

use crate::traits::RequestId;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::time::delay_queue::{DelayQueue, Key};

/// One timer per sent request
pub struct RetryScheduler {
    timeout: Duration,
    max_attempts: u32,
    timers: DelayQueue<RequestId>,
    keys: HashMap<RequestId, Key>,
}

/// What to do with a request whose timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send it again
    Retry,
    /// Ceiling reached, fail the caller
    Exhausted,
}

impl RetryScheduler {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts,
            timers: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Start (or restart) the timer for a request that was just sent
    pub fn arm(&mut self, id: RequestId) {
        match self.keys.get(&id) {
            Some(key) => self.timers.reset(key, self.timeout),
            None => {
                let key = self.timers.insert(id, self.timeout);
                self.keys.insert(id, key);
            }
        }
    }

    /// Stop the timer; returns whether one was running
    pub fn disarm(&mut self, id: RequestId) -> bool {
        match self.keys.remove(&id) {
            Some(key) => {
                self.timers.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Decide the fate of a request after its timer fired
    pub fn decide(&self, attempts: u32) -> RetryDecision {
        if attempts < self.max_attempts {
            RetryDecision::Retry
        } else {
            RetryDecision::Exhausted
        }
    }

    /// Wait for the next timer to fire
    ///
    /// Resolves to `None` immediately when nothing is armed, so callers
    /// racing it in `select!` should guard on [`is_empty`](Self::is_empty).
    pub async fn expired(&mut self) -> Option<RequestId> {
        let expired = self.timers.next().await?;
        let id = expired.into_inner();
        self.keys.remove(&id);
        Some(id)
    }

    pub fn clear(&mut self) {
        self.timers.clear();
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
