//! Request correlation: id allocation and the pending-request table.

use crate::traits::{Envelope, RequestId, Result, SocketError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Settles the caller's [`PendingResponse`](crate::client::PendingResponse)
pub type Resolver = oneshot::Sender<Result<Envelope>>;

/// Monotonic id source shared between the facade and the correlator
///
/// Ids start at 1 and are never reused for the lifetime of the client.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: Arc<AtomicU64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> RequestId {
        RequestId::new(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// An outstanding request
#[derive(Debug)]
pub struct PendingRequest {
    pub id: RequestId,
    pub payload: Map<String, Value>,
    pub created_at: Instant,
    /// Number of times the request has been emitted
    pub attempts: u32,
    resolver: Resolver,
}

impl PendingRequest {
    pub fn new(id: RequestId, payload: Map<String, Value>, resolver: Resolver) -> Self {
        Self {
            id,
            payload,
            created_at: Instant::now(),
            attempts: 0,
            resolver,
        }
    }

    /// Settle the caller; a caller that stopped listening is ignored
    pub fn settle(self, outcome: Result<Envelope>) {
        let _ = self.resolver.send(outcome);
    }
}

/// Table of outstanding requests keyed by correlation id
///
/// Ids are allocated by the facade's [`IdGenerator`] so `submit` can hand
/// the id back before the driver has seen the request.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<RequestId, PendingRequest>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a request under its id
    ///
    /// A duplicate id can only come from misuse of the generator; the newer
    /// request is rejected so the outstanding one keeps its resolver.
    pub fn insert(&mut self, request: PendingRequest) {
        if self.pending.contains_key(&request.id) {
            let id = request.id;
            request.settle(Err(SocketError::InvalidPayload(format!(
                "request id {} is already outstanding",
                id
            ))));
            return;
        }
        self.pending.insert(request.id, request);
    }

    /// Hand a response to its waiting caller
    ///
    /// Returns `false` when nobody is waiting for the id (duplicate, late,
    /// timed out or cancelled); that case is a silent no-op.
    pub fn resolve(&mut self, envelope: Envelope) -> bool {
        match self.pending.remove(&envelope.id) {
            Some(request) => {
                debug!(
                    "Resolved request {} after {} attempt(s) in {:?}",
                    request.id,
                    request.attempts,
                    request.created_at.elapsed()
                );
                request.settle(Ok(envelope));
                true
            }
            None => {
                debug!("No pending request for response id {}, dropping", envelope.id);
                false
            }
        }
    }

    pub fn get(&self, id: RequestId) -> Option<&PendingRequest> {
        self.pending.get(&id)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut PendingRequest> {
        self.pending.get_mut(&id)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Remove without settling; the caller observes `Cancelled`
    pub fn remove(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    /// Take every outstanding request out of the table
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        self.pending.drain().map(|(_, request)| request).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
