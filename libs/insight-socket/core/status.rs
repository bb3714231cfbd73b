//! Connection status notifications.

use crate::traits::DisconnectReason;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Lifecycle notification delivered to status subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Transport is open; queued requests are being flushed
    Connected,
    /// An open connection ended
    Disconnected(DisconnectReason),
    /// A connection attempt failed
    ConnectError(String),
}

type StatusHandler = Arc<dyn Fn(&StatusEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<u64, StatusHandler>>,
}

/// Fan-out of status events to registered handlers
#[derive(Clone, Default)]
pub struct StatusHub {
    registry: Arc<Registry>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; it stays registered while the handle is alive
    pub fn subscribe<F>(&self, handler: F) -> StatusSubscription
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.handlers.write().insert(id, Arc::new(handler));

        StatusSubscription {
            id,
            registry: Arc::downgrade(&self.registry),
            active: AtomicBool::new(true),
        }
    }

    /// Deliver an event to every handler
    ///
    /// Handlers are called outside the registry lock, so they may subscribe
    /// or unsubscribe from inside the callback.
    pub fn notify(&self, event: &StatusEvent) {
        let handlers: Vec<StatusHandler> =
            self.registry.handlers.read().values().cloned().collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.handlers.read().len()
    }
}

/// Handle returned by `on_status_change`
///
/// Unsubscribing is idempotent and also happens on drop.
#[must_use = "dropping the subscription unsubscribes the handler"]
pub struct StatusSubscription {
    id: u64,
    registry: Weak<Registry>,
    active: AtomicBool,
}

impl StatusSubscription {
    /// Stop receiving events; returns `true` only on the first call
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.handlers.write().remove(&self.id);
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for StatusSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusSubscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
