//! Client core: the facade, its connection driver and the bookkeeping the
//! driver owns (queue, correlator, retry timers, status fan-out).

pub mod builder;
pub mod client;
pub mod config;
pub mod connection;
pub mod connection_state;
pub mod correlator;
pub mod queue;
pub mod scheduler;
pub mod status;

// Re-export main types
pub use builder::{states, ClientBuilder};
pub use client::{InsightClient, Metrics, PendingResponse};
pub use config::{ClientConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT};
pub use connection::ClientSnapshot;
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use status::{StatusEvent, StatusHub, StatusSubscription};

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new client builder
///
/// # Example
/// ```ignore
/// let client = insight_socket::builder()
///     .url("ws://localhost:5002")
///     .request_timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder<states::NoTransport> {
    ClientBuilder::new()
}
