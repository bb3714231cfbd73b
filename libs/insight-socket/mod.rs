//! # Insight Socket
//!
//! Resilient request/response messaging over a persistent WebSocket.
//!
//! ## Features
//!
//! - **At-least-once delivery**: requests are resent until answered or out of attempts
//! - **Offline queue**: requests made while disconnected are flushed in order on reconnect
//! - **Correlation**: every request carries an id echoed back by the backend
//! - **Type-state builder**: a transport must be chosen before `build()` exists
//! - **Pluggable transports**: WebSocket for production, in-memory for tests

pub mod traits;
pub mod core;
pub mod transport;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use self::core::{
    builder, client, config, connection, connection_state, correlator, queue, scheduler, status,
    builder::{states, ClientBuilder},
    client::{InsightClient, Metrics, PendingResponse},
    config::{ClientConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT},
    connection::ClientSnapshot,
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    status::{StatusEvent, StatusHub, StatusSubscription},
};

pub use transport::{memory_transport, MemoryPeer, MemoryServer, MemoryTransport, WsTransport};

// Convenience function
pub use self::core::builder as client_builder;
