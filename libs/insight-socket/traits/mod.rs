//! # Insight Socket Traits
//!
//! Core traits and wire types shared by the client and its transports:
//!
//! - **Transport / Connection**: the seam to whatever moves frames
//! - **ReconnectionStrategy**: how long to wait between connection attempts
//! - **HeaderProvider**: handshake headers for WebSocket transports
//! - **Frame / Envelope**: the `request` / `response` wire format

pub mod error;
pub mod headers;
pub mod message;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{Result, SocketError};
pub use headers::{HeaderProvider, Headers, StaticHeaders};
pub use message::{
    Envelope, Frame, RequestId, ResponseKind, ID_FIELD, REQUEST_EVENT, RESPONSE_EVENT,
};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use transport::{Connection, DisconnectReason, Transport, TransportEvent};
