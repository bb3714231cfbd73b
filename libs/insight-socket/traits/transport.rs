use crate::traits::error::Result;
use crate::traits::message::Frame;
use async_trait::async_trait;
use std::fmt;

/// Why an open connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the session on purpose; reconnect right away
    ServerDisconnect,
    /// The underlying stream ended without a close handshake
    TransportClose,
    /// The underlying stream failed
    TransportError(String),
}

impl DisconnectReason {
    /// Whether the reconnection backoff should be skipped
    pub fn is_server_initiated(&self) -> bool {
        matches!(self, DisconnectReason::ServerDisconnect)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ServerDisconnect => write!(f, "server disconnect"),
            DisconnectReason::TransportClose => write!(f, "transport close"),
            DisconnectReason::TransportError(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// Something that happened on an open connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(Frame),
    Disconnected(DisconnectReason),
}

/// Factory for connections to the backend
///
/// Framing, handshakes and keepalive belong to the implementation. The
/// client only ever calls `connect`, then talks to the returned
/// [`Connection`] until it reports a disconnect.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new connection
    ///
    /// # Returns
    /// * `Ok(connection)` - Connection is open and ready to emit
    /// * `Err(SocketError)` - Connection could not be established
    async fn connect(&self) -> Result<Box<dyn Connection>>;

    /// Short description for logs (usually the URL)
    fn describe(&self) -> String;
}

/// A single open session with the backend
#[async_trait]
pub trait Connection: Send {
    /// Send a named event
    async fn emit(&mut self, frame: Frame) -> Result<()>;

    /// Wait for the next inbound event
    ///
    /// Must be cancel-safe: the client races it against commands and timers.
    /// Once a `Disconnected` event has been returned the connection is dead.
    async fn recv(&mut self) -> TransportEvent;

    /// Close the session from the client side
    ///
    /// Also called after a disconnect was reported, so it must tolerate a
    /// dead connection.
    async fn close(&mut self);
}
