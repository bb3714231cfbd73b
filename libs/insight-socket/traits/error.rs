use crate::traits::message::RequestId;
use thiserror::Error;

/// Main error type for insight-socket
#[derive(Error, Debug, Clone)]
pub enum SocketError {
    /// Connection could not be established or a send failed below this layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// No response arrived after every attempt timed out
    #[error("Request {id} timed out after {attempts} attempts")]
    Timeout { id: RequestId, attempts: u32 },

    /// The backend answered with `kind = error`
    #[error("Backend reported an error for request {id}: {content}")]
    Backend {
        id: RequestId,
        content: serde_json::Value,
    },

    /// Inbound frame could not be understood
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Payload rejected before it was sent
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Request was cancelled or abandoned by a client reset
    #[error("Request {id} was cancelled")]
    Cancelled { id: RequestId },

    /// Client has been shut down
    #[error("Client is shut down")]
    Shutdown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SocketError {
    /// Whether the failure belongs to a single request rather than the connection
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            SocketError::Timeout { .. }
                | SocketError::Backend { .. }
                | SocketError::Cancelled { .. }
        )
    }
}

/// Result type for insight-socket operations
pub type Result<T> = std::result::Result<T, SocketError>;
