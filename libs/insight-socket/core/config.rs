use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// How long to wait for a response before resending
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends per request before the caller gets a timeout
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for InsightClient
///
/// Built with the type-state builder; the transport is the only required
/// piece.
pub struct ClientConfig {
    /// Connection factory
    pub(crate) transport: Arc<dyn Transport>,

    /// Response window per attempt
    pub(crate) request_timeout: Duration,

    /// Total sends per request, including the first
    pub(crate) max_attempts: u32,

    /// Delay policy between reconnection attempts
    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,

    /// Connect as soon as the client is built
    pub(crate) auto_connect: bool,
}

impl ClientConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(SocketError::Configuration(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(SocketError::Configuration(
                "max attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> String {
        self.transport.describe()
    }
}
