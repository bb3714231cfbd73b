pub mod states;

use crate::client::InsightClient;
use crate::config::{ClientConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT};
use crate::traits::*;
use crate::transport::WsTransport;
use states::*;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for InsightClient
///
/// The transport must be chosen (`url` or `transport`) before `build()`
/// becomes available.
pub struct ClientBuilder<T>
where
    T: TransportState,
{
    _state: PhantomData<T>,
    transport: Option<Arc<dyn Transport>>,
    request_timeout: Duration,
    max_attempts: u32,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    auto_connect: bool,
}

impl ClientBuilder<NoTransport> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: PhantomData,
            transport: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            reconnect_strategy: None,
            auto_connect: true,
        }
    }

    /// Connect over WebSocket to `url`
    pub fn url(self, url: impl Into<String>) -> ClientBuilder<HasTransport> {
        self.transport(WsTransport::new(url))
    }

    /// Use a custom transport
    pub fn transport(self, transport: impl Transport) -> ClientBuilder<HasTransport> {
        ClientBuilder {
            _state: PhantomData,
            transport: Some(Arc::new(transport)),
            request_timeout: self.request_timeout,
            max_attempts: self.max_attempts,
            reconnect_strategy: self.reconnect_strategy,
            auto_connect: self.auto_connect,
        }
    }
}

impl Default for ClientBuilder<NoTransport> {
    fn default() -> Self {
        Self::new()
    }
}

// Optional configuration methods
impl<T> ClientBuilder<T>
where
    T: TransportState,
{
    /// Response window per attempt (default 60s)
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Total sends per request including the first (default 3)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Delay policy between reconnection attempts
    ///
    /// Defaults to exponential backoff from 1s to 5s without an attempt limit.
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Whether to open the connection as soon as the client is built
    /// (default true). When off, the first `connect()` or `submit()` does it.
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }
}

// Build method - only available once a transport is set
impl ClientBuilder<HasTransport> {
    /// Validate the configuration and start the client
    ///
    /// Must be called from within a tokio runtime; the connection driver is
    /// spawned onto it.
    pub fn build(self) -> Result<InsightClient> {
        let transport = self
            .transport
            .ok_or_else(|| SocketError::Configuration("transport must be set".to_string()))?;

        let reconnect_strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(ExponentialBackoff::unbounded()));

        let config = ClientConfig {
            transport,
            request_timeout: self.request_timeout,
            max_attempts: self.max_attempts,
            reconnect_strategy,
            auto_connect: self.auto_connect,
        };
        config.validate()?;

        InsightClient::new(config)
    }
}
