//! WebSocket transport: one JSON text message per frame.

use crate::traits::*;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a WebSocket backend
///
/// Handshake headers come from an optional [`HeaderProvider`] that is asked
/// again on every reconnect.
pub struct WsTransport {
    url: String,
    headers: Option<Arc<dyn HeaderProvider>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: None,
        }
    }

    /// Send headers from `provider` with every handshake
    pub fn headers(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.headers = Some(Arc::new(provider));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&self) -> std::result::Result<WsStream, tokio_tungstenite::tungstenite::Error> {
        let Some(ref header_provider) = self.headers else {
            return connect_async(self.url.as_str()).await.map(|(stream, _)| stream);
        };

        // Generate headers dynamically
        let headers = header_provider.get_headers().await;
        let mut request = self.url.as_str().into_client_request()?;

        for (key, value) in headers {
            match key.parse::<http::header::HeaderName>() {
                Ok(header_name) => match value.parse::<http::header::HeaderValue>() {
                    Ok(header_value) => {
                        request.headers_mut().insert(header_name, header_value);
                    }
                    Err(_) => {
                        warn!("Invalid header value for key '{}': {}", key, value);
                    }
                },
                Err(_) => {
                    warn!("Invalid header name: {}", key);
                }
            }
        }

        debug!("Connecting with custom headers");
        connect_async(request).await.map(|(stream, _)| stream)
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("url", &self.url)
            .field("headers", &self.headers.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let stream = self
            .open()
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))?;
        Ok(Box::new(WsConnection {
            stream,
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

struct WsConnection {
    stream: WsStream,
    closed: bool,
}

#[async_trait]
impl Connection for WsConnection {
    async fn emit(&mut self, frame: Frame) -> Result<()> {
        let text = serde_json::to_string(&frame)
            .map_err(|e| SocketError::InvalidPayload(e.to_string()))?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Frame>(&text) {
                    Ok(frame) => return TransportEvent::Message(frame),
                    Err(e) => warn!("Dropping unparsable message: {}", e),
                },
                Some(Ok(Message::Binary(data))) => match serde_json::from_slice::<Frame>(&data) {
                    Ok(frame) => return TransportEvent::Message(frame),
                    Err(e) => warn!("Dropping unparsable binary message: {}", e),
                },
                Some(Ok(Message::Close(close_frame))) => {
                    debug!("Server sent close frame: {:?}", close_frame);
                    self.closed = true;
                    return TransportEvent::Disconnected(DisconnectReason::ServerDisconnect);
                }
                // Ping replies are queued by tungstenite itself
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    self.closed = true;
                    return TransportEvent::Disconnected(DisconnectReason::TransportError(
                        e.to_string(),
                    ));
                }
                None => {
                    self.closed = true;
                    return TransportEvent::Disconnected(DisconnectReason::TransportClose);
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            debug!("Error while closing WebSocket: {}", e);
        }
    }
}
