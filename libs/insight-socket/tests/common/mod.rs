//! Common test utilities for insight-socket integration tests
//!
//! Provides a mock analysis backend over real WebSockets and helpers for
//! building clients on the in-memory transport.

#![allow(dead_code)]

use insight_socket::{
    memory_transport, Envelope, Frame, InsightClient, MemoryServer, ReconnectionStrategy,
    RequestId, StatusEvent, ID_FIELD, REQUEST_EVENT,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Route client logs to the test output when TEST_VERBOSE is set
pub fn init_test_tracing() {
    if std::env::var("TEST_VERBOSE").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("insight_socket=debug")
            .with_test_writer()
            .try_init();
    }
}

/// How the mock backend answers
#[derive(Debug, Clone, Copy)]
pub enum BackendMode {
    /// Success envelope echoing the request body
    Echo,
    /// Error envelope for every request
    Fail,
    /// Echo, then send a close frame after this many answers
    CloseAfter(usize),
}

/// A mock analysis backend speaking the request/response protocol
pub struct MockBackend {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
}

impl MockBackend {
    /// Start a backend that echoes every request
    pub async fn start() -> Self {
        Self::start_with(BackendMode::Echo).await
    }

    pub async fn start_with(mode: BackendMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(Notify::new());

        let connections_clone = Arc::clone(&connections);
        let shutdown_clone = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                connections_clone.fetch_add(1, Ordering::SeqCst);
                                let shutdown = Arc::clone(&shutdown_clone);
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, mode, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            connections,
            shutdown,
        }
    }

    async fn handle_connection(stream: tokio::net::TcpStream, mode: BackendMode, shutdown: Arc<Notify>) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::{accept_async, tungstenite::Message};

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();
        let mut answered = 0;

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    };

                    let Some(reply) = Self::answer(&text, mode) else {
                        continue;
                    };
                    let body = serde_json::to_string(&reply).unwrap();
                    if write.send(Message::Text(body)).await.is_err() {
                        break;
                    }

                    answered += 1;
                    if let BackendMode::CloseAfter(limit) = mode {
                        if answered >= limit {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    fn answer(text: &str, mode: BackendMode) -> Option<Frame> {
        let frame: Frame = serde_json::from_str(text).ok()?;
        if frame.event != REQUEST_EVENT {
            return None;
        }
        let id = frame.request_id()?;

        let mut body = frame.data.as_object()?.clone();
        body.remove(ID_FIELD);

        let envelope = match mode {
            BackendMode::Fail => Envelope::error(id, Value::String("analysis failed".into())),
            _ => Envelope::success(id, Value::Object(body)),
        };
        Some(Frame::response(&envelope))
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Accepted TCP connections so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Client on the in-memory transport with the given retry window and ceiling
pub fn memory_client(timeout: Duration, max_attempts: u32) -> (InsightClient, MemoryServer) {
    let (transport, server) = memory_transport();
    let client = InsightClient::builder()
        .transport(transport)
        .request_timeout(timeout)
        .max_attempts(max_attempts)
        .build()
        .unwrap();
    (client, server)
}

/// Same as [`memory_client`] with a custom reconnection strategy
pub fn memory_client_with_strategy(
    strategy: impl ReconnectionStrategy + 'static,
    auto_connect: bool,
) -> (InsightClient, MemoryServer) {
    let (transport, server) = memory_transport();
    let client = InsightClient::builder()
        .transport(transport)
        .reconnect_strategy(strategy)
        .auto_connect(auto_connect)
        .build()
        .unwrap();
    (client, server)
}

/// Poll until the client reports a live connection
pub async fn wait_until_connected(client: &InsightClient) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !client.is_connected() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("client never connected");
}

/// Poll until `predicate` holds
pub async fn wait_for(mut predicate: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never became true");
}

/// Collects status events for later assertions
pub fn status_recorder() -> (Arc<Mutex<Vec<StatusEvent>>>, impl Fn(&StatusEvent) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event: &StatusEvent| sink.lock().push(event.clone()))
}

/// Id and body of a request frame
pub fn request_parts(frame: &Frame) -> (RequestId, Value) {
    assert_eq!(frame.event, REQUEST_EVENT);
    let id = frame.request_id().expect("request frame without id");
    (id, frame.data.clone())
}
