//! Integration tests for reconnection strategies and the reconnect loop
//!
//! Strategy arithmetic is checked directly; driver behaviour runs on the
//! paused clock against the in-memory transport.

#[macro_use]
mod common;

use common::{memory_client, memory_client_with_strategy, request_parts, wait_for, wait_until_connected};
use insight_socket::traits::reconnect::{
    ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy,
};
use async_trait::async_trait;
use insight_socket::{
    memory_transport, Connection, ConnectionState, DisconnectReason, Envelope, Frame,
    InsightClient, MemoryTransport, RequestId, Result, SocketError, Transport, TransportEvent,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Memory transport whose first connection fails on its Nth send
///
/// Successful sends are logged as (connection index, request id).
struct BreakingTransport {
    inner: MemoryTransport,
    fail_on_send: usize,
    /// What the broken connection reports afterwards, if anything
    reported: Option<DisconnectReason>,
    connections: AtomicUsize,
    sent: Arc<Mutex<Vec<(usize, RequestId)>>>,
}

impl BreakingTransport {
    fn new(
        inner: MemoryTransport,
        fail_on_send: usize,
        reported: Option<DisconnectReason>,
    ) -> (Self, Arc<Mutex<Vec<(usize, RequestId)>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = Self {
            inner,
            fail_on_send,
            reported,
            connections: AtomicUsize::new(0),
            sent: Arc::clone(&sent),
        };
        (transport, sent)
    }
}

#[async_trait]
impl Transport for BreakingTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let inner = self.inner.connect().await?;
        let index = self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(BreakingConnection {
            inner,
            index,
            fail_on_send: (index == 0).then_some(self.fail_on_send),
            reported: self.reported.clone(),
            broken: None,
            sends: 0,
            sent: Arc::clone(&self.sent),
        }))
    }

    fn describe(&self) -> String {
        "breaking memory://".to_string()
    }
}

struct BreakingConnection {
    inner: Box<dyn Connection>,
    index: usize,
    fail_on_send: Option<usize>,
    reported: Option<DisconnectReason>,
    broken: Option<DisconnectReason>,
    sends: usize,
    sent: Arc<Mutex<Vec<(usize, RequestId)>>>,
}

#[async_trait]
impl Connection for BreakingConnection {
    async fn emit(&mut self, frame: Frame) -> Result<()> {
        self.sends += 1;
        if self.fail_on_send == Some(self.sends) {
            self.broken = self.reported.clone();
            return Err(SocketError::Transport("broken pipe".into()));
        }

        let id = frame.request_id();
        self.inner.emit(frame).await?;
        if let Some(id) = id {
            self.sent.lock().push((self.index, id));
        }
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        match &self.broken {
            Some(reason) => TransportEvent::Disconnected(reason.clone()),
            None => self.inner.recv().await,
        }
    }

    async fn close(&mut self) {
        self.inner.close().await;
    }
}

#[test]
fn test_exponential_backoff_full_sequence() {
    verbose_println!("Testing exponential backoff full sequence...");

    let strategy = ExponentialBackoff::new(
        Duration::from_millis(100),
        Duration::from_secs(10),
        Some(5),
    );

    let expected_delays = [100, 200, 400, 800, 1600];

    for (attempt, &expected_ms) in expected_delays.iter().enumerate() {
        let delay = strategy.next_delay(attempt).unwrap();
        verbose_println!("  Attempt {}: {:?}", attempt, delay);
        assert_eq!(delay.as_millis(), expected_ms, "Unexpected delay at attempt {}", attempt);
    }

    assert!(strategy.next_delay(5).is_none(), "Should return None after max attempts");
}

#[test]
fn test_default_backoff_matches_socket_defaults() {
    let strategy = ExponentialBackoff::default();
    assert_eq!(strategy.next_delay(0), Some(Duration::from_secs(1)));
    assert_eq!(strategy.next_delay(3), Some(Duration::from_secs(5)));
    assert!(strategy.next_delay(1_000_000).is_some());
}

#[test]
fn test_fixed_delay_with_max_attempts() {
    let strategy = FixedDelay::new(Duration::from_millis(500), Some(3));

    assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(500)));
    assert!(strategy.next_delay(2).is_some());
    assert!(strategy.next_delay(3).is_none());
}

#[test]
fn test_never_reconnect_never_offers_a_delay() {
    let strategy = NeverReconnect;
    for attempt in 0..10 {
        assert!(strategy.next_delay(attempt).is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn test_server_disconnect_reconnects_without_backoff() {
    verbose_println!("Testing immediate reconnect after server disconnect...");

    let (client, mut server) = memory_client(Duration::from_secs(60), 3);
    let peer = server.accept().await.unwrap();
    wait_until_connected(&client).await;

    let start = Instant::now();
    peer.server_disconnect();
    let _peer = server.accept().await.unwrap();

    verbose_println!("  Reconnected after {:?}", start.elapsed());
    assert!(start.elapsed() < Duration::from_millis(100));
    wait_until_connected(&client).await;
    assert_eq!(client.metrics().reconnect_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_close_waits_for_backoff() {
    let (client, mut server) = memory_client(Duration::from_secs(60), 3);
    let peer = server.accept().await.unwrap();
    wait_until_connected(&client).await;

    let start = Instant::now();
    drop(peer);
    let _peer = server.accept().await.unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "reconnected too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "reconnected too late: {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_while_server_is_down() {
    let (client, mut server) = memory_client(Duration::from_secs(60), 3);
    server.set_available(false);

    // 1 + 2 + 4 + 5 seconds of backoff between five attempts
    let start = Instant::now();
    wait_for(|| server.connect_attempts() >= 5).await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(12), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(13), "{:?}", elapsed);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    server.set_available(true);
    let _peer = server.accept().await.unwrap();
    wait_until_connected(&client).await;
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_strategy_goes_idle_until_connect() {
    verbose_println!("Testing idle after strategy exhaustion...");

    let (client, mut server) =
        memory_client_with_strategy(FixedDelay::new(Duration::from_secs(1), Some(2)), true);
    server.set_available(false);

    wait_for(|| server.connect_attempts() >= 3).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.connect_attempts(), 3, "no attempts after exhaustion");
    assert!(!client.is_connected());

    server.set_available(true);
    client.connect();
    let _peer = server.accept().await.unwrap();
    wait_until_connected(&client).await;
    verbose_println!("  Reconnected after explicit connect()");
}

#[tokio::test(start_paused = true)]
async fn test_submit_wakes_idle_client() {
    let (client, mut server) = memory_client_with_strategy(NeverReconnect, true);
    let peer = server.accept().await.unwrap();
    wait_until_connected(&client).await;

    drop(peer);
    wait_for(|| !client.is_connected()).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(server.connect_attempts(), 1);

    let pending = client.submit(&json!({ "message": "wake up" })).unwrap();
    let mut peer = server.accept().await.unwrap();
    let (id, _) = request_parts(&peer.recv().await.unwrap());
    assert_eq!(id, pending.id());

    peer.respond(Envelope::success(id, json!("awake")));
    assert_eq!(pending.await.unwrap().content, json!("awake"));
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_mode() {
    let (client, mut server) = memory_client_with_strategy(ExponentialBackoff::default(), false);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(server.connect_attempts(), 0);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    client.connect();
    let _peer = server.accept().await.unwrap();
    wait_until_connected(&client).await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_while_disconnected_is_sent_after_reconnect() {
    verbose_println!("Testing retry that fires during an outage...");

    let (client, mut server) = memory_client(Duration::from_secs(60), 3);
    let mut peer = server.accept().await.unwrap();
    wait_until_connected(&client).await;

    let pending = client.submit(&json!({ "message": "survive" })).unwrap();
    let (id, _) = request_parts(&peer.recv().await.unwrap());

    server.set_available(false);
    drop(peer);
    tokio::time::sleep(Duration::from_secs(61)).await;

    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.queued, 1, "expired request waits for the connection");
    assert_eq!(snapshot.armed_timers, 0);

    server.set_available(true);
    let mut peer = server.accept().await.unwrap();
    let (resent, _) = request_parts(&peer.recv().await.unwrap());
    assert_eq!(resent, id);

    peer.respond(Envelope::success(id, json!("made it")));
    assert_eq!(pending.await.unwrap().content, json!("made it"));
    assert_eq!(client.metrics().retries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_mid_flush_keeps_the_rest_queued() {
    verbose_println!("Testing a connection that drops during the flush...");

    let (inner, _server) = memory_transport();
    let (transport, sent) = BreakingTransport::new(inner, 2, None);
    let client = InsightClient::builder()
        .transport(transport)
        .auto_connect(false)
        .build()
        .unwrap();

    let start = Instant::now();
    let a = client.submit(&json!({ "message": "a" })).unwrap();
    let b = client.submit(&json!({ "message": "b" })).unwrap();
    let c = client.submit(&json!({ "message": "c" })).unwrap();

    wait_for(|| sent.lock().len() >= 3).await;
    verbose_println!("  Sends: {:?}", *sent.lock());
    assert_eq!(
        *sent.lock(),
        vec![(0, a.id()), (1, b.id()), (1, c.id())],
        "B and C go out on the next connection in order"
    );
    assert!(start.elapsed() >= Duration::from_secs(1), "plain send failure waits for backoff");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sent.lock().len(), 3, "nothing sent twice");

    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.queued, 0);
    assert_eq!(snapshot.pending, 3);
    assert_eq!(snapshot.armed_timers, 3);
    assert_eq!(client.metrics().requests_sent, 3);
}

#[tokio::test(start_paused = true)]
async fn test_server_disconnect_during_send_skips_backoff() {
    let (inner, _server) = memory_transport();
    let (transport, sent) =
        BreakingTransport::new(inner, 1, Some(DisconnectReason::ServerDisconnect));
    let client = InsightClient::builder().transport(transport).build().unwrap();

    let start = Instant::now();
    let pending = client.submit(&json!({ "message": "mid-close" })).unwrap();

    wait_for(|| !sent.lock().is_empty()).await;
    assert!(
        start.elapsed() < Duration::from_millis(100),
        "reconnected after {:?}",
        start.elapsed()
    );
    assert_eq!(*sent.lock(), vec![(1, pending.id())]);
    assert_eq!(client.metrics().reconnect_count, 1);
}
