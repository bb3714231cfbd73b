//! In-process transport for tests and simulations.
//!
//! `memory_transport()` returns the client half (a [`Transport`]) and a
//! [`MemoryServer`] that plays the backend. Every successful `connect` shows
//! up as a [`MemoryPeer`] on the server side.

use crate::traits::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Create a connected transport/server pair
pub fn memory_transport() -> (MemoryTransport, MemoryServer) {
    let shared = Arc::new(Shared {
        available: AtomicBool::new(true),
        connect_attempts: AtomicUsize::new(0),
    });
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();

    (
        MemoryTransport {
            shared: Arc::clone(&shared),
            accept_tx,
        },
        MemoryServer { shared, accept_rx },
    )
}

struct Shared {
    available: AtomicBool,
    connect_attempts: AtomicUsize,
}

enum ServerSignal {
    Frame(Frame),
    Disconnect,
}

/// Client half of the in-memory transport
pub struct MemoryTransport {
    shared: Arc<Shared>,
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        self.shared.connect_attempts.fetch_add(1, Ordering::AcqRel);

        if !self.shared.available.load(Ordering::Acquire) {
            return Err(SocketError::Transport("connection refused".into()));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            frames: outbound_rx,
            signals: Some(signal_tx),
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| SocketError::Transport("memory server dropped".into()))?;

        Ok(Box::new(MemoryConnection {
            outbound: Some(outbound_tx),
            inbound: signal_rx,
        }))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

struct MemoryConnection {
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    inbound: mpsc::UnboundedReceiver<ServerSignal>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn emit(&mut self, frame: Frame) -> Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| SocketError::ConnectionClosed("closed by client".into()))?;
        outbound
            .send(frame)
            .map_err(|_| SocketError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&mut self) -> TransportEvent {
        match self.inbound.recv().await {
            Some(ServerSignal::Frame(frame)) => TransportEvent::Message(frame),
            Some(ServerSignal::Disconnect) => {
                TransportEvent::Disconnected(DisconnectReason::ServerDisconnect)
            }
            None => TransportEvent::Disconnected(DisconnectReason::TransportClose),
        }
    }

    async fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }
}

/// Backend half: accepts connections and controls availability
pub struct MemoryServer {
    shared: Arc<Shared>,
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Refuse (`false`) or accept (`true`) new connections
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::Release);
    }

    /// Wait for the client's next successful connect
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.try_recv().ok()
    }

    /// Connect calls seen so far, refused ones included
    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::Acquire)
    }
}

/// Server side of one open connection
///
/// Dropping it looks like a transport close to the client;
/// [`server_disconnect`](Self::server_disconnect) looks like a deliberate
/// server-side disconnect.
pub struct MemoryPeer {
    frames: mpsc::UnboundedReceiver<Frame>,
    signals: Option<mpsc::UnboundedSender<ServerSignal>>,
}

impl MemoryPeer {
    /// Next frame emitted by the client; `None` once the client closed
    pub async fn recv(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Frame> {
        self.frames.try_recv().ok()
    }

    /// Push a frame to the client; `false` if the client is gone
    pub fn send(&self, frame: Frame) -> bool {
        match self.signals {
            Some(ref signals) => signals.send(ServerSignal::Frame(frame)).is_ok(),
            None => false,
        }
    }

    /// Answer a request
    pub fn respond(&self, envelope: Envelope) -> bool {
        self.send(Frame::response(&envelope))
    }

    /// End the session the way a server-initiated disconnect does
    pub fn server_disconnect(mut self) {
        if let Some(signals) = self.signals.take() {
            let _ = signals.send(ServerSignal::Disconnect);
        }
    }

    /// Whether the client side has closed or dropped the connection
    pub fn is_closed(&self) -> bool {
        self.signals.as_ref().map_or(true, |signals| signals.is_closed())
    }
}
