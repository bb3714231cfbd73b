//! Connection driver
//!
//! A single tokio task owns the transport, the outbound queue, the
//! pending-request table and the retry timers. Facade calls arrive as
//! [`Command`]s on an unbounded channel and are handled one at a time, so
//! no state here needs a lock.
//!
//! ```text
//!   InsightClient ──Command──┐
//!                            ▼
//!        ┌──────────── driver loop ─────────────┐
//!        │ idle → connecting → connected ──┐    │
//!        │   ▲          │ error            │drop│
//!        │   └─ backoff ◄──────────────────┘    │
//!        └──────────────────────────────────────┘
//!   every phase also serves commands and retry timers
//! ```

use crate::config::ClientConfig;
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::correlator::{Correlator, PendingRequest, Resolver};
use crate::queue::OutboundQueue;
use crate::scheduler::{RetryDecision, RetryScheduler};
use crate::status::{StatusEvent, StatusHub};
use crate::traits::*;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info, warn};

/// Requests from the facade to the driver
#[derive(Debug)]
pub(crate) enum Command {
    /// New request with an id already allocated by the facade
    Submit {
        id: RequestId,
        payload: Map<String, Value>,
        resolver: Resolver,
    },
    /// Forget a request without telling the backend
    Cancel(RequestId),
    /// Leave the idle state and start connecting
    Connect,
    /// Drop the queue and every pending request
    Reset,
    /// Report table sizes
    Snapshot(oneshot::Sender<ClientSnapshot>),
    /// Close the connection and stop
    Shutdown,
}

/// Point-in-time view of the driver's tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub connection_state: ConnectionState,
    /// Requests waiting for a response or for a connection
    pub pending: usize,
    /// Requests waiting for a connection
    pub queued: usize,
    /// Requests with a running response timer
    pub armed_timers: usize,
}

/// Outcome of handling one event while a connection may be open
enum Flow {
    Continue,
    Lost(DisconnectReason),
}

pub(crate) struct ConnectionManager {
    transport: Arc<dyn Transport>,
    endpoint: String,
    reconnect_strategy: Box<dyn ReconnectionStrategy>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    status: StatusHub,
    commands: mpsc::UnboundedReceiver<Command>,
    queue: OutboundQueue,
    correlator: Correlator,
    scheduler: RetryScheduler,
    /// False only while idle (auto-connect off, or strategy exhausted)
    wants_connection: bool,
    wake: Arc<Notify>,
    shutting_down: bool,
}

impl ConnectionManager {
    pub(crate) fn new(
        config: ClientConfig,
        state: Arc<AtomicConnectionState>,
        metrics: Arc<AtomicMetrics>,
        status: StatusHub,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let endpoint = config.endpoint();
        Self {
            transport: config.transport,
            endpoint,
            reconnect_strategy: config.reconnect_strategy,
            state,
            metrics,
            status,
            commands,
            queue: OutboundQueue::new(),
            correlator: Correlator::new(),
            scheduler: RetryScheduler::new(config.request_timeout, config.max_attempts),
            wants_connection: config.auto_connect,
            wake: Arc::new(Notify::new()),
            shutting_down: false,
        }
    }

    /// Main driver loop
    pub(crate) async fn run(mut self) {
        let mut reconnect_attempt = 0;

        loop {
            if self.shutting_down {
                break;
            }

            if !self.wants_connection {
                debug!("Connection idle until requested");
                let wake = Arc::clone(&self.wake);
                if self.while_disconnected(wake.notified()).await.is_none() {
                    break;
                }
                reconnect_attempt = 0;
                continue;
            }

            self.state.set(ConnectionState::Connecting);
            let transport = Arc::clone(&self.transport);
            let outcome = match self.while_disconnected(transport.connect()).await {
                Some(outcome) => outcome,
                None => break,
            };

            let server_initiated = match outcome {
                Ok(connection) => {
                    reconnect_attempt = 0;
                    self.reconnect_strategy.reset();
                    self.state.set(ConnectionState::Connected);
                    info!("Connected to {}", self.endpoint);
                    self.status.notify(&StatusEvent::Connected);

                    let reason = match self.drive_connection(connection).await {
                        Some(reason) => reason,
                        None => break,
                    };

                    self.state.set(ConnectionState::Disconnected);
                    warn!("Disconnected from {}: {}", self.endpoint, reason);
                    self.status.notify(&StatusEvent::Disconnected(reason.clone()));
                    reason.is_server_initiated()
                }
                Err(e) => {
                    self.state.set(ConnectionState::Disconnected);
                    error!("Failed to connect to {}: {}", self.endpoint, e);
                    self.status.notify(&StatusEvent::ConnectError(e.to_string()));
                    false
                }
            };

            if server_initiated {
                info!("Server closed the session, reconnecting immediately");
                self.metrics.increment_reconnects();
                continue;
            }

            match self.reconnect_strategy.next_delay(reconnect_attempt) {
                Some(delay) => {
                    info!(
                        "Reconnecting in {:?} (attempt {})",
                        delay,
                        reconnect_attempt + 1
                    );
                    if self
                        .while_disconnected(tokio::time::sleep(delay))
                        .await
                        .is_none()
                    {
                        break;
                    }
                    reconnect_attempt += 1;
                    self.metrics.increment_reconnects();
                }
                None => {
                    warn!("Reconnection strategy exhausted, waiting for connect()");
                    self.wants_connection = false;
                }
            }
        }

        self.finish();
    }

    /// Serve commands and timers until `fut` completes
    ///
    /// Returns `None` if the client started shutting down first.
    async fn while_disconnected<F>(&mut self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::pin!(fut);

        loop {
            if self.shutting_down {
                return None;
            }

            tokio::select! {
                output = &mut fut => return Some(output),
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        self.handle_command(cmd, None).await;
                    }
                    None => self.shutting_down = true,
                },
                Some(id) = self.scheduler.expired(), if !self.scheduler.is_empty() => {
                    self.on_timeout(id, None).await;
                }
            }
        }
    }

    /// Run an open connection until it drops
    ///
    /// Flushes the queue once on entry. Returns `None` on shutdown.
    async fn drive_connection(
        &mut self,
        mut connection: Box<dyn Connection>,
    ) -> Option<DisconnectReason> {
        if let Flow::Lost(reason) = self.flush(connection.as_mut()).await {
            connection.close().await;
            return Some(reason);
        }

        loop {
            if self.shutting_down {
                connection.close().await;
                return None;
            }

            let flow = tokio::select! {
                event = connection.recv() => match event {
                    TransportEvent::Message(frame) => {
                        self.on_frame(frame);
                        Flow::Continue
                    }
                    TransportEvent::Disconnected(reason) => Flow::Lost(reason),
                },
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd, Some(connection.as_mut())).await,
                    None => {
                        self.shutting_down = true;
                        Flow::Continue
                    }
                },
                Some(id) = self.scheduler.expired(), if !self.scheduler.is_empty() => {
                    self.on_timeout(id, Some(connection.as_mut())).await
                }
            };

            if let Flow::Lost(reason) = flow {
                connection.close().await;
                return Some(reason);
            }
        }
    }

    async fn handle_command(
        &mut self,
        cmd: Command,
        connection: Option<&mut dyn Connection>,
    ) -> Flow {
        match cmd {
            Command::Submit {
                id,
                payload,
                resolver,
            } => {
                self.correlator
                    .insert(PendingRequest::new(id, payload, resolver));
                if !self.correlator.contains(id) {
                    return Flow::Continue;
                }
                self.send_or_enqueue(id, connection).await
            }
            Command::Cancel(id) => {
                let removed = self.correlator.remove(id).is_some();
                self.scheduler.disarm(id);
                self.queue.remove(id);
                if removed {
                    debug!("Cancelled request {}", id);
                }
                Flow::Continue
            }
            Command::Connect => {
                self.request_connection();
                Flow::Continue
            }
            Command::Reset => {
                self.queue.clear();
                self.scheduler.clear();
                let dropped = self.correlator.drain().len();
                info!("Client reset, dropped {} pending request(s)", dropped);
                Flow::Continue
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(ClientSnapshot {
                    connection_state: self.state.get(),
                    pending: self.correlator.len(),
                    queued: self.queue.len(),
                    armed_timers: self.scheduler.len(),
                });
                Flow::Continue
            }
            Command::Shutdown => {
                info!("Received shutdown command");
                self.shutting_down = true;
                Flow::Continue
            }
        }
    }

    /// Send right away when connected, otherwise park in the queue
    async fn send_or_enqueue(
        &mut self,
        id: RequestId,
        connection: Option<&mut dyn Connection>,
    ) -> Flow {
        match connection {
            Some(connection) if self.state.is_connected() => self.dispatch(id, connection).await,
            _ => {
                self.queue.enqueue(id);
                debug!("Not connected, queued request {} ({} queued)", id, self.queue.len());
                self.request_connection();
                Flow::Continue
            }
        }
    }

    /// Emit one request and start its response timer
    async fn dispatch(&mut self, id: RequestId, connection: &mut dyn Connection) -> Flow {
        let frame = match self.correlator.get(id) {
            Some(request) => Frame::request(id, &request.payload),
            None => return Flow::Continue,
        };

        match connection.emit(frame).await {
            Ok(()) => {
                let attempts = match self.correlator.get_mut(id) {
                    Some(request) => {
                        request.attempts += 1;
                        request.attempts
                    }
                    None => return Flow::Continue,
                };
                self.scheduler.arm(id);
                self.metrics.increment_sent();
                debug!(
                    "Sent request {} (attempt {}/{})",
                    id,
                    attempts,
                    self.scheduler.max_attempts()
                );
                Flow::Continue
            }
            Err(e) => {
                warn!("Failed to send request {}, keeping it queued: {}", id, e);
                self.queue.requeue_front(id);
                Flow::Lost(self.reason_after_send_failure(connection, e))
            }
        }
    }

    /// Why the connection died under a send
    ///
    /// Drains whatever the connection already has ready, so a close the
    /// server sent just before the failed write still counts as a server
    /// disconnect.
    fn reason_after_send_failure(
        &mut self,
        connection: &mut dyn Connection,
        error: SocketError,
    ) -> DisconnectReason {
        while let Some(event) = connection.recv().now_or_never() {
            match event {
                TransportEvent::Message(frame) => self.on_frame(frame),
                TransportEvent::Disconnected(reason) => return reason,
            }
        }
        DisconnectReason::TransportError(error.to_string())
    }

    /// Drain the queue in arrival order
    async fn flush(&mut self, connection: &mut dyn Connection) -> Flow {
        if !self.queue.is_empty() {
            info!("Flushing {} queued request(s)", self.queue.len());
        }

        while let Some(id) = self.queue.pop_front() {
            if !self.correlator.contains(id) {
                continue;
            }
            if let Flow::Lost(reason) = self.dispatch(id, connection).await {
                return Flow::Lost(reason);
            }
        }

        Flow::Continue
    }

    async fn on_timeout(&mut self, id: RequestId, connection: Option<&mut dyn Connection>) -> Flow {
        let attempts = match self.correlator.get(id) {
            Some(request) => request.attempts,
            None => return Flow::Continue,
        };

        match self.scheduler.decide(attempts) {
            RetryDecision::Exhausted => {
                if let Some(request) = self.correlator.remove(id) {
                    warn!(
                        "Request {} got no response after {} attempts, giving up",
                        id, attempts
                    );
                    self.metrics.increment_timeouts();
                    request.settle(Err(SocketError::Timeout { id, attempts }));
                }
                Flow::Continue
            }
            RetryDecision::Retry => {
                warn!(
                    "No response to request {} within {:?}, resending (attempt {}/{})",
                    id,
                    self.scheduler.timeout(),
                    attempts + 1,
                    self.scheduler.max_attempts()
                );
                self.metrics.increment_retries();
                self.send_or_enqueue(id, connection).await
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        if !frame.is_response() {
            debug!("Ignoring '{}' event", frame.event);
            return;
        }

        match frame.envelope() {
            Ok(envelope) => {
                self.metrics.increment_received();
                let id = envelope.id;
                if self.correlator.resolve(envelope) {
                    self.scheduler.disarm(id);
                    self.queue.remove(id);
                }
            }
            Err(e) => warn!("Dropping inbound frame: {}", e),
        }
    }

    fn request_connection(&mut self) {
        if !self.wants_connection {
            self.wants_connection = true;
            self.wake.notify_one();
        }
    }

    /// Settle everything still outstanding and mark the client closed
    fn finish(&mut self) {
        self.state.set(ConnectionState::Disconnected);
        self.commands.close();

        while let Ok(cmd) = self.commands.try_recv() {
            if let Command::Submit { resolver, .. } = cmd {
                let _ = resolver.send(Err(SocketError::Shutdown));
            }
        }

        self.queue.clear();
        self.scheduler.clear();

        let outstanding = self.correlator.drain();
        if !outstanding.is_empty() {
            info!("Failing {} outstanding request(s) on shutdown", outstanding.len());
        }
        for request in outstanding {
            request.settle(Err(SocketError::Shutdown));
        }

        info!("Connection driver for {} exiting", self.endpoint);
    }
}
