use crate::builder::{states::NoTransport, ClientBuilder};
use crate::config::ClientConfig;
use crate::connection::{ClientSnapshot, Command, ConnectionManager};
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::correlator::IdGenerator;
use crate::status::{StatusEvent, StatusHub, StatusSubscription};
use crate::traits::*;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Client metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metrics {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub reconnect_count: u64,
    pub connection_state: ConnectionState,
}

/// Resolves to the backend's response envelope for one request
///
/// A backend error arrives as `Ok(envelope)` with `kind == Error`; use
/// [`Envelope::into_result`] to turn it into an `Err`. Dropping this handle
/// does not withdraw the request; use [`InsightClient::cancel`] for that.
#[derive(Debug)]
#[must_use = "the response is only observable through this handle"]
pub struct PendingResponse {
    id: RequestId,
    rx: oneshot::Receiver<Result<Envelope>>,
}

impl PendingResponse {
    /// Correlation id assigned to the request
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Future for PendingResponse {
    type Output = Result<Envelope>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Resolver dropped without an answer: cancelled or reset
            Poll::Ready(Err(_)) => Poll::Ready(Err(SocketError::Cancelled { id })),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Request/response client over a self-healing connection
///
/// Every request is tagged with a unique id, queued while the connection
/// is down, flushed in order on reconnect and resent if no response
/// arrives in time. All of that runs on a single background task; this
/// handle only sends it commands and reads shared atomics, so it is cheap
/// to share behind an `Arc`.
///
/// # Example
/// ```ignore
/// let client = InsightClient::builder()
///     .url("ws://localhost:5002")
///     .build()?;
///
/// let envelope = client.submit(&json!({ "message": "hello" }))?.await?;
/// println!("{}", envelope.into_result()?);
/// ```
pub struct InsightClient {
    /// Command channel to the connection driver
    commands: mpsc::UnboundedSender<Command>,
    ids: IdGenerator,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    status: StatusHub,
    endpoint: String,
    /// Driver task, taken by `shutdown`
    task_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl InsightClient {
    /// Start configuring a client
    pub fn builder() -> ClientBuilder<NoTransport> {
        ClientBuilder::new()
    }

    /// Spawn the connection driver and return its handle
    ///
    /// This is called by the builder's `build()` method.
    pub(crate) fn new(config: ClientConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SocketError::Configuration("InsightClient must be built inside a tokio runtime".into())
        })?;

        let state = Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected));
        let metrics = Arc::new(AtomicMetrics::new());
        let status = StatusHub::new();
        let ids = IdGenerator::new();
        let endpoint = config.endpoint();

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let driver = ConnectionManager::new(
            config,
            Arc::clone(&state),
            Arc::clone(&metrics),
            status.clone(),
            command_rx,
        );
        let task_handle = runtime.spawn(driver.run());

        info!("Insight client started for {}", endpoint);

        Ok(Self {
            commands: command_tx,
            ids,
            state,
            metrics,
            status,
            endpoint,
            task_handle: Mutex::new(Some(task_handle)),
        })
    }

    /// Send a request and get a handle to its eventual response
    ///
    /// The payload must serialize to a JSON object without an `id` field;
    /// the client adds the correlation id itself. When disconnected the
    /// request is queued and a connection attempt is started.
    pub fn submit<P>(&self, payload: &P) -> Result<PendingResponse>
    where
        P: Serialize + ?Sized,
    {
        let payload = match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(SocketError::InvalidPayload(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
            Err(e) => return Err(SocketError::InvalidPayload(e.to_string())),
        };
        if payload.contains_key(ID_FIELD) {
            return Err(SocketError::InvalidPayload(format!(
                "'{}' is reserved for the correlation id",
                ID_FIELD
            )));
        }

        let id = self.ids.next_id();
        let (resolver, rx) = oneshot::channel();

        if let Err(mpsc::error::SendError(cmd)) = self.commands.send(Command::Submit {
            id,
            payload,
            resolver,
        }) {
            debug!("Submit {} after shutdown", id);
            if let Command::Submit { resolver, .. } = cmd {
                let _ = resolver.send(Err(SocketError::Shutdown));
            }
        }

        Ok(PendingResponse { id, rx })
    }

    /// Forget a request; its handle resolves to `Cancelled`
    ///
    /// The backend is not told. A response that still arrives is ignored.
    pub fn cancel(&self, id: RequestId) {
        let _ = self.commands.send(Command::Cancel(id));
    }

    /// Start connecting if the client is idle
    ///
    /// Only needed with `auto_connect(false)` or after a finite reconnection
    /// strategy gave up; `submit` does the same implicitly.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Drop all queued and pending requests
    ///
    /// Their handles resolve to `Cancelled`. The connection is left alone.
    pub fn reset(&self) {
        let _ = self.commands.send(Command::Reset);
    }

    /// Get current connection state
    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Check if connected
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Endpoint description of the underlying transport
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Register a connection status handler
    ///
    /// Handlers run on the driver task and must not block. The handler is
    /// removed when the returned subscription is dropped or unsubscribed.
    pub fn on_status_change<F>(&self, handler: F) -> StatusSubscription
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.status.subscribe(handler)
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        Metrics {
            requests_sent: self.metrics.requests_sent(),
            responses_received: self.metrics.responses_received(),
            retries: self.metrics.retries(),
            timeouts: self.metrics.timeouts(),
            reconnect_count: self.metrics.reconnect_count(),
            connection_state: self.state.get(),
        }
    }

    /// Sizes of the queue, pending table and timer set
    pub async fn snapshot(&self) -> Result<ClientSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .map_err(|_| SocketError::Shutdown)?;
        rx.await.map_err(|_| SocketError::Shutdown)
    }

    /// Close the connection and stop the driver
    ///
    /// Outstanding requests resolve to `Shutdown`, as does every later
    /// `submit`. Calling it twice is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down insight client");

        let _ = self.commands.send(Command::Shutdown);

        let handle = self.task_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Connection driver ended abnormally: {}", e);
            }
        }

        info!("Insight client shut down");
        Ok(())
    }
}

impl std::fmt::Debug for InsightClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightClient")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state.get())
            .finish()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
