//! Wire types exchanged with the analysis backend.
//!
//! Every outbound request is a `request` frame whose data is the caller's
//! JSON object plus an `id` field. The backend answers with a `response`
//! frame carrying an [`Envelope`] with the same id.

use crate::traits::error::{Result, SocketError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Event name for outbound requests
pub const REQUEST_EVENT: &str = "request";

/// Event name for inbound responses
pub const RESPONSE_EVENT: &str = "response";

/// Field injected into every outbound payload
pub const ID_FIELD: &str = "id";

/// Correlation id echoed back by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named event with a JSON body, the unit the transport moves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Build the outbound `request` frame: `{...payload, id}`
    pub fn request(id: RequestId, payload: &Map<String, Value>) -> Self {
        let mut data = payload.clone();
        data.insert(ID_FIELD.to_string(), Value::from(id.get()));
        Self::new(REQUEST_EVENT, Value::Object(data))
    }

    /// Build an inbound `response` frame (used by backends and test peers)
    pub fn response(envelope: &Envelope) -> Self {
        let data = serde_json::to_value(envelope).unwrap_or(Value::Null);
        Self::new(RESPONSE_EVENT, data)
    }

    pub fn is_response(&self) -> bool {
        self.event == RESPONSE_EVENT
    }

    /// Request id carried in the frame body, if any
    pub fn request_id(&self) -> Option<RequestId> {
        self.data.get(ID_FIELD)?.as_u64().map(RequestId::new)
    }

    /// Decode the body as a response envelope
    pub fn envelope(&self) -> Result<Envelope> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| SocketError::Protocol(format!("malformed envelope: {}", e)))
    }
}

/// Distinguishes normal results from backend-reported errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Success,
    Error,
}

/// Structured inbound message correlating a response to its request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: RequestId,
    pub kind: ResponseKind,
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    pub fn success(id: RequestId, content: Value) -> Self {
        Self {
            id,
            kind: ResponseKind::Success,
            content,
        }
    }

    pub fn error(id: RequestId, content: Value) -> Self {
        Self {
            id,
            kind: ResponseKind::Error,
            content,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResponseKind::Error
    }

    /// Unwrap the content, turning a backend error into [`SocketError::Backend`]
    pub fn into_result(self) -> Result<Value> {
        match self.kind {
            ResponseKind::Success => Ok(self.content),
            ResponseKind::Error => Err(SocketError::Backend {
                id: self.id,
                content: self.content,
            }),
        }
    }
}
