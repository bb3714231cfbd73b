use async_trait::async_trait;
use std::collections::HashMap;

/// Extra HTTP headers for the WebSocket upgrade request
pub type Headers = HashMap<String, String>;

/// Supplies handshake headers, asked again before every connect
///
/// Lets a session token rotate between reconnects without rebuilding the
/// client.
///
/// # Example
/// ```ignore
/// struct SessionHeaders(Arc<RwLock<String>>);
///
/// #[async_trait::async_trait]
/// impl HeaderProvider for SessionHeaders {
///     async fn get_headers(&self) -> Headers {
///         Headers::from([("Authorization".into(), self.0.read().clone())])
///     }
/// }
/// ```
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    async fn get_headers(&self) -> Headers;
}

/// The same headers on every handshake
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    headers: Headers,
}

impl StaticHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl HeaderProvider for StaticHeaders {
    async fn get_headers(&self) -> Headers {
        self.headers.clone()
    }
}
