//! Transport implementations
//!
//! - [`WsTransport`]: JSON frames over WebSocket (tokio-tungstenite)
//! - [`MemoryTransport`]: in-process pair for tests and simulations

pub mod memory;
pub mod websocket;

pub use memory::{memory_transport, MemoryPeer, MemoryServer, MemoryTransport};
pub use websocket::WsTransport;
