//! Transport abstraction
//!
//! A [`Connector`] opens [`Link`]s to the gateway endpoint. Exchanges only ever talk
//! to these traits, which keeps the reconnect and queueing logic independent of the
//! socket implementation. Production code uses [`WebSocketConnector`]; tests use the
//! in-memory connector from `test_utils`.

use bytes::Bytes;

use crate::Result;

mod websocket;

pub use websocket::WebSocketConnector;

/// A data message on a link (control frames never surface here)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Bytes),
}

/// One open duplex connection
#[async_trait::async_trait]
pub trait Link: Send + 'static {
    /// Send one message
    async fn send(&mut self, message: WireMessage) -> Result<()>;

    /// Receive the next message
    ///
    /// Returns:
    /// - `Some(Ok(message))` - Data message received
    /// - `Some(Err(e))` - Transport error; the link should be considered dead
    /// - `None` - Peer closed the link
    ///
    /// Must be cancel-safe: the exchange task polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<WireMessage>>;

    /// Close the link, best effort
    async fn close(&mut self) -> Result<()>;
}

/// Factory for links to a single endpoint URL
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Link>>;
}
