//! Transport seam between the event bus and the network
//!
//! A `Transport` opens connections; a `Connection` carries text frames in
//! both directions. The bus never touches sockets directly, so tests can
//! substitute in-memory transports.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("connection closed")]
    Closed,
}

/// Factory for persistent connections to the event stream
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform the handshake. Success means the connection is open.
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String;
}

/// One open connection
///
/// Both methods must be cancel safe: the bus polls them inside `select!`.
#[async_trait]
pub trait Connection: Send {
    /// Next inbound text frame, or `Ok(None)` once the peer has closed
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    async fn send(&mut self, frame: String) -> Result<(), TransportError>;
}
