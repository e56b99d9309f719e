//! IO modules - external system interfaces
//!
//! - `transport` - Transport/Connection traits the event bus runs on
//! - `websocket` - WebSocket transport for the server event stream

pub mod transport;
pub mod websocket;

pub use transport::{Connection, Transport, TransportError};
pub use websocket::WebSocketTransport;
