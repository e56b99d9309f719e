//! WebSocket transport for the server event stream

use crate::io::transport::{Connection, Transport, TransportError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Once;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// Log receive error (cold path)
#[cold]
fn log_receive_error(e: &tokio_tungstenite::tungstenite::Error) {
    debug!(error = %e, "websocket_receive_error");
}

/// `wss://` handshakes need a process-wide rustls crypto provider
fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Err means the host already installed one
        if rustls::crypto::ring::default_provider().install_default().is_err() {
            debug!("rustls_crypto_provider_already_installed");
        }
    });
}

#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self { url: url.into(), connect_timeout }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        if self.url.starts_with("wss://") {
            ensure_crypto_provider();
        }
        let handshake = connect_async(self.url.as_str());
        let (stream, response) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!(url = %self.url, status = ?response.status(), "websocket_connected");
        Ok(Box::new(WebSocketConnection { stream }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        // Pings are answered by tungstenite on the next read/flush
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    debug!(bytes = %data.len(), "websocket_binary_frame_ignored");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(frame = ?frame, "websocket_close_frame");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    log_receive_error(&e);
                    return Err(TransportError::Receive(e.to_string()));
                }
                None => return Ok(None),
            }
        }
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport =
            WebSocketTransport::new(format!("ws://127.0.0.1:{}/ws", port), Duration::from_secs(2));
        let result = transport.connect().await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn test_wss_fails_in_tls_handshake() {
        // Plain TCP peer that hangs up, so the TLS handshake itself fails
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let transport = WebSocketTransport::new(format!("wss://{}/ws", addr), Duration::from_secs(2));
        let result = transport.connect().await;
        server.await.unwrap();

        let Err(TransportError::Connect(message)) = result else {
            panic!("expected a handshake error");
        };
        assert!(!message.contains("URL error"), "{message}");
        assert!(!message.contains("TLS support not compiled in"), "{message}");
    }

    #[tokio::test]
    async fn test_text_frames_round_trip_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
            ws.send(Message::Text("hello".to_string())).await.unwrap();
            let reply = ws.next().await.unwrap().unwrap();
            ws.close(None).await.ok();
            reply
        });

        let transport = WebSocketTransport::new(format!("ws://{}/ws", addr), Duration::from_secs(2));
        let mut conn = transport.connect().await.unwrap();
        assert_eq!(conn.recv().await.unwrap().as_deref(), Some("hello"));
        conn.send("world".to_string()).await.unwrap();
        assert_eq!(conn.recv().await.unwrap(), None);

        let reply = server.await.unwrap();
        assert_eq!(reply, Message::Text("world".to_string()));
    }
}
