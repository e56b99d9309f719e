//! In-memory transport that hands the server side of each connection to the test.

use async_trait::async_trait;
use famfin_core::io::transport::{Connection, Transport, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

#[derive(Default)]
struct Counters {
    attempts: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    fail_remaining: AtomicUsize,
}

/// Server end of one fake connection. Dropping it closes the connection.
pub struct FakePeer {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl FakePeer {
    pub fn push(&self, frame: &str) {
        let _ = self.to_client.send(frame.to_string());
    }

    pub async fn next_sent(&mut self) -> Option<String> {
        self.from_client.recv().await
    }
}

pub struct FakeTransport {
    counters: Arc<Counters>,
    handshake_delay: Duration,
    peers_tx: mpsc::UnboundedSender<FakePeer>,
    peers_rx: Mutex<mpsc::UnboundedReceiver<FakePeer>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_handshake_delay(Duration::ZERO)
    }

    /// Handshakes sleep for `delay` before succeeding, so `Connecting` is observable
    pub fn with_handshake_delay(delay: Duration) -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            counters: Arc::new(Counters::default()),
            handshake_delay: delay,
            peers_tx,
            peers_rx: Mutex::new(peers_rx),
        }
    }

    /// Fail the next `n` handshakes
    pub fn fail_next(&self, n: usize) {
        self.counters.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.counters.attempts.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    /// Wait for the bus to complete its next handshake
    pub async fn accept(&self) -> FakePeer {
        self.peers_rx.lock().await.recv().await.expect("transport dropped")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        self.counters.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.handshake_delay.is_zero() {
            tokio::time::sleep(self.handshake_delay).await;
        }

        let failing = self
            .counters
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Connect("handshake refused".to_string()));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();

        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);

        let _ = self.peers_tx.send(FakePeer { to_client, from_client });
        Ok(Box::new(FakeConnection { inbound, outbound, counters: self.counters.clone() }))
    }

    fn endpoint(&self) -> String {
        "fake://events".to_string()
    }
}

struct FakeConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.recv().await)
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}
