//! Reconnecting publish/subscribe bus over the server event stream
//!
//! A single supervisor task owns the live connection and runs the
//! connection state machine:
//!
//! ```text
//! Closed --connect()--> Connecting --handshake ok--> Open
//!                           |                          |
//!                     handshake failed          recv ended / error
//!                           v                          v
//!                         Closed --reconnect_delay--> Connecting ...
//! ```
//!
//! Retries are unbounded with a fixed delay. Inbound frames are delivered
//! on the supervisor task, in arrival order, before the next frame is read.

use crate::domain::envelope::{EnvelopeError, EventEnvelope, EventType, EventTypeRegistry, TypedPayload};
use crate::infra::config::Config;
use crate::infra::metrics::BusMetrics;
use crate::io::transport::{Connection, Transport, TransportError};
use crate::services::subscribers::{Handler, SubscriberRegistry, Subscription};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Log connection failure (cold path)
#[cold]
fn log_connect_failed(endpoint: &str, e: &TransportError) {
    error!(endpoint = %endpoint, error = %e, "event_bus_connect_failed");
}

/// Log subscriber failure (cold path)
#[cold]
fn log_subscriber_failed(event_type: &EventType, subscription_id: u64, error: &str) {
    warn!(
        event_type = %event_type,
        subscription_id = %subscription_id,
        error = %error,
        "event_bus_subscriber_failed"
    );
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "subscriber panicked".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct BusOptions {
    pub reconnect_delay: Duration,
    pub outbound_buffer: usize,
    pub registry: EventTypeRegistry,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            registry: EventTypeRegistry::new(),
        }
    }
}

impl BusOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms()),
            outbound_buffer: config.outbound_buffer(),
            registry: EventTypeRegistry::with_extensions(config.extension_types().iter().cloned()),
        }
    }
}

/// Why an inbound frame never reached subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    UnknownType,
}

/// Outcome of handling one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    /// Subscribers that returned Ok
    pub delivered: usize,
    /// Subscribers that returned Err or panicked
    pub failed: usize,
    pub dropped: Option<DropReason>,
}

impl Delivery {
    fn dropped(reason: DropReason) -> Self {
        Self { delivered: 0, failed: 0, dropped: Some(reason) }
    }
}

pub struct EventBus {
    transport: Arc<dyn Transport>,
    options: BusOptions,
    metrics: Arc<BusMetrics>,
    subscribers: Arc<SubscriberRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    /// Sender into the live connection; `Some` only while Open
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new(transport: Arc<dyn Transport>, options: BusOptions, metrics: Arc<BusMetrics>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Closed);
        Self {
            transport,
            options: BusOptions { outbound_buffer: options.outbound_buffer.max(1), ..options },
            metrics,
            subscribers: Arc::new(SubscriberRegistry::new()),
            state_tx,
            outbound: Mutex::new(None),
            supervisor: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn Transport>, metrics: Arc<BusMetrics>) -> Self {
        Self::new(transport, BusOptions::from_config(config), metrics)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe connection state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn metrics(&self) -> &Arc<BusMetrics> {
        &self.metrics
    }

    pub fn registry(&self) -> &EventTypeRegistry {
        &self.options.registry
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "event_bus_state_changed");
        }
    }

    /// Start the connection supervisor if it is not already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(self: &Arc<Self>) {
        let mut supervisor = self.supervisor.lock();
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!(state = %self.state(), "event_bus_connect_noop");
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "event_bus_connect_without_runtime");
                return;
            }
        };

        let bus = Arc::clone(self);
        *supervisor = Some(runtime.spawn(async move { bus.supervise().await }));
    }

    /// Explicit close: stop reconnecting and drop the live connection
    pub async fn disconnect(&self) {
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            // Wait until the task (and the connection it owns) is gone
            let _ = handle.await;
        }
        if self.outbound.lock().take().is_some() {
            self.metrics.record_disconnect();
        }
        self.set_state(ConnectionState::Closed);
        info!("event_bus_disconnected");
    }

    async fn supervise(self: Arc<Self>) {
        let endpoint = self.transport.endpoint();
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                self.metrics.record_reconnect_attempt();
            }

            self.set_state(ConnectionState::Connecting);
            info!(endpoint = %endpoint, attempt = %attempt, "event_bus_connecting");

            match self.transport.connect().await {
                Ok(connection) => {
                    self.metrics.record_connect();
                    self.run_connection(connection).await;
                    self.metrics.record_disconnect();
                }
                Err(e) => log_connect_failed(&endpoint, &e),
            }

            self.set_state(ConnectionState::Closed);
            info!(
                endpoint = %endpoint,
                delay_ms = %self.options.reconnect_delay.as_millis(),
                "event_bus_reconnect_scheduled"
            );
            tokio::time::sleep(self.options.reconnect_delay).await;
        }
    }

    /// Pump one open connection until it closes. The connection is dropped on return.
    async fn run_connection(&self, mut connection: Box<dyn Connection>) {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(self.options.outbound_buffer);
        *self.outbound.lock() = Some(outbound_tx);
        self.set_state(ConnectionState::Open);
        info!("event_bus_open");

        loop {
            tokio::select! {
                inbound = connection.recv() => {
                    match inbound {
                        Ok(Some(frame)) => {
                            self.handle_message(&frame);
                        }
                        Ok(None) => {
                            info!("event_bus_closed_by_peer");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "event_bus_transport_error");
                            break;
                        }
                    }
                }
                Some(frame) = outbound_rx.recv() => {
                    if let Err(e) = connection.send(frame).await {
                        warn!(error = %e, "event_bus_send_failed");
                        break;
                    }
                }
            }
        }

        self.outbound.lock().take();
    }

    /// Register `callback` for `event_type`
    pub fn subscribe<F>(&self, event_type: EventType, callback: F) -> Subscription
    where
        F: Fn(&EventEnvelope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(callback);
        let id = self.subscribers.insert(event_type.clone(), handler);
        debug!(event_type = %event_type, subscription_id = %id, "event_bus_subscribed");
        Subscription::new(&self.subscribers, event_type, id)
    }

    /// Register a callback that receives the payload decoded into `P`
    ///
    /// A payload that does not decode counts as a failure of this subscriber only.
    pub fn subscribe_typed<P, F>(&self, callback: F) -> Subscription
    where
        P: TypedPayload,
        F: Fn(&EventEnvelope, P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(P::EVENT_TYPE, move |envelope| {
            let payload = envelope.decode::<P>()?;
            callback(envelope, payload)
        })
    }

    pub fn subscriber_count(&self, event_type: &EventType) -> usize {
        self.subscribers.count(event_type)
    }

    /// Send an envelope to the server if the connection is open
    ///
    /// At-most-once: returns false and drops the envelope when not open
    /// or when the outbound queue is full.
    pub fn emit(&self, envelope: &EventEnvelope) -> bool {
        let state = self.state();
        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref().filter(|_| state == ConnectionState::Open) else {
            self.metrics.record_emit_dropped();
            debug!(event_type = %envelope.event_type, state = %state, "event_bus_emit_dropped");
            return false;
        };

        match tx.try_send(envelope.to_json()) {
            Ok(()) => {
                self.metrics.record_emit_sent();
                true
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.record_emit_dropped();
                warn!(event_type = %envelope.event_type, "event_bus_emit_dropped: outbound queue full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.record_emit_dropped();
                debug!(event_type = %envelope.event_type, "event_bus_emit_dropped: connection closing");
                false
            }
        }
    }

    /// Parse one inbound frame and deliver it to the subscribers of its type
    ///
    /// Malformed frames and unknown types are logged and dropped; subscriber
    /// errors and panics are isolated per callback.
    pub fn handle_message(&self, raw: &str) -> Delivery {
        self.metrics.record_message_received();

        let envelope = match EventEnvelope::parse(raw, &self.options.registry) {
            Ok(envelope) => envelope,
            Err(EnvelopeError::UnknownType(name)) => {
                self.metrics.record_message_unknown_type();
                debug!(event_type = %name, "event_bus_unknown_type_dropped");
                return Delivery::dropped(DropReason::UnknownType);
            }
            Err(EnvelopeError::Malformed(e)) => {
                self.metrics.record_message_malformed();
                warn!(error = %e, bytes = %raw.len(), "event_bus_malformed_message");
                return Delivery::dropped(DropReason::Malformed);
            }
        };

        self.dispatch(&envelope)
    }

    fn dispatch(&self, envelope: &EventEnvelope) -> Delivery {
        let handlers = self.subscribers.snapshot(&envelope.event_type);
        let mut delivery = Delivery::default();

        for (id, handler) in handlers.iter() {
            match catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
                Ok(Ok(())) => {
                    delivery.delivered += 1;
                    self.metrics.record_delivery();
                }
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    self.metrics.record_subscriber_failure();
                    log_subscriber_failed(&envelope.event_type, id.0, &format!("{:#}", e));
                }
                Err(panic) => {
                    delivery.failed += 1;
                    self.metrics.record_subscriber_failure();
                    log_subscriber_failed(&envelope.event_type, id.0, &panic_message(panic.as_ref()));
                }
            }
        }

        debug!(
            event_type = %envelope.event_type,
            delivered = %delivery.delivered,
            failed = %delivery.failed,
            "event_bus_dispatched"
        );
        delivery
    }
}
