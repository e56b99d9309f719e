//! Lock-free event bus counters and periodic reporting
//!
//! Counters use Relaxed ordering and are for reporting only; nothing in the
//! bus reads them to make decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector for the event bus
///
/// Counters are monotonic; `report()` derives per-interval rates by
/// remembering the previous snapshot.
pub struct BusMetrics {
    /// Text frames handed to the bus
    messages_received: AtomicU64,
    /// Frames that failed JSON or structural validation
    messages_malformed: AtomicU64,
    /// Frames whose type is not registered
    messages_unknown_type: AtomicU64,
    /// Successful subscriber invocations
    deliveries: AtomicU64,
    /// Subscriber invocations that returned an error or panicked
    subscriber_failures: AtomicU64,
    /// Outbound envelopes queued to an open connection
    emits_sent: AtomicU64,
    /// Outbound envelopes dropped (not open, or queue full)
    emits_dropped: AtomicU64,
    /// Successful handshakes
    connects: AtomicU64,
    /// Transport closes (any cause)
    disconnects: AtomicU64,
    /// Connection attempts after the first
    reconnect_attempts: AtomicU64,
    /// Messages received at last report
    last_report_messages: AtomicU64,
    /// Time of last report
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for BusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BusMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_malformed: AtomicU64::new(0),
            messages_unknown_type: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            subscriber_failures: AtomicU64::new(0),
            emits_sent: AtomicU64::new(0),
            emits_dropped: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            last_report_messages: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_message_malformed(&self) {
        self.messages_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_message_unknown_type(&self) {
        self.messages_unknown_type.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_subscriber_failure(&self) {
        self.subscriber_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_emit_sent(&self) {
        self.emits_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_emit_dropped(&self) {
        self.emits_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters
    pub fn report(&self) -> BusMetricsSummary {
        let messages_received = self.messages_received.load(Ordering::Relaxed);
        let previous = self.last_report_messages.swap(messages_received, Ordering::Relaxed);

        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };
        let messages_per_sec = if elapsed_secs > 0.0 {
            messages_received.saturating_sub(previous) as f64 / elapsed_secs
        } else {
            0.0
        };

        BusMetricsSummary {
            messages_received,
            messages_per_sec,
            messages_malformed: self.messages_malformed.load(Ordering::Relaxed),
            messages_unknown_type: self.messages_unknown_type.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            subscriber_failures: self.subscriber_failures.load(Ordering::Relaxed),
            emits_sent: self.emits_sent.load(Ordering::Relaxed),
            emits_dropped: self.emits_dropped.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the bus counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusMetricsSummary {
    pub messages_received: u64,
    pub messages_per_sec: f64,
    pub messages_malformed: u64,
    pub messages_unknown_type: u64,
    pub deliveries: u64,
    pub subscriber_failures: u64,
    pub emits_sent: u64,
    pub emits_dropped: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub reconnect_attempts: u64,
}

impl BusMetricsSummary {
    pub fn log(&self) {
        info!(
            messages_received = %self.messages_received,
            messages_per_sec = %format!("{:.1}", self.messages_per_sec),
            messages_malformed = %self.messages_malformed,
            messages_unknown_type = %self.messages_unknown_type,
            deliveries = %self.deliveries,
            subscriber_failures = %self.subscriber_failures,
            emits_sent = %self.emits_sent,
            emits_dropped = %self.emits_dropped,
            connects = %self.connects,
            disconnects = %self.disconnects,
            reconnect_attempts = %self.reconnect_attempts,
            "bus_metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = BusMetrics::new();
        metrics.record_message_received();
        metrics.record_message_received();
        metrics.record_message_malformed();
        metrics.record_delivery();
        metrics.record_subscriber_failure();
        metrics.record_emit_dropped();
        metrics.record_connect();

        let summary = metrics.report();
        assert_eq!(summary.messages_received, 2);
        assert_eq!(summary.messages_malformed, 1);
        assert_eq!(summary.deliveries, 1);
        assert_eq!(summary.subscriber_failures, 1);
        assert_eq!(summary.emits_dropped, 1);
        assert_eq!(summary.emits_sent, 0);
        assert_eq!(summary.connects, 1);
    }

    #[test]
    fn test_report_is_monotonic() {
        let metrics = BusMetrics::new();
        metrics.record_message_received();
        let first = metrics.report();
        let second = metrics.report();
        assert_eq!(first.messages_received, 1);
        assert_eq!(second.messages_received, 1);
        assert_eq!(second.messages_per_sec, 0.0);
    }
}
