//! Bridge counters, shared between the subscription manager and the dispatch
//! engine via `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct BridgeMetrics {
    // Connection metrics
    pub connections_established: AtomicU64,
    pub connections_failed: AtomicU64,
    pub reconnect_attempts: AtomicU64,

    // Message metrics
    pub deltas_received: AtomicU64,
    pub values_processed: AtomicU64,
    pub commands_emitted: AtomicU64,

    // Error metrics
    pub parse_errors: AtomicU64,
    pub validation_failures: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_failure(&self) {
        self.connections_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        let attempts = self.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!("Reconnect attempt recorded, {} total", attempts);
    }

    pub fn record_delta(&self) {
        self.deltas_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_value(&self) {
        self.values_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = BridgeMetrics::new();
        metrics.record_delta();
        metrics.record_delta();
        metrics.record_command();

        assert_eq!(metrics.deltas_received.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.commands_emitted.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.parse_errors.load(Ordering::Relaxed), 0);
    }
}
