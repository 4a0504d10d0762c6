use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Guard to decrement active connections counter when dropped
#[derive(Debug)]
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
    connections_active: Option<opentelemetry::metrics::UpDownCounter<i64>>,
}

impl ConnectionGuard {
    pub fn new(
        counter: Arc<AtomicUsize>,
        connections_active: Option<opentelemetry::metrics::UpDownCounter<i64>>,
    ) -> Self {
        Self { counter, connections_active }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
        if let Some(ref counter) = self.connections_active {
            counter.add(-1, &[]);
        }
    }
}
