use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::config::SecurityConfig;
use crate::telemetry::Metrics;

use super::guards::ConnectionGuard;

/// Errors that can occur when trying to accept a connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection limit exceeded (current: {current}, limit: {limit})")]
    LimitExceeded { current: usize, limit: usize },
}

/// Tracks open client connections and enforces `max_connections`
pub struct ConnectionManager {
    active_connections: Arc<AtomicUsize>,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(security: &SecurityConfig) -> Self {
        Self { active_connections: Arc::new(AtomicUsize::new(0)), max_connections: security.max_connections }
    }

    /// Number of client connections currently being served
    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Try to accept a new connection
    /// Returns Ok(guard) if connection is accepted, Err(ConnectionError) if rejected
    pub fn try_accept(
        &self,
        peer: std::net::SocketAddr,
        metrics: Option<&Arc<Metrics>>,
    ) -> Result<ConnectionGuard, ConnectionError> {
        let current_connections = self.active_connections.load(Ordering::Relaxed);
        if current_connections >= self.max_connections {
            if let Some(m) = metrics {
                m.connections_rejected_total.add(1, &[]);
            }
            warn!(
                current = current_connections,
                limit = self.max_connections,
                peer = %peer,
                "Connection limit exceeded, rejecting connection"
            );
            return Err(ConnectionError::LimitExceeded {
                current: current_connections,
                limit: self.max_connections,
            });
        }

        self.active_connections.fetch_add(1, Ordering::Relaxed);

        if let Some(m) = metrics {
            m.connections_total.add(1, &[]);
            m.connections_active.add(1, &[]);
        }

        Ok(ConnectionGuard::new(
            self.active_connections.clone(),
            metrics.map(|m| m.connections_active.clone()),
        ))
    }
}
