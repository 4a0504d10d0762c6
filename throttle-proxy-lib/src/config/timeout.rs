use serde::Deserialize;
use std::time::Duration;

/// Timeout configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Origin dial timeout in seconds, for tunnels and forwarded requests
    /// Default: 30
    #[serde(default = "default_dial_timeout")]
    pub dial_secs: u64,
    /// TCP keep-alive interval in seconds for origin connections
    /// Default: 30
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// How long an idle pooled outbound connection is kept before closing it
    /// Default: 90
    #[serde(default = "default_idle_connection")]
    pub idle_connection_secs: u64,
    /// Graceful shutdown timeout in seconds
    /// Tunnels still relaying after this are cancelled
    /// Default: 30
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dial_secs: default_dial_timeout(),
            keep_alive_secs: default_keep_alive(),
            idle_connection_secs: default_idle_connection(),
            shutdown_secs: default_shutdown_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn dial(&self) -> Duration {
        Duration::from_secs(self.dial_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn idle_connection(&self) -> Duration {
        Duration::from_secs(self.idle_connection_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

fn default_dial_timeout() -> u64 {
    30
}

fn default_keep_alive() -> u64 {
    30
}

fn default_idle_connection() -> u64 {
    90
}

fn default_shutdown_timeout() -> u64 {
    30
}
