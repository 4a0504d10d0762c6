use serde::Deserialize;
use std::time::Duration;

use crate::throttle::LimitRule;

/// Bandwidth limit configuration
///
/// The limit is process-wide: every forwarded body and both directions of every
/// tunnel draw from the same token bucket.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LimitConfig {
    /// Sustained cap in bytes per second
    /// Values below 4096 (one chunk) disable limiting
    /// Default: 8388608 (8 MiB/s)
    #[serde(default = "default_bytes_per_second")]
    pub bytes_per_second: u64,
    /// Cooldown in seconds applied when a chunk does not fit in the bucket
    /// Default: 5
    #[serde(default = "default_retry_after")]
    pub retry_after_secs: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self { bytes_per_second: default_bytes_per_second(), retry_after_secs: default_retry_after() }
    }
}

impl LimitConfig {
    pub fn to_rule(&self) -> LimitRule {
        LimitRule::new(self.bytes_per_second, Duration::from_secs(self.retry_after_secs))
    }
}

fn default_bytes_per_second() -> u64 {
    8 * 1024 * 1024
}

fn default_retry_after() -> u64 {
    5
}
