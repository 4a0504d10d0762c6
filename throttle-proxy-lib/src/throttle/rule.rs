use std::time::Duration;

/// Size of one copy chunk, and the smallest rate a [`LimitRule`] accepts.
pub const CHUNK_SIZE: usize = 1 << 12;

/// Bandwidth limit applied to every relayed byte stream.
///
/// A rule is only enforced when it is [valid](LimitRule::is_valid); anything
/// slower than one chunk per second turns limiting off entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitRule {
    /// Sustained cap in bytes per second
    pub limited_bytes_per_sec: u64,
    /// Cooldown applied when a chunk exceeds the available burst
    pub retry_after: Duration,
}

impl LimitRule {
    pub fn new(limited_bytes_per_sec: u64, retry_after: Duration) -> Self {
        Self { limited_bytes_per_sec, retry_after }
    }

    /// A rule that never limits.
    pub fn unlimited() -> Self {
        Self { limited_bytes_per_sec: 0, retry_after: Duration::ZERO }
    }

    pub fn is_valid(&self) -> bool {
        self.limited_bytes_per_sec >= CHUNK_SIZE as u64
    }
}
