//! Token bucket shared by every relayed stream.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::rule::{LimitRule, CHUNK_SIZE};

/// Token bucket metering bytes for the whole process.
///
/// # Algorithm
///
/// - The bucket refills at `limited_bytes_per_sec` tokens per second
/// - Capacity is `limited_bytes_per_sec + CHUNK_SIZE`, so one full chunk always fits
///   even when the rate equals the chunk size
/// - [`try_admit`](IoLimiter::try_admit) debits only when enough tokens are present
/// - [`reserve_delay`](IoLimiter::reserve_delay) always debits and lets the balance go
///   negative; the returned delay is the time until the balance is back at zero.
///   Successive reservations therefore form a virtual schedule instead of a queue.
///
/// # Thread Safety
///
/// The `(tokens, last)` pair sits behind one mutex held for O(1) arithmetic only.
/// Callers share the limiter through an `Arc` without further locking.
///
/// # Disabled limiter
///
/// A limiter built from an invalid [`LimitRule`] has no bucket: it admits everything,
/// never delays and reports a zero retry-after.
pub struct IoLimiter {
    bucket: Option<Mutex<Bucket>>,
    rate: f64,
    burst: f64,
    retry_after: Duration,
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

impl IoLimiter {
    pub fn new(rule: LimitRule) -> Self {
        if !rule.is_valid() {
            return Self::disabled();
        }

        let rate = rule.limited_bytes_per_sec as f64;
        let burst = rate + CHUNK_SIZE as f64;
        Self {
            bucket: Some(Mutex::new(Bucket { tokens: burst, last: Instant::now() })),
            rate,
            burst,
            retry_after: rule.retry_after,
        }
    }

    pub fn disabled() -> Self {
        Self { bucket: None, rate: 0.0, burst: 0.0, retry_after: Duration::ZERO }
    }

    pub fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    /// Bucket capacity in bytes (zero when disabled).
    pub fn burst(&self) -> u64 {
        self.burst as u64
    }

    /// Admit `n` bytes now if the bucket holds enough tokens.
    ///
    /// A rejected check leaves the bucket untouched.
    pub fn try_admit(&self, n: usize) -> bool {
        let Some(bucket) = &self.bucket else {
            return true;
        };

        let mut bucket = bucket.lock();
        self.refill(&mut bucket, Instant::now());
        let n = n as f64;
        if bucket.tokens >= n {
            bucket.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Debit `n` bytes and return how long the caller must wait before sending them.
    pub fn reserve_delay(&self, n: usize) -> Duration {
        let Some(bucket) = &self.bucket else {
            return Duration::ZERO;
        };

        let mut bucket = bucket.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens -= n as f64;
        if bucket.tokens >= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(-bucket.tokens / self.rate)
    }

    /// Cooldown advertised when [`try_admit`](IoLimiter::try_admit) fails.
    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last);
        if elapsed.is_zero() {
            return;
        }
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        bucket.last = now;
    }
}

impl std::fmt::Debug for IoLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoLimiter")
            .field("enabled", &self.is_enabled())
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .field("retry_after", &self.retry_after)
            .finish()
    }
}
