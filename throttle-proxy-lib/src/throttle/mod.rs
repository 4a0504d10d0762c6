//! Bandwidth throttling for proxied byte streams.
//!
//! Every byte the proxy relays, whether a forwarded response body or either
//! direction of a CONNECT tunnel, flows through the [`CopyEngine`]. The engine
//! meters each chunk against one process-wide [`IoLimiter`].
//!
//! # Architecture
//!
//! 1. **Rule** (`rule.rs`): the configured [`LimitRule`]. Rates below one
//!    chunk per second are invalid and disable limiting.
//!
//! 2. **Limiter** (`limiter.rs`): a token bucket refilled at the configured
//!    rate with a burst of one second plus one chunk. Supports non-blocking
//!    admission checks and reservations that schedule a future wait.
//!
//! 3. **Buffer pool** (`buffer_pool.rs`): fixed-size chunk buffers reused
//!    across copies and returned on drop.
//!
//! 4. **Copy engine** (`copy.rs`): the read/meter/write loop with
//!    cancellation-aware backoff.
//!
//! # Example Usage
//!
//! ```ignore
//! use std::time::Duration;
//! use throttle_proxy_lib::throttle::{CopyEngine, LimitRule};
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = CopyEngine::new(LimitRule::new(1024 * 1024, Duration::from_secs(5)), None);
//! let cancel = CancellationToken::new();
//! let copied = engine.copy(&cancel, &mut dest, &mut src).await?;
//! ```

mod buffer_pool;
mod copy;
mod limiter;
mod rule;

pub use buffer_pool::{BufferPool, PooledBuffer, DEFAULT_MAX_IDLE_BUFFERS};
pub use copy::{CopyEngine, CopyError};
pub use limiter::IoLimiter;
pub use rule::{LimitRule, CHUNK_SIZE};
