use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::buffer_pool::BufferPool;
use super::limiter::IoLimiter;
use super::rule::LimitRule;
use crate::telemetry::metrics::{values, Metrics};

/// Why a throttled copy stopped before the source reached end of stream.
///
/// Every variant carries the number of bytes already written to the destination.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("read failed after {written} bytes: {source}")]
    Read { written: u64, source: io::Error },

    #[error("write failed after {written} bytes: {source}")]
    Write { written: u64, source: io::Error },

    #[error("short write after {written} bytes")]
    ShortWrite { written: u64 },

    #[error("copy cancelled after {written} bytes")]
    Cancelled { written: u64 },
}

impl CopyError {
    pub fn written(&self) -> u64 {
        match self {
            Self::Read { written, .. }
            | Self::Write { written, .. }
            | Self::ShortWrite { written }
            | Self::Cancelled { written } => *written,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Copies byte streams chunk by chunk through one shared [`IoLimiter`].
///
/// The engine is cheap to clone; clones share the limiter and the buffer pool, so the
/// configured rate is a ceiling on the sum of every stream copied through them.
#[derive(Clone)]
pub struct CopyEngine {
    limiter: Arc<IoLimiter>,
    buffers: Arc<BufferPool>,
    metrics: Option<Arc<Metrics>>,
}

impl CopyEngine {
    pub fn new(rule: LimitRule, metrics: Option<Arc<Metrics>>) -> Self {
        Self { limiter: Arc::new(IoLimiter::new(rule)), buffers: Arc::new(BufferPool::default()), metrics }
    }

    pub fn limiter(&self) -> &IoLimiter {
        &self.limiter
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Copy `src` into `dest` until end of stream, an error, or cancellation.
    ///
    /// Each iteration performs a single read of at most one chunk. Before the chunk is
    /// written the limiter is consulted twice: a failed admission check costs the
    /// retry-after cooldown, then the chunk is always reserved and the copy sleeps
    /// whatever delay the reservation returns. Every wait observes `cancel`.
    ///
    /// Returns the total bytes written on a clean end of stream.
    pub async fn copy<R, W>(&self, cancel: &CancellationToken, dest: &mut W, src: &mut R) -> Result<u64, CopyError>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut buf = self.buffers.get();
        let mut written: u64 = 0;
        let throttle = sleep(Duration::ZERO);
        tokio::pin!(throttle);

        loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CopyError::Cancelled { written }),
                read = src.read(&mut buf[..]) => match read {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => 0,
                    Err(source) => return Err(CopyError::Read { written, source }),
                },
            };

            if n == 0 {
                if let Err(source) = dest.flush().await {
                    return Err(CopyError::Write { written, source });
                }
                return Ok(written);
            }

            if !self.limiter.try_admit(n) {
                warn!(bytes = n, retry_after = ?self.limiter.retry_after(), "hit io limit rule");
                self.record_wait(values::WAIT_RETRY_AFTER);
                self.pause(&mut throttle, self.limiter.retry_after(), cancel, written).await?;
            }

            let delay = self.limiter.reserve_delay(n);
            if !delay.is_zero() {
                debug!(bytes = n, ?delay, "waiting for io reservation");
                self.record_wait(values::WAIT_RESERVATION);
                self.pause(&mut throttle, delay, cancel, written).await?;
            }

            let mut chunk = &buf[..n];
            while !chunk.is_empty() {
                let w = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CopyError::Cancelled { written }),
                    res = dest.write(chunk) => match res {
                        Ok(0) => return Err(CopyError::ShortWrite { written }),
                        Ok(w) => w,
                        Err(source) => return Err(CopyError::Write { written, source }),
                    },
                };
                written += w as u64;
                chunk = &chunk[w..];
            }
        }
    }

    async fn pause(
        &self,
        throttle: &mut std::pin::Pin<&mut Sleep>,
        wait: Duration,
        cancel: &CancellationToken,
        written: u64,
    ) -> Result<(), CopyError> {
        if wait.is_zero() {
            return Ok(());
        }
        throttle.as_mut().reset(Instant::now() + wait);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CopyError::Cancelled { written }),
            _ = throttle.as_mut() => Ok(()),
        }
    }

    fn record_wait(&self, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rate_limit_wait(reason);
        }
    }
}

impl std::fmt::Debug for CopyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyEngine")
            .field("limiter", &self.limiter)
            .field("idle_buffers", &self.buffers.idle())
            .finish()
    }
}
