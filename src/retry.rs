//! Busy-retry send policy.
//!
//! Outbound transports may report [`TransportError::Busy`] when their TX path
//! is momentarily full (USB endpoint not drained, UART DMA in flight). A send
//! is retried a bounded number of times with a fixed delay between attempts.
//! Hard errors are returned immediately.
//!
//! [`send_with_retry`] waits through [`Clock::sleep`] and blocks the caller;
//! it serves synchronous poll loops. Async links use [`send_with_retry_async`],
//! which waits on the tokio timer so other tasks (such as the writer draining
//! the queue) keep running between attempts.
//!
//! # Configuration
//!
//! - `attempts`: Total write attempts (default: 6)
//! - `delay`: Pause between attempts (default: 10ms)

use std::time::Duration;

use crate::clock::Clock;
use crate::transport::{Transport, TransportError};

/// Default number of write attempts.
pub const DEFAULT_SEND_ATTEMPTS: u32 = 6;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Bounded retry budget for a single packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A single attempt, never sleeping.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

/// Write `data`, retrying while the transport reports `Busy`.
///
/// Returns `Busy` once the budget is exhausted; any other error is returned
/// on first occurrence.
pub fn send_with_retry(
    transport: &mut dyn Transport,
    data: &[u8],
    policy: &RetryPolicy,
    clock: &dyn Clock,
) -> Result<(), TransportError> {
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        match transport.write(data) {
            Ok(()) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "Write accepted after retry");
                }
                return Ok(());
            }
            Err(TransportError::Busy) if attempt < attempts => {
                clock.sleep(policy.delay);
            }
            Err(e) => return Err(e),
        }
    }

    Err(TransportError::Busy)
}

/// Async variant of [`send_with_retry`].
///
/// `attempt` performs one write. It is called again after `policy.delay`
/// while it reports `Busy`; the wait yields to the runtime.
pub async fn send_with_retry_async<F>(
    mut attempt: F,
    policy: &RetryPolicy,
) -> Result<(), TransportError>
where
    F: FnMut() -> Result<(), TransportError>,
{
    let attempts = policy.attempts.max(1);

    for n in 1..=attempts {
        match attempt() {
            Ok(()) => {
                if n > 1 {
                    tracing::debug!(attempt = n, "Write accepted after retry");
                }
                return Ok(());
            }
            Err(TransportError::Busy) if n < attempts => {
                if policy.delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(TransportError::Busy)
}
