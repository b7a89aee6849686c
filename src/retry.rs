//! Retry logic with configurable backoff
//!
//! Transient failures (DNS hiccups, connection resets, throttling, truncated bodies)
//! are retried according to [`RetryConfig`]; everything else fails immediately.
//!
//! # Example
//!
//! ```no_run
//! use media_dl::retry::{IsRetryable, retry_with_backoff};
//! use media_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! retry_with_backoff(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, TransferError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures should return `true`; permanent ones (content removed,
/// access denied, no usable format, disk full) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            // Only network-class extraction failures; removed or private videos stay failed
            Error::Extraction { kind, .. } => kind.is_transient(),
            Error::Transfer(e) => e.is_retryable(),
            Error::ExternalTool(msg) => {
                msg.contains("timed out") || msg.contains("temporary") || msg.contains("reset")
            }
            Error::Config { .. }
            | Error::InvalidUrl { .. }
            | Error::NoSuitableFormat { .. }
            | Error::Merge { .. }
            | Error::Serialization(_)
            | Error::ShuttingDown
            | Error::Cancelled
            | Error::InsufficientSpace { .. }
            | Error::DiskSpaceCheckFailed(_)
            | Error::BatchAborted { .. }
            | Error::NotSupported(_)
            | Error::Other(_) => false,
        }
    }
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            // Server-side trouble and throttling clear up; 4xx other than 429 will not
            TransferError::BadStatus { status, .. } => *status >= 500 || *status == 429,
            TransferError::Timeout { .. } => true,
            TransferError::Segment { source, .. } => source.is_retryable(),
            // A short body means the connection dropped mid-stream
            TransferError::SizeMismatch { .. } => true,
            TransferError::Backend { reason } => {
                let reason = reason.to_ascii_lowercase();
                reason.contains("timed out")
                    || reason.contains("connection reset")
                    || reason.contains("temporary failure")
                    || reason.contains("http error 5")
            }
        }
    }
}

/// Execute an async operation, retrying transient failures
///
/// # Arguments
///
/// * `config` - Retry configuration (max retries, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns `Result<T, E>` where `E` implements [`IsRetryable`]
///
/// # Returns
///
/// The successful result, or the last error once retries are exhausted or a
/// permanent error is seen.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = backoff_delay(config, attempt);
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Delay to wait before retry number `attempt + 1` (zero-based)
///
/// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`, with
/// optional jitter applied after the cap.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = config.backoff_multiplier.max(0.0).powi(attempt as i32);
    let secs = config.initial_delay.as_secs_f64() * factor;
    let base = if secs.is_finite() {
        Duration::from_secs_f64(secs).min(config.max_delay)
    } else {
        config.max_delay
    };

    if config.jitter { add_jitter(base) } else { base }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
