//! Fixed-delay retry loop shared by downloads and grid listings.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry policy: how many extra attempts, and how long to wait between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,

    /// Fixed wait before each retry. Zero retries immediately.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Retry immediately, no waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// The last error once a retry budget is spent.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Run `op` until it succeeds or `policy.max_retries` retries have failed.
///
/// Each failure that will be retried is logged first.
pub async fn with_retries<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt <= policy.max_retries => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    what,
                    attempt,
                    policy.max_retries + 1,
                    error
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(error) => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    error,
                })
            }
        }
    }
}
