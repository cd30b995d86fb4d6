use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const FETCH: RetryPolicy = RetryPolicy {
        attempts: 3,
        delay: Duration::from_secs(3),
    };

    pub const LOOKUP: RetryPolicy = RetryPolicy {
        attempts: 2,
        delay: Duration::from_secs(5),
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed; holds the last error.
    Exhausted(E),
    Cancelled,
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Exhausted(err) => write!(f, "{}", err),
            RetryError::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Runs `op` until it succeeds or `policy.attempts` is used up, sleeping
/// `policy.delay` between attempts. No wait follows the final attempt.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(RetryError::Exhausted(err)),
            Err(err) => {
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label, attempt, attempts, err, policy.delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn always_failing_op_runs_exactly_the_attempt_bound() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let result: Result<(), _> = retry(RetryPolicy::FETCH, &cancel, "fetch v1", |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("boom")
        })
        .await;

        assert_eq!(result, Err(RetryError::Exhausted("boom")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_first_success() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let result = retry(RetryPolicy::LOOKUP, &cancel, "lookup", |attempt| async move {
            if attempt == 2 {
                Ok(attempt)
            } else {
                Err("not yet")
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        let result: Result<(), _> =
            retry(RetryPolicy::FETCH, &cancel, "fetch", |_| async { Err::<(), _>("down") }).await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
