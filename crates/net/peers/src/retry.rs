//! Fixed-delay retry with cooperative cancellation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use meshlite_tasks::Shutdown;
use tracing::debug;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    /// Wait after every failed attempt, the last one included.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: E },
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: usize },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> usize {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// `op` receives the 1-based attempt number. Both the attempt and the delay that
/// follows a failure are abandoned as soon as `shutdown` fires.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &Shutdown,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut shutdown = shutdown.clone();
    let mut attempt = 0;

    loop {
        if shutdown.is_fired() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }
        attempt += 1;
        let result = tokio::select! {
            biased;
            _ = &mut shutdown => return Err(RetryError::Cancelled { attempts: attempt - 1 }),
            result = op(attempt) => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        debug!(attempt, max_attempts, error = %err, "attempt failed");

        tokio::select! {
            biased;
            _ = &mut shutdown => return Err(RetryError::Cancelled { attempts: attempt }),
            _ = tokio::time::sleep(policy.delay) => {}
        }

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use tokio::time::Instant;

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let (_signal, shutdown) = meshlite_tasks::signal();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let result = retry(&policy(), &shutdown, move |attempt| {
            c.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err("refused")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_waits_after_every_failure() {
        let (_signal, shutdown) = meshlite_tasks::signal();
        let start = Instant::now();

        let result: Result<(), _> =
            retry(&policy(), &shutdown, |_| async { Err("refused") }).await;

        assert_matches!(result, Err(RetryError::Exhausted { attempts: 3, last: "refused" }));
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_delay() {
        let (signal, shutdown) = meshlite_tasks::signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            signal.fire();
        });

        let result: Result<(), _> =
            retry(&policy(), &shutdown, |_| async { Err("refused") }).await;

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 2);
    }

    #[tokio::test]
    async fn test_already_fired_makes_no_attempt() {
        let (signal, shutdown) = meshlite_tasks::signal();
        signal.fire();

        let calls = AtomicUsize::new(0);
        let result: Result<(), RetryError<&str>> = retry(&policy(), &shutdown, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("refused") }
        })
        .await;
        assert_matches!(result, Err(RetryError::Cancelled { attempts: 0 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
