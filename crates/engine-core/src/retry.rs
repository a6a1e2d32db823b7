use std::{future::Future, time::Duration};
use tokio::time::sleep;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Last error of a failed run, with how many attempts were made.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Classified as not worth retrying.
    Stopped { error: E, attempts: usize },
    /// Still retryable when the attempt budget ran out.
    Exhausted { error: E, attempts: usize },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Stopped { attempts, .. } | RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Stopped { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }
}

/// Attempt budget and doubling backoff for one checker.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made. A zero `max_delay` caps at
    /// `base_delay`.
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        let max_delay = if max_delay.is_zero() { base_delay } else { max_delay };
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// One initial attempt plus `retry_count` retries.
    pub fn with_retries(retry_count: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self::new(retry_count as usize + 1, base_delay, max_delay)
    }

    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Calls `op` with the zero-based attempt number until it succeeds,
    /// `classify` says stop, or the attempts run out.
    pub async fn run<F, Fut, T, E, C>(&self, mut op: F, classify: C) -> Result<T, RetryError<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryDisposition,
    {
        let mut attempt = 0;
        loop {
            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            let attempts = attempt + 1;

            if classify(&error) == RetryDisposition::Stop {
                return Err(RetryError::Stopped { error, attempts });
            }
            if attempts >= self.max_attempts {
                return Err(RetryError::Exhausted { error, attempts });
            }

            sleep(self.backoff_delay(attempt)).await;
            attempt = attempts;
        }
    }

    /// `base_delay * 2^attempt`, doubling at most six times, capped at
    /// `max_delay`.
    fn backoff_delay(&self, attempt: usize) -> Duration {
        let doubled = self.base_delay.saturating_mul(1u32 << attempt.min(6));
        doubled.min(self.max_delay)
    }
}
