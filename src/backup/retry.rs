use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

/// Linear backoff for rate-limited requests.
///
/// The first retry waits `initial_delay`, every following retry waits
/// `backoff_increment` longer than the one before. `max_retries: None` retries until
/// the request succeeds or the run is cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub backoff_increment: Duration,
    pub max_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_increment: Duration::from_millis(100),
            max_retries: None,
        }
    }
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The operation failed with an error that is not retried.
    Failed(E),
    /// `max_retries` retries were used up; `last` is the final error.
    Exhausted { attempts: u32, last: E },
    /// Cancellation was requested while waiting for the next attempt.
    Cancelled,
}

impl RetryPolicy {
    /// Runs `operation` until it succeeds, retrying errors for which `classify`
    /// returns true.
    ///
    /// `on_retry` is called with the upcoming sleep and the retry number (starting at
    /// 1) right before each sleep. The sleep is abandoned as soon as `cancel` fires.
    pub async fn run<T, E, Op, Fut, C, N>(
        &self,
        cancel: &CancellationToken,
        mut operation: Op,
        classify: C,
        mut on_retry: N,
    ) -> Result<T, RetryError<E>>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        N: FnMut(Duration, u32),
    {
        let mut delay = self.initial_delay;
        let mut attempt = 0u32;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if classify(&e) => e,
                Err(e) => return Err(RetryError::Failed(e)),
            };

            if self.max_retries.is_some_and(|max| attempt >= max) {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            attempt += 1;
            on_retry(delay, attempt);

            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            delay += self.backoff_increment;
        }
    }
}
