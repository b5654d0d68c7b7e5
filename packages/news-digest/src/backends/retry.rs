//! Timeouts and bounded retries shared by the HTTP backends.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use crate::error::{BackendError, BackendResult};

/// Connect timeout, request timeout and retry budget for one backend.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub connect_timeout: Duration,
    /// Whole-request timeout, including reading the answer.
    pub timeout: Duration,
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Sleep before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Build an HTTP client carrying both timeouts.
    pub fn client(&self) -> BackendResult<Client> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {e}")))
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    pub async fn run<T, F, Fut>(&self, backend: &str, mut attempt: F) -> BackendResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if retries < self.max_retries && e.is_retryable() => {
                    retries += 1;
                    warn!(backend = %backend, retry = retries, error = %e, "Backend call failed, retrying");
                    tokio::time::sleep(self.backoff * retries).await;
                }
                result => return result,
            }
        }
    }
}

/// Map a failure while reading a response body. A stalled body is a
/// network failure; anything else is a malformed answer.
pub(crate) fn body_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Network(e.to_string())
    } else {
        BackendError::MalformedResponse(e.to_string())
    }
}
