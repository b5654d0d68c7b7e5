//! HTTP fetching for documents and images.
//!
//! Every request carries a connect timeout, an overall timeout and a small
//! bounded retry budget so one hung upstream cannot stall a batch.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};

/// Desktop Chrome; several sites refuse obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Hard cap on any single response body.
pub const MAX_BODY_BYTES: usize = 17 * 1024 * 1024;

/// A fetched resource.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Source of remote bytes.
///
/// Implemented by [`HttpFetcher`] in production and by
/// [`crate::testing::MockFetcher`] in tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, optionally sending a `Referer`.
    async fn fetch(&self, url: &str, referrer: Option<&str>) -> FetchResult<Fetched>;
}

/// Timeouts, retries and limits for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub user_agent: String,
    pub max_body_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            timeout: Duration::from_secs(20),
            max_retries: 3,
            retry_backoff: Duration::from_millis(250),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

impl FetchConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Http(Box::new(e)))?;
        Ok(Self { client, config })
    }

    /// Use a preconfigured client; timeouts then come from that client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn fetch_once(&self, url: &str, referrer: Option<&str>) -> FetchResult<Fetched> {
        let mut request = self.client.get(url);
        if let Some(referrer) = referrer {
            request = request.header(reqwest::header::REFERER, referrer);
        }
        let mut response = request.send().await.map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let limit = self.config.max_body_bytes;
        if response
            .content_length()
            .is_some_and(|len| len as usize > limit)
        {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit,
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(url, e))? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Fetched {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, referrer: Option<&str>) -> FetchResult<Fetched> {
        url::Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;

        let mut attempt = 0;
        loop {
            debug!(url = %url, attempt, "HTTP fetch starting");
            match self.fetch_once(url, referrer).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if attempt < self.config.max_retries && is_retryable(&e) => {
                    warn!(url = %url, attempt, error = %e, "HTTP fetch failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Http(Box::new(e))
    }
}

fn is_retryable(e: &FetchError) -> bool {
    match e {
        FetchError::Timeout { .. } | FetchError::Http(_) => true,
        FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        FetchError::InvalidUrl { .. } | FetchError::TooLarge { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FetchConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_body_bytes, 17 * 1024 * 1024);
    }

    #[test]
    fn test_retry_policy() {
        let status = |status| FetchError::Status {
            url: "http://x".into(),
            status,
        };
        assert!(is_retryable(&status(503)));
        assert!(is_retryable(&status(429)));
        assert!(!is_retryable(&status(404)));
        assert!(!is_retryable(&FetchError::TooLarge {
            url: "http://x".into(),
            limit: 1
        }));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_without_request() {
        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        let err = tokio_test::assert_err!(fetcher.fetch("not a url", None).await);
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
