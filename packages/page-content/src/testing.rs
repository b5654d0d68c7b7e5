//! Testing utilities.
//!
//! [`MockFetcher`] serves canned bodies so extraction and image selection can
//! be exercised without network access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{FetchError, FetchResult};
use crate::fetch::{Fetched, Fetcher};

#[derive(Debug, Clone)]
enum MockResponse {
    Body {
        content_type: Option<String>,
        body: Vec<u8>,
    },
    Status(u16),
    Timeout,
}

/// Record of a request made to the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFetch {
    pub url: String,
    pub referrer: Option<String>,
}

/// A [`Fetcher`] that answers from a fixed table.
///
/// Unknown URLs get a 404.
#[derive(Default, Clone)]
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, MockResponse>>>,
    calls: Arc<RwLock<Vec<MockFetch>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn with_response(self, url: impl Into<String>, content_type: &str, body: Vec<u8>) -> Self {
        self.responses.write().unwrap().insert(
            url.into(),
            MockResponse::Body {
                content_type: Some(content_type.to_string()),
                body,
            },
        );
        self
    }

    /// Serve `body` for `url` with no `Content-Type` header.
    pub fn with_untyped_response(self, url: impl Into<String>, body: Vec<u8>) -> Self {
        self.responses.write().unwrap().insert(
            url.into(),
            MockResponse::Body {
                content_type: None,
                body,
            },
        );
        self
    }

    /// Answer `url` with an HTTP error status.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(url.into(), MockResponse::Status(status));
        self
    }

    /// Make `url` time out.
    pub fn with_timeout(self, url: impl Into<String>) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(url.into(), MockResponse::Timeout);
        self
    }

    /// Every request, in order.
    pub fn calls(&self) -> Vec<MockFetch> {
        self.calls.read().unwrap().clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.calls.read().unwrap().iter().filter(|c| c.url == url).count()
    }

    /// Referrers sent with each request for `url`.
    pub fn referrers(&self, url: &str) -> Vec<Option<String>> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.url == url)
            .map(|c| c.referrer.clone())
            .collect()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, referrer: Option<&str>) -> FetchResult<Fetched> {
        self.calls.write().unwrap().push(MockFetch {
            url: url.to_string(),
            referrer: referrer.map(str::to_string),
        });

        let response = self.responses.read().unwrap().get(url).cloned();
        match response {
            Some(MockResponse::Body { content_type, body }) => Ok(Fetched {
                url: url.to_string(),
                status: 200,
                content_type,
                body,
            }),
            Some(MockResponse::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            Some(MockResponse::Timeout) => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
