//! Typed errors for the digest pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`). None of these escape
//! [`crate::Orchestrator::pull_content`]; they are logged and degraded at
//! each tier boundary.

use thiserror::Error;

/// Errors that can occur while pulling a story.
#[derive(Debug, Error)]
pub enum DigestError {
    /// Fetching or extracting the document failed
    #[error("extraction failed: {0}")]
    Extract(#[from] page_content::ExtractError),

    /// A summarization backend failed
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Cache read or write failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Failures of a summarization or translation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend is not configured or switched off
    #[error("backend disabled: {0}")]
    Disabled(String),

    /// Network error (connection failed, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Rate limit or quota exhausted
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Response did not have the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Backend answered with nothing usable
    #[error("empty answer")]
    EmptyAnswer,
}

impl BackendError {
    /// Transport failures and 5xx responses. Quota errors are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Network(_) => true,
            BackendError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Failures of the summary and translation cache.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stored row could not be decoded
    #[error("corrupt row for {key}: {reason}")]
    CorruptRow { key: String, reason: String },
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, DigestError>;

/// Result type alias for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Result type alias for cache operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
