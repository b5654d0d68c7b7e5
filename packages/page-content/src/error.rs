//! Typed errors for page content extraction.
//!
//! Extraction itself degrades instead of failing (an unparseable page yields an
//! empty extract), so these errors mostly surface at the edges: fetching bytes,
//! sniffing image headers and dispatching unsupported content types.

use thiserror::Error;

/// Errors raised while turning a fetched document into a page.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Fetching the document failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The document could not be parsed
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    /// No extractor understands this content type
    #[error("unsupported content type {content_type:?} for {url}")]
    UnsupportedContentType { url: String, content_type: String },
}

/// Malformed or unsupported document bodies.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The URL belongs to an embed provider but does not name any media
    #[error("not an embeddable url for {provider}: {url}")]
    NotEmbeddable { provider: &'static str, url: String },

    /// An embed provider has no host registration
    #[error("embed provider {provider} has no registered host")]
    UnregisteredProvider { provider: &'static str },

    /// The same host is registered twice
    #[error("embed host {host} is registered more than once")]
    DuplicateEmbedHost { host: &'static str },

    /// PDF text extraction failed
    #[error("invalid pdf: {0}")]
    Pdf(String),

    /// JSON form of an image could not be decoded
    #[error("invalid image json: {0}")]
    ImageJson(#[from] serde_json::Error),
}

/// Errors that can occur while fetching remote resources.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Connection or read timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Response body exceeded the configured cap
    #[error("body of {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

/// Errors raised by the binary image sniffer.
#[derive(Debug, Error)]
pub enum SniffError {
    /// No known signature matched
    #[error("unknown image format")]
    UnknownFormat,

    /// Signature matched but the header ended early or was inconsistent
    #[error("truncated or corrupt {format} header")]
    Corrupt { format: &'static str },
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for sniffing.
pub type SniffResult<T> = std::result::Result<T, SniffError>;
