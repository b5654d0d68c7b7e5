//! News Digest
//!
//! Summarizes news stories through a cascade of increasingly costly tiers
//! and caches the outcome, so a story settled once is never paid for again.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use news_digest::{Orchestrator, SqliteStore, Story, OpenAiConfig, OpenAiSummarizer};
//! use page_content::{FetchConfig, HttpFetcher};
//!
//! let store = Arc::new(SqliteStore::new("sqlite:./digest.db?mode=rwc").await?);
//! let fetcher = Arc::new(HttpFetcher::new(FetchConfig::default())?);
//! let hosted = Arc::new(OpenAiSummarizer::new(OpenAiConfig::new(api_key))?);
//!
//! let orchestrator = Orchestrator::new(store, fetcher)
//!     .with_external(hosted.clone())
//!     .with_translator(hosted);
//!
//! let records = orchestrator
//!     .pull_batch(&[Story::new("https://example.com/post", 250)], 4)
//!     .await;
//! ```
//!
//! # Modules
//!
//! - [`types`] - Tiers, cached records, stories and configuration
//! - [`traits`] - Store and backend seams
//! - [`stores`] - Cache implementations (MemoryStore, SqliteStore)
//! - [`backends`] - Hosted and local summarizers
//! - [`pipeline`] - Orchestrator, batch runner and expiry sweep
//! - [`testing`] - Mock backends and a controllable clock

pub mod backends;
pub mod clock;
pub mod error;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use backends::{LocalCompletionBackend, OpenAiConfig, OpenAiSummarizer, RetryPolicy};
pub use clock::{Clock, SystemClock};
pub use error::{BackendError, DigestError, Result, StorageError};
pub use pipeline::{run_expiry, spawn_expiry_sweep, Orchestrator, Stage};
pub use stores::MemoryStore;
#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;
pub use traits::{
    store::{CacheStore, SummaryStore, TranslationStore},
    summarizer::{Summarizer, Translator},
};
pub use types::{
    config::{ExpiryPolicy, ExpiryReport, SummaryConfig},
    record::{SummaryRecord, TranslationRecord},
    story::Story,
    tier::{Tier, TierPolicy, UnknownTier},
};
