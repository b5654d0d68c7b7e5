//! Storage traits for summaries and translations.
//!
//! - `SummaryStore`: one record per URL
//! - `TranslationStore`: one record per `(text, language)`
//! - `CacheStore`: composite of both

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Duration;

use crate::error::StorageResult;
use crate::types::{
    config::{ExpiryPolicy, ExpiryReport},
    record::{SummaryRecord, TranslationRecord},
};

/// Cache of pulled stories, keyed by URL.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Read and touch. A miss yields [`SummaryRecord::empty`], never an error.
    async fn get_summary(&self, url: &str) -> StorageResult<SummaryRecord>;

    /// Read without touching.
    async fn peek_summary(&self, url: &str) -> StorageResult<Option<SummaryRecord>>;

    /// Upsert, stamping `last_accessed_at` with the current time. An existing
    /// row keeps its `created_at`. Returns the record as stored.
    async fn put_summary(&self, record: &SummaryRecord) -> StorageResult<SummaryRecord>;

    /// The subset of `urls` already cached, found in one round trip. Found
    /// rows are touched and kept for the next [`Self::get_summary`].
    async fn filter_existing(&self, urls: &[String]) -> StorageResult<HashSet<String>>;

    /// Run both retention sweeps. `translations` in the report is left at 0.
    async fn expire_summaries(&self, policy: &ExpiryPolicy) -> StorageResult<ExpiryReport>;

    async fn count_summaries(&self) -> StorageResult<usize>;
}

/// Cache of translated summaries.
#[async_trait]
pub trait TranslationStore: Send + Sync {
    /// Read and touch. A miss yields a record with empty `translated`.
    async fn get_translation(&self, source: &str, language: &str) -> StorageResult<TranslationRecord>;

    async fn has_translation(&self, source: &str, language: &str) -> StorageResult<bool>;

    /// Upsert, stamping `last_accessed_at`.
    async fn put_translation(&self, record: &TranslationRecord) -> StorageResult<()>;

    /// Delete translations not read within `ttl`.
    async fn expire_translations(&self, ttl: Duration) -> StorageResult<usize>;
}

/// Composite store: everything the orchestrator and the sweep need.
pub trait CacheStore: SummaryStore + TranslationStore {}

impl<T: SummaryStore + TranslationStore> CacheStore for T {}
