//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::error::StorageResult;
use crate::traits::store::{SummaryStore, TranslationStore};
use crate::types::{
    config::{ExpiryPolicy, ExpiryReport},
    record::{normalize_time, SummaryRecord, TranslationRecord},
};

/// In-memory cache of summaries and translations.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    summaries: RwLock<HashMap<String, SummaryRecord>>,
    translations: RwLock<HashMap<(String, String), TranslationRecord>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            summaries: RwLock::new(HashMap::new()),
            translations: RwLock::new(HashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a custom time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.summaries.write().unwrap().clear();
        self.translations.write().unwrap().clear();
    }

    /// Get the number of stored translations.
    pub fn translation_count(&self) -> usize {
        self.translations.read().unwrap().len()
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        normalize_time(self.clock.now())
    }
}

#[async_trait]
impl SummaryStore for MemoryStore {
    async fn get_summary(&self, url: &str) -> StorageResult<SummaryRecord> {
        let now = self.now();
        let mut summaries = self.summaries.write().unwrap();
        Ok(match summaries.get_mut(url) {
            Some(record) => {
                record.last_accessed_at = now;
                record.clone()
            }
            None => SummaryRecord::empty(url, now),
        })
    }

    async fn peek_summary(&self, url: &str) -> StorageResult<Option<SummaryRecord>> {
        Ok(self.summaries.read().unwrap().get(url).cloned())
    }

    async fn put_summary(&self, record: &SummaryRecord) -> StorageResult<SummaryRecord> {
        let mut stored = record.clone().truncated();
        stored.last_accessed_at = self.now();

        let mut summaries = self.summaries.write().unwrap();
        if let Some(existing) = summaries.get(&stored.url) {
            stored.created_at = existing.created_at;
        }
        summaries.insert(stored.url.clone(), stored.clone());
        Ok(stored)
    }

    async fn filter_existing(&self, urls: &[String]) -> StorageResult<HashSet<String>> {
        let now = self.now();
        let mut summaries = self.summaries.write().unwrap();
        let mut found = HashSet::new();
        for url in urls {
            if let Some(record) = summaries.get_mut(url) {
                record.last_accessed_at = now;
                found.insert(url.clone());
            }
        }
        Ok(found)
    }

    async fn expire_summaries(&self, policy: &ExpiryPolicy) -> StorageResult<ExpiryReport> {
        let now = self.now();
        let mut summaries = self.summaries.write().unwrap();

        let before = summaries.len();
        let long_cutoff = now - policy.long_ttl;
        summaries.retain(|_, r| r.last_accessed_at >= long_cutoff);
        let long = before - summaries.len();

        let before = summaries.len();
        let short_cutoff = now - policy.short_ttl;
        summaries.retain(|_, r| {
            r.last_accessed_at >= short_cutoff || r.tier.is_some_and(|t| policy.tiers.is_final(t))
        });
        let short = before - summaries.len();

        Ok(ExpiryReport {
            long,
            short,
            translations: 0,
        })
    }

    async fn count_summaries(&self) -> StorageResult<usize> {
        Ok(self.summaries.read().unwrap().len())
    }
}

#[async_trait]
impl TranslationStore for MemoryStore {
    async fn get_translation(&self, source: &str, language: &str) -> StorageResult<TranslationRecord> {
        let now = self.now();
        let mut translations = self.translations.write().unwrap();
        let key = (source.to_string(), language.to_string());
        Ok(match translations.get_mut(&key) {
            Some(record) => {
                record.last_accessed_at = now;
                record.clone()
            }
            None => TranslationRecord::new(source, language, "", now),
        })
    }

    async fn has_translation(&self, source: &str, language: &str) -> StorageResult<bool> {
        let key = (source.to_string(), language.to_string());
        Ok(self.translations.read().unwrap().contains_key(&key))
    }

    async fn put_translation(&self, record: &TranslationRecord) -> StorageResult<()> {
        let mut stored = record.clone().truncated();
        stored.last_accessed_at = self.now();
        self.translations
            .write()
            .unwrap()
            .insert((stored.source.clone(), stored.language.clone()), stored);
        Ok(())
    }

    async fn expire_translations(&self, ttl: Duration) -> StorageResult<usize> {
        let cutoff = self.now() - ttl;
        let mut translations = self.translations.write().unwrap();
        let before = translations.len();
        translations.retain(|_, r| r.last_accessed_at >= cutoff);
        Ok(before - translations.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClock;
    use crate::types::tier::Tier;

    fn store() -> (MemoryStore, MockClock) {
        let clock = MockClock::new();
        (MemoryStore::new().with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_miss_returns_empty_record() {
        let (store, _) = store();
        let record = store.get_summary("http://a.com").await.unwrap();
        assert!(record.is_empty());
        assert_eq!(store.count_summaries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_keeps_created_at() {
        let (store, clock) = store();
        let first = store
            .put_summary(&SummaryRecord::new("http://a.com", "one", Tier::Full, clock.now()))
            .await
            .unwrap();
        clock.advance(Duration::hours(3));
        let second = store
            .put_summary(&SummaryRecord::new("http://a.com", "two", Tier::External, clock.now()))
            .await
            .unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.last_accessed_at, clock.now());
        assert_eq!(store.get_summary("http://a.com").await.unwrap().text, "two");
    }

    #[tokio::test]
    async fn test_peek_does_not_touch() {
        let (store, clock) = store();
        let put = store
            .put_summary(&SummaryRecord::new("http://a.com", "x", Tier::Full, clock.now()))
            .await
            .unwrap();
        clock.advance(Duration::hours(1));
        let peeked = store.peek_summary("http://a.com").await.unwrap().unwrap();
        assert_eq!(peeked.last_accessed_at, put.last_accessed_at);
        let got = store.get_summary("http://a.com").await.unwrap();
        assert_eq!(got.last_accessed_at, clock.now());
    }

    #[tokio::test]
    async fn test_translation_miss_and_hit() {
        let (store, clock) = store();
        assert!(store.get_translation("hi", "zh").await.unwrap().is_empty());
        store
            .put_translation(&TranslationRecord::new("hi", "zh", "你好", clock.now()))
            .await
            .unwrap();
        assert!(store.has_translation("hi", "zh").await.unwrap());
        assert!(!store.has_translation("hi", "ja").await.unwrap());
        assert_eq!(store.get_translation("hi", "zh").await.unwrap().translated, "你好");

        clock.advance(Duration::days(15));
        assert_eq!(store.expire_translations(Duration::days(14)).await.unwrap(), 1);
        assert_eq!(store.translation_count(), 0);
    }
}
