//! SQLite storage implementation.
//!
//! A file-based cache using SQLite. Good for:
//! - Single-host deployments
//! - Testing with persistent data
//!
//! Timestamps are stored as RFC 3339 text with fixed microsecond width so
//! that string comparison orders them correctly.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::clock::{Clock, SystemClock};
use crate::error::{StorageError, StorageResult};
use crate::traits::store::{SummaryStore, TranslationStore};
use crate::types::{
    config::{ExpiryPolicy, ExpiryReport},
    record::{normalize_time, SummaryRecord, TranslationRecord},
    tier::Tier,
};

/// URLs bound per statement in `filter_existing`, below SQLite's
/// host-parameter limit.
const FILTER_CHUNK_SIZE: usize = 500;

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string().into())
}

fn timestamp(t: DateTime<Utc>) -> String {
    normalize_time(t).to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(key: &str, s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow {
            key: key.to_string(),
            reason: format!("bad timestamp {s:?}: {e}"),
        })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// SQLite-backed summary and translation cache.
pub struct SqliteStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    /// Rows loaded by `filter_existing`, handed out by the next `get_summary`.
    prefetched: RwLock<HashMap<String, SummaryRecord>>,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite:./digest.db?mode=rwc` - File-based, created if missing
    /// - `sqlite::memory:` - Use [`Self::in_memory`] instead
    pub async fn new(database_url: &str) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Self::from_pool(pool).await
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Uses a single connection that is never recycled, since each SQLite
    /// memory connection is its own database.
    pub async fn in_memory() -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> StorageResult<Self> {
        let store = Self {
            pool,
            clock: Arc::new(SystemClock),
            prefetched: RwLock::new(HashMap::new()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Use a custom time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summaries (
                url TEXT PRIMARY KEY,
                text TEXT NOT NULL DEFAULT '',
                tier TEXT,
                created_at TEXT NOT NULL,
                last_accessed_at TEXT NOT NULL,
                favicon TEXT NOT NULL DEFAULT '',
                image_name TEXT,
                image_meta TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_summaries_last_accessed ON summaries(last_accessed_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS translations (
                source TEXT NOT NULL,
                language TEXT NOT NULL,
                translated TEXT NOT NULL,
                last_accessed_at TEXT NOT NULL,
                PRIMARY KEY (source, language)
            );

            CREATE INDEX IF NOT EXISTS idx_translations_last_accessed ON translations(last_accessed_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        normalize_time(self.clock.now())
    }
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct SummaryRow {
    url: String,
    text: String,
    tier: Option<String>,
    created_at: String,
    last_accessed_at: String,
    favicon: String,
    image_name: Option<String>,
    image_meta: String,
}

impl SummaryRow {
    fn into_record(self) -> StorageResult<SummaryRecord> {
        let tier = match self.tier.as_deref() {
            Some(name) => Some(Tier::from_str(name).map_err(|e| StorageError::CorruptRow {
                key: self.url.clone(),
                reason: e.to_string(),
            })?),
            None => None,
        };
        Ok(SummaryRecord {
            created_at: parse_timestamp(&self.url, &self.created_at)?,
            last_accessed_at: parse_timestamp(&self.url, &self.last_accessed_at)?,
            url: self.url,
            text: self.text,
            tier,
            favicon: self.favicon,
            image_name: self.image_name,
            image_meta: self.image_meta,
        })
    }
}

#[derive(Debug, FromRow)]
struct TranslationRow {
    source: String,
    language: String,
    translated: String,
    last_accessed_at: String,
}

impl TranslationRow {
    fn into_record(self) -> StorageResult<TranslationRecord> {
        let last_accessed_at = parse_timestamp(&self.source, &self.last_accessed_at)?;
        Ok(TranslationRecord {
            source: self.source,
            language: self.language,
            translated: self.translated,
            last_accessed_at,
        })
    }
}

#[async_trait]
impl SummaryStore for SqliteStore {
    async fn get_summary(&self, url: &str) -> StorageResult<SummaryRecord> {
        let prefetched = self.prefetched.write().unwrap().remove(url);
        if let Some(record) = prefetched {
            return Ok(record);
        }

        let now = self.now();
        let row: Option<SummaryRow> = sqlx::query_as("SELECT * FROM summaries WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(SummaryRecord::empty(url, now));
        };

        sqlx::query("UPDATE summaries SET last_accessed_at = ? WHERE url = ?")
            .bind(timestamp(now))
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let mut record = row.into_record()?;
        record.last_accessed_at = now;
        Ok(record)
    }

    async fn peek_summary(&self, url: &str) -> StorageResult<Option<SummaryRecord>> {
        let row: Option<SummaryRow> = sqlx::query_as("SELECT * FROM summaries WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(SummaryRow::into_record).transpose()
    }

    async fn put_summary(&self, record: &SummaryRecord) -> StorageResult<SummaryRecord> {
        let mut stored = record.clone().truncated();
        stored.last_accessed_at = self.now();
        self.prefetched.write().unwrap().remove(&stored.url);

        sqlx::query(
            r#"
            INSERT INTO summaries (url, text, tier, created_at, last_accessed_at, favicon, image_name, image_meta)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                text = excluded.text,
                tier = excluded.tier,
                last_accessed_at = excluded.last_accessed_at,
                favicon = excluded.favicon,
                image_name = excluded.image_name,
                image_meta = excluded.image_meta
            "#,
        )
        .bind(&stored.url)
        .bind(&stored.text)
        .bind(stored.tier.map(|t| t.as_str()))
        .bind(timestamp(stored.created_at))
        .bind(timestamp(stored.last_accessed_at))
        .bind(&stored.favicon)
        .bind(&stored.image_name)
        .bind(&stored.image_meta)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let created_at: (String,) = sqlx::query_as("SELECT created_at FROM summaries WHERE url = ?")
            .bind(&stored.url)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        stored.created_at = parse_timestamp(&stored.url, &created_at.0)?;

        Ok(stored)
    }

    async fn filter_existing(&self, urls: &[String]) -> StorageResult<HashSet<String>> {
        if urls.is_empty() {
            return Ok(HashSet::new());
        }
        let now = self.now();

        let mut rows = Vec::new();
        for chunk in urls.chunks(FILTER_CHUNK_SIZE) {
            let select = format!("SELECT * FROM summaries WHERE url IN ({})", placeholders(chunk.len()));
            let mut query = sqlx::query_as::<_, SummaryRow>(&select);
            for url in chunk {
                query = query.bind(url);
            }
            rows.extend(query.fetch_all(&self.pool).await.map_err(db_err)?);

            let update = format!(
                "UPDATE summaries SET last_accessed_at = ? WHERE url IN ({})",
                placeholders(chunk.len())
            );
            let mut touch = sqlx::query(&update).bind(timestamp(now));
            for url in chunk {
                touch = touch.bind(url);
            }
            touch.execute(&self.pool).await.map_err(db_err)?;
        }

        let mut found = HashSet::new();
        let mut prefetched = self.prefetched.write().unwrap();
        for row in rows {
            match row.into_record() {
                Ok(mut record) => {
                    record.last_accessed_at = now;
                    found.insert(record.url.clone());
                    prefetched.insert(record.url.clone(), record);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable cached summary"),
            }
        }
        Ok(found)
    }

    async fn expire_summaries(&self, policy: &ExpiryPolicy) -> StorageResult<ExpiryReport> {
        let now = self.now();
        self.prefetched.write().unwrap().clear();

        let long = sqlx::query("DELETE FROM summaries WHERE last_accessed_at < ?")
            .bind(timestamp(now - policy.long_ttl))
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected() as usize;

        let final_tiers: Vec<&'static str> = policy.tiers.final_tiers().map(|t| t.as_str()).collect();
        let sql = if final_tiers.is_empty() {
            "DELETE FROM summaries WHERE last_accessed_at < ?".to_string()
        } else {
            format!(
                "DELETE FROM summaries WHERE last_accessed_at < ? AND (tier IS NULL OR tier NOT IN ({}))",
                placeholders(final_tiers.len())
            )
        };
        let mut query = sqlx::query(&sql).bind(timestamp(now - policy.short_ttl));
        for tier in final_tiers {
            query = query.bind(tier);
        }
        let short = query.execute(&self.pool).await.map_err(db_err)?.rows_affected() as usize;

        Ok(ExpiryReport {
            long,
            short,
            translations: 0,
        })
    }

    async fn count_summaries(&self) -> StorageResult<usize> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM summaries")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count.0 as usize)
    }
}

#[async_trait]
impl TranslationStore for SqliteStore {
    async fn get_translation(&self, source: &str, language: &str) -> StorageResult<TranslationRecord> {
        let now = self.now();
        let row: Option<TranslationRow> =
            sqlx::query_as("SELECT * FROM translations WHERE source = ? AND language = ?")
                .bind(source)
                .bind(language)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(TranslationRecord::new(source, language, "", now));
        };

        sqlx::query("UPDATE translations SET last_accessed_at = ? WHERE source = ? AND language = ?")
            .bind(timestamp(now))
            .bind(source)
            .bind(language)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let mut record = row.into_record()?;
        record.last_accessed_at = now;
        Ok(record)
    }

    async fn has_translation(&self, source: &str, language: &str) -> StorageResult<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM translations WHERE source = ? AND language = ?")
                .bind(source)
                .bind(language)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(count.0 > 0)
    }

    async fn put_translation(&self, record: &TranslationRecord) -> StorageResult<()> {
        let mut stored = record.clone().truncated();
        stored.last_accessed_at = self.now();

        sqlx::query(
            r#"
            INSERT INTO translations (source, language, translated, last_accessed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(source, language) DO UPDATE SET
                translated = excluded.translated,
                last_accessed_at = excluded.last_accessed_at
            "#,
        )
        .bind(&stored.source)
        .bind(&stored.language)
        .bind(&stored.translated)
        .bind(timestamp(stored.last_accessed_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn expire_translations(&self, ttl: Duration) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM translations WHERE last_accessed_at < ?")
            .bind(timestamp(self.now() - ttl))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() as usize)
    }
}
