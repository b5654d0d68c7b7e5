//! Configuration for summarization and cache expiry.

use std::path::PathBuf;

use chrono::Duration;

use super::tier::TierPolicy;

/// Knobs for [`crate::Orchestrator`].
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    /// Extracts at or below this many characters are used as-is.
    ///
    /// Default: 400.
    pub summary_size: usize,

    /// Character budget when extracting a document for summarization.
    ///
    /// Default: 32 KiB.
    pub max_content_size: usize,

    /// Minimum importance for the hosted backend. Default: 100.
    pub external_threshold: i64,

    /// Minimum importance for local inference. Default: 10.
    pub local_threshold: i64,

    /// Translate hosted summaries and cache the result.
    pub translate: bool,

    /// Language key translations are stored under. Default: `zh`.
    pub translation_language: String,

    /// Language name given to the translator. Default: `simplified Chinese`.
    pub translation_target: String,

    /// Where selected illustrations are written. `None` disables
    /// illustration selection.
    pub image_dir: Option<PathBuf>,

    /// Tiers that are never re-summarized.
    pub tiers: TierPolicy,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            summary_size: 400,
            max_content_size: 32 * 1024,
            external_threshold: 100,
            local_threshold: 10,
            translate: true,
            translation_language: "zh".to_string(),
            translation_target: "simplified Chinese".to_string(),
            image_dir: None,
            tiers: TierPolicy::default(),
        }
    }
}

impl SummaryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary_size(mut self, size: usize) -> Self {
        self.summary_size = size;
        self
    }

    pub fn with_max_content_size(mut self, size: usize) -> Self {
        self.max_content_size = size;
        self
    }

    pub fn with_external_threshold(mut self, threshold: i64) -> Self {
        self.external_threshold = threshold;
        self
    }

    pub fn with_local_threshold(mut self, threshold: i64) -> Self {
        self.local_threshold = threshold;
        self
    }

    pub fn with_translation(mut self, enabled: bool) -> Self {
        self.translate = enabled;
        self
    }

    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = Some(dir.into());
        self
    }

    pub fn with_tiers(mut self, tiers: TierPolicy) -> Self {
        self.tiers = tiers;
        self
    }
}

/// Two-tier retention for the cache.
#[derive(Debug, Clone)]
pub struct ExpiryPolicy {
    /// Anything not read for this long is deleted. Default: 14 days.
    pub long_ttl: Duration,

    /// Non-final tiers not read for this long are deleted. Default: 1 day.
    pub short_ttl: Duration,

    /// Tiers protected from the short sweep.
    pub tiers: TierPolicy,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            long_ttl: Duration::days(14),
            short_ttl: Duration::days(1),
            tiers: TierPolicy::default(),
        }
    }
}

impl ExpiryPolicy {
    pub fn with_long_ttl(mut self, ttl: Duration) -> Self {
        self.long_ttl = ttl;
        self
    }

    pub fn with_short_ttl(mut self, ttl: Duration) -> Self {
        self.short_ttl = ttl;
        self
    }

    pub fn with_tiers(mut self, tiers: TierPolicy) -> Self {
        self.tiers = tiers;
        self
    }
}

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    /// Summaries past the long retention window
    pub long: usize,
    /// Non-final summaries past the short window
    pub short: usize,
    pub translations: usize,
}

impl ExpiryReport {
    pub fn total(&self) -> usize {
        self.long + self.short + self.translations
    }
}
