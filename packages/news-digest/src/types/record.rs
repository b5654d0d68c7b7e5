//! Cached summary and translation records.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use page_content::ImageMeta;

use super::tier::Tier;

/// Column widths of the backing store. Longer values are truncated on write.
pub const MAX_URL_CHARS: usize = 1024;
pub const MAX_TEXT_CHARS: usize = 65535;
pub const MAX_FAVICON_CHARS: usize = 1024;
pub const MAX_IMAGE_NAME_CHARS: usize = 64;
pub const MAX_IMAGE_META_CHARS: usize = 2048;
pub const MAX_LANGUAGE_CHARS: usize = 16;

/// Timestamps are kept at microsecond precision so they survive a trip
/// through the database unchanged.
pub fn normalize_time(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(6)
}

fn truncate(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}

/// The cached outcome of pulling one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub url: String,
    pub text: String,
    /// `None` until something has been settled for this URL.
    pub tier: Option<Tier>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub favicon: String,
    /// File name in the image directory. `Some("")` means selection ran and
    /// found nothing; `None` means it has not run.
    pub image_name: Option<String>,
    /// [`ImageMeta`] JSON of the selected image, empty when there is none.
    pub image_meta: String,
}

impl SummaryRecord {
    /// A record with nothing settled, as returned for cache misses.
    pub fn empty(url: impl Into<String>, now: DateTime<Utc>) -> Self {
        let now = normalize_time(now);
        Self {
            url: url.into(),
            text: String::new(),
            tier: None,
            created_at: now,
            last_accessed_at: now,
            favicon: String::new(),
            image_name: None,
            image_meta: String::new(),
        }
    }

    pub fn new(url: impl Into<String>, text: impl Into<String>, tier: Tier, now: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            tier: Some(tier),
            ..Self::empty(url, now)
        }
    }

    pub fn with_favicon(mut self, favicon: impl Into<String>) -> Self {
        self.favicon = favicon.into();
        self
    }

    pub fn with_image(mut self, name: impl Into<String>, meta: &ImageMeta) -> Self {
        self.image_name = Some(name.into());
        self.image_meta = meta.to_json();
        self
    }

    /// Nothing settled yet.
    pub fn is_empty(&self) -> bool {
        self.tier.is_none() && self.text.is_empty()
    }

    /// Decoded image metadata, if any.
    pub fn image(&self) -> Option<ImageMeta> {
        ImageMeta::from_json(&self.image_meta).ok().flatten()
    }

    /// Clip every field to its column width and normalize timestamps.
    pub fn truncated(mut self) -> Self {
        truncate(&mut self.url, MAX_URL_CHARS);
        truncate(&mut self.text, MAX_TEXT_CHARS);
        truncate(&mut self.favicon, MAX_FAVICON_CHARS);
        if let Some(name) = self.image_name.as_mut() {
            truncate(name, MAX_IMAGE_NAME_CHARS);
        }
        truncate(&mut self.image_meta, MAX_IMAGE_META_CHARS);
        self.created_at = normalize_time(self.created_at);
        self.last_accessed_at = normalize_time(self.last_accessed_at);
        self
    }
}

/// A cached translation keyed by `(source, language)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub source: String,
    pub language: String,
    /// Empty on a cache miss.
    pub translated: String,
    pub last_accessed_at: DateTime<Utc>,
}

impl TranslationRecord {
    pub fn new(
        source: impl Into<String>,
        language: impl Into<String>,
        translated: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            source: source.into(),
            language: language.into(),
            translated: translated.into(),
            last_accessed_at: normalize_time(now),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.translated.is_empty()
    }

    pub fn truncated(mut self) -> Self {
        truncate(&mut self.source, MAX_TEXT_CHARS);
        truncate(&mut self.translated, MAX_TEXT_CHARS);
        truncate(&mut self.language, MAX_LANGUAGE_CHARS);
        self.last_accessed_at = normalize_time(self.last_accessed_at);
        self
    }
}
