//! Per-story summarization: extract, pick a tier, attach an illustration,
//! cache the outcome.
//!
//! Tiers are tried as an ordered list of [`Stage`]s. The first stage that
//! answers settles the story; when none does, the extract itself is kept
//! as a [`Tier::Prefix`] summary and retried on the next pull.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use lazy_static::lazy_static;
use page_content::{fetch_document, is_embed_markup, Fetcher, ImageSelector, Page};
pub use page_content::text::contains_cjk;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::traits::store::CacheStore;
use crate::traits::summarizer::{Summarizer, Translator};
use crate::types::{
    config::SummaryConfig,
    record::{SummaryRecord, TranslationRecord},
    story::Story,
    tier::Tier,
};

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref LEADING_LABEL: Regex = Regex::new(r"(?i)^(abstract|summary):\s*").unwrap();
}

/// Collapse whitespace runs and drop a leading `Abstract:` or `Summary:`
/// label, as found on papers and PDFs.
pub fn normalize_content(raw: &str) -> String {
    let collapsed = WHITESPACE.replace_all(raw, " ");
    LEADING_LABEL.replace(collapsed.trim(), "").trim().to_string()
}

/// A summarization step, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Embed markup is kept as-is
    Embed,
    /// Short extracts need no summarizing
    Full,
    /// Hosted backend, gated by importance
    External,
    /// Local backends, gated by a lower importance threshold
    Local,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [Stage::Embed, Stage::Full, Stage::External, Stage::Local];
}

/// What every stage sees.
struct StageInput<'a> {
    story: &'a Story,
    cached: &'a SummaryRecord,
    content: &'a str,
}

/// Fetches the document the first time it is needed.
struct LazyPage<'a> {
    fetcher: &'a dyn Fetcher,
    url: &'a str,
    page: Option<Page>,
}

impl<'a> LazyPage<'a> {
    fn new(fetcher: &'a dyn Fetcher, url: &'a str) -> Self {
        Self {
            fetcher,
            url,
            page: None,
        }
    }

    async fn get(&mut self) -> page_content::Result<&Page> {
        let page = match self.page.take() {
            Some(page) => page,
            None => {
                info!(url = %self.url, "Fetching document");
                let doc = fetch_document(self.fetcher, self.url).await?;
                Page::from_document(&doc)?
            }
        };
        Ok(self.page.insert(page))
    }
}

/// Drives one story through extraction, the tier cascade and the cache.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = Orchestrator::new(store, fetcher)
///     .with_external(hosted.clone())
///     .with_translator(hosted)
///     .with_local(llama);
///
/// let record = orchestrator.pull_content(&story).await;
/// ```
pub struct Orchestrator {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    external: Option<Arc<dyn Summarizer>>,
    translator: Option<Arc<dyn Translator>>,
    local: Vec<Arc<dyn Summarizer>>,
    config: SummaryConfig,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            store,
            fetcher,
            external: None,
            translator: None,
            local: Vec::new(),
            config: SummaryConfig::default(),
        }
    }

    /// Set the hosted summarizer.
    pub fn with_external(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.external = Some(summarizer);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Append a local backend. Backends are tried in the order added.
    pub fn with_local(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.local.push(summarizer);
        self
    }

    pub fn with_config(mut self, config: SummaryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Pull one story. Never fails: on any error or panic the cached record
    /// for the URL is returned instead, or an empty one.
    pub async fn pull_content(&self, story: &Story) -> SummaryRecord {
        match AssertUnwindSafe(self.try_pull(story)).catch_unwind().await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                warn!(url = %story.url, error = %e, "Pull failed, using cached record");
                self.cached_or_empty(&story.url).await
            }
            Err(_) => {
                warn!(url = %story.url, "Pull panicked, using cached record");
                self.cached_or_empty(&story.url).await
            }
        }
    }

    async fn cached_or_empty(&self, url: &str) -> SummaryRecord {
        match self.store.get_summary(url).await {
            Ok(record) => record,
            Err(e) => {
                warn!(url = %url, error = %e, "Cache read failed");
                SummaryRecord::empty(url, Utc::now())
            }
        }
    }

    async fn try_pull(&self, story: &Story) -> Result<SummaryRecord> {
        let mut record = self.store.get_summary(&story.url).await?;
        let mut page = LazyPage::new(self.fetcher.as_ref(), &story.url);

        if record.favicon.is_empty() {
            record.favicon = page.get().await?.favicon_url();
        }

        let (text, tier) = self.summarize(story, &record, &mut page).await?;
        info!(url = %story.url, tier = %tier, chars = text.chars().count(), "Summary settled");
        record.text = text;
        record.tier = Some(tier);

        self.attach_illustration(&mut record, &mut page).await;

        match self.store.put_summary(&record).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                warn!(url = %story.url, error = %e, "Cache write failed, keeping result in memory");
                Ok(record)
            }
        }
    }

    async fn summarize(
        &self,
        story: &Story,
        cached: &SummaryRecord,
        page: &mut LazyPage<'_>,
    ) -> Result<(String, Tier)> {
        if let Some(tier) = cached.tier.filter(|t| self.config.tiers.is_final(*t)) {
            info!(url = %story.url, tier = %tier, "Cache hit");
            return Ok((cached.text.clone(), tier));
        }

        let content = normalize_content(&page.get().await?.get_content(self.config.max_content_size));
        let input = StageInput {
            story,
            cached,
            content: &content,
        };

        for stage in Stage::ORDER {
            if let Some(settled) = self.run_stage(stage, &input).await {
                return Ok(settled);
            }
        }
        Ok((content, Tier::Prefix))
    }

    async fn run_stage(&self, stage: Stage, input: &StageInput<'_>) -> Option<(String, Tier)> {
        match stage {
            Stage::Embed => is_embed_markup(input.content).then(|| (input.content.to_string(), Tier::Embed)),
            Stage::Full => self.full_text(input),
            Stage::External => self.external_summary(input).await,
            Stage::Local => self.local_summary(input).await,
        }
    }

    fn full_text(&self, input: &StageInput<'_>) -> Option<(String, Tier)> {
        let len = input.content.chars().count();
        if len > self.config.summary_size {
            return None;
        }
        match input.cached.tier {
            Some(tier) if tier.is_generated() && !input.cached.text.is_empty() => {
                debug!(url = %input.story.url, tier = %tier, "Short extract, keeping cached summary");
                Some((input.cached.text.clone(), tier))
            }
            _ => {
                debug!(url = %input.story.url, chars = len, "Short extract used whole");
                Some((input.content.to_string(), Tier::Full))
            }
        }
    }

    async fn external_summary(&self, input: &StageInput<'_>) -> Option<(String, Tier)> {
        let Some(external) = &self.external else {
            debug!("No hosted summarizer configured");
            return None;
        };
        let story = input.story;
        if story.importance < self.config.external_threshold && !story.is_hiring() {
            info!(url = %story.url, importance = story.importance, "Importance too low for hosted summarizer");
            return None;
        }

        match external.summarize(input.content).await {
            Ok(summary) if !summary.trim().is_empty() => {
                self.translate_summary(&summary).await;
                Some((summary, external.tier()))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(url = %story.url, backend = %external.name(), error = %e, "Hosted summarizer failed");
                None
            }
        }
    }

    async fn local_summary(&self, input: &StageInput<'_>) -> Option<(String, Tier)> {
        let story = input.story;
        if story.importance < self.config.local_threshold {
            info!(url = %story.url, importance = story.importance, "Importance too low for local inference");
            return None;
        }
        if let Some(tier) = input.cached.tier.filter(|t| t.is_local()) {
            if !input.cached.text.is_empty() {
                info!(url = %story.url, tier = %tier, "Cache hit");
                return Some((input.cached.text.clone(), tier));
            }
        }

        for backend in &self.local {
            match backend.summarize(input.content).await {
                Ok(summary) if !summary.trim().is_empty() => return Some((summary, backend.tier())),
                Ok(_) => debug!(backend = %backend.name(), "Local backend returned nothing"),
                Err(e) => warn!(url = %story.url, backend = %backend.name(), error = %e, "Local backend failed"),
            }
        }
        None
    }

    /// Cache a translation of a fresh hosted summary. Failures are logged only.
    async fn translate_summary(&self, summary: &str) {
        let Some(translator) = &self.translator else {
            return;
        };
        if !self.config.translate {
            return;
        }
        let language = &self.config.translation_language;

        match self.store.has_translation(summary, language).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Translation lookup failed");
                return;
            }
        }

        let translated = match translator.translate(summary, &self.config.translation_target).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!(error = %e, "Translation failed");
                return;
            }
        };
        if !contains_cjk(&translated) {
            info!(translated = %translated, "Translation has no CJK characters, discarding");
            return;
        }

        let record = TranslationRecord::new(summary, language.as_str(), translated, Utc::now());
        if let Err(e) = self.store.put_translation(&record).await {
            warn!(error = %e, "Translation cache write failed");
        }
    }

    /// Pick, compress and save an illustration unless one is already on disk.
    async fn attach_illustration(&self, record: &mut SummaryRecord, page: &mut LazyPage<'_>) {
        let Some(dir) = &self.config.image_dir else {
            return;
        };
        if let Some(name) = &record.image_name {
            if dir.join(name).exists() {
                debug!(url = %record.url, image = %name, "Cache hit image");
                return;
            }
            info!(url = %record.url, image = %name, "Cached image missing on disk");
        }

        let (url, candidates) = match page.get().await {
            Ok(page) => (page.url().to_string(), page.image_candidates()),
            Err(e) => {
                warn!(url = %record.url, error = %e, "Cannot load page for illustration");
                return;
            }
        };

        let selected = ImageSelector::new(self.fetcher.clone())
            .with_referrer(url)
            .select(&candidates)
            .await;

        let Some(mut image) = selected else {
            record.image_name = Some(String::new());
            record.image_meta = String::new();
            return;
        };

        image.try_compress();
        let saved = std::fs::create_dir_all(dir).and_then(|_| image.save(dir));
        match saved {
            Ok(path) => {
                debug!(url = %record.url, path = %path.display(), "Illustration saved");
                record.image_name = Some(image.unique_name());
                record.image_meta = image.meta().to_json();
            }
            Err(e) => warn!(url = %record.url, error = %e, "Failed to save illustration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_content() {
        assert_eq!(normalize_content("  Abstract:\n  We   study\tthings. "), "We study things.");
        assert_eq!(normalize_content("SUMMARY: short"), "short");
        assert_eq!(normalize_content("A summary: of sorts"), "A summary: of sorts");
    }

    #[test]
    fn test_contains_cjk() {
        assert!(contains_cjk("这是摘要"));
        assert!(contains_cjk("Rust 编程"));
        assert!(!contains_cjk("This is a summary."));
        assert!(!contains_cjk("こんにちは"));
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::ORDER[0], Stage::Embed);
        assert_eq!(Stage::ORDER[3], Stage::Local);
    }
}
