//! Integration tests for the tier cascade, the cache and the expiry sweep,
//! run against canned pages and mock backends.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use news_digest::error::BackendResult;
use news_digest::testing::{MockClock, MockSummarizer, MockTranslator};
use news_digest::{
    run_expiry, CacheStore, ExpiryPolicy, MemoryStore, Orchestrator, SqliteStore, Story, Summarizer,
    SummaryConfig, SummaryRecord, SummaryStore, Tier, TierPolicy, TranslationStore,
};
use page_content::testing::MockFetcher;

const STORY_URL: &str = "http://news.test/story";
const NOTE_URL: &str = "http://news.test/note";

fn noise_png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        let v = (x.wrapping_mul(7919) ^ y.wrapping_mul(104729)).wrapping_mul(2654435761);
        Rgb([(v >> 8) as u8, (v >> 16) as u8, (v >> 24) as u8])
    }));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn article_html() -> Vec<u8> {
    let paragraph = "The committee published its findings on Tuesday, and the results were \
        broadly in line with what independent researchers had been predicting for months. ";
    format!(
        r#"<html><head><title>Findings published</title></head>
        <body>
          <div class="article-body">
            <h1>Findings published</h1>
            <img src="/figure.png">
            <p>{p}</p><p>{p}</p><p>{p}</p><p>{p}</p>
          </div>
        </body></html>"#,
        p = paragraph
    )
    .into_bytes()
}

fn note_html() -> Vec<u8> {
    br#"<html><head><title>Note</title>
    <meta name="description" content="The harbour reopens to ferries next week.">
    </head><body><div><a href="/">Home</a></div></body></html>"#
        .to_vec()
}

fn fetcher() -> MockFetcher {
    MockFetcher::new()
        .with_response(STORY_URL, "text/html; charset=utf-8", article_html())
        .with_response(NOTE_URL, "text/html", note_html())
        .with_response("http://news.test/figure.png", "image/png", noise_png(300, 200))
}

struct Backends {
    external: MockSummarizer,
    translator: MockTranslator,
    llm: MockSummarizer,
    seq2seq: MockSummarizer,
}

impl Backends {
    fn new() -> Self {
        Self {
            external: MockSummarizer::new(Tier::External).with_response("A committee published its findings."),
            translator: MockTranslator::new().with_response("委员会公布了调查结果。"),
            llm: MockSummarizer::new(Tier::LocalLlm),
            seq2seq: MockSummarizer::new(Tier::LocalModel),
        }
    }

    fn total_calls(&self) -> usize {
        self.external.call_count() + self.llm.call_count() + self.seq2seq.call_count()
    }

    fn orchestrator(&self, store: Arc<dyn CacheStore>, fetcher: &MockFetcher) -> Orchestrator {
        Orchestrator::new(store, Arc::new(fetcher.clone()))
            .with_external(Arc::new(self.external.clone()))
            .with_translator(Arc::new(self.translator.clone()))
            .with_local(Arc::new(self.llm.clone()))
            .with_local(Arc::new(self.seq2seq.clone()))
    }
}

/// Panics on every call.
struct ExplodingSummarizer;

#[async_trait]
impl Summarizer for ExplodingSummarizer {
    fn name(&self) -> &str {
        "exploding"
    }

    fn tier(&self) -> Tier {
        Tier::External
    }

    async fn summarize(&self, _content: &str) -> BackendResult<String> {
        panic!("model crashed")
    }
}

#[tokio::test]
async fn test_below_threshold_never_calls_external() {
    let backends = Backends::new();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = backends.orchestrator(store, &fetcher());

    let record = orchestrator.pull_content(&Story::new(STORY_URL, 50)).await;

    assert_eq!(backends.external.call_count(), 0);
    assert_eq!(backends.llm.call_count(), 1);
    assert_eq!(record.tier, Some(Tier::LocalLlm));
    assert_eq!(record.text, "Summary by Llama.");
    assert_eq!(record.favicon, "http://news.test/favicon.ico");
}

#[tokio::test]
async fn test_low_importance_keeps_prefix() {
    let backends = Backends::new();
    let orchestrator = backends.orchestrator(Arc::new(MemoryStore::new()), &fetcher());

    let record = orchestrator.pull_content(&Story::new(STORY_URL, 3)).await;

    assert_eq!(backends.total_calls(), 0);
    assert_eq!(record.tier, Some(Tier::Prefix));
    assert!(record.text.starts_with("The committee published its findings"));
    assert!(!record.text.contains("  "));
}

#[tokio::test]
async fn test_external_summary_is_translated() {
    let backends = Backends::new();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = backends.orchestrator(store.clone(), &fetcher());

    let record = orchestrator.pull_content(&Story::new(STORY_URL, 250)).await;

    assert_eq!(record.tier, Some(Tier::External));
    assert_eq!(record.text, "A committee published its findings.");
    assert_eq!(backends.llm.call_count(), 0);
    let translation = store.get_translation(&record.text, "zh").await.unwrap();
    assert_eq!(translation.translated, "委员会公布了调查结果。");

    // An existing translation is not requested again.
    let other = Story::new("http://news.test/story?page=2", 250);
    let fetcher = fetcher().with_response(&other.url, "text/html", article_html());
    backends.orchestrator(store, &fetcher).pull_content(&other).await;
    assert_eq!(backends.translator.call_count(), 1);
}

#[tokio::test]
async fn test_translation_without_cjk_is_discarded() {
    let mut backends = Backends::new();
    backends.translator = MockTranslator::new().with_response("Committee findings.");
    let store = Arc::new(MemoryStore::new());
    let orchestrator = backends.orchestrator(store.clone(), &fetcher());

    let record = orchestrator.pull_content(&Story::new(STORY_URL, 250)).await;

    assert_eq!(record.tier, Some(Tier::External));
    assert_eq!(backends.translator.call_count(), 1);
    assert!(!store.has_translation(&record.text, "zh").await.unwrap());
}

#[tokio::test]
async fn test_translation_failure_is_swallowed() {
    let mut backends = Backends::new();
    backends.translator = MockTranslator::new().failing();
    let orchestrator = backends.orchestrator(Arc::new(MemoryStore::new()), &fetcher());

    let record = orchestrator.pull_content(&Story::new(STORY_URL, 250)).await;
    assert_eq!(record.tier, Some(Tier::External));
}

#[tokio::test]
async fn test_final_tier_is_not_summarized_or_fetched_again() {
    let images = tempfile::tempdir().unwrap();
    let backends = Backends::new();
    let fetcher = fetcher();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = backends
        .orchestrator(store.clone(), &fetcher)
        .with_config(SummaryConfig::default().with_image_dir(images.path()));
    let story = Story::new(STORY_URL, 250);

    let first = orchestrator.pull_content(&story).await;
    let image_name = first.image_name.clone().unwrap();
    assert!(!image_name.is_empty());
    assert!(images.path().join(&image_name).exists());
    assert_eq!(first.image().unwrap().url, "http://news.test/figure.png");

    let calls = backends.total_calls();
    let fetches = fetcher.calls().len();
    let second = orchestrator.pull_content(&story).await;

    assert_eq!(backends.total_calls(), calls);
    assert_eq!(fetcher.calls().len(), fetches);
    assert_eq!(second.text, first.text);
    assert_eq!(second.tier, Some(Tier::External));
    assert_eq!(second.image_name, Some(image_name));
    assert_eq!(second.created_at, first.created_at);
}

#[tokio::test]
async fn test_page_without_image_records_empty_name() {
    let images = tempfile::tempdir().unwrap();
    let backends = Backends::new();
    let orchestrator = backends
        .orchestrator(Arc::new(MemoryStore::new()), &fetcher())
        .with_config(SummaryConfig::default().with_image_dir(images.path()));

    let record = orchestrator.pull_content(&Story::new(NOTE_URL, 250)).await;
    assert_eq!(record.image_name.as_deref(), Some(""));
    assert!(record.image().is_none());
}

#[tokio::test]
async fn test_hiring_story_uses_external() {
    let backends = Backends::new();
    let orchestrator = backends.orchestrator(Arc::new(MemoryStore::new()), &fetcher());
    let story = Story::new(STORY_URL, 0).with_title("Acme (YC W24) is hiring engineers");

    let record = orchestrator.pull_content(&story).await;

    assert_eq!(backends.external.call_count(), 1);
    assert_eq!(record.tier, Some(Tier::External));
}

#[tokio::test]
async fn test_embeddable_short_circuits() {
    let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
    let backends = Backends::new();
    let fetcher = fetcher().with_response(url, "text/html", b"<html><head></head><body></body></html>".to_vec());
    let orchestrator = backends.orchestrator(Arc::new(MemoryStore::new()), &fetcher);

    let record = orchestrator.pull_content(&Story::new(url, 500)).await;

    assert_eq!(record.tier, Some(Tier::Embed));
    assert!(record.text.starts_with("<iframe "));
    assert!(record.text.contains("youtube.com/embed/dQw4w9WgXcQ"));
    assert_eq!(backends.total_calls(), 0);
}

#[tokio::test]
async fn test_short_content_is_used_whole() {
    let backends = Backends::new();
    let orchestrator = backends.orchestrator(Arc::new(MemoryStore::new()), &fetcher());

    let record = orchestrator.pull_content(&Story::new(NOTE_URL, 500)).await;

    assert_eq!(record.tier, Some(Tier::Full));
    assert_eq!(record.text, "The harbour reopens to ferries next week.");
    assert_eq!(backends.total_calls(), 0);
}

#[tokio::test]
async fn test_short_content_keeps_cached_generated_summary() {
    let backends = Backends::new();
    let store = Arc::new(MemoryStore::new());
    store
        .put_summary(&SummaryRecord::new(NOTE_URL, "Ferries return.", Tier::LocalLlm, chrono::Utc::now()))
        .await
        .unwrap();
    let config = SummaryConfig::default().with_tiers(TierPolicy::new([Tier::External]));
    let orchestrator = backends.orchestrator(store, &fetcher()).with_config(config);

    let record = orchestrator.pull_content(&Story::new(NOTE_URL, 500)).await;

    assert_eq!(record.tier, Some(Tier::LocalLlm));
    assert_eq!(record.text, "Ferries return.");
}

#[tokio::test]
async fn test_cached_local_summary_is_reused() {
    let backends = Backends::new();
    let store = Arc::new(MemoryStore::new());
    store
        .put_summary(&SummaryRecord::new(STORY_URL, "Cached local.", Tier::LocalModel, chrono::Utc::now()))
        .await
        .unwrap();
    let config = SummaryConfig::default().with_tiers(TierPolicy::new([Tier::External]));
    let orchestrator = backends.orchestrator(store, &fetcher()).with_config(config);

    let record = orchestrator.pull_content(&Story::new(STORY_URL, 50)).await;

    assert_eq!(record.text, "Cached local.");
    assert_eq!(record.tier, Some(Tier::LocalModel));
    assert_eq!(backends.llm.call_count() + backends.seq2seq.call_count(), 0);
}

#[tokio::test]
async fn test_failed_tiers_fall_through_in_order() {
    let mut backends = Backends::new();
    backends.external = MockSummarizer::new(Tier::External).failing();
    backends.llm = MockSummarizer::new(Tier::LocalLlm).failing();
    let orchestrator = backends.orchestrator(Arc::new(MemoryStore::new()), &fetcher());

    let record = orchestrator.pull_content(&Story::new(STORY_URL, 250)).await;

    assert_eq!(backends.external.call_count(), 1);
    assert_eq!(backends.llm.call_count(), 1);
    assert_eq!(record.tier, Some(Tier::LocalModel));
    assert_eq!(record.text, "Summary by GoogleT5.");
    assert_eq!(backends.translator.call_count(), 0);
}

#[tokio::test]
async fn test_fetch_failure_returns_cached_record() {
    let backends = Backends::new();
    let store = Arc::new(MemoryStore::new());
    let url = "http://news.test/gone";
    store
        .put_summary(&SummaryRecord::new(url, "Old extract.", Tier::Prefix, chrono::Utc::now()))
        .await
        .unwrap();
    let fetcher = fetcher().with_status(url, 503);
    let orchestrator = backends.orchestrator(store, &fetcher);

    let record = orchestrator.pull_content(&Story::new(url, 250)).await;
    assert_eq!(record.text, "Old extract.");
    assert_eq!(record.tier, Some(Tier::Prefix));

    let missing = orchestrator.pull_content(&Story::new("http://news.test/never", 250)).await;
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_backend_panic_is_contained() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(store, Arc::new(fetcher())).with_external(Arc::new(ExplodingSummarizer));

    let record = orchestrator.pull_content(&Story::new(STORY_URL, 250)).await;
    assert!(record.is_empty());
}

#[tokio::test]
async fn test_batch_preserves_order() {
    let backends = Backends::new();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = backends.orchestrator(store.clone(), &fetcher());
    orchestrator.pull_content(&Story::new(NOTE_URL, 1)).await;

    let stories = vec![
        Story::new(STORY_URL, 250),
        Story::new(NOTE_URL, 1),
        Story::new("http://news.test/never", 250),
    ];
    let records = orchestrator.pull_batch(&stories, 2).await;

    let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls, vec![STORY_URL, NOTE_URL, "http://news.test/never"]);
    assert_eq!(records[0].tier, Some(Tier::External));
    assert_eq!(records[1].tier, Some(Tier::Full));
    assert!(records[2].is_empty());
    assert_eq!(store.count_summaries().await.unwrap(), 2);
}

async fn check_two_tier_expiry(store: Arc<dyn CacheStore>, clock: MockClock) {
    let backends = Backends::new();
    let orchestrator = backends.orchestrator(store.clone(), &fetcher());

    orchestrator.pull_content(&Story::new(STORY_URL, 250)).await;
    orchestrator.pull_content(&Story::new(NOTE_URL, 250)).await;
    assert_eq!(store.count_summaries().await.unwrap(), 2);

    // The hosted summary survives the short window, the plain extract does not.
    clock.advance(Duration::days(2));
    let report = run_expiry(store.as_ref(), &ExpiryPolicy::default()).await.unwrap();
    assert_eq!((report.long, report.short), (0, 1));
    assert_eq!(store.peek_summary(STORY_URL).await.unwrap().unwrap().tier, Some(Tier::External));
    assert!(store.peek_summary(NOTE_URL).await.unwrap().is_none());

    clock.advance(Duration::days(13));
    let report = run_expiry(store.as_ref(), &ExpiryPolicy::default()).await.unwrap();
    assert_eq!(report.long, 1);
    assert_eq!(report.translations, 1);
    assert_eq!(store.count_summaries().await.unwrap(), 0);
}

#[tokio::test]
async fn test_two_tier_expiry_in_memory() {
    let clock = MockClock::new();
    let store = Arc::new(MemoryStore::new().with_clock(Arc::new(clock.clone())));
    check_two_tier_expiry(store, clock).await;
}

#[tokio::test]
async fn test_two_tier_expiry_in_sqlite() {
    let clock = MockClock::new();
    let store = Arc::new(SqliteStore::in_memory().await.unwrap().with_clock(Arc::new(clock.clone())));
    check_two_tier_expiry(store, clock).await;
}
