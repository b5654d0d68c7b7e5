//! Bounded-concurrency processing of a story list.

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::orchestrator::Orchestrator;
use crate::types::{record::SummaryRecord, story::Story};

impl Orchestrator {
    /// Pull every story, at most `concurrency` at a time. Results come back
    /// in input order.
    ///
    /// The cache is warmed with a single lookup first so the per-story reads
    /// do not each go to the database.
    pub async fn pull_batch(&self, stories: &[Story], concurrency: usize) -> Vec<SummaryRecord> {
        let urls: Vec<String> = stories.iter().map(|s| s.url.clone()).collect();
        match self.store().filter_existing(&urls).await {
            Ok(cached) => info!(total = urls.len(), cached = cached.len(), "Pulling stories"),
            Err(e) => warn!(error = %e, "Cache warm-up failed"),
        }

        stream::iter(stories)
            .map(|story| self.pull_content(story))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}
