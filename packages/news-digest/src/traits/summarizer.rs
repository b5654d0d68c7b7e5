//! Summarization and translation backends.

use async_trait::async_trait;

use crate::error::BackendResult;
use crate::types::tier::Tier;

/// A `text -> summary` backend.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Tier a successful answer is recorded under.
    fn tier(&self) -> Tier;

    async fn summarize(&self, content: &str) -> BackendResult<String>;
}

/// A `text -> translated text` backend.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target`, a human-readable language name.
    async fn translate(&self, text: &str, target: &str) -> BackendResult<String>;
}
