//! Local inference through a llama.cpp-style completion server.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::retry::{body_error, RetryPolicy};
use crate::error::{BackendError, BackendResult};
use crate::traits::summarizer::Summarizer;
use crate::types::tier::Tier;

const LLM_INSTRUCTION: &str = "<<SYS>>Summarize following article in 3 sentences.<</SYS>>\n";
const SEQ2SEQ_INSTRUCTION: &str = "summarize: ";

/// Characters of article text sent to each kind of model.
const LLM_INPUT_CHARS: usize = 2048 * 4;
const SEQ2SEQ_INPUT_CHARS: usize = 4096;

/// Local generation is slow; a whole request may take this long.
pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    content: String,
}

/// A [`Summarizer`] for the local tiers. Requests go to `POST {endpoint}/completion`.
#[derive(Clone)]
pub struct LocalCompletionBackend {
    http_client: Client,
    retry: RetryPolicy,
    endpoint: String,
    tier: Tier,
    n_predict: usize,
    temperature: f32,
}

impl LocalCompletionBackend {
    /// Local LLM tier. `summary_size` is the target summary length in characters.
    pub fn llm(endpoint: impl Into<String>, summary_size: usize) -> BackendResult<Self> {
        Self::new(endpoint, Tier::LocalLlm, summary_size, 1.0)
    }

    /// Local sequence-to-sequence tier.
    pub fn seq2seq(endpoint: impl Into<String>, summary_size: usize) -> BackendResult<Self> {
        Self::new(endpoint, Tier::LocalModel, summary_size, 0.0)
    }

    fn new(endpoint: impl Into<String>, tier: Tier, summary_size: usize, temperature: f32) -> BackendResult<Self> {
        let retry = RetryPolicy::default().with_timeout(DEFAULT_LOCAL_TIMEOUT);
        Ok(Self {
            http_client: retry.client()?,
            retry,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tier,
            n_predict: summary_size / 4,
            temperature,
        })
    }

    /// Replace the timeouts and retry budget.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> BackendResult<Self> {
        self.http_client = retry.client()?;
        self.retry = retry;
        Ok(self)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn prompt(&self, content: &str) -> String {
        let (instruction, max_chars) = match self.tier {
            Tier::LocalModel => (SEQ2SEQ_INSTRUCTION, SEQ2SEQ_INPUT_CHARS),
            _ => (LLM_INSTRUCTION, LLM_INPUT_CHARS.saturating_sub(LLM_INSTRUCTION.len())),
        };
        let content: String = content.trim().chars().take(max_chars).collect();
        format!("{instruction}{content}")
    }

    fn finish(&self, answer: &str) -> String {
        let answer = answer.trim();
        if self.tier != Tier::LocalModel {
            return answer.to_string();
        }
        let mut chars = answer.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl Summarizer for LocalCompletionBackend {
    fn name(&self) -> &str {
        &self.endpoint
    }

    fn tier(&self) -> Tier {
        self.tier
    }

    async fn summarize(&self, content: &str) -> BackendResult<String> {
        let prompt = self.prompt(content);
        self.retry.run(&self.endpoint, || self.complete(&prompt)).await
    }
}

impl LocalCompletionBackend {
    async fn complete(&self, prompt: &str) -> BackendResult<String> {
        let start = Instant::now();
        let response = self
            .http_client
            .post(format!("{}/completion", self.endpoint))
            .json(&CompletionRequest {
                prompt,
                n_predict: self.n_predict,
                temperature: self.temperature,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "Local completion request failed");
                BackendError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(endpoint = %self.endpoint, status = %status, "Local completion error");
            return Err(BackendError::Api {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let body: CompletionResponse = response.json().await.map_err(body_error)?;

        debug!(
            endpoint = %self.endpoint,
            tier = %self.tier,
            duration_ms = start.elapsed().as_millis(),
            "Local completion"
        );

        let summary = self.finish(&body.content);
        if summary.is_empty() {
            return Err(BackendError::EmptyAnswer);
        }
        Ok(summary)
    }
}
