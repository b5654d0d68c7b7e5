//! Hosted summarizer over an OpenAI-compatible chat completion API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::retry::{body_error, RetryPolicy};
use crate::error::{BackendError, BackendResult};
use crate::traits::summarizer::{Summarizer, Translator};
use crate::types::tier::Tier;

/// Tokens reserved for the prompt and function schema.
const PROMPT_OVERHEAD: usize = 200;

/// Rough characters-per-token ratio for English text.
const CHARS_PER_TOKEN: usize = 4;

lazy_static! {
    static ref SUMMARY_LABEL: Regex = Regex::new(r"(?i)^[\s*_#]*summary[\s*_]*:[\s*_]*").unwrap();
    static ref LEADING_PUNCT: Regex = Regex::new(r"^[^\p{L}\p{N}]+").unwrap();
}

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Default: `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    /// Timeouts (2s connect, 30s whole request) and retry budget.
    pub retry: RetryPolicy,
    /// Ask for the answer through a `render` function call instead of
    /// plain content.
    pub structured: bool,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            retry: RetryPolicy::default(),
            structured: false,
        }
    }

    /// Set a custom base URL (for proxies or compatible providers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.retry.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_structured_output(mut self, structured: bool) -> Self {
        self.structured = structured;
        self
    }
}

/// Context window, in tokens, guessed from the model name.
pub fn context_limit(model: &str) -> usize {
    if model.contains("128k") {
        128 * 1024
    } else if model.contains("32k") || model.contains("mistral-7b") {
        32 * 1024
    } else if model.contains("gemma-7b") {
        8 * 1024
    } else {
        4096
    }
}

/// Strip backtick fences (they delimit the article in the prompt) and cut
/// the text to fit the model's context.
pub fn sanitize_content(text: &str, model: &str) -> String {
    let mut text = text.replace("```", " ").trim().to_string();

    let limit = context_limit(model);
    let budget = limit.saturating_sub(PROMPT_OVERHEAD) * CHARS_PER_TOKEN;
    if text.chars().count() > budget {
        text = text.chars().take(budget).collect();
    }
    text.trim_matches('.').trim().to_string()
}

pub fn summary_prompt(content: &str) -> String {
    format!(
        "Use third person mood to summarize the following article delimited by triple backticks \
         in 2 concise English sentences. Ensure the summary does not exceed 100 characters.\n\
         ```{}.```",
        content.trim_matches('.')
    )
}

fn translation_prompt(text: &str, target: &str) -> String {
    format!(
        "Translate the following text delimited by triple backticks into {target}. \
         Output the translation only.\n```{}```",
        text.replace("```", " ")
    )
}

/// Remove a leading `Summary:` label and any leading punctuation.
pub fn clean_answer(answer: &str) -> String {
    let answer = SUMMARY_LABEL.replace(answer.trim(), "");
    LEADING_PUNCT.replace(&answer, "").trim().to_string()
}

/// Arguments of the `render` function. Models sometimes omit fields.
#[derive(Debug, Default, Deserialize)]
pub struct RenderArguments {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub summary_zh: String,
    #[serde(default)]
    pub translation: String,
}

/// Decode `render` arguments. A reply cut off by the token limit usually
/// stops inside the last string value, so it is closed before parsing.
pub fn parse_render_arguments(arguments: &str, finish_reason: Option<&str>) -> BackendResult<RenderArguments> {
    let mut json = arguments.to_string();
    if finish_reason == Some("length") {
        json.push_str("\"}");
    }
    serde_json::from_str(&json).map_err(|e| BackendError::MalformedResponse(format!("render arguments: {e}")))
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    n: u32,
    frequency_penalty: f32,
    presence_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    arguments: String,
}

fn render_function() -> Value {
    json!([{
        "name": "render",
        "parameters": {
            "type": "object",
            "properties": {
                "summary": { "type": "string", "description": "English summary" },
                "summary_zh": { "type": "string", "description": "Chinese summary" },
                "translation": { "type": "string", "description": "Chinese translation of sentence" }
            }
        }
    }])
}

/// Summarizer and translator backed by a hosted chat completion endpoint.
#[derive(Clone)]
pub struct OpenAiSummarizer {
    http_client: Client,
    config: OpenAiConfig,
}

impl OpenAiSummarizer {
    pub fn new(config: OpenAiConfig) -> BackendResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(BackendError::Disabled("API key is not set".into()));
        }
        let http_client = config.retry.client()?;
        Ok(Self { http_client, config })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn complete(&self, prompt: &str, structured: bool) -> BackendResult<Choice> {
        self.config
            .retry
            .run(&self.config.model, || self.complete_once(prompt, structured))
            .await
    }

    async fn complete_once(&self, prompt: &str, structured: bool) -> BackendResult<Choice> {
        let start = Instant::now();
        let request = CompletionRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
            n: 1,
            frequency_penalty: 1.0,
            presence_penalty: 1.0,
            functions: structured.then(render_function),
            function_call: structured.then(|| json!({ "name": "render" })),
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Chat completion request failed");
                BackendError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Chat completion API error");
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(BackendError::Quota(error_text));
            }
            return Err(BackendError::Api {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let body: CompletionResponse = response.json().await.map_err(body_error)?;

        debug!(
            model = %self.config.model,
            duration_ms = start.elapsed().as_millis(),
            "Chat completion"
        );

        body.choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::MalformedResponse("no choices".into()))
    }
}

fn answer_text(choice: Choice) -> BackendResult<String> {
    let answer = match choice.message.function_call {
        Some(call) => parse_render_arguments(&call.arguments, choice.finish_reason.as_deref())?.summary,
        None => choice.message.content.unwrap_or_default(),
    };
    let answer = clean_answer(&answer);
    if answer.is_empty() {
        return Err(BackendError::EmptyAnswer);
    }
    Ok(answer)
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn tier(&self) -> Tier {
        Tier::External
    }

    async fn summarize(&self, content: &str) -> BackendResult<String> {
        let prompt = summary_prompt(&sanitize_content(content, &self.config.model));
        let choice = self.complete(&prompt, self.config.structured).await?;
        let summary = answer_text(choice)?;
        info!(model = %self.config.model, chars = summary.len(), "Hosted summary generated");
        Ok(summary)
    }
}

#[async_trait]
impl Translator for OpenAiSummarizer {
    async fn translate(&self, text: &str, target: &str) -> BackendResult<String> {
        let choice = self.complete(&translation_prompt(text, target), false).await?;
        let translated = choice.message.content.unwrap_or_default().trim().to_string();
        if translated.is_empty() {
            return Err(BackendError::EmptyAnswer);
        }
        Ok(translated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::retry::test_server;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_context_limit() {
        assert_eq!(context_limit("gpt-4-128k"), 131072);
        assert_eq!(context_limit("open-mistral-7b"), 32768);
        assert_eq!(context_limit("gemma-7b-it"), 8192);
        assert_eq!(context_limit("gpt-3.5-turbo"), 4096);
    }

    #[test]
    fn test_sanitize_removes_fences_and_cuts() {
        assert_eq!(sanitize_content("..```rm -rf```. Hello...", "gpt-3.5-turbo"), "rm -rf . Hello");

        let long = "word ".repeat(10_000);
        let cut = sanitize_content(&long, "gpt-3.5-turbo");
        assert!(cut.chars().count() <= (4096 - PROMPT_OVERHEAD) * CHARS_PER_TOKEN);
    }

    #[test]
    fn test_prompt_wraps_content() {
        let prompt = summary_prompt("An article.");
        assert!(prompt.starts_with("Use third person mood"));
        assert!(prompt.ends_with("```An article.```"));
    }

    #[test]
    fn test_clean_answer() {
        assert_eq!(clean_answer("**Summary:** The tool works."), "The tool works.");
        assert_eq!(clean_answer(": - The tool works."), "The tool works.");
        assert_eq!(clean_answer("summary: 42 ways"), "42 ways");
        assert_eq!(clean_answer("Summaries are short."), "Summaries are short.");
    }

    #[test]
    fn test_truncated_render_arguments_are_repaired() {
        let args = r#"{"summary": "A new database engine"#;
        assert!(parse_render_arguments(args, Some("stop")).is_err());
        let parsed = parse_render_arguments(args, Some("length")).unwrap();
        assert_eq!(parsed.summary, "A new database engine");
        assert!(parsed.summary_zh.is_empty());
    }

    #[test]
    fn test_answer_from_function_call() {
        let choice: Choice = serde_json::from_value(json!({
            "message": { "function_call": { "name": "render", "arguments": "{\"summary\": \"It ships.\"}" } },
            "finish_reason": "stop"
        }))
        .unwrap();
        assert_eq!(answer_text(choice).unwrap(), "It ships.");

        let empty: Choice = serde_json::from_value(json!({ "message": { "content": " ** " } })).unwrap();
        assert!(matches!(answer_text(empty), Err(BackendError::EmptyAnswer)));
    }

    fn hosted(base_url: &str) -> OpenAiSummarizer {
        let retry = RetryPolicy::default()
            .with_timeout(Duration::from_millis(500))
            .with_backoff(Duration::from_millis(10));
        OpenAiSummarizer::new(
            OpenAiConfig::new("sk-test")
                .with_base_url(base_url)
                .with_retry_policy(retry),
        )
        .unwrap()
    }

    #[test]
    fn test_client_carries_connect_timeout() {
        let config = OpenAiConfig::new("sk-test").with_timeout(Duration::from_secs(10));
        assert_eq!(config.retry.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.retry.timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_quota_is_reported_without_retry() {
        let (base_url, hits) = test_server::canned("429 Too Many Requests", r#"{"error": "quota"}"#).await;
        let result = hosted(&base_url).summarize("An article.").await;
        assert!(matches!(result, Err(BackendError::Quota(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let (base_url, hits) = test_server::canned("500 Internal Server Error", "{}").await;
        let result = hosted(&base_url).summarize("An article.").await;
        assert!(matches!(result, Err(BackendError::Api { status: 500, .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let base_url = test_server::silent().await;
        let result = tokio::time::timeout(Duration::from_secs(5), hosted(&base_url).summarize("An article.")).await;
        assert!(matches!(result, Ok(Err(BackendError::Network(_)))));
    }

    #[test]
    fn test_missing_key_disables_backend() {
        assert!(matches!(
            OpenAiSummarizer::new(OpenAiConfig::new("")),
            Err(BackendError::Disabled(_))
        ));
    }
}
