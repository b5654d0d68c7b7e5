//! Summarization backends.
//!
//! - `OpenAiSummarizer` - Hosted chat completion API (external tier)
//! - `LocalCompletionBackend` - Local completion servers (local tiers)
//!
//! Both carry a connect timeout, a request timeout and a bounded retry
//! budget through [`RetryPolicy`].

pub mod local;
pub mod openai;
pub mod retry;

pub use local::LocalCompletionBackend;
pub use openai::{OpenAiConfig, OpenAiSummarizer};
pub use retry::RetryPolicy;
