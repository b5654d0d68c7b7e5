//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the digest pipeline
//! without making real model calls or waiting on the wall clock.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};

use crate::clock::Clock;
use crate::error::{BackendError, BackendResult};
use crate::traits::summarizer::{Summarizer, Translator};
use crate::types::tier::Tier;

/// Record of a call made to a mock backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Summarize { backend: String, content: String },
    Translate { text: String, target: String },
}

#[derive(Debug, Clone)]
enum Behavior {
    Answer(String),
    Fail,
}

/// A [`Summarizer`] with a canned answer.
///
/// Clones share call history, so a test can keep one handle and give the
/// other to the orchestrator.
#[derive(Clone)]
pub struct MockSummarizer {
    name: String,
    tier: Tier,
    behavior: Arc<RwLock<Behavior>>,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockSummarizer {
    /// Answers `"Summary by <tier>."` until told otherwise.
    pub fn new(tier: Tier) -> Self {
        Self {
            name: format!("mock-{}", tier.as_str().to_lowercase()),
            tier,
            behavior: Arc::new(RwLock::new(Behavior::Answer(format!("Summary by {tier}.")))),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_response(self, answer: impl Into<String>) -> Self {
        *self.behavior.write().unwrap() = Behavior::Answer(answer.into());
        self
    }

    /// Every call fails with a network error.
    pub fn failing(self) -> Self {
        *self.behavior.write().unwrap() = Behavior::Fail;
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> Tier {
        self.tier
    }

    async fn summarize(&self, content: &str) -> BackendResult<String> {
        self.calls.write().unwrap().push(MockCall::Summarize {
            backend: self.name.clone(),
            content: content.to_string(),
        });
        match &*self.behavior.read().unwrap() {
            Behavior::Answer(answer) => Ok(answer.clone()),
            Behavior::Fail => Err(BackendError::Network("mock failure".into())),
        }
    }
}

/// A [`Translator`] with a canned answer.
#[derive(Clone)]
pub struct MockTranslator {
    behavior: Arc<RwLock<Behavior>>,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl Default for MockTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranslator {
    /// Answers `"译文"` until told otherwise.
    pub fn new() -> Self {
        Self {
            behavior: Arc::new(RwLock::new(Behavior::Answer("译文".to_string()))),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_response(self, answer: impl Into<String>) -> Self {
        *self.behavior.write().unwrap() = Behavior::Answer(answer.into());
        self
    }

    pub fn failing(self) -> Self {
        *self.behavior.write().unwrap() = Behavior::Fail;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str, target: &str) -> BackendResult<String> {
        self.calls.write().unwrap().push(MockCall::Translate {
            text: text.to_string(),
            target: target.to_string(),
        });
        match &*self.behavior.read().unwrap() {
            Behavior::Answer(answer) => Ok(answer.clone()),
            Behavior::Fail => Err(BackendError::Quota("mock quota".into())),
        }
    }
}

/// A [`Clock`] that only moves when told to.
#[derive(Clone)]
pub struct MockClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Starts at 2024-01-01T00:00:00Z.
    pub fn new() -> Self {
        Self::at(DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.write().unwrap() += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap() = now;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}
