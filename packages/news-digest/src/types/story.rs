//! Input stories.

use serde::{Deserialize, Serialize};

/// A story to pull: the URL plus the ranking data that gates costly tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Importance, e.g. upvotes.
    #[serde(default, alias = "score")]
    pub importance: i64,
    #[serde(default)]
    pub author: String,
}

impl Story {
    pub fn new(url: impl Into<String>, importance: i64) -> Self {
        Self {
            url: url.into(),
            importance,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into().trim().to_string();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Job postings: no score, no author, a batch tag in the title.
    /// These are always summarized by the hosted backend.
    pub fn is_hiring(&self) -> bool {
        self.importance == 0 && self.author.is_empty() && self.title.contains("YC ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hiring_detection() {
        let job = Story::new("http://a.com/jobs", 0).with_title("Acme (YC W24) is hiring engineers");
        assert!(job.is_hiring());
        assert!(!job.clone().with_author("pg").is_hiring());
        assert!(!Story { importance: 3, ..job }.is_hiring());
    }

    #[test]
    fn test_deserialize_score_alias() {
        let story: Story =
            serde_json::from_str(r#"{"url":"http://a.com","title":"T","score":42}"#).unwrap();
        assert_eq!(story.importance, 42);
        assert_eq!(story.author, "");
    }
}
