use anyhow::{Context, Result};
use chrono::Duration;
use news_digest::{ExpiryPolicy, SummaryConfig, TierPolicy};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub database_url: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub openai_model: String,
    pub openai_score_threshold: i64,
    pub local_llm_score_threshold: i64,
    pub llama_endpoint: Option<String>,
    pub transformer_endpoint: Option<String>,
    pub summary_size: usize,
    pub max_content_size: usize,
    pub image_dir: Option<PathBuf>,
    pub disable_translation: bool,
    pub summary_ttl_days: i64,
    pub final_tiers: TierPolicy,
    pub concurrency: usize,
}

impl DigestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        fn parsed<T>(name: &str, value: Option<String>, default: T) -> Result<T>
        where
            T: FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match value {
                Some(v) => v.trim().parse().with_context(|| format!("{name} must be a number")),
                None => Ok(default),
            }
        }

        let final_tiers = match var("FINAL_TIERS") {
            Some(list) => TierPolicy::parse(&list).context("FINAL_TIERS must list tier names")?,
            None => TierPolicy::default(),
        };

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| "sqlite://digest.db?mode=rwc".to_string()),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_api_base: var("OPENAI_API_BASE"),
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            openai_score_threshold: parsed("OPENAI_SCORE_THRESHOLD", var("OPENAI_SCORE_THRESHOLD"), 100)?,
            local_llm_score_threshold: parsed("LOCAL_LLM_SCORE_THRESHOLD", var("LOCAL_LLM_SCORE_THRESHOLD"), 10)?,
            llama_endpoint: var("LLAMA_ENDPOINT"),
            transformer_endpoint: var("TRANSFORMER_ENDPOINT"),
            summary_size: parsed("SUMMARY_SIZE", var("SUMMARY_SIZE"), 400)?,
            max_content_size: parsed("MAX_CONTENT_SIZE", var("MAX_CONTENT_SIZE"), 32 * 1024)?,
            image_dir: var("IMAGE_DIR").map(PathBuf::from),
            disable_translation: var("DISABLE_TRANSLATION")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            summary_ttl_days: parsed("SUMMARY_TTL_DAYS", var("SUMMARY_TTL_DAYS"), 14)?,
            final_tiers,
            concurrency: parsed("CONCURRENCY", var("CONCURRENCY"), 4)?,
        })
    }

    pub fn summary_config(&self) -> SummaryConfig {
        let mut config = SummaryConfig::default()
            .with_summary_size(self.summary_size)
            .with_max_content_size(self.max_content_size)
            .with_external_threshold(self.openai_score_threshold)
            .with_local_threshold(self.local_llm_score_threshold)
            .with_translation(!self.disable_translation)
            .with_tiers(self.final_tiers.clone());
        if let Some(dir) = &self.image_dir {
            config = config.with_image_dir(dir);
        }
        config
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::default()
            .with_long_ttl(Duration::days(self.summary_ttl_days))
            .with_tiers(self.final_tiers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use news_digest::Tier;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<DigestConfig> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        DigestConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.summary_size, 400);
        assert_eq!(config.openai_score_threshold, 100);
        assert_eq!(config.concurrency, 4);
        assert!(config.openai_api_key.is_none());
        assert!(!config.disable_translation);
        assert_eq!(config.expiry_policy().long_ttl, Duration::days(14));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("SUMMARY_SIZE", "300"),
            ("DISABLE_TRANSLATION", "1"),
            ("FINAL_TIERS", "OpenAI,Embed"),
            ("SUMMARY_TTL_DAYS", "7"),
            ("LLAMA_ENDPOINT", ""),
        ])
        .unwrap();
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert!(config.llama_endpoint.is_none());

        let summary = config.summary_config();
        assert_eq!(summary.summary_size, 300);
        assert!(!summary.translate);
        assert!(summary.tiers.is_final(Tier::Embed));
        assert!(!summary.tiers.is_final(Tier::LocalLlm));
        assert_eq!(config.expiry_policy().long_ttl, Duration::days(7));
    }

    #[test]
    fn test_bad_number_is_reported() {
        let err = load(&[("CONCURRENCY", "many")]).unwrap_err();
        assert!(err.to_string().contains("CONCURRENCY"));
        assert!(load(&[("FINAL_TIERS", "Gemini")]).is_err());
    }
}
