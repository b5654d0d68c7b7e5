//! Summary provenance.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a cached summary came from, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Leading slice of the extracted text; nothing better was available
    Prefix,
    /// The extracted text was short enough to use whole
    Full,
    /// Embed markup for a video or document host
    Embed,
    /// Local sequence-to-sequence model
    LocalModel,
    /// Local large language model
    LocalLlm,
    /// Hosted completion API
    External,
}

impl Tier {
    pub const ALL: [Tier; 6] = [
        Tier::Prefix,
        Tier::Full,
        Tier::Embed,
        Tier::LocalModel,
        Tier::LocalLlm,
        Tier::External,
    ];

    /// Stored name. These strings are persisted and must not change.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Prefix => "Prefix",
            Tier::Full => "Full",
            Tier::Embed => "Embed",
            Tier::LocalModel => "GoogleT5",
            Tier::LocalLlm => "Llama",
            Tier::External => "OpenAI",
        }
    }

    /// Produced by a summarization backend rather than copied from the page.
    pub fn is_generated(&self) -> bool {
        matches!(self, Tier::LocalModel | Tier::LocalLlm | Tier::External)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Tier::LocalModel | Tier::LocalLlm)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised tier name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTier(pub String);

impl fmt::Display for UnknownTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tier: {}", self.0)
    }
}

impl std::error::Error for UnknownTier {}

impl FromStr for Tier {
    type Err = UnknownTier;

    /// Accepts the stored name or the variant name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s) || format!("{:?}", t).eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

/// Which tiers are settled: a cached summary in one of these is never
/// re-summarized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    final_tiers: BTreeSet<Tier>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::new([Tier::LocalModel, Tier::LocalLlm, Tier::External])
    }
}

impl TierPolicy {
    pub fn new(final_tiers: impl IntoIterator<Item = Tier>) -> Self {
        Self {
            final_tiers: final_tiers.into_iter().collect(),
        }
    }

    /// Parse a comma-separated list such as `OpenAI,Llama,Embed`.
    pub fn parse(list: &str) -> Result<Self, UnknownTier> {
        let tiers = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Tier::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(tiers))
    }

    pub fn is_final(&self, tier: Tier) -> bool {
        self.final_tiers.contains(&tier)
    }

    pub fn final_tiers(&self) -> impl Iterator<Item = Tier> + '_ {
        self.final_tiers.iter().copied()
    }
}
