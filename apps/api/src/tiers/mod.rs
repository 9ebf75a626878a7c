//! Subscription tier policy table.
//!
//! Maps a tier name to the parsing backend, AI backend and model, and the
//! monthly operation limits. The table is static and process-wide. Lookups
//! are total: any unrecognised tier name resolves to `free`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::llm_client::AiProvider;

pub mod handlers;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// A named subscription level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    Free,
    PayAsYouGo,
    Starter,
    Professional,
    CareerPro,
    EliteExecutive,
}

impl Tier {
    pub const ALL: [Tier; 6] = [
        Tier::Free,
        Tier::PayAsYouGo,
        Tier::Starter,
        Tier::Professional,
        Tier::CareerPro,
        Tier::EliteExecutive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::PayAsYouGo => "payAsYouGo",
            Tier::Starter => "starter",
            Tier::Professional => "professional",
            Tier::CareerPro => "careerPro",
            Tier::EliteExecutive => "eliteExecutive",
        }
    }

    /// Exact, case-sensitive match on the wire name.
    pub fn parse(name: &str) -> Option<Tier> {
        Tier::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Resolves a tier name as stored on a user record. Unknown names fall back to `Free`.
    pub fn resolve(name: &str) -> Tier {
        Tier::parse(name).unwrap_or(Tier::Free)
    }

    pub fn config(&self) -> &'static TierDefinition {
        &TIER_TABLE[*self as usize]
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document-parsing backend used for CV uploads on a tier. Display-only here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingProvider {
    Standard,
    Enhanced,
}

/// A per-period operation ceiling. Serialised as `-1` for unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Limit {
    Unlimited,
    Max(u32),
}

impl Limit {
    /// Whether one more operation is permitted after `used` operations.
    pub fn allows(&self, used: u32) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Max(max) => used < *max,
        }
    }

    /// Operations left in the period. `None` means unlimited.
    pub fn remaining(&self, used: u32) -> Option<u32> {
        match self {
            Limit::Unlimited => None,
            Limit::Max(max) => Some(max.saturating_sub(used)),
        }
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> i64 {
        match limit {
            Limit::Unlimited => -1,
            Limit::Max(max) => max as i64,
        }
    }
}

impl TryFrom<i64> for Limit {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Limit::Unlimited),
            v if v >= 0 => u32::try_from(v)
                .map(Limit::Max)
                .map_err(|_| format!("limit {v} out of range")),
            v => Err(format!("invalid limit {v}: expected -1 or a non-negative count")),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Unlimited => f.write_str("unlimited"),
            Limit::Max(max) => write!(f, "{max}"),
        }
    }
}

/// Immutable policy for one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierDefinition {
    pub tier: Tier,
    pub parsing_provider: ParsingProvider,
    pub ai_provider: AiProvider,
    pub ai_model: &'static str,
    pub parsing_limit: Limit,
    pub ai_limit: Limit,
    /// Marketing copy only; has no effect on enforcement.
    pub features: &'static [&'static str],
}

// ────────────────────────────────────────────────────────────────────────────
// Table
// ────────────────────────────────────────────────────────────────────────────

// Indexed by `Tier as usize`; keep in declaration order.
static TIER_TABLE: [TierDefinition; 6] = [
    TierDefinition {
        tier: Tier::Free,
        parsing_provider: ParsingProvider::Standard,
        ai_provider: AiProvider::OpenAi,
        ai_model: "gpt-4o-mini",
        parsing_limit: Limit::Max(3),
        ai_limit: Limit::Max(1),
        features: &[
            "3 CV uploads per month",
            "1 AI CV analysis per month",
            "Basic CV templates",
            "Job application tracker",
        ],
    },
    TierDefinition {
        tier: Tier::PayAsYouGo,
        parsing_provider: ParsingProvider::Standard,
        ai_provider: AiProvider::Cohere,
        ai_model: "command-r",
        parsing_limit: Limit::Max(10),
        ai_limit: Limit::Max(5),
        features: &[
            "10 CV uploads per month",
            "5 AI CV analyses per month",
            "All CV templates",
            "Pay only for what you use",
        ],
    },
    TierDefinition {
        tier: Tier::Starter,
        parsing_provider: ParsingProvider::Standard,
        ai_provider: AiProvider::OpenAi,
        ai_model: "gpt-4o-mini",
        parsing_limit: Limit::Max(25),
        ai_limit: Limit::Max(15),
        features: &[
            "25 CV uploads per month",
            "15 AI analyses or cover letters per month",
            "All CV templates",
            "ATS keyword suggestions",
        ],
    },
    TierDefinition {
        tier: Tier::Professional,
        parsing_provider: ParsingProvider::Enhanced,
        ai_provider: AiProvider::OpenAi,
        ai_model: "gpt-4o",
        parsing_limit: Limit::Unlimited,
        ai_limit: Limit::Unlimited,
        features: &[
            "Unlimited CV uploads",
            "Unlimited AI analyses and cover letters",
            "Enhanced document parsing",
            "Job description matching",
        ],
    },
    TierDefinition {
        tier: Tier::CareerPro,
        parsing_provider: ParsingProvider::Enhanced,
        ai_provider: AiProvider::Claude,
        ai_model: "claude-3-5-sonnet-20241022",
        parsing_limit: Limit::Unlimited,
        ai_limit: Limit::Unlimited,
        features: &[
            "Everything in Professional",
            "Premium AI model for analysis and writing",
            "AI interview coaching",
            "Priority support",
        ],
    },
    TierDefinition {
        tier: Tier::EliteExecutive,
        parsing_provider: ParsingProvider::Enhanced,
        ai_provider: AiProvider::Claude,
        ai_model: "claude-3-opus-20240229",
        parsing_limit: Limit::Unlimited,
        ai_limit: Limit::Unlimited,
        features: &[
            "Everything in Career Pro",
            "Most capable AI model",
            "Executive CV review",
            "Dedicated career advisor",
        ],
    },
];

/// Returns the policy for a tier name, or the `free` policy when the name is unknown.
pub fn get_tier_config(tier: &str) -> &'static TierDefinition {
    Tier::resolve(tier).config()
}

/// All tier definitions in ascending order.
pub fn all_tiers() -> &'static [TierDefinition] {
    &TIER_TABLE
}
