//! Usage ledger: per-(user, tier) operation counters with monthly limits.
//!
//! Storage is pluggable through `UsageStore`; the ledger holds the policy.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::tiers::{Limit, Tier, TierDefinition};

pub mod handlers;
pub mod ledger;
pub mod pg_store;
pub mod store;

pub use ledger::{Reservation, Settlement, UsageLedger};
pub use pg_store::PgUsageStore;
pub use store::{InMemoryUsageStore, UsageStore};

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Corrupt usage record {key}: {message}")]
    CorruptRecord { key: String, message: String },

    #[error("Invalid cost {0}: must be a finite, non-negative amount")]
    InvalidCost(f64),
}

pub type Result<T> = std::result::Result<T, UsageError>;

// ────────────────────────────────────────────────────────────────────────────
// Operations and keys
// ────────────────────────────────────────────────────────────────────────────

/// A metered operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Parsing,
    Ai,
}

impl Operation {
    pub fn limit(&self, def: &TierDefinition) -> Limit {
        match self {
            Operation::Parsing => def.parsing_limit,
            Operation::Ai => def.ai_limit,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Operation::Parsing => "CV parsing",
            Operation::Ai => "AI analysis",
        }
    }
}

/// Composite ledger key. Built from the *resolved* tier, so unknown tier names
/// share the free record instead of each getting a fresh allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub user_id: Uuid,
    pub tier: Tier,
}

impl fmt::Display for UsageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.user_id, self.tier)
    }
}

/// Calendar month used as the accounting period, e.g. `2026-10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got {s:?}"))?;
        let year = year.parse().map_err(|_| format!("bad year in {s:?}"))?;
        let month = month.parse().map_err(|_| format!("bad month in {s:?}"))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range in {s:?}"))
    }
}

impl From<YearMonth> for String {
    fn from(ym: YearMonth) -> String {
        ym.to_string()
    }
}

impl TryFrom<String> for YearMonth {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// Source of "now" for period accounting.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Records
// ────────────────────────────────────────────────────────────────────────────

/// Values a store needs to create or roll over a record.
#[derive(Debug, Clone, Copy)]
pub struct RecordSeed {
    pub month: YearMonth,
    pub monthly_limit: Limit,
}

/// Mutable counters for one user on one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: Uuid,
    pub tier: Tier,
    pub parsing_count: u32,
    pub ai_call_count: u32,
    pub total_cost: f64,
    /// Parsing limit as of record creation or the last month rollover.
    pub monthly_limit: Limit,
    pub current_month: YearMonth,
}

/// A single mutation applied to a record by a store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UsageChange {
    /// Unconditional count + cost.
    Increment { operation: Operation, cost: f64 },
    /// Count only if `limit` still allows it. The atomic check-and-reserve.
    IncrementWithin { operation: Operation, limit: Limit },
    /// Refund a reservation taken in `reserved_in`. Saturates at zero, and is
    /// refused once the record has rolled over to a later month.
    Decrement {
        operation: Operation,
        reserved_in: YearMonth,
    },
    AddCost(f64),
}

impl UsageRecord {
    pub fn new(key: &UsageKey, seed: &RecordSeed) -> Self {
        Self {
            user_id: key.user_id,
            tier: key.tier,
            parsing_count: 0,
            ai_call_count: 0,
            total_cost: 0.0,
            monthly_limit: seed.monthly_limit,
            current_month: seed.month,
        }
    }

    pub fn key(&self) -> UsageKey {
        UsageKey {
            user_id: self.user_id,
            tier: self.tier,
        }
    }

    pub fn count(&self, operation: Operation) -> u32 {
        match operation {
            Operation::Parsing => self.parsing_count,
            Operation::Ai => self.ai_call_count,
        }
    }

    fn count_mut(&mut self, operation: Operation) -> &mut u32 {
        match operation {
            Operation::Parsing => &mut self.parsing_count,
            Operation::Ai => &mut self.ai_call_count,
        }
    }

    /// Resets counters when the accounting month has moved on. Returns whether it did.
    pub fn roll_over(&mut self, seed: &RecordSeed) -> bool {
        if self.current_month == seed.month {
            return false;
        }
        self.parsing_count = 0;
        self.ai_call_count = 0;
        self.total_cost = 0.0;
        self.monthly_limit = seed.monthly_limit;
        self.current_month = seed.month;
        true
    }

    /// Applies `change`, returning `false` when an `IncrementWithin` was refused
    /// or a `Decrement` targets a month that is already closed.
    pub fn apply(&mut self, change: UsageChange) -> bool {
        match change {
            UsageChange::Increment { operation, cost } => {
                let count = self.count_mut(operation);
                *count = count.saturating_add(1);
                self.total_cost += cost;
                true
            }
            UsageChange::IncrementWithin { operation, limit } => {
                if !limit.allows(self.count(operation)) {
                    return false;
                }
                let count = self.count_mut(operation);
                *count = count.saturating_add(1);
                true
            }
            UsageChange::Decrement {
                operation,
                reserved_in,
            } => {
                if self.current_month != reserved_in {
                    return false;
                }
                let count = self.count_mut(operation);
                *count = count.saturating_sub(1);
                true
            }
            UsageChange::AddCost(cost) => {
                self.total_cost += cost;
                true
            }
        }
    }
}

/// Result of a store update: the record after the change, and whether it applied.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub applied: bool,
    pub record: UsageRecord,
}

// ────────────────────────────────────────────────────────────────────────────
// Ledger outputs
// ────────────────────────────────────────────────────────────────────────────

/// Answer to "may this user run one more operation?".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl QuotaDecision {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(operation: Operation, used: u32, limit: Limit, tier: Tier) -> Self {
        Self {
            allowed: false,
            reason: Some(format!(
                "{} limit reached ({used}/{limit}) for the {tier} plan this month",
                operation.label()
            )),
        }
    }
}

/// Snapshot of a user's consumption for display.
#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub user_id: Uuid,
    pub tier: Tier,
    pub current_month: YearMonth,
    pub parsing_count: u32,
    pub parsing_limit: Limit,
    /// `None` when unlimited.
    pub parsing_remaining: Option<u32>,
    pub ai_call_count: u32,
    pub ai_limit: Limit,
    pub ai_remaining: Option<u32>,
    pub total_cost: f64,
    pub features: &'static [&'static str],
}

impl UserStats {
    pub(crate) fn from_record(record: &UsageRecord) -> Self {
        let def = record.tier.config();
        Self {
            user_id: record.user_id,
            tier: record.tier,
            current_month: record.current_month,
            parsing_count: record.parsing_count,
            parsing_limit: def.parsing_limit,
            parsing_remaining: def.parsing_limit.remaining(record.parsing_count),
            ai_call_count: record.ai_call_count,
            ai_limit: def.ai_limit,
            ai_remaining: def.ai_limit.remaining(record.ai_call_count),
            total_cost: record.total_cost,
            features: def.features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(month: u32, limit: Limit) -> RecordSeed {
        RecordSeed {
            month: YearMonth::new(2026, month).unwrap(),
            monthly_limit: limit,
        }
    }

    fn record() -> UsageRecord {
        let key = UsageKey {
            user_id: Uuid::new_v4(),
            tier: Tier::Free,
        };
        UsageRecord::new(&key, &seed(3, Limit::Max(3)))
    }

    #[test]
    fn test_key_display_is_user_dash_tier() {
        let id = Uuid::nil();
        let key = UsageKey {
            user_id: id,
            tier: Tier::CareerPro,
        };
        assert_eq!(key.to_string(), format!("{id}-careerPro"));
    }

    #[test]
    fn test_year_month_round_trip_and_validation() {
        let ym: YearMonth = "2026-03".parse().unwrap();
        assert_eq!(ym, YearMonth::new(2026, 3).unwrap());
        assert_eq!(ym.to_string(), "2026-03");
        assert!("2026-13".parse::<YearMonth>().is_err());
        assert!("202603".parse::<YearMonth>().is_err());
        assert!(YearMonth::new(2026, 4).unwrap() > ym);
    }

    #[test]
    fn test_increment_within_refuses_at_limit() {
        let mut r = record();
        let change = UsageChange::IncrementWithin {
            operation: Operation::Ai,
            limit: Limit::Max(1),
        };
        assert!(r.apply(change));
        assert!(!r.apply(change));
        assert_eq!(r.ai_call_count, 1);
    }

    #[test]
    fn test_decrement_saturates() {
        let mut r = record();
        assert!(r.apply(UsageChange::Decrement {
            operation: Operation::Parsing,
            reserved_in: r.current_month,
        }));
        assert_eq!(r.parsing_count, 0);
    }

    #[test]
    fn test_decrement_from_closed_month_is_refused() {
        let mut r = record();
        r.roll_over(&seed(4, Limit::Max(3)));
        r.apply(UsageChange::Increment {
            operation: Operation::Ai,
            cost: 0.0,
        });
        let refund = UsageChange::Decrement {
            operation: Operation::Ai,
            reserved_in: YearMonth::new(2026, 3).unwrap(),
        };
        assert!(!r.apply(refund));
        assert_eq!(r.ai_call_count, 1);
    }

    #[test]
    fn test_roll_over_resets_and_resnapshots_limit() {
        let mut r = record();
        r.apply(UsageChange::Increment {
            operation: Operation::Parsing,
            cost: 0.5,
        });
        assert!(!r.roll_over(&seed(3, Limit::Max(10))));
        assert_eq!(r.monthly_limit, Limit::Max(3));

        assert!(r.roll_over(&seed(4, Limit::Max(10))));
        assert_eq!(r.parsing_count, 0);
        assert_eq!(r.total_cost, 0.0);
        assert_eq!(r.monthly_limit, Limit::Max(10));
        assert_eq!(r.current_month.to_string(), "2026-04");
    }

    #[test]
    fn test_denied_reason_names_count_and_limit() {
        let d = QuotaDecision::denied(Operation::Ai, 1, Limit::Max(1), Tier::Free);
        assert!(!d.allowed);
        let reason = d.reason.unwrap();
        assert!(reason.contains("1/1"), "{reason}");
        assert!(reason.contains("free"));
    }

    #[test]
    fn test_allowed_decision_omits_reason_in_json() {
        let json = serde_json::to_value(QuotaDecision::allowed()).unwrap();
        assert_eq!(json, serde_json::json!({"allowed": true}));
    }
}
