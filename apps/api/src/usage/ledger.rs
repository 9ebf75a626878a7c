use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::{
    Clock, Operation, QuotaDecision, RecordSeed, Result, SystemClock, UsageChange, UsageError,
    UsageKey, UsageRecord, UsageStore, UserStats, YearMonth,
};
use crate::tiers::{Limit, Tier};

/// How a reserved operation ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Settlement {
    /// The call went through; charge its estimated cost.
    Completed { cost: f64 },
    /// The call failed; give back the unit reserved in `reserved_in`.
    Failed { reserved_in: YearMonth },
}

/// Result of `try_consume`: the decision, and the accounting month the unit
/// was taken from.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub decision: QuotaDecision,
    pub month: YearMonth,
}

impl Reservation {
    /// The settlement that refunds this reservation.
    pub fn refund(&self) -> Settlement {
        Settlement::Failed {
            reserved_in: self.month,
        }
    }
}

/// Tracks consumption and enforces per-tier monthly limits.
///
/// Tier names are resolved with the same fallback as the tier table, so an
/// unknown name is metered against the free record and free limits.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn UsageStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn key_and_seed(&self, user_id: Uuid, tier: &str) -> (UsageKey, RecordSeed) {
        let tier = Tier::resolve(tier);
        let seed = RecordSeed {
            month: YearMonth::of(self.clock.now()),
            monthly_limit: tier.config().parsing_limit,
        };
        (UsageKey { user_id, tier }, seed)
    }

    /// Returns the record for `(user_id, tier)`, creating a zeroed one on first use.
    pub async fn get_or_create_record(&self, user_id: Uuid, tier: &str) -> Result<UsageRecord> {
        let (key, seed) = self.key_and_seed(user_id, tier);
        self.store.get_or_create(&key, &seed).await
    }

    pub async fn can_parse(&self, user_id: Uuid, tier: &str) -> Result<QuotaDecision> {
        self.check(user_id, tier, Operation::Parsing).await
    }

    pub async fn can_use_ai(&self, user_id: Uuid, tier: &str) -> Result<QuotaDecision> {
        self.check(user_id, tier, Operation::Ai).await
    }

    async fn check(&self, user_id: Uuid, tier: &str, operation: Operation) -> Result<QuotaDecision> {
        let (key, seed) = self.key_and_seed(user_id, tier);
        let limit = operation.limit(key.tier.config());

        // Unlimited tiers never need the record.
        if limit == Limit::Unlimited {
            return Ok(QuotaDecision::allowed());
        }

        let record = self.store.get_or_create(&key, &seed).await?;
        let used = record.count(operation);
        if limit.allows(used) {
            Ok(QuotaDecision::allowed())
        } else {
            Ok(QuotaDecision::denied(operation, used, limit, key.tier))
        }
    }

    /// Counts one operation and adds its cost. Performs no limit check; pair with
    /// `can_parse`/`can_use_ai`, or use `try_consume` to check and count atomically.
    pub async fn record_usage(
        &self,
        user_id: Uuid,
        tier: &str,
        operation: Operation,
        cost: f64,
    ) -> Result<UsageRecord> {
        validate_cost(cost)?;
        let (key, seed) = self.key_and_seed(user_id, tier);
        let outcome = self
            .store
            .update(&key, &seed, UsageChange::Increment { operation, cost })
            .await?;
        debug!(key = %key, ?operation, cost, "Recorded usage");
        Ok(outcome.record)
    }

    /// Atomically checks the limit and reserves one unit of `operation`.
    /// Follow up with `settle` once the reserved work has finished.
    pub async fn try_consume(
        &self,
        user_id: Uuid,
        tier: &str,
        operation: Operation,
    ) -> Result<Reservation> {
        let (key, seed) = self.key_and_seed(user_id, tier);
        let limit = operation.limit(key.tier.config());
        let outcome = self
            .store
            .update(&key, &seed, UsageChange::IncrementWithin { operation, limit })
            .await?;

        let decision = if outcome.applied {
            QuotaDecision::allowed()
        } else {
            let used = outcome.record.count(operation);
            info!(key = %key, ?operation, used, %limit, "Quota exceeded");
            QuotaDecision::denied(operation, used, limit, key.tier)
        };
        Ok(Reservation {
            decision,
            month: outcome.record.current_month,
        })
    }

    /// Completes a reservation made by `try_consume`. A refund for a month that
    /// has since rolled over is dropped.
    pub async fn settle(
        &self,
        user_id: Uuid,
        tier: &str,
        operation: Operation,
        settlement: Settlement,
    ) -> Result<UsageRecord> {
        let change = match settlement {
            Settlement::Completed { cost } => {
                validate_cost(cost)?;
                UsageChange::AddCost(cost)
            }
            Settlement::Failed { reserved_in } => UsageChange::Decrement {
                operation,
                reserved_in,
            },
        };
        let (key, seed) = self.key_and_seed(user_id, tier);
        let outcome = self.store.update(&key, &seed, change).await?;
        if !outcome.applied {
            debug!(key = %key, ?settlement, "Refund skipped for a closed month");
        }
        Ok(outcome.record)
    }

    pub async fn user_stats(&self, user_id: Uuid, tier: &str) -> Result<UserStats> {
        let record = self.get_or_create_record(user_id, tier).await?;
        Ok(UserStats::from_record(&record))
    }
}

fn validate_cost(cost: f64) -> Result<()> {
    if cost.is_finite() && cost >= 0.0 {
        Ok(())
    } else {
        Err(UsageError::InvalidCost(cost))
    }
}
