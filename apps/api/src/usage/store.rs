use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RecordSeed, Result, UpdateOutcome, UsageChange, UsageKey, UsageRecord};

/// Backing store for usage records.
///
/// Implementations create records lazily from `seed`, roll them over when
/// `seed.month` differs from the stored month, and must apply each
/// `UsageChange` atomically with respect to other updates on the same key.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn get_or_create(&self, key: &UsageKey, seed: &RecordSeed) -> Result<UsageRecord>;

    async fn update(
        &self,
        key: &UsageKey,
        seed: &RecordSeed,
        change: UsageChange,
    ) -> Result<UpdateOutcome>;
}

/// Process-local store. Counts are lost on restart and are not shared between
/// instances, so this is only suitable for single-instance deployments and tests.
#[derive(Default)]
pub struct InMemoryUsageStore {
    records: RwLock<HashMap<UsageKey, UsageRecord>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn get_or_create(&self, key: &UsageKey, seed: &RecordSeed) -> Result<UsageRecord> {
        let mut records = self.records.write().await;
        let record = records
            .entry(*key)
            .or_insert_with(|| UsageRecord::new(key, seed));
        record.roll_over(seed);
        Ok(record.clone())
    }

    async fn update(
        &self,
        key: &UsageKey,
        seed: &RecordSeed,
        change: UsageChange,
    ) -> Result<UpdateOutcome> {
        // The write guard spans check and mutation, which makes IncrementWithin atomic.
        let mut records = self.records.write().await;
        let record = records
            .entry(*key)
            .or_insert_with(|| UsageRecord::new(key, seed));
        record.roll_over(seed);
        let applied = record.apply(change);
        Ok(UpdateOutcome {
            applied,
            record: record.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::{Limit, Tier};
    use crate::usage::{Operation, YearMonth};
    use std::sync::Arc;
    use uuid::Uuid;

    fn key() -> UsageKey {
        UsageKey {
            user_id: Uuid::new_v4(),
            tier: Tier::Starter,
        }
    }

    fn seed() -> RecordSeed {
        RecordSeed {
            month: YearMonth::new(2026, 10).unwrap(),
            monthly_limit: Limit::Max(25),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_does_not_overwrite() {
        let store = InMemoryUsageStore::new();
        let key = key();
        store
            .update(
                &key,
                &seed(),
                UsageChange::Increment {
                    operation: Operation::Parsing,
                    cost: 0.25,
                },
            )
            .await
            .unwrap();

        let record = store.get_or_create(&key, &seed()).await.unwrap();
        assert_eq!(record.parsing_count, 1);
        assert_eq!(record.total_cost, 0.25);
        let again = store.get_or_create(&key, &seed()).await.unwrap();
        assert_eq!(record, again);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_exceed_limit() {
        let store = Arc::new(InMemoryUsageStore::new());
        let key = key();
        let change = UsageChange::IncrementWithin {
            operation: Operation::Ai,
            limit: Limit::Max(15),
        };

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.update(&key, &seed(), change).await.unwrap() })
            })
            .collect();

        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap().applied {
                granted += 1;
            }
        }

        assert_eq!(granted, 15);
        let record = store.get_or_create(&key, &seed()).await.unwrap();
        assert_eq!(record.ai_call_count, 15);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryUsageStore::new();
        let a = key();
        let b = UsageKey {
            user_id: a.user_id,
            tier: Tier::Professional,
        };
        store
            .update(
                &a,
                &seed(),
                UsageChange::Increment {
                    operation: Operation::Ai,
                    cost: 0.0,
                },
            )
            .await
            .unwrap();

        assert_eq!(store.get_or_create(&b, &seed()).await.unwrap().ai_call_count, 0);
    }
}
