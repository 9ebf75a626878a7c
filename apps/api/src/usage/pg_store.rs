use async_trait::async_trait;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{
    RecordSeed, Result, UpdateOutcome, UsageChange, UsageError, UsageKey, UsageRecord, UsageStore,
};
use crate::tiers::{Limit, Tier};

/// PostgreSQL-backed store. Shared across instances; each update runs in a
/// transaction holding a row lock, so quota reservations cannot race.
#[derive(Clone)]
pub struct PgUsageStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct UsageRow {
    user_id: Uuid,
    tier: String,
    parsing_count: i32,
    ai_call_count: i32,
    total_cost: f64,
    monthly_limit: i64,
    current_month: String,
}

impl UsageRow {
    fn into_record(self) -> Result<UsageRecord> {
        let key = format!("{}-{}", self.user_id, self.tier);
        let corrupt = |message: String| UsageError::CorruptRecord {
            key: key.clone(),
            message,
        };

        Ok(UsageRecord {
            user_id: self.user_id,
            tier: Tier::parse(&self.tier)
                .ok_or_else(|| corrupt(format!("unknown tier {:?}", self.tier)))?,
            parsing_count: u32::try_from(self.parsing_count)
                .map_err(|_| corrupt("negative parsing_count".to_string()))?,
            ai_call_count: u32::try_from(self.ai_call_count)
                .map_err(|_| corrupt("negative ai_call_count".to_string()))?,
            total_cost: self.total_cost,
            monthly_limit: Limit::try_from(self.monthly_limit).map_err(corrupt)?,
            current_month: self.current_month.parse().map_err(corrupt)?,
        })
    }
}

fn to_db_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_if_absent(
        conn: &mut PgConnection,
        key: &UsageKey,
        seed: &RecordSeed,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_records (user_id, tier, monthly_limit, current_month)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, tier) DO NOTHING
            "#,
        )
        .bind(key.user_id)
        .bind(key.tier.as_str())
        .bind(i64::from(seed.monthly_limit))
        .bind(seed.month.to_string())
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn get_or_create(&self, key: &UsageKey, seed: &RecordSeed) -> Result<UsageRecord> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_if_absent(&mut conn, key, seed).await?;

        let row: UsageRow = sqlx::query_as(
            "SELECT * FROM usage_records WHERE user_id = $1 AND tier = $2",
        )
        .bind(key.user_id)
        .bind(key.tier.as_str())
        .fetch_one(&mut *conn)
        .await?;

        // A stale month is reported as rolled over; the next update persists it.
        let mut record = row.into_record()?;
        record.roll_over(seed);
        Ok(record)
    }

    async fn update(
        &self,
        key: &UsageKey,
        seed: &RecordSeed,
        change: UsageChange,
    ) -> Result<UpdateOutcome> {
        let mut tx = self.pool.begin().await?;
        Self::insert_if_absent(&mut tx, key, seed).await?;

        let row: UsageRow = sqlx::query_as(
            "SELECT * FROM usage_records WHERE user_id = $1 AND tier = $2 FOR UPDATE",
        )
        .bind(key.user_id)
        .bind(key.tier.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let mut record = row.into_record()?;
        let rolled_over = record.roll_over(seed);
        if rolled_over {
            debug!(key = %key, month = %seed.month, "Rolled usage record over to new month");
        }
        let applied = record.apply(change);

        if applied || rolled_over {
            sqlx::query(
                r#"
                UPDATE usage_records
                SET parsing_count = $3,
                    ai_call_count = $4,
                    total_cost = $5,
                    monthly_limit = $6,
                    current_month = $7,
                    updated_at = NOW()
                WHERE user_id = $1 AND tier = $2
                "#,
            )
            .bind(key.user_id)
            .bind(key.tier.as_str())
            .bind(to_db_count(record.parsing_count))
            .bind(to_db_count(record.ai_call_count))
            .bind(record.total_cost)
            .bind(i64::from(record.monthly_limit))
            .bind(record.current_month.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(UpdateOutcome { applied, record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(tier: &str, parsing_count: i32, monthly_limit: i64, month: &str) -> UsageRow {
        UsageRow {
            user_id: Uuid::new_v4(),
            tier: tier.to_string(),
            parsing_count,
            ai_call_count: 2,
            total_cost: 0.004,
            monthly_limit,
            current_month: month.to_string(),
        }
    }

    #[test]
    fn test_row_converts_to_record() {
        let record = row("careerPro", 7, -1, "2026-09").into_record().unwrap();
        assert_eq!(record.tier, Tier::CareerPro);
        assert_eq!(record.parsing_count, 7);
        assert_eq!(record.ai_call_count, 2);
        assert_eq!(record.monthly_limit, Limit::Unlimited);
        assert_eq!(record.current_month.to_string(), "2026-09");
    }

    #[test]
    fn test_row_with_unknown_tier_is_corrupt() {
        let err = row("gold", 0, 3, "2026-09").into_record().unwrap_err();
        assert!(matches!(err, UsageError::CorruptRecord { .. }));
    }

    #[test]
    fn test_row_with_negative_count_is_corrupt() {
        assert!(row("free", -1, 3, "2026-09").into_record().is_err());
        assert!(row("free", 0, -5, "2026-09").into_record().is_err());
        assert!(row("free", 0, 3, "September").into_record().is_err());
    }

    #[test]
    fn test_db_count_clamps() {
        assert_eq!(to_db_count(5), 5);
        assert_eq!(to_db_count(u32::MAX), i32::MAX);
    }
}
