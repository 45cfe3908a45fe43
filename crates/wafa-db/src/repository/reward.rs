//! # Reward Repository
//!
//! Merchant-defined reward rules. The engine reads these; configuration
//! collaborators write them. The coupon issuer consumes the merchant's
//! designated active rule (the oldest rule currently available).

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use wafa_core::validation::validate_reward;
use wafa_core::{Reward, RewardType};

/// Repository for reward rule operations.
#[derive(Debug, Clone)]
pub struct RewardRepository {
    pool: SqlitePool,
}

/// Raw reward row; enum text is parsed on the way out.
#[derive(sqlx::FromRow)]
pub(crate) struct RewardRow {
    id: String,
    merchant_id: String,
    name: String,
    points_required: i64,
    reward_type: String,
    reward_value: i64,
    usage_limit: Option<i64>,
    times_used: i64,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RewardRow {
    pub(crate) fn into_reward(self) -> DbResult<Reward> {
        let reward_type: RewardType = self
            .reward_type
            .parse()
            .map_err(|e| DbError::corrupt("reward type", &self.id, e))?;

        Ok(Reward {
            id: self.id,
            merchant_id: self.merchant_id,
            name: self.name,
            points_required: self.points_required,
            reward_type,
            reward_value: self.reward_value,
            usage_limit: self.usage_limit,
            times_used: self.times_used,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) const SELECT_REWARD: &str =
    "SELECT id, merchant_id, name, points_required, reward_type, reward_value, usage_limit, \
     times_used, valid_from, valid_until, is_active, created_at, updated_at FROM rewards";

/// Parameters for creating a reward rule.
#[derive(Debug, Clone)]
pub struct NewReward {
    pub merchant_id: String,
    pub name: String,
    pub points_required: i64,
    pub reward_type: RewardType,
    pub reward_value: i64,
    pub usage_limit: Option<i64>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl RewardRepository {
    /// Creates a new RewardRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RewardRepository { pool }
    }

    /// Creates a reward rule after validating it.
    pub async fn create(&self, new: NewReward) -> DbResult<Reward> {
        let now = Utc::now();
        let reward = Reward {
            id: Uuid::new_v4().to_string(),
            merchant_id: new.merchant_id,
            name: new.name,
            points_required: new.points_required,
            reward_type: new.reward_type,
            reward_value: new.reward_value,
            usage_limit: new.usage_limit,
            times_used: 0,
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        validate_reward(&reward)?;

        sqlx::query(
            "INSERT INTO rewards (id, merchant_id, name, points_required, reward_type, \
             reward_value, usage_limit, times_used, valid_from, valid_until, is_active, \
             created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(&reward.id)
        .bind(&reward.merchant_id)
        .bind(&reward.name)
        .bind(reward.points_required)
        .bind(reward.reward_type.as_str())
        .bind(reward.reward_value)
        .bind(reward.usage_limit)
        .bind(reward.times_used)
        .bind(reward.valid_from)
        .bind(reward.valid_until)
        .bind(reward.is_active)
        .bind(reward.created_at)
        .bind(reward.updated_at)
        .execute(&self.pool)
        .await?;

        info!(reward_id = %reward.id, merchant_id = %reward.merchant_id, "Reward rule created");

        Ok(reward)
    }

    /// Gets a reward by ID, scoped to a merchant.
    pub async fn get(&self, merchant_id: &str, reward_id: &str) -> DbResult<Option<Reward>> {
        let row: Option<RewardRow> = sqlx::query_as(&format!(
            "{SELECT_REWARD} WHERE id = ?1 AND merchant_id = ?2"
        ))
        .bind(reward_id)
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RewardRow::into_reward).transpose()
    }

    /// Lists a merchant's reward rules, newest first.
    pub async fn list_for_merchant(&self, merchant_id: &str) -> DbResult<Vec<Reward>> {
        let rows: Vec<RewardRow> = sqlx::query_as(&format!(
            "{SELECT_REWARD} WHERE merchant_id = ?1 ORDER BY created_at DESC"
        ))
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RewardRow::into_reward).collect()
    }

    /// Finds the merchant's designated active reward rule at `now`.
    ///
    /// The oldest rule that is enabled, inside its validity window, and
    /// under its usage cap. Candidate filtering happens in Rust so the
    /// availability logic lives in one place
    /// ([`Reward::is_available_at`]).
    pub async fn active_for_merchant(
        &self,
        merchant_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Reward>> {
        let rows: Vec<RewardRow> = sqlx::query_as(&format!(
            "{SELECT_REWARD} WHERE merchant_id = ?1 AND is_active = 1 ORDER BY created_at ASC"
        ))
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let reward = row.into_reward()?;
            if reward.is_available_at(now) {
                return Ok(Some(reward));
            }
        }

        Ok(None)
    }

    /// Disables a reward rule.
    pub async fn deactivate(&self, merchant_id: &str, reward_id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE rewards SET is_active = 0, updated_at = ?3 \
             WHERE id = ?1 AND merchant_id = ?2 AND is_active = 1",
        )
        .bind(reward_id)
        .bind(merchant_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Reward (active)", reward_id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use wafa_core::LoyaltySettings;

    async fn db_with_merchant() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let merchant = db
            .merchants()
            .create("store-1", "Shop", None, LoyaltySettings::default())
            .await
            .unwrap();
        (db, merchant.id)
    }

    fn new_reward(merchant_id: &str, name: &str) -> NewReward {
        NewReward {
            merchant_id: merchant_id.to_string(),
            name: name.to_string(),
            points_required: 100,
            reward_type: RewardType::PercentageDiscount,
            reward_value: 1000,
            usage_limit: None,
            valid_from: None,
            valid_until: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (db, merchant_id) = db_with_merchant().await;
        let reward = db
            .rewards()
            .create(new_reward(&merchant_id, "10% off"))
            .await
            .unwrap();

        let back = db
            .rewards()
            .get(&merchant_id, &reward.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(back.name, "10% off");
        assert_eq!(back.reward_type, RewardType::PercentageDiscount);
        assert_eq!(back.times_used, 0);
    }

    #[tokio::test]
    async fn test_invalid_reward_rejected() {
        let (db, merchant_id) = db_with_merchant().await;
        let mut new = new_reward(&merchant_id, "broken");
        new.points_required = 0;
        assert!(db.rewards().create(new).await.is_err());
    }

    #[tokio::test]
    async fn test_active_picks_oldest_available() {
        let (db, merchant_id) = db_with_merchant().await;
        let first = db
            .rewards()
            .create(new_reward(&merchant_id, "first"))
            .await
            .unwrap();
        db.rewards()
            .create(new_reward(&merchant_id, "second"))
            .await
            .unwrap();

        let active = db
            .rewards()
            .active_for_merchant(&merchant_id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, first.id);
    }

    #[tokio::test]
    async fn test_active_skips_unavailable() {
        let (db, merchant_id) = db_with_merchant().await;
        let now = Utc::now();

        let mut expired = new_reward(&merchant_id, "expired");
        expired.valid_until = Some(now - Duration::days(1));
        // valid_from must not be after valid_until
        expired.valid_from = Some(now - Duration::days(30));
        db.rewards().create(expired).await.unwrap();

        let current = db
            .rewards()
            .create(new_reward(&merchant_id, "current"))
            .await
            .unwrap();

        let active = db
            .rewards()
            .active_for_merchant(&merchant_id, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, current.id);
    }

    #[tokio::test]
    async fn test_no_active_rule() {
        let (db, merchant_id) = db_with_merchant().await;
        assert!(db
            .rewards()
            .active_for_merchant(&merchant_id, Utc::now())
            .await
            .unwrap()
            .is_none());

        let reward = db
            .rewards()
            .create(new_reward(&merchant_id, "soon disabled"))
            .await
            .unwrap();
        db.rewards()
            .deactivate(&merchant_id, &reward.id)
            .await
            .unwrap();

        assert!(db
            .rewards()
            .active_for_merchant(&merchant_id, Utc::now())
            .await
            .unwrap()
            .is_none());
    }
}
