//! # Activity Ledger Repository
//!
//! Read access to the append-only loyalty activity ledger. Rows are
//! inserted exclusively by the ledger writer, inside the same
//! transaction as the balance change they record; nothing here mutates.
//!
//! The signed-sum query is the reconciliation primitive: for any
//! customer, the sum of their activity deltas equals their balance.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use wafa_core::LoyaltyActivity;

/// Repository for activity ledger queries.
#[derive(Debug, Clone)]
pub struct ActivityRepository {
    pool: SqlitePool,
}

/// Raw activity row; metadata JSON is parsed on the way out.
#[derive(sqlx::FromRow)]
pub(crate) struct ActivityRow {
    id: String,
    customer_id: String,
    merchant_id: String,
    event: String,
    points: i64,
    metadata: String,
    dedup_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl ActivityRow {
    pub(crate) fn into_activity(self) -> DbResult<LoyaltyActivity> {
        let metadata: serde_json::Value = serde_json::from_str(&self.metadata)
            .map_err(|e| DbError::corrupt("activity metadata", &self.id, e))?;

        Ok(LoyaltyActivity {
            id: self.id,
            customer_id: self.customer_id,
            merchant_id: self.merchant_id,
            event: self.event,
            points: self.points,
            metadata,
            dedup_key: self.dedup_key,
            created_at: self.created_at,
        })
    }
}

pub(crate) const SELECT_ACTIVITY: &str =
    "SELECT id, customer_id, merchant_id, event, points, metadata, dedup_key, created_at \
     FROM loyalty_activities";

impl ActivityRepository {
    /// Creates a new ActivityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ActivityRepository { pool }
    }

    /// Lists a customer's activity, newest first.
    pub async fn list_for_customer(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> DbResult<Vec<LoyaltyActivity>> {
        let rows: Vec<ActivityRow> = sqlx::query_as(&format!(
            "{SELECT_ACTIVITY} WHERE customer_id = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))
        .bind(customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActivityRow::into_activity).collect()
    }

    /// Lists a merchant's activity across all customers, newest first.
    pub async fn list_for_merchant(
        &self,
        merchant_id: &str,
        limit: u32,
    ) -> DbResult<Vec<LoyaltyActivity>> {
        let rows: Vec<ActivityRow> = sqlx::query_as(&format!(
            "{SELECT_ACTIVITY} WHERE merchant_id = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))
        .bind(merchant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActivityRow::into_activity).collect()
    }

    /// Sums a customer's signed activity deltas.
    ///
    /// Reconciliation invariant: this equals the customer's current
    /// balance, always.
    pub async fn sum_for_customer(&self, customer_id: &str) -> DbResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points), 0) FROM loyalty_activities WHERE customer_id = ?1",
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    /// Counts ledger rows for a customer.
    pub async fn count_for_customer(&self, customer_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loyalty_activities WHERE customer_id = ?1",
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use wafa_core::LoyaltySettings;

    #[tokio::test]
    async fn test_empty_ledger_sums_to_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let merchant = db
            .merchants()
            .create("store-1", "Shop", None, LoyaltySettings::default())
            .await
            .unwrap();
        let customer = db
            .customers()
            .get_or_create(&merchant.id, "cust-1", None, None)
            .await
            .unwrap();

        assert_eq!(db.activities().sum_for_customer(&customer.id).await.unwrap(), 0);
        assert_eq!(
            db.activities()
                .count_for_customer(&customer.id)
                .await
                .unwrap(),
            0
        );
        assert!(db
            .activities()
            .list_for_customer(&customer.id, 10)
            .await
            .unwrap()
            .is_empty());
    }
}
