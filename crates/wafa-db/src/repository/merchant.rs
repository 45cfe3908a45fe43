//! # Merchant Repository
//!
//! Merchant lifecycle and loyalty configuration storage.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Merchant Lifecycle                                 │
//! │                                                                         │
//! │  1. STORE AUTHORIZATION                                                │
//! │     └── create() → merchant row with validated settings JSON           │
//! │                                                                         │
//! │  2. CONFIGURATION                                                      │
//! │     └── update_settings() → validated, then overwrites the JSON        │
//! │                                                                         │
//! │  3. OPERATION                                                          │
//! │     └── add_customers_points() → best-effort aggregate bump            │
//! │     └── reconcile_customers_points() → recompute from the ledger       │
//! │                                                                         │
//! │  4. APP UNINSTALL                                                      │
//! │     └── delete() → children removed via ON DELETE CASCADE              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use wafa_core::validation::validate_settings;
use wafa_core::{LoyaltySettings, Merchant};

/// Repository for merchant database operations.
#[derive(Debug, Clone)]
pub struct MerchantRepository {
    pool: SqlitePool,
}

/// Raw merchant row; `settings` is parsed on the way out.
#[derive(sqlx::FromRow)]
struct MerchantRow {
    id: String,
    external_id: String,
    name: String,
    email: Option<String>,
    settings: String,
    customers_points: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MerchantRow {
    fn into_merchant(self) -> DbResult<Merchant> {
        let settings: LoyaltySettings = serde_json::from_str(&self.settings)
            .map_err(|e| DbError::corrupt("merchant settings", &self.id, e))?;

        Ok(Merchant {
            id: self.id,
            external_id: self.external_id,
            name: self.name,
            email: self.email,
            settings,
            customers_points: self.customers_points,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_MERCHANT: &str = "SELECT id, external_id, name, email, settings, \
     customers_points, created_at, updated_at FROM merchants";

impl MerchantRepository {
    /// Creates a new MerchantRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MerchantRepository { pool }
    }

    /// Creates a merchant on store authorization.
    ///
    /// Settings are validated before anything is written; invalid
    /// configuration never reaches a row.
    pub async fn create(
        &self,
        external_id: &str,
        name: &str,
        email: Option<&str>,
        settings: LoyaltySettings,
    ) -> DbResult<Merchant> {
        validate_settings(&settings)?;

        let now = Utc::now();
        let merchant = Merchant {
            id: Uuid::new_v4().to_string(),
            external_id: external_id.to_string(),
            name: name.to_string(),
            email: email.map(str::to_string),
            settings,
            customers_points: 0,
            created_at: now,
            updated_at: now,
        };

        let settings_json = serde_json::to_string(&merchant.settings)
            .map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO merchants (id, external_id, name, email, settings, \
             customers_points, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&merchant.id)
        .bind(&merchant.external_id)
        .bind(&merchant.name)
        .bind(&merchant.email)
        .bind(&settings_json)
        .bind(merchant.customers_points)
        .bind(merchant.created_at)
        .bind(merchant.updated_at)
        .execute(&self.pool)
        .await?;

        info!(merchant_id = %merchant.id, external_id = %external_id, "Merchant created");

        Ok(merchant)
    }

    /// Gets a merchant by internal ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Merchant>> {
        let row: Option<MerchantRow> =
            sqlx::query_as(&format!("{SELECT_MERCHANT} WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(MerchantRow::into_merchant).transpose()
    }

    /// Gets a merchant by the platform-assigned store ID.
    pub async fn get_by_external_id(&self, external_id: &str) -> DbResult<Option<Merchant>> {
        let row: Option<MerchantRow> =
            sqlx::query_as(&format!("{SELECT_MERCHANT} WHERE external_id = ?1"))
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(MerchantRow::into_merchant).transpose()
    }

    /// Replaces a merchant's loyalty settings.
    ///
    /// Settings are validated first; the row is untouched on rejection.
    pub async fn update_settings(&self, id: &str, settings: &LoyaltySettings) -> DbResult<()> {
        validate_settings(settings)?;

        let settings_json =
            serde_json::to_string(settings).map_err(|e| DbError::Internal(e.to_string()))?;
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE merchants SET settings = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(&settings_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Merchant", id));
        }

        debug!(merchant_id = %id, "Merchant settings updated");
        Ok(())
    }

    /// Deletes a merchant on app uninstall.
    ///
    /// Customers, rewards, coupons, activities, and outbox entries go
    /// with it via ON DELETE CASCADE.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM merchants WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Merchant", id));
        }

        info!(merchant_id = %id, "Merchant deleted");
        Ok(())
    }

    /// Adds a signed delta to the informational customers_points
    /// aggregate.
    ///
    /// Called after the customer-side transaction commits. The caller
    /// treats failures as log-and-continue; the aggregate is not
    /// authoritative and can be rebuilt with
    /// [`MerchantRepository::reconcile_customers_points`].
    pub async fn add_customers_points(&self, id: &str, delta: i64) -> DbResult<()> {
        sqlx::query(
            "UPDATE merchants SET customers_points = customers_points + ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Recomputes the customers_points aggregate from the activity
    /// ledger and stores it.
    ///
    /// ## Returns
    /// The recomputed value.
    pub async fn reconcile_customers_points(&self, id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points), 0) FROM loyalty_activities WHERE merchant_id = ?1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let result = sqlx::query("UPDATE merchants SET customers_points = ?2 WHERE id = ?1")
            .bind(id)
            .bind(total)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Merchant", id));
        }

        info!(merchant_id = %id, customers_points = total, "Aggregate reconciled");
        Ok(total)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use wafa_core::{LoyaltySettings, TierThresholds};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let db = db().await;
        let merchant = db
            .merchants()
            .create("store-1", "Corner Shop", Some("owner@shop.example"), LoyaltySettings::default())
            .await
            .unwrap();

        let by_id = db.merchants().get(&merchant.id).await.unwrap().unwrap();
        assert_eq!(by_id.external_id, "store-1");
        assert_eq!(by_id.customers_points, 0);

        let by_ext = db
            .merchants()
            .get_by_external_id("store-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_ext.id, merchant.id);

        assert!(db
            .merchants()
            .get_by_external_id("store-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_external_id_rejected() {
        let db = db().await;
        db.merchants()
            .create("store-1", "First", None, LoyaltySettings::default())
            .await
            .unwrap();

        let err = db
            .merchants()
            .create("store-1", "Second", None, LoyaltySettings::default())
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let db = db().await;
        let mut settings = LoyaltySettings::default();
        settings.tiers = TierThresholds {
            silver: 100,
            gold: 50,
            platinum: 5000,
        };

        let err = db
            .merchants()
            .create("store-1", "Shop", None, settings)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::DbError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_update_settings() {
        let db = db().await;
        let merchant = db
            .merchants()
            .create("store-1", "Shop", None, LoyaltySettings::default())
            .await
            .unwrap();

        let mut settings = LoyaltySettings::default();
        settings.purchase.enabled = true;
        settings.purchase.cents_per_point = 50;
        db.merchants()
            .update_settings(&merchant.id, &settings)
            .await
            .unwrap();

        let back = db.merchants().get(&merchant.id).await.unwrap().unwrap();
        assert!(back.settings.purchase.enabled);
        assert_eq!(back.settings.purchase.cents_per_point, 50);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = db().await;
        let merchant = db
            .merchants()
            .create("store-1", "Shop", None, LoyaltySettings::default())
            .await
            .unwrap();

        db.merchants().delete(&merchant.id).await.unwrap();
        assert!(db.merchants().get(&merchant.id).await.unwrap().is_none());

        // Deleting again reports not found
        assert!(db.merchants().delete(&merchant.id).await.is_err());
    }

    #[tokio::test]
    async fn test_aggregate_add() {
        let db = db().await;
        let merchant = db
            .merchants()
            .create("store-1", "Shop", None, LoyaltySettings::default())
            .await
            .unwrap();

        db.merchants()
            .add_customers_points(&merchant.id, 120)
            .await
            .unwrap();
        db.merchants()
            .add_customers_points(&merchant.id, -20)
            .await
            .unwrap();

        let back = db.merchants().get(&merchant.id).await.unwrap().unwrap();
        assert_eq!(back.customers_points, 100);
    }
}
