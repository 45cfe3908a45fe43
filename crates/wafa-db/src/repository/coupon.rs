//! # Coupon Repository
//!
//! Issued coupons and their one-way redemption transition.
//!
//! ## Coupon Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Coupon Lifecycle                                  │
//! │                                                                         │
//! │  1. ISSUE (ledger repository, inside the award transaction)            │
//! │     └── threshold crossing → INSERT with origin 'threshold'            │
//! │     └── manualReward       → INSERT with origin 'manual'               │
//! │                                                                         │
//! │  2. REDEEM (this repository)                                           │
//! │     └── redeem(code) → used 0 → 1, exactly once, never back            │
//! │                                                                         │
//! │  3. EXPIRE (passive)                                                   │
//! │     └── expires_at in the past → redeem() rejects                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};
use wafa_core::{Coupon, CouponOrigin};

/// Repository for coupon operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

/// Raw coupon row; origin text is parsed on the way out.
#[derive(sqlx::FromRow)]
pub(crate) struct CouponRow {
    id: String,
    merchant_id: String,
    customer_id: String,
    reward_id: String,
    code: String,
    origin: String,
    expires_at: DateTime<Utc>,
    used: bool,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl CouponRow {
    pub(crate) fn into_coupon(self) -> DbResult<Coupon> {
        let origin: CouponOrigin = self
            .origin
            .parse()
            .map_err(|e| DbError::corrupt("coupon origin", &self.id, e))?;

        Ok(Coupon {
            id: self.id,
            merchant_id: self.merchant_id,
            customer_id: self.customer_id,
            reward_id: self.reward_id,
            code: self.code,
            origin,
            expires_at: self.expires_at,
            used: self.used,
            used_at: self.used_at,
            created_at: self.created_at,
        })
    }
}

pub(crate) const SELECT_COUPON: &str =
    "SELECT id, merchant_id, customer_id, reward_id, code, origin, expires_at, used, used_at, \
     created_at FROM coupons";

/// Generates a coupon code: a fixed prefix plus random alphanumerics.
///
/// Uniqueness is enforced by the UNIQUE index on `code`; the issuer
/// retries with a fresh code on the (vanishingly rare) collision.
pub(crate) fn generate_coupon_code() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("WAFA-{suffix}")
}

impl CouponRepository {
    /// Creates a new CouponRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Gets a coupon by its redemption code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let row: Option<CouponRow> =
            sqlx::query_as(&format!("{SELECT_COUPON} WHERE code = ?1"))
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

        row.map(CouponRow::into_coupon).transpose()
    }

    /// Lists a customer's coupons, newest first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Coupon>> {
        let rows: Vec<CouponRow> = sqlx::query_as(&format!(
            "{SELECT_COUPON} WHERE customer_id = ?1 ORDER BY created_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CouponRow::into_coupon).collect()
    }

    /// Redeems a coupon by code.
    ///
    /// The used flag transitions false→true exactly once. Already-used
    /// and expired codes are rejected with typed errors; the guarded
    /// UPDATE makes double redemption impossible even under races.
    pub async fn redeem(&self, code: &str) -> DbResult<Coupon> {
        let now = Utc::now();

        let coupon = self
            .get_by_code(code)
            .await?
            .ok_or_else(|| DbError::not_found("Coupon", code))?;

        if coupon.used {
            return Err(DbError::CouponUsed {
                code: code.to_string(),
            });
        }
        if coupon.is_expired_at(now) {
            return Err(DbError::CouponExpired {
                code: code.to_string(),
                expired_at: coupon.expires_at.to_rfc3339(),
            });
        }

        let result = sqlx::query(
            "UPDATE coupons SET used = 1, used_at = ?2 WHERE id = ?1 AND used = 0",
        )
        .bind(&coupon.id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Raced with another redemption between the read and the write.
            return Err(DbError::CouponUsed {
                code: code.to_string(),
            });
        }

        info!(coupon_id = %coupon.id, code = %code, "Coupon redeemed");

        Ok(Coupon {
            used: true,
            used_at: Some(now),
            ..coupon
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::reward::NewReward;
    use chrono::Duration;
    use wafa_core::{LoyaltySettings, RewardType};

    async fn setup() -> (Database, String, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let merchant = db
            .merchants()
            .create("store-1", "Shop", None, LoyaltySettings::default())
            .await
            .unwrap();
        let customer = db
            .customers()
            .get_or_create(&merchant.id, "cust-1", Some("c@example.com"), None)
            .await
            .unwrap();
        let reward = db
            .rewards()
            .create(NewReward {
                merchant_id: merchant.id.clone(),
                name: "10% off".to_string(),
                points_required: 100,
                reward_type: RewardType::PercentageDiscount,
                reward_value: 1000,
                usage_limit: None,
                valid_from: None,
                valid_until: None,
            })
            .await
            .unwrap();
        (db, merchant.id, customer.id, reward.id)
    }

    async fn insert_coupon(
        db: &Database,
        merchant_id: &str,
        customer_id: &str,
        reward_id: &str,
        expires_at: DateTime<Utc>,
    ) -> String {
        let code = generate_coupon_code();
        sqlx::query(
            "INSERT INTO coupons (id, merchant_id, customer_id, reward_id, code, origin, \
             expires_at, used, used_at, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 'threshold', ?6, 0, NULL, ?7)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(merchant_id)
        .bind(customer_id)
        .bind(reward_id)
        .bind(&code)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();
        code
    }

    #[test]
    fn test_code_shape() {
        let code = generate_coupon_code();
        assert!(code.starts_with("WAFA-"));
        assert_eq!(code.len(), 15);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-'));
    }

    #[tokio::test]
    async fn test_redeem_once() {
        let (db, merchant_id, customer_id, reward_id) = setup().await;
        let code = insert_coupon(
            &db,
            &merchant_id,
            &customer_id,
            &reward_id,
            Utc::now() + Duration::days(30),
        )
        .await;

        let redeemed = db.coupons().redeem(&code).await.unwrap();
        assert!(redeemed.used);
        assert!(redeemed.used_at.is_some());

        // Second redemption is rejected, used never reverts
        let err = db.coupons().redeem(&code).await.unwrap_err();
        assert!(matches!(err, DbError::CouponUsed { .. }));

        let back = db.coupons().get_by_code(&code).await.unwrap().unwrap();
        assert!(back.used);
    }

    #[tokio::test]
    async fn test_redeem_expired() {
        let (db, merchant_id, customer_id, reward_id) = setup().await;
        let code = insert_coupon(
            &db,
            &merchant_id,
            &customer_id,
            &reward_id,
            Utc::now() - Duration::days(1),
        )
        .await;

        let err = db.coupons().redeem(&code).await.unwrap_err();
        assert!(matches!(err, DbError::CouponExpired { .. }));
    }

    #[tokio::test]
    async fn test_redeem_unknown_code() {
        let (db, _, _, _) = setup().await;
        let err = db.coupons().redeem("WAFA-NOPE000000").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_for_customer() {
        let (db, merchant_id, customer_id, reward_id) = setup().await;
        for _ in 0..3 {
            insert_coupon(
                &db,
                &merchant_id,
                &customer_id,
                &reward_id,
                Utc::now() + Duration::days(30),
            )
            .await;
        }

        let coupons = db.coupons().list_for_customer(&customer_id).await.unwrap();
        assert_eq!(coupons.len(), 3);
    }
}
