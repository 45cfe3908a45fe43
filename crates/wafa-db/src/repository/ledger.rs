//! # Ledger Repository
//!
//! The write path for customer point balances. Everything that must be
//! atomic with a balance change happens here, in one transaction.
//!
//! ## The Award Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      award() - one transaction                          │
//! │                                                                         │
//! │  1. Replay check     SELECT 1 FROM loyalty_activities                  │
//! │                      WHERE dedup_key = ?  → hit = no-op outcome        │
//! │                                                                         │
//! │  2. Read balance     SELECT points, tier, version, email ...           │
//! │                                                                         │
//! │  3. Write balance    UPDATE customers SET points, tier,                │
//! │                      version = version + 1                             │
//! │                      WHERE id = ? AND version = ?                      │
//! │                      → 0 rows = lost a race → retry from 1             │
//! │                                                                         │
//! │  4. Audit            INSERT INTO loyalty_activities (signed delta)     │
//! │                                                                         │
//! │  5. Coupons          active reward rule → one coupon per threshold     │
//! │                      crossing, times_used bumped per coupon;           │
//! │                      no rule → admin alert queued instead              │
//! │                                                                         │
//! │  6. Notifications    INSERT INTO notification_outbox                   │
//! │                                                                         │
//! │  COMMIT - all of it or none of it                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The merchant's customers_points aggregate is NOT touched here: it is
//! informational, updated best-effort by the dispatcher after commit,
//! and reconciled from this ledger.

use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::coupon::generate_coupon_code;
use crate::repository::outbox::insert_entry;
use crate::repository::reward::{RewardRow, SELECT_REWARD};
use wafa_core::event::DeductionReason;
use wafa_core::points::threshold_crossings;
use wafa_core::{
    Coupon, CouponOrigin, Customer, EventKind, Merchant, NotificationKind, NotificationPayload,
    Reward, Tier,
};

// =============================================================================
// Settings & Outcomes
// =============================================================================

/// Tunables for the ledger writer.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Coupon validity window from issuance, in days.
    pub coupon_validity_days: i64,

    /// How many optimistic-concurrency retries before giving up.
    pub max_write_retries: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            coupon_validity_days: 30,
            max_write_retries: 5,
        }
    }
}

/// Result of an award invocation.
#[derive(Debug, Clone)]
pub struct AwardOutcome {
    /// False when the event was a replay (dedup key already present);
    /// nothing was written.
    pub applied: bool,
    pub points_before: i64,
    pub points_after: i64,
    pub tier_before: Tier,
    pub tier_after: Tier,
    /// Coupons issued by this award, one per threshold crossing.
    pub coupons: Vec<Coupon>,
    /// True when a crossing check ran without an active reward rule;
    /// an administrative alert was queued instead of a coupon.
    pub missing_reward_rule: bool,
}

impl AwardOutcome {
    /// Whether the award moved the customer to a different tier.
    pub fn tier_changed(&self) -> bool {
        self.tier_before != self.tier_after
    }
}

/// Result of a deduction invocation.
#[derive(Debug, Clone)]
pub struct DeductOutcome {
    /// What the caller asked to take back.
    pub requested: i64,
    /// What was actually taken (clamped so the balance stays >= 0).
    /// This is also what the ledger entry records.
    pub deducted: i64,
    pub points_after: i64,
    pub tier_before: Tier,
    pub tier_after: Tier,
}

/// Balance fields read inside the transaction.
#[derive(sqlx::FromRow)]
struct BalanceRow {
    points: i64,
    tier: String,
    version: i64,
    email: Option<String>,
    name: Option<String>,
}

// =============================================================================
// Ledger Repository
// =============================================================================

/// The sole writer of customer balances and trigger of coupon issuance.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
    settings: LedgerSettings,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool, settings: LedgerSettings) -> Self {
        LedgerRepository { pool, settings }
    }

    /// Applies a positive point award to a customer.
    ///
    /// ## Arguments
    /// * `merchant` - the owning merchant (settings drive tier and
    ///   notification decisions)
    /// * `customer_id` - internal customer id, already resolved
    /// * `event` - the event kind recorded in the ledger
    /// * `points` - the delta, must be positive (the calculator never
    ///   hands zero here; zero deltas write no ledger entry)
    /// * `metadata` - original event metadata, stored verbatim
    /// * `dedup_key` - replay key for order-bearing events
    pub async fn award(
        &self,
        merchant: &Merchant,
        customer_id: &str,
        event: EventKind,
        points: i64,
        metadata: &Value,
        dedup_key: Option<&str>,
    ) -> DbResult<AwardOutcome> {
        if points <= 0 {
            return Err(DbError::Internal(format!(
                "award called with non-positive delta {points}"
            )));
        }

        for attempt in 0..self.settings.max_write_retries {
            let mut tx = self.pool.begin().await?;

            // Replay check. The dedup key is also UNIQUE-constrained, so
            // a race between two deliveries that both pass this check is
            // caught again at the insert below.
            if let Some(key) = dedup_key {
                let seen: Option<i64> =
                    sqlx::query_scalar("SELECT 1 FROM loyalty_activities WHERE dedup_key = ?1")
                        .bind(key)
                        .fetch_optional(&mut *tx)
                        .await?;

                if seen.is_some() {
                    tx.rollback().await?;
                    info!(
                        customer_id = %customer_id,
                        event = event.as_str(),
                        dedup_key = key,
                        "Replayed event ignored"
                    );
                    return self.replay_outcome(customer_id).await;
                }
            }

            let Some(balance) = self.fetch_balance(&mut tx, merchant, customer_id).await? else {
                return Err(DbError::not_found("Customer", customer_id));
            };

            let points_before = balance.points;
            let points_after = points_before + points;
            let tier_before: Tier = balance
                .tier
                .parse()
                .map_err(|e| DbError::corrupt("customer tier", customer_id, e))?;
            let tier_after = Tier::resolve(points_after, &merchant.settings.tiers);
            let now = Utc::now();

            let updated = sqlx::query(
                "UPDATE customers SET points = ?2, tier = ?3, version = version + 1, \
                 updated_at = ?4 WHERE id = ?1 AND version = ?5",
            )
            .bind(customer_id)
            .bind(points_after)
            .bind(tier_after.as_str())
            .bind(now)
            .bind(balance.version)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                // Someone else moved the balance between our read and
                // write. Drop everything and start over.
                tx.rollback().await?;
                debug!(
                    customer_id = %customer_id,
                    attempt = attempt + 1,
                    "Balance version conflict, retrying"
                );
                continue;
            }

            match self
                .insert_activity(&mut tx, merchant, customer_id, event, points, metadata, dedup_key)
                .await
            {
                Ok(()) => {}
                Err(e) if is_dedup_violation(&e) => {
                    // A concurrent delivery inserted the same key after
                    // our replay check. Treat exactly like the pre-check
                    // hit.
                    tx.rollback().await?;
                    info!(
                        customer_id = %customer_id,
                        event = event.as_str(),
                        "Replayed event lost insert race, ignored"
                    );
                    return self.replay_outcome(customer_id).await;
                }
                Err(e) => return Err(e),
            }

            // Coupon issuance rides the same transaction as the balance
            // change its crossing detection depends on.
            let (coupons, missing_reward_rule) = self
                .issue_threshold_coupons(&mut tx, merchant, customer_id, &balance, points_before, points_after)
                .await?;

            self.queue_award_notification(
                &mut tx,
                merchant,
                customer_id,
                &balance,
                event,
                points,
                points_after,
            )
            .await?;

            tx.commit().await?;

            info!(
                customer_id = %customer_id,
                event = event.as_str(),
                points = points,
                balance = points_after,
                tier = %tier_after,
                coupons = coupons.len(),
                "Points awarded"
            );

            return Ok(AwardOutcome {
                applied: true,
                points_before,
                points_after,
                tier_before,
                tier_after,
                coupons,
                missing_reward_rule,
            });
        }

        Err(DbError::ConcurrencyConflict {
            customer_id: customer_id.to_string(),
        })
    }

    /// Applies a deduction, clamped so the balance never goes negative.
    ///
    /// The ledger entry records the amount actually deducted, not the
    /// requested one, so the audit trail stays internally consistent.
    /// A deduction that clamps to zero writes nothing.
    pub async fn deduct(
        &self,
        merchant: &Merchant,
        customer_id: &str,
        requested: i64,
        reason: DeductionReason,
        metadata: &Value,
    ) -> DbResult<DeductOutcome> {
        if requested < 0 {
            return Err(DbError::Internal(format!(
                "deduct called with negative request {requested}"
            )));
        }

        for attempt in 0..self.settings.max_write_retries {
            let mut tx = self.pool.begin().await?;

            let Some(balance) = self.fetch_balance(&mut tx, merchant, customer_id).await? else {
                return Err(DbError::not_found("Customer", customer_id));
            };

            let points_before = balance.points;
            let deducted = requested.min(points_before);
            let tier_before: Tier = balance
                .tier
                .parse()
                .map_err(|e| DbError::corrupt("customer tier", customer_id, e))?;

            if deducted == 0 {
                tx.rollback().await?;
                debug!(
                    customer_id = %customer_id,
                    requested = requested,
                    "Deduction clamped to zero, nothing to record"
                );
                return Ok(DeductOutcome {
                    requested,
                    deducted: 0,
                    points_after: points_before,
                    tier_before,
                    tier_after: tier_before,
                });
            }

            let points_after = points_before - deducted;
            let tier_after = Tier::resolve(points_after, &merchant.settings.tiers);
            let now = Utc::now();

            let updated = sqlx::query(
                "UPDATE customers SET points = ?2, tier = ?3, version = version + 1, \
                 updated_at = ?4 WHERE id = ?1 AND version = ?5",
            )
            .bind(customer_id)
            .bind(points_after)
            .bind(tier_after.as_str())
            .bind(now)
            .bind(balance.version)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                tx.rollback().await?;
                debug!(
                    customer_id = %customer_id,
                    attempt = attempt + 1,
                    "Balance version conflict, retrying"
                );
                continue;
            }

            // Enrich the stored metadata with the clamp result so the
            // audit trail shows both numbers.
            let mut stored = metadata.clone();
            if let Value::Object(map) = &mut stored {
                map.insert("reason".to_string(), Value::from(reason.as_str()));
                map.insert("requested".to_string(), Value::from(requested));
            }

            self.insert_activity(
                &mut tx,
                merchant,
                customer_id,
                EventKind::PointsDeduction,
                -deducted,
                &stored,
                None,
            )
            .await?;

            if merchant.settings.notifications.points_deducted {
                if let Some(email) = &balance.email {
                    let payload = NotificationPayload {
                        customer_name: balance.name.clone(),
                        points: Some(deducted),
                        balance: Some(points_after),
                        ..NotificationPayload::default()
                    };
                    insert_entry(
                        &mut *tx,
                        &merchant.id,
                        Some(customer_id),
                        NotificationKind::PointsDeducted,
                        email,
                        &payload,
                    )
                    .await?;
                }
            }

            tx.commit().await?;

            info!(
                customer_id = %customer_id,
                requested = requested,
                deducted = deducted,
                balance = points_after,
                reason = reason.as_str(),
                "Points deducted"
            );

            return Ok(DeductOutcome {
                requested,
                deducted,
                points_after,
                tier_before,
                tier_after,
            });
        }

        Err(DbError::ConcurrencyConflict {
            customer_id: customer_id.to_string(),
        })
    }

    /// Issues one coupon for a named reward without any points check.
    ///
    /// Used by the manualReward path. The usage cap is re-checked
    /// atomically via the guarded UPDATE on times_used, so concurrent
    /// manual issuances cannot overshoot the limit.
    pub async fn issue_manual_coupon(
        &self,
        merchant: &Merchant,
        customer: &Customer,
        reward: &Reward,
    ) -> DbResult<Coupon> {
        let now = Utc::now();
        if !reward.is_available_at(now) {
            return Err(DbError::RewardUnavailable {
                id: reward.id.clone(),
            });
        }

        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE rewards SET times_used = times_used + 1, updated_at = ?2 \
             WHERE id = ?1 AND is_active = 1 \
             AND (usage_limit IS NULL OR times_used < usage_limit)",
        )
        .bind(&reward.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DbError::RewardUnavailable {
                id: reward.id.clone(),
            });
        }

        let coupon = self
            .insert_coupon(&mut tx, merchant, &customer.id, reward, CouponOrigin::Manual)
            .await?;

        if merchant.settings.notifications.coupon_issued {
            if let Some(email) = &customer.email {
                let payload = NotificationPayload {
                    customer_name: customer.name.clone(),
                    coupon_code: Some(coupon.code.clone()),
                    reward_name: Some(reward.name.clone()),
                    expires_at: Some(coupon.expires_at),
                    ..NotificationPayload::default()
                };
                insert_entry(
                    &mut *tx,
                    &merchant.id,
                    Some(&customer.id),
                    NotificationKind::CouponIssued,
                    email,
                    &payload,
                )
                .await?;
            }
        }

        tx.commit().await?;

        info!(
            customer_id = %customer.id,
            reward_id = %reward.id,
            code = %coupon.code,
            "Manual coupon issued"
        );

        Ok(coupon)
    }

    // =========================================================================
    // Transaction Helpers
    // =========================================================================

    async fn fetch_balance(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        merchant: &Merchant,
        customer_id: &str,
    ) -> DbResult<Option<BalanceRow>> {
        let row: Option<BalanceRow> = sqlx::query_as(
            "SELECT points, tier, version, email, name FROM customers \
             WHERE id = ?1 AND merchant_id = ?2",
        )
        .bind(customer_id)
        .bind(&merchant.id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row)
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_activity(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        merchant: &Merchant,
        customer_id: &str,
        event: EventKind,
        points: i64,
        metadata: &Value,
        dedup_key: Option<&str>,
    ) -> DbResult<()> {
        let metadata_json =
            serde_json::to_string(metadata).map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO loyalty_activities (id, customer_id, merchant_id, event, points, \
             metadata, dedup_key, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(customer_id)
        .bind(&merchant.id)
        .bind(event.as_str())
        .bind(points)
        .bind(&metadata_json)
        .bind(dedup_key)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Detects threshold crossings and issues coupons inside the open
    /// transaction. Returns the issued coupons and whether the active
    /// rule was missing.
    async fn issue_threshold_coupons(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        merchant: &Merchant,
        customer_id: &str,
        balance: &BalanceRow,
        points_before: i64,
        points_after: i64,
    ) -> DbResult<(Vec<Coupon>, bool)> {
        let now = Utc::now();

        let rows: Vec<RewardRow> = sqlx::query_as(&format!(
            "{SELECT_REWARD} WHERE merchant_id = ?1 AND is_active = 1 ORDER BY created_at ASC"
        ))
        .bind(&merchant.id)
        .fetch_all(&mut **tx)
        .await?;

        let mut reward = None;
        for row in rows {
            let candidate = row.into_reward()?;
            if candidate.is_available_at(now) {
                reward = Some(candidate);
                break;
            }
        }

        let Some(reward) = reward else {
            // An award happened with nowhere to send the crossings. Do
            // not drop this silently: the merchant gets an alert.
            warn!(
                merchant_id = %merchant.id,
                customer_id = %customer_id,
                "No active reward rule, coupon issuance skipped"
            );
            if let Some(admin_email) = &merchant.email {
                let payload = NotificationPayload {
                    merchant_name: Some(merchant.name.clone()),
                    ..NotificationPayload::default()
                };
                insert_entry(
                    &mut **tx,
                    &merchant.id,
                    None,
                    NotificationKind::MissingRewardRule,
                    admin_email,
                    &payload,
                )
                .await?;
            }
            return Ok((Vec::new(), true));
        };

        let crossings = threshold_crossings(points_before, points_after, reward.points_required);
        if crossings == 0 {
            return Ok((Vec::new(), false));
        }

        let budget = reward
            .usage_limit
            .map(|limit| (limit - reward.times_used).max(0))
            .unwrap_or(crossings);
        let to_issue = crossings.min(budget);
        if to_issue < crossings {
            warn!(
                merchant_id = %merchant.id,
                reward_id = %reward.id,
                crossings = crossings,
                issued = to_issue,
                "Reward usage cap truncated coupon issuance"
            );
        }

        let mut coupons = Vec::with_capacity(to_issue as usize);
        for _ in 0..to_issue {
            let coupon = self
                .insert_coupon(tx, merchant, customer_id, &reward, CouponOrigin::Threshold)
                .await?;

            sqlx::query(
                "UPDATE rewards SET times_used = times_used + 1, updated_at = ?2 WHERE id = ?1",
            )
            .bind(&reward.id)
            .bind(now)
            .execute(&mut **tx)
            .await?;

            if merchant.settings.notifications.coupon_issued {
                if let Some(email) = &balance.email {
                    let payload = NotificationPayload {
                        customer_name: balance.name.clone(),
                        coupon_code: Some(coupon.code.clone()),
                        reward_name: Some(reward.name.clone()),
                        expires_at: Some(coupon.expires_at),
                        ..NotificationPayload::default()
                    };
                    insert_entry(
                        &mut **tx,
                        &merchant.id,
                        Some(customer_id),
                        NotificationKind::CouponIssued,
                        email,
                        &payload,
                    )
                    .await?;
                }
            }

            coupons.push(coupon);
        }

        Ok((coupons, false))
    }

    /// Inserts one coupon row, retrying with fresh codes on the
    /// (vanishingly rare) code collision.
    async fn insert_coupon(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        merchant: &Merchant,
        customer_id: &str,
        reward: &Reward,
        origin: CouponOrigin,
    ) -> DbResult<Coupon> {
        let now = Utc::now();
        let expires_at = now + Duration::days(self.settings.coupon_validity_days);

        for _ in 0..3 {
            let coupon = Coupon {
                id: Uuid::new_v4().to_string(),
                merchant_id: merchant.id.clone(),
                customer_id: customer_id.to_string(),
                reward_id: reward.id.clone(),
                code: generate_coupon_code(),
                origin,
                expires_at,
                used: false,
                used_at: None,
                created_at: now,
            };

            let inserted = sqlx::query(
                "INSERT INTO coupons (id, merchant_id, customer_id, reward_id, code, origin, \
                 expires_at, used, used_at, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL, ?8)",
            )
            .bind(&coupon.id)
            .bind(&coupon.merchant_id)
            .bind(&coupon.customer_id)
            .bind(&coupon.reward_id)
            .bind(&coupon.code)
            .bind(coupon.origin.as_str())
            .bind(coupon.expires_at)
            .bind(coupon.created_at)
            .execute(&mut **tx)
            .await;

            match inserted {
                Ok(_) => return Ok(coupon),
                Err(e) => {
                    let db_err: DbError = e.into();
                    if is_code_collision(&db_err) {
                        debug!(code = %coupon.code, "Coupon code collision, regenerating");
                        continue;
                    }
                    return Err(db_err);
                }
            }
        }

        Err(DbError::Internal(
            "could not generate a unique coupon code".to_string(),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    async fn queue_award_notification(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        merchant: &Merchant,
        customer_id: &str,
        balance: &BalanceRow,
        event: EventKind,
        points: i64,
        points_after: i64,
    ) -> DbResult<()> {
        let toggles = &merchant.settings.notifications;
        let (kind, enabled) = match event {
            EventKind::Birthday => (NotificationKind::Birthday, toggles.birthday),
            EventKind::ShareReferral => (NotificationKind::ReferralShare, toggles.referral_share),
            _ => (NotificationKind::PointsEarned, toggles.points_earned),
        };

        if !enabled {
            return Ok(());
        }
        let Some(email) = &balance.email else {
            return Ok(());
        };

        let payload = NotificationPayload {
            customer_name: balance.name.clone(),
            points: Some(points),
            balance: Some(points_after),
            ..NotificationPayload::default()
        };
        insert_entry(&mut **tx, &merchant.id, Some(customer_id), kind, email, &payload).await?;

        Ok(())
    }

    /// Builds the no-op outcome reported for a replayed event.
    async fn replay_outcome(&self, customer_id: &str) -> DbResult<AwardOutcome> {
        let row: Option<BalanceRow> = sqlx::query_as(
            "SELECT points, tier, version, email, name FROM customers WHERE id = ?1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(DbError::not_found("Customer", customer_id));
        };
        let tier: Tier = row
            .tier
            .parse()
            .map_err(|e| DbError::corrupt("customer tier", customer_id, e))?;

        Ok(AwardOutcome {
            applied: false,
            points_before: row.points,
            points_after: row.points,
            tier_before: tier,
            tier_after: tier,
            coupons: Vec::new(),
            missing_reward_rule: false,
        })
    }
}

fn is_dedup_violation(err: &DbError) -> bool {
    matches!(err, DbError::UniqueViolation { field, .. } if field.contains("dedup_key"))
}

fn is_code_collision(err: &DbError) -> bool {
    matches!(err, DbError::UniqueViolation { field, .. } if field.contains("coupons.code"))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::reward::NewReward;
    use serde_json::json;
    use wafa_core::{EventRule, LoyaltySettings, PurchaseRule, RewardType};

    fn settings() -> LoyaltySettings {
        LoyaltySettings {
            purchase: PurchaseRule {
                enabled: true,
                cents_per_point: 100,
            },
            birthday: EventRule {
                enabled: true,
                points: 50,
            },
            ..LoyaltySettings::default()
        }
    }

    async fn setup(with_reward: bool) -> (Database, Merchant, Customer) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let merchant = db
            .merchants()
            .create("store-1", "Shop", Some("owner@shop.example"), settings())
            .await
            .unwrap();
        let customer = db
            .customers()
            .get_or_create(&merchant.id, "cust-1", Some("c@example.com"), Some("Amira"))
            .await
            .unwrap();
        if with_reward {
            db.rewards()
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
        }
        (db, merchant, customer)
    }

    #[tokio::test]
    async fn test_award_updates_balance_and_ledger() {
        let (db, merchant, customer) = setup(true).await;

        let outcome = db
            .ledger()
            .award(
                &merchant,
                &customer.id,
                EventKind::Purchase,
                250,
                &json!({"amount": 250.0, "orderId": "o1"}),
                None,
            )
            .await
            .unwrap();

        assert!(outcome.applied);
        assert_eq!(outcome.points_before, 0);
        assert_eq!(outcome.points_after, 250);

        let back = db.customers().get(&customer.id).await.unwrap().unwrap();
        assert_eq!(back.points, 250);
        assert_eq!(back.version, 1);

        // One ledger entry with the full delta
        let activities = db.activities().list_for_customer(&customer.id, 10).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].points, 250);
        assert_eq!(activities[0].event, "purchase");

        // Reconciliation: sum of deltas equals the balance
        assert_eq!(
            db.activities().sum_for_customer(&customer.id).await.unwrap(),
            back.points
        );
    }

    #[tokio::test]
    async fn test_single_threshold_crossing() {
        let (db, merchant, customer) = setup(true).await;
        let ledger = db.ledger();

        // 0 → 95: no crossing
        let outcome = ledger
            .award(&merchant, &customer.id, EventKind::Purchase, 95, &json!({}), None)
            .await
            .unwrap();
        assert!(outcome.coupons.is_empty());

        // 95 → 105: exactly one coupon
        let outcome = ledger
            .award(&merchant, &customer.id, EventKind::Purchase, 10, &json!({}), None)
            .await
            .unwrap();
        assert_eq!(outcome.coupons.len(), 1);
        assert_eq!(outcome.coupons[0].origin, CouponOrigin::Threshold);
        assert!(!outcome.coupons[0].used);

        let coupons = db.coupons().list_for_customer(&customer.id).await.unwrap();
        assert_eq!(coupons.len(), 1);
    }

    #[tokio::test]
    async fn test_multiple_crossings_in_one_award() {
        let (db, merchant, customer) = setup(true).await;

        // 0 → 250 with a 100-point rule: two coupons
        let outcome = db
            .ledger()
            .award(&merchant, &customer.id, EventKind::Purchase, 250, &json!({}), None)
            .await
            .unwrap();
        assert_eq!(outcome.coupons.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_reward_rule_sends_admin_alert() {
        let (db, merchant, customer) = setup(false).await;

        let outcome = db
            .ledger()
            .award(&merchant, &customer.id, EventKind::Purchase, 150, &json!({}), None)
            .await
            .unwrap();

        // The award itself still commits
        assert!(outcome.applied);
        assert!(outcome.missing_reward_rule);
        assert!(outcome.coupons.is_empty());
        assert_eq!(
            db.customers().get(&customer.id).await.unwrap().unwrap().points,
            150
        );

        // Admin alert queued alongside the customer notification
        let pending = db.outbox().get_pending(10).await.unwrap();
        assert!(pending
            .iter()
            .any(|e| e.kind == NotificationKind::MissingRewardRule
                && e.recipient == "owner@shop.example"));
    }

    #[tokio::test]
    async fn test_dedup_key_blocks_replay() {
        let (db, merchant, customer) = setup(true).await;
        let ledger = db.ledger();
        let key = format!("{}:purchase:o1", merchant.id);

        let first = ledger
            .award(&merchant, &customer.id, EventKind::Purchase, 100, &json!({}), Some(&key))
            .await
            .unwrap();
        assert!(first.applied);

        let replay = ledger
            .award(&merchant, &customer.id, EventKind::Purchase, 100, &json!({}), Some(&key))
            .await
            .unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.points_after, 100);

        // Balance unchanged, exactly one ledger entry
        assert_eq!(
            db.customers().get(&customer.id).await.unwrap().unwrap().points,
            100
        );
        assert_eq!(db.activities().count_for_customer(&customer.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deduction_clamps_and_records_actual() {
        let (db, merchant, customer) = setup(true).await;
        let ledger = db.ledger();

        ledger
            .award(&merchant, &customer.id, EventKind::Welcome, 30, &json!({}), None)
            .await
            .unwrap();

        let outcome = ledger
            .deduct(
                &merchant,
                &customer.id,
                100,
                DeductionReason::OrderCancelled,
                &json!({}),
            )
            .await
            .unwrap();

        assert_eq!(outcome.requested, 100);
        assert_eq!(outcome.deducted, 30);
        assert_eq!(outcome.points_after, 0);

        let back = db.customers().get(&customer.id).await.unwrap().unwrap();
        assert_eq!(back.points, 0);

        // The ledger records -30, not -100
        let activities = db.activities().list_for_customer(&customer.id, 10).await.unwrap();
        let deduction = activities.iter().find(|a| a.points < 0).unwrap();
        assert_eq!(deduction.points, -30);
        assert_eq!(deduction.event, "pointsDeduction");
        assert_eq!(deduction.metadata["requested"], json!(100));

        // Reconciliation still holds
        assert_eq!(db.activities().sum_for_customer(&customer.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deduction_at_zero_writes_nothing() {
        let (db, merchant, customer) = setup(true).await;

        let outcome = db
            .ledger()
            .deduct(
                &merchant,
                &customer.id,
                50,
                DeductionReason::OrderRefunded,
                &json!({}),
            )
            .await
            .unwrap();

        assert_eq!(outcome.deducted, 0);
        assert_eq!(db.activities().count_for_customer(&customer.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tier_transition_on_award() {
        let (db, mut merchant, customer) = setup(true).await;
        merchant.settings.tiers.silver = 100;

        let ledger = db.ledger();
        let first = ledger
            .award(&merchant, &customer.id, EventKind::Purchase, 80, &json!({}), None)
            .await
            .unwrap();
        assert_eq!(first.tier_after, Tier::Bronze);
        assert!(!first.tier_changed());

        let second = ledger
            .award(&merchant, &customer.id, EventKind::Purchase, 25, &json!({}), None)
            .await
            .unwrap();
        assert_eq!(second.tier_before, Tier::Bronze);
        assert_eq!(second.tier_after, Tier::Silver);
        assert!(second.tier_changed());

        let back = db.customers().get(&customer.id).await.unwrap().unwrap();
        assert_eq!(back.tier, Tier::Silver);
    }

    #[tokio::test]
    async fn test_usage_cap_truncates_issuance() {
        let (db, merchant, customer) = setup(false).await;
        db.rewards()
            .create(NewReward {
                merchant_id: merchant.id.clone(),
                name: "limited".to_string(),
                points_required: 100,
                reward_type: RewardType::FreeShipping,
                reward_value: 0,
                usage_limit: Some(1),
                valid_from: None,
                valid_until: None,
            })
            .await
            .unwrap();

        // 0 → 250 would cross twice, but only one issuance is budgeted
        let outcome = db
            .ledger()
            .award(&merchant, &customer.id, EventKind::Purchase, 250, &json!({}), None)
            .await
            .unwrap();
        assert_eq!(outcome.coupons.len(), 1);

        // The rule is now exhausted; the next crossing finds no rule
        let outcome = db
            .ledger()
            .award(&merchant, &customer.id, EventKind::Purchase, 100, &json!({}), None)
            .await
            .unwrap();
        assert!(outcome.coupons.is_empty());
        assert!(outcome.missing_reward_rule);
    }

    #[tokio::test]
    async fn test_manual_coupon_issuance() {
        let (db, merchant, customer) = setup(true).await;
        let reward = db
            .rewards()
            .active_for_merchant(&merchant.id, Utc::now())
            .await
            .unwrap()
            .unwrap();

        let coupon = db
            .ledger()
            .issue_manual_coupon(&merchant, &customer, &reward)
            .await
            .unwrap();
        assert_eq!(coupon.origin, CouponOrigin::Manual);
        assert_eq!(coupon.reward_id, reward.id);

        // No balance change, no ledger entry
        assert_eq!(
            db.customers().get(&customer.id).await.unwrap().unwrap().points,
            0
        );
        assert_eq!(db.activities().count_for_customer(&customer.id).await.unwrap(), 0);

        // Usage accounting happened
        let back = db.rewards().get(&merchant.id, &reward.id).await.unwrap().unwrap();
        assert_eq!(back.times_used, 1);
    }

    #[tokio::test]
    async fn test_manual_coupon_exhausted_reward() {
        let (db, merchant, customer) = setup(false).await;
        let reward = db
            .rewards()
            .create(NewReward {
                merchant_id: merchant.id.clone(),
                name: "one-shot".to_string(),
                points_required: 100,
                reward_type: RewardType::FreeShipping,
                reward_value: 0,
                usage_limit: Some(1),
                valid_from: None,
                valid_until: None,
            })
            .await
            .unwrap();

        let ledger = db.ledger();
        ledger
            .issue_manual_coupon(&merchant, &customer, &reward)
            .await
            .unwrap();

        // Stale Reward value still says available; the guarded UPDATE
        // catches the exhaustion.
        let err = ledger
            .issue_manual_coupon(&merchant, &customer, &reward)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::RewardUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_notifications_queued_with_award() {
        let (db, merchant, customer) = setup(true).await;

        db.ledger()
            .award(&merchant, &customer.id, EventKind::Purchase, 150, &json!({}), None)
            .await
            .unwrap();

        let pending = db.outbox().get_pending(10).await.unwrap();
        // One points-earned plus one coupon-issued
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().any(|e| e.kind == NotificationKind::PointsEarned));
        assert!(pending.iter().any(|e| e.kind == NotificationKind::CouponIssued));

        let earned = pending
            .iter()
            .find(|e| e.kind == NotificationKind::PointsEarned)
            .unwrap();
        assert_eq!(earned.recipient, "c@example.com");
        assert_eq!(earned.payload.points, Some(150));
        assert_eq!(earned.payload.balance, Some(150));
    }

    #[tokio::test]
    async fn test_no_email_skips_customer_notification() {
        let (db, merchant, _) = setup(true).await;
        let no_email = db
            .customers()
            .get_or_create(&merchant.id, "cust-2", None, None)
            .await
            .unwrap();

        db.ledger()
            .award(&merchant, &no_email.id, EventKind::Purchase, 50, &json!({}), None)
            .await
            .unwrap();

        // Award committed, nothing queued
        assert_eq!(
            db.customers().get(&no_email.id).await.unwrap().unwrap().points,
            50
        );
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_toggle_skips_notification() {
        let (db, _, _) = setup(false).await;
        let mut quiet = settings();
        quiet.notifications.points_earned = false;
        let merchant = db
            .merchants()
            .create("store-quiet", "Quiet Shop", None, quiet)
            .await
            .unwrap();
        let customer = db
            .customers()
            .get_or_create(&merchant.id, "cust-q", Some("q@example.com"), None)
            .await
            .unwrap();

        db.ledger()
            .award(&merchant, &customer.id, EventKind::Purchase, 50, &json!({}), None)
            .await
            .unwrap();

        // No reward rule exists either, but the merchant has no email,
        // so nothing at all lands in the outbox.
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }
}
