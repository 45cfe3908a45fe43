//! # Engine Dispatcher
//!
//! The single entry point for loyalty events. One invocation is one
//! synchronous pass: validate, calculate, write the ledger, check
//! coupons, queue notifications. There is no persisted intermediate
//! state; a failure part-way surfaces as an error and the upstream
//! platform redelivers the webhook (replays of committed order events
//! are absorbed by the dedup key).
//!
//! ## Entry Validation
//! A missing merchant, missing customer, or unknown event name is a
//! logged no-op, not an error. Callers that need an error signal must
//! verify preconditions before invoking.

use tracing::{debug, info, warn};

use wafa_core::points::{award_points, purchase_threshold_bonus};
use wafa_core::{
    Customer, EventEnvelope, EventKind, LoyaltyEvent, Merchant, NotificationKind,
    NotificationPayload,
};
use wafa_db::{AwardOutcome, Database, DbError, LedgerRepository, LedgerSettings};

use crate::config::EngineConfig;
use crate::error::EngineResult;

// =============================================================================
// Loyalty Engine
// =============================================================================

/// The loyalty engine dispatcher.
///
/// The sole writer of customer point balances and the sole trigger of
/// coupon issuance. Webhook handlers and manual controllers build an
/// [`EventEnvelope`] and call [`LoyaltyEngine::handle`].
#[derive(Debug, Clone)]
pub struct LoyaltyEngine {
    db: Database,
    ledger: LedgerRepository,
}

impl LoyaltyEngine {
    /// Creates an engine over a database with the given configuration.
    pub fn new(db: Database, config: &EngineConfig) -> Self {
        let ledger = db.ledger_with(LedgerSettings {
            coupon_validity_days: config.coupons.validity_days,
            ..LedgerSettings::default()
        });
        LoyaltyEngine { db, ledger }
    }

    /// Handles one event envelope.
    ///
    /// ## Returns
    /// * `Ok(())` - the event was applied, or was a recognized no-op
    ///   (missing entities, unknown event name, replay, zero-point rule)
    /// * `Err(_)` - malformed metadata for a recognized event, or a
    ///   persistence failure; the caller should surface an error status
    ///   so the platform retries
    pub async fn handle(&self, envelope: &EventEnvelope) -> EngineResult<()> {
        let Some(merchant) = self
            .db
            .merchants()
            .get_by_external_id(&envelope.merchant_id)
            .await?
        else {
            warn!(
                merchant = %envelope.merchant_id,
                event = %envelope.event,
                "Unknown merchant, ignoring event"
            );
            return Ok(());
        };

        let Some(customer) = self
            .db
            .customers()
            .get_by_external_id(&merchant.id, &envelope.customer.external_id)
            .await?
        else {
            warn!(
                merchant = %envelope.merchant_id,
                customer = %envelope.customer.external_id,
                event = %envelope.event,
                "Unknown customer, ignoring event"
            );
            return Ok(());
        };

        let Some(event) = LoyaltyEvent::from_envelope(envelope)? else {
            // Unknown names stay a no-op so upstream topic additions
            // cannot break deliveries; the log line is the breadcrumb
            // for misconfigured integrations.
            warn!(
                merchant = %envelope.merchant_id,
                event = %envelope.event,
                "Unrecognized event name, ignoring"
            );
            return Ok(());
        };

        debug!(
            merchant_id = %merchant.id,
            customer_id = %customer.id,
            event = event.kind().as_str(),
            "Dispatching event"
        );

        match &event {
            LoyaltyEvent::PointsDeduction { points, reason } => {
                let outcome = self
                    .ledger
                    .deduct(&merchant, &customer.id, *points, *reason, &envelope.metadata)
                    .await?;

                if outcome.deducted > 0 {
                    self.bump_aggregate(&merchant, -outcome.deducted).await;
                }
                if outcome.tier_before != outcome.tier_after {
                    info!(
                        customer_id = %customer.id,
                        from = %outcome.tier_before,
                        to = %outcome.tier_after,
                        "Tier changed on deduction"
                    );
                }
            }

            LoyaltyEvent::ManualReward {
                reward_type,
                reward_id,
            } => {
                self.handle_manual_reward(&merchant, &customer, *reward_type, reward_id)
                    .await?;
            }

            LoyaltyEvent::Purchase { amount, order_id } => {
                // Base award and threshold bonus are independent rules;
                // each gets its own ledger entry and its own dedup key.
                let base = award_points(&event, &merchant.settings);
                if base > 0 {
                    let key = dedup_key(&merchant.id, EventKind::Purchase, order_id);
                    let outcome = self
                        .ledger
                        .award(
                            &merchant,
                            &customer.id,
                            EventKind::Purchase,
                            base,
                            &envelope.metadata,
                            Some(&key),
                        )
                        .await?;
                    self.settle_award(&merchant, &customer, &outcome, base).await;
                } else {
                    debug!(customer_id = %customer.id, "Purchase rule yields zero points");
                }

                let bonus = purchase_threshold_bonus(*amount, &merchant.settings);
                if bonus > 0 {
                    let key = dedup_key(&merchant.id, EventKind::PurchaseAmountThreshold, order_id);
                    let outcome = self
                        .ledger
                        .award(
                            &merchant,
                            &customer.id,
                            EventKind::PurchaseAmountThreshold,
                            bonus,
                            &envelope.metadata,
                            Some(&key),
                        )
                        .await?;
                    self.settle_award(&merchant, &customer, &outcome, bonus).await;
                }
            }

            _ => {
                // The share counter follows the platform's report even
                // when the award rule is disabled.
                if let LoyaltyEvent::ShareReferral { share_count, .. } = &event {
                    self.db
                        .customers()
                        .record_share(&customer.id, *share_count)
                        .await?;
                }

                let points = award_points(&event, &merchant.settings);
                if points == 0 {
                    debug!(
                        customer_id = %customer.id,
                        event = event.kind().as_str(),
                        "Rule disabled or zero-valued, nothing to award"
                    );
                    return Ok(());
                }

                // Standalone threshold-bonus events are order-bearing
                // and deduplicated like purchases.
                let key = event
                    .order_id()
                    .map(|order_id| dedup_key(&merchant.id, event.kind(), order_id));

                let outcome = self
                    .ledger
                    .award(
                        &merchant,
                        &customer.id,
                        event.kind(),
                        points,
                        &envelope.metadata,
                        key.as_deref(),
                    )
                    .await?;
                self.settle_award(&merchant, &customer, &outcome, points).await;
            }
        }

        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Post-commit bookkeeping for an applied award.
    async fn settle_award(
        &self,
        merchant: &Merchant,
        customer: &Customer,
        outcome: &AwardOutcome,
        points: i64,
    ) {
        if !outcome.applied {
            return;
        }

        self.bump_aggregate(merchant, points).await;

        if outcome.tier_changed() {
            info!(
                customer_id = %customer.id,
                from = %outcome.tier_before,
                to = %outcome.tier_after,
                balance = outcome.points_after,
                "Tier changed"
            );
        }
    }

    /// Best-effort update of the informational merchant aggregate.
    ///
    /// Runs after the customer transaction committed; a failure here is
    /// accepted drift, repaired by the reconciliation recompute, and
    /// must not fail the invocation.
    async fn bump_aggregate(&self, merchant: &Merchant, delta: i64) {
        if let Err(e) = self
            .db
            .merchants()
            .add_customers_points(&merchant.id, delta)
            .await
        {
            warn!(
                ?e,
                merchant_id = %merchant.id,
                delta = delta,
                "Aggregate update failed, will reconcile later"
            );
        }
    }

    /// Issues a coupon for a named reward, bypassing the points check.
    async fn handle_manual_reward(
        &self,
        merchant: &Merchant,
        customer: &Customer,
        reward_type: wafa_core::RewardType,
        reward_id: &str,
    ) -> EngineResult<()> {
        let Some(reward) = self.db.rewards().get(&merchant.id, reward_id).await? else {
            warn!(
                merchant_id = %merchant.id,
                reward_id = %reward_id,
                "manualReward names a reward that does not exist"
            );
            self.queue_admin_alert(merchant, Some(reward_id)).await?;
            return Ok(());
        };

        if reward.reward_type != reward_type {
            warn!(
                merchant_id = %merchant.id,
                reward_id = %reward_id,
                declared = reward_type.as_str(),
                actual = reward.reward_type.as_str(),
                "manualReward type mismatch"
            );
            self.queue_admin_alert(merchant, Some(&reward.name)).await?;
            return Ok(());
        }

        match self
            .ledger
            .issue_manual_coupon(merchant, customer, &reward)
            .await
        {
            Ok(coupon) => {
                info!(
                    customer_id = %customer.id,
                    reward_id = %reward.id,
                    code = %coupon.code,
                    "Manual reward applied"
                );
                Ok(())
            }
            Err(DbError::RewardUnavailable { .. }) => {
                warn!(
                    merchant_id = %merchant.id,
                    reward_id = %reward.id,
                    "manualReward names an unavailable reward"
                );
                self.queue_admin_alert(merchant, Some(&reward.name)).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Queues an administrative misconfiguration alert for the merchant.
    async fn queue_admin_alert(
        &self,
        merchant: &Merchant,
        reward_name: Option<&str>,
    ) -> EngineResult<()> {
        let Some(email) = &merchant.email else {
            warn!(
                merchant_id = %merchant.id,
                "Cannot deliver admin alert, merchant has no email"
            );
            return Ok(());
        };

        let payload = NotificationPayload {
            merchant_name: Some(merchant.name.clone()),
            reward_name: reward_name.map(str::to_string),
            ..NotificationPayload::default()
        };
        self.db
            .outbox()
            .enqueue(
                &merchant.id,
                None,
                NotificationKind::MissingRewardRule,
                email,
                &payload,
            )
            .await?;

        Ok(())
    }
}

/// Replay key for order-bearing events.
fn dedup_key(merchant_id: &str, kind: EventKind, order_id: &str) -> String {
    format!("{merchant_id}:{}:{order_id}", kind.as_str())
}

// =============================================================================
// Integration Tests
// =============================================================================
