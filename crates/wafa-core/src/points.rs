//! # Point Calculator
//!
//! Pure functions mapping an event plus a merchant's configuration to an
//! integer point delta, and the threshold-crossing math behind coupon
//! issuance.
//!
//! ## Award Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Point Calculation                                 │
//! │                                                                         │
//! │  purchase                 floor(amount / cents_per_point)               │
//! │                           ratio <= 0 → rule treated as disabled         │
//! │                                                                         │
//! │  purchaseAmountThreshold  flat bonus if amount >= min_amount            │
//! │                           evaluated independently of the base award;    │
//! │                           both can fire for the same order              │
//! │                                                                         │
//! │  birthday, welcome, ...   flat configured points, 0 when disabled       │
//! │                                                                         │
//! │  manualReward,            0 - these are not awards; the dispatcher      │
//! │  pointsDeduction          routes them to their own paths                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every function here is deterministic and side-effect free. A result
//! of 0 means "no ledger entry": the ledger writer is never invoked for
//! zero deltas.

use crate::event::LoyaltyEvent;
use crate::money::Money;
use crate::types::{EventRule, LoyaltySettings};
use crate::MAX_AWARD_POINTS;

// =============================================================================
// Award Calculation
// =============================================================================

/// Computes the points an award-type event is worth under `settings`.
///
/// Returns 0 for disabled rules, for rules with nonsense configuration
/// (ratio <= 0), and for the non-award kinds (`manualReward`,
/// `pointsDeduction`). Results are capped at [`MAX_AWARD_POINTS`].
pub fn award_points(event: &LoyaltyEvent, settings: &LoyaltySettings) -> i64 {
    let points = match event {
        LoyaltyEvent::Purchase { amount, .. } => purchase_points(*amount, settings),
        LoyaltyEvent::PurchaseAmountThreshold { amount, .. } => {
            purchase_threshold_bonus(*amount, settings)
        }
        LoyaltyEvent::Birthday { .. } => flat(&settings.birthday),
        LoyaltyEvent::Welcome { .. } => flat(&settings.welcome),
        LoyaltyEvent::ShippingFeedback { .. } => flat(&settings.shipping_feedback),
        LoyaltyEvent::AppRating { .. } => flat(&settings.app_rating),
        LoyaltyEvent::ProductRating { .. } => flat(&settings.product_rating),
        LoyaltyEvent::ProfileCompletion => flat(&settings.profile_completion),
        LoyaltyEvent::RepeatPurchase => flat(&settings.repeat_purchase),
        LoyaltyEvent::ShareReferral { .. } => flat(&settings.share_referral),
        LoyaltyEvent::AppInstall => flat(&settings.app_install),
        LoyaltyEvent::ManualReward { .. } | LoyaltyEvent::PointsDeduction { .. } => 0,
    };

    points.clamp(0, MAX_AWARD_POINTS)
}

/// Base purchase award: one point per `cents_per_point` spent, floored.
///
/// A ratio of zero or below would divide by zero; such configuration is
/// rejected at the settings boundary, and treated as a disabled rule
/// here in case a bad value slipped into an old row.
fn purchase_points(amount: Money, settings: &LoyaltySettings) -> i64 {
    let rule = &settings.purchase;
    if !rule.enabled || rule.cents_per_point <= 0 {
        return 0;
    }
    amount.cents() / rule.cents_per_point
}

/// Purchase-amount threshold bonus, independent of the base award.
pub fn purchase_threshold_bonus(amount: Money, settings: &LoyaltySettings) -> i64 {
    let rule = &settings.purchase_amount_threshold;
    if !rule.enabled || rule.min_amount_cents <= 0 {
        return 0;
    }
    if amount.cents() >= rule.min_amount_cents {
        rule.points.max(0)
    } else {
        0
    }
}

fn flat(rule: &EventRule) -> i64 {
    if rule.enabled {
        rule.points.max(0)
    } else {
        0
    }
}

// =============================================================================
// Threshold Crossings
// =============================================================================

/// How many multiples of `required` the balance crossed moving from
/// `before` to `after`. One coupon is issued per crossing.
///
/// ## Example
/// ```rust
/// use wafa_core::points::threshold_crossings;
///
/// // 95 → 105 with a 100-point reward: one coupon
/// assert_eq!(threshold_crossings(95, 105, 100), 1);
///
/// // 50 → 310: crosses 100, 200, and 300
/// assert_eq!(threshold_crossings(50, 310, 100), 3);
/// ```
pub fn threshold_crossings(before: i64, after: i64, required: i64) -> i64 {
    if required <= 0 || after <= before {
        return 0;
    }
    after / required - before / required
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PurchaseRule, PurchaseThresholdRule};

    fn settings() -> LoyaltySettings {
        LoyaltySettings {
            purchase: PurchaseRule {
                enabled: true,
                cents_per_point: 100,
            },
            purchase_amount_threshold: PurchaseThresholdRule {
                enabled: true,
                min_amount_cents: 50_000,
                points: 75,
            },
            birthday: EventRule {
                enabled: true,
                points: 50,
            },
            welcome: EventRule {
                enabled: false,
                points: 20,
            },
            ..LoyaltySettings::default()
        }
    }

    fn purchase(amount_cents: i64) -> LoyaltyEvent {
        LoyaltyEvent::Purchase {
            amount: Money::from_cents(amount_cents),
            order_id: "o1".to_string(),
        }
    }

    #[test]
    fn test_purchase_floor_division() {
        let s = settings();
        assert_eq!(award_points(&purchase(25000), &s), 250);
        assert_eq!(award_points(&purchase(25099), &s), 250);
        assert_eq!(award_points(&purchase(99), &s), 0);
    }

    #[test]
    fn test_purchase_disabled_rule() {
        let mut s = settings();
        s.purchase.enabled = false;
        assert_eq!(award_points(&purchase(25000), &s), 0);
    }

    #[test]
    fn test_purchase_zero_ratio_treated_as_disabled() {
        let mut s = settings();
        s.purchase.cents_per_point = 0;
        assert_eq!(award_points(&purchase(25000), &s), 0);

        s.purchase.cents_per_point = -10;
        assert_eq!(award_points(&purchase(25000), &s), 0);
    }

    #[test]
    fn test_threshold_bonus_independent_of_base() {
        let s = settings();
        // 600.00 order: base award AND threshold bonus both apply,
        // each through its own calculation.
        assert_eq!(award_points(&purchase(60_000), &s), 600);
        assert_eq!(purchase_threshold_bonus(Money::from_cents(60_000), &s), 75);
        // 400.00 order: below the 500.00 threshold.
        assert_eq!(purchase_threshold_bonus(Money::from_cents(40_000), &s), 0);
        // Boundary: exactly at the threshold counts.
        assert_eq!(purchase_threshold_bonus(Money::from_cents(50_000), &s), 75);
    }

    #[test]
    fn test_flat_awards_respect_enabled_flag() {
        let s = settings();
        let birthday = LoyaltyEvent::Birthday {
            birthday_date: chrono::NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        };
        let welcome = LoyaltyEvent::Welcome {
            source: "signup".to_string(),
        };
        assert_eq!(award_points(&birthday, &s), 50);
        assert_eq!(award_points(&welcome, &s), 0);
    }

    #[test]
    fn test_non_award_events_are_zero() {
        let s = settings();
        let manual = LoyaltyEvent::ManualReward {
            reward_type: crate::types::RewardType::FreeShipping,
            reward_id: "r1".to_string(),
        };
        let deduction = LoyaltyEvent::PointsDeduction {
            points: 100,
            reason: crate::event::DeductionReason::OrderCancelled,
        };
        assert_eq!(award_points(&manual, &s), 0);
        assert_eq!(award_points(&deduction, &s), 0);
    }

    #[test]
    fn test_award_cap() {
        let mut s = settings();
        s.purchase.cents_per_point = 1;
        let huge = purchase(i64::MAX / 2);
        assert_eq!(award_points(&huge, &s), MAX_AWARD_POINTS);
    }

    #[test]
    fn test_negative_configured_points_clamp_to_zero() {
        let mut s = settings();
        s.birthday.points = -5;
        let birthday = LoyaltyEvent::Birthday {
            birthday_date: chrono::NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        };
        assert_eq!(award_points(&birthday, &s), 0);
    }

    #[test]
    fn test_threshold_crossings() {
        assert_eq!(threshold_crossings(95, 105, 100), 1);
        assert_eq!(threshold_crossings(50, 310, 100), 3);
        assert_eq!(threshold_crossings(0, 250, 100), 2);
        assert_eq!(threshold_crossings(100, 150, 100), 0);
        assert_eq!(threshold_crossings(99, 100, 100), 1);
        // No crossing on deduction or no-op
        assert_eq!(threshold_crossings(105, 95, 100), 0);
        assert_eq!(threshold_crossings(100, 100, 100), 0);
        // Guard: zero/negative requirement never divides
        assert_eq!(threshold_crossings(0, 1000, 0), 0);
        assert_eq!(threshold_crossings(0, 1000, -5), 0);
    }
}
