//! # Domain Types
//!
//! Core domain types used throughout the Wafa loyalty engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Merchant     │   │    Customer     │   │     Reward      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  external_id    │   │  external_id    │   │  points_required│       │
//! │  │  settings       │   │  points / tier  │   │  reward_type    │       │
//! │  │  customers_pts  │   │  share_count    │   │  validity window│       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐                         │
//! │  │     Coupon      │   │  LoyaltyActivity    │                         │
//! │  │  ─────────────  │   │  ─────────────────  │                         │
//! │  │  code (unique)  │   │  signed points      │                         │
//! │  │  used (one-way) │   │  append-only ledger │                         │
//! │  │  expires_at     │   │  dedup_key          │                         │
//! │  └─────────────────┘   └─────────────────────┘                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Merchants and customers have:
//! - `id`: UUID v4 - immutable, used for database relations
//! - `external_id`: the identifier assigned by the e-commerce platform,
//!   unique per scope (globally for merchants, per-merchant for customers)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::tier::Tier;

// =============================================================================
// Loyalty Settings
// =============================================================================

/// A flat-award rule for a single event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRule {
    /// Whether this event awards points at all.
    pub enabled: bool,
    /// Flat points granted when the event fires.
    pub points: i64,
}

impl EventRule {
    pub const fn disabled() -> Self {
        EventRule {
            enabled: false,
            points: 0,
        }
    }
}

impl Default for EventRule {
    fn default() -> Self {
        EventRule::disabled()
    }
}

/// The purchase award rule: points proportional to the order amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRule {
    pub enabled: bool,
    /// How much the customer must spend (in the smallest currency unit)
    /// to earn one point. A value <= 0 means the rule is effectively
    /// disabled; the calculator never divides by it.
    pub cents_per_point: i64,
}

impl Default for PurchaseRule {
    fn default() -> Self {
        PurchaseRule {
            enabled: false,
            // one point per whole currency unit
            cents_per_point: 100,
        }
    }
}

/// Bonus points when a single order total reaches a configured amount.
///
/// Evaluated independently of the base purchase award. Both can fire for
/// the same order, producing two separate ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseThresholdRule {
    pub enabled: bool,
    /// Minimum order total, in the smallest currency unit.
    pub min_amount_cents: i64,
    /// Flat bonus granted when the total reaches the minimum.
    pub points: i64,
}

impl Default for PurchaseThresholdRule {
    fn default() -> Self {
        PurchaseThresholdRule {
            enabled: false,
            min_amount_cents: 0,
            points: 0,
        }
    }
}

/// Cumulative-point thresholds for each tier above bronze.
///
/// Bronze is the floor tier; a customer with fewer points than
/// `silver` is bronze. Must be strictly increasing, which the
/// configuration boundary enforces (see [`crate::validation`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub silver: i64,
    pub gold: i64,
    pub platinum: i64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        TierThresholds {
            silver: 500,
            gold: 1500,
            platinum: 5000,
        }
    }
}

/// Per-category notification toggles for a merchant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationToggles {
    pub points_earned: bool,
    pub birthday: bool,
    pub referral_share: bool,
    pub coupon_issued: bool,
    pub points_deducted: bool,
}

impl Default for NotificationToggles {
    fn default() -> Self {
        NotificationToggles {
            points_earned: true,
            birthday: true,
            referral_share: true,
            coupon_issued: true,
            points_deducted: true,
        }
    }
}

/// A merchant's complete loyalty configuration.
///
/// Stored as a JSON column on the merchant row and read-only to the
/// engine; the (out-of-scope) settings controller writes it after
/// running [`crate::validation::validate_settings`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoyaltySettings {
    pub purchase: PurchaseRule,
    pub purchase_amount_threshold: PurchaseThresholdRule,
    pub birthday: EventRule,
    pub welcome: EventRule,
    pub shipping_feedback: EventRule,
    pub app_rating: EventRule,
    pub product_rating: EventRule,
    pub profile_completion: EventRule,
    pub repeat_purchase: EventRule,
    pub share_referral: EventRule,
    pub app_install: EventRule,
    pub tiers: TierThresholds,
    pub notifications: NotificationToggles,
}

// =============================================================================
// Merchant
// =============================================================================

/// A tenant store enrolled in the loyalty platform.
///
/// Created when the store authorizes the app; deleted on uninstall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Store identifier assigned by the e-commerce platform.
    pub external_id: String,

    /// Store display name.
    pub name: String,

    /// Store owner email, recipient of administrative alerts.
    pub email: Option<String>,

    /// The merchant's loyalty configuration.
    pub settings: LoyaltySettings,

    /// Running sum of points awarded across all customers.
    ///
    /// Informational aggregate only. It is updated best-effort outside
    /// the customer transaction and can drift; reconcile from the
    /// activity ledger, never trust it for a single customer's balance.
    pub customers_points: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Customer
// =============================================================================

/// A merchant's end-shopper enrolled in the loyalty program.
///
/// `points` and `tier` are mutated exclusively through the ledger
/// writer; `tier` is a cache derived from `points` and the merchant's
/// thresholds, recomputed on every point change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub merchant_id: String,

    /// Platform customer identifier, unique per merchant.
    pub external_id: String,

    /// Needed for notifications; a customer without an email is
    /// silently skipped by the dispatcher.
    pub email: Option<String>,

    pub name: Option<String>,

    /// Current point balance. Never negative; deductions clamp at zero.
    pub points: i64,

    /// Cached tier label, derived from `points`.
    pub tier: Tier,

    /// Number of referral shares recorded for this customer.
    pub share_count: i64,

    /// Soft-delete flag. The engine never hard-deletes customers.
    pub is_active: bool,

    /// Optimistic-concurrency version, bumped on every balance change.
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Reward
// =============================================================================

/// The kind of discount a reward rule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    /// Percentage off the order total; `reward_value` is basis points.
    PercentageDiscount,
    /// Fixed amount off; `reward_value` is in the smallest currency unit.
    FixedAmountDiscount,
    /// Free shipping; `reward_value` is unused.
    FreeShipping,
}

impl RewardType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RewardType::PercentageDiscount => "percentage_discount",
            RewardType::FixedAmountDiscount => "fixed_amount_discount",
            RewardType::FreeShipping => "free_shipping",
        }
    }
}

impl fmt::Display for RewardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage_discount" => Ok(RewardType::PercentageDiscount),
            "fixed_amount_discount" => Ok(RewardType::FixedAmountDiscount),
            "free_shipping" => Ok(RewardType::FreeShipping),
            other => Err(CoreError::UnknownVariant {
                what: "reward type",
                value: other.to_string(),
            }),
        }
    }
}

/// A merchant-defined discount template consumed when issuing coupons.
///
/// Read-only to the engine. At most one reward is expected to be active
/// per merchant for implicit threshold-based issuance; additional rules
/// may exist for manual application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub merchant_id: String,
    pub name: String,

    /// Points between threshold crossings for implicit issuance.
    pub points_required: i64,

    pub reward_type: RewardType,

    /// Basis points for percentage discounts, smallest currency unit
    /// for fixed discounts, 0 for free shipping.
    pub reward_value: i64,

    /// Maximum number of coupons this rule may produce. None = unlimited.
    pub usage_limit: Option<i64>,

    /// Coupons issued against this rule so far.
    pub times_used: i64,

    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reward {
    /// Whether this rule can produce a coupon at `now`.
    ///
    /// Checks the active flag, the validity window, and the usage cap.
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(from) = self.valid_from {
            if now < from {
                return false;
            }
        }
        if let Some(until) = self.valid_until {
            if now > until {
                return false;
            }
        }
        match self.usage_limit {
            Some(limit) => self.times_used < limit,
            None => true,
        }
    }
}

// =============================================================================
// Coupon
// =============================================================================

/// How a coupon came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponOrigin {
    /// Issued automatically when a point threshold was crossed.
    Threshold,
    /// Issued by an explicit manualReward call.
    Manual,
}

impl CouponOrigin {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CouponOrigin::Threshold => "threshold",
            CouponOrigin::Manual => "manual",
        }
    }
}

impl FromStr for CouponOrigin {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(CouponOrigin::Threshold),
            "manual" => Ok(CouponOrigin::Manual),
            other => Err(CoreError::UnknownVariant {
                what: "coupon origin",
                value: other.to_string(),
            }),
        }
    }
}

/// A single-use, expiring instantiation of a reward rule for one customer.
///
/// The reward, customer, and merchant linkage is immutable after
/// creation. `used` transitions false→true exactly once and never
/// reverts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    pub merchant_id: String,
    pub customer_id: String,
    pub reward_id: String,

    /// Unique redemption code shown to the customer.
    pub code: String,

    pub origin: CouponOrigin,

    pub expires_at: DateTime<Utc>,

    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Whether the coupon has expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// =============================================================================
// Loyalty Activity (ledger entry)
// =============================================================================

/// An immutable, append-only audit record of one point change.
///
/// One entry per award or deduction, with the signed delta that was
/// actually applied (a clamped deduction records the clamped amount).
/// Customer balances are reconstructable by summing these entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyActivity {
    pub id: String,
    pub customer_id: String,
    pub merchant_id: String,

    /// Stable event kind name, e.g. "purchase" or "pointsDeduction".
    pub event: String,

    /// Signed point delta as applied to the balance.
    pub points: i64,

    /// The originating event metadata, retained verbatim for audit.
    pub metadata: serde_json::Value,

    /// Uniqueness key for webhook replay deduplication; present only
    /// for order-bearing events.
    pub dedup_key: Option<String>,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Notifications
// =============================================================================

/// The message category a notification belongs to.
///
/// Each kind maps to a distinct bilingual template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PointsEarned,
    Birthday,
    ReferralShare,
    CouponIssued,
    PointsDeducted,
    /// Administrative alert: an award committed but no active reward
    /// rule existed for coupon issuance.
    MissingRewardRule,
}

impl NotificationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PointsEarned => "points_earned",
            NotificationKind::Birthday => "birthday",
            NotificationKind::ReferralShare => "referral_share",
            NotificationKind::CouponIssued => "coupon_issued",
            NotificationKind::PointsDeducted => "points_deducted",
            NotificationKind::MissingRewardRule => "missing_reward_rule",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "points_earned" => Ok(NotificationKind::PointsEarned),
            "birthday" => Ok(NotificationKind::Birthday),
            "referral_share" => Ok(NotificationKind::ReferralShare),
            "coupon_issued" => Ok(NotificationKind::CouponIssued),
            "points_deducted" => Ok(NotificationKind::PointsDeducted),
            "missing_reward_rule" => Ok(NotificationKind::MissingRewardRule),
            other => Err(CoreError::UnknownVariant {
                what: "notification kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Template variables carried by an outbox entry.
///
/// Serialized as the outbox `payload` column; the worker deserializes
/// it and feeds the fields into the matching template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPayload {
    /// Customer display name, when known.
    pub customer_name: Option<String>,
    /// Points involved in the triggering change (absolute value).
    pub points: Option<i64>,
    /// Balance after the change.
    pub balance: Option<i64>,
    /// Coupon code, for coupon_issued messages.
    pub coupon_code: Option<String>,
    /// Reward rule name, for coupon_issued and admin alerts.
    pub reward_name: Option<String>,
    /// Coupon expiry, for coupon_issued messages.
    pub expires_at: Option<DateTime<Utc>>,
    /// Merchant store name, for admin alerts.
    pub merchant_name: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reward(now: DateTime<Utc>) -> Reward {
        Reward {
            id: "r1".to_string(),
            merchant_id: "m1".to_string(),
            name: "10% off".to_string(),
            points_required: 100,
            reward_type: RewardType::PercentageDiscount,
            reward_value: 1000,
            usage_limit: None,
            times_used: 0,
            valid_from: None,
            valid_until: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_reward_availability_window() {
        let now = Utc::now();
        let mut r = reward(now);
        assert!(r.is_available_at(now));

        r.valid_from = Some(now + Duration::days(1));
        assert!(!r.is_available_at(now));

        r.valid_from = Some(now - Duration::days(1));
        r.valid_until = Some(now - Duration::hours(1));
        assert!(!r.is_available_at(now));
    }

    #[test]
    fn test_reward_usage_cap() {
        let now = Utc::now();
        let mut r = reward(now);
        r.usage_limit = Some(2);
        r.times_used = 1;
        assert!(r.is_available_at(now));

        r.times_used = 2;
        assert!(!r.is_available_at(now));
    }

    #[test]
    fn test_reward_inactive() {
        let now = Utc::now();
        let mut r = reward(now);
        r.is_active = false;
        assert!(!r.is_available_at(now));
    }

    #[test]
    fn test_reward_type_round_trip() {
        for ty in [
            RewardType::PercentageDiscount,
            RewardType::FixedAmountDiscount,
            RewardType::FreeShipping,
        ] {
            assert_eq!(ty.as_str().parse::<RewardType>().unwrap(), ty);
        }
        assert!("bogus".parse::<RewardType>().is_err());
    }

    #[test]
    fn test_settings_default_toggles_on() {
        let settings = LoyaltySettings::default();
        assert!(settings.notifications.points_earned);
        assert!(settings.notifications.coupon_issued);
        assert!(!settings.purchase.enabled);
    }

    #[test]
    fn test_settings_json_round_trip() {
        let mut settings = LoyaltySettings::default();
        settings.purchase.enabled = true;
        settings.purchase.cents_per_point = 100;
        settings.birthday = EventRule {
            enabled: true,
            points: 50,
        };

        let json = serde_json::to_string(&settings).unwrap();
        let back: LoyaltySettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_settings_partial_json_uses_defaults() {
        // Settings written by older app versions may lack newer fields.
        let back: LoyaltySettings =
            serde_json::from_str(r#"{"purchase":{"enabled":true,"cents_per_point":50}}"#).unwrap();
        assert!(back.purchase.enabled);
        assert_eq!(back.purchase.cents_per_point, 50);
        assert_eq!(back.tiers, TierThresholds::default());
    }

    #[test]
    fn test_coupon_expiry() {
        let now = Utc::now();
        let coupon = Coupon {
            id: "c1".to_string(),
            merchant_id: "m1".to_string(),
            customer_id: "cu1".to_string(),
            reward_id: "r1".to_string(),
            code: "WAFA-ABCD1234".to_string(),
            origin: CouponOrigin::Threshold,
            expires_at: now + Duration::days(30),
            used: false,
            used_at: None,
            created_at: now,
        };
        assert!(!coupon.is_expired_at(now));
        assert!(coupon.is_expired_at(now + Duration::days(31)));
    }
}
