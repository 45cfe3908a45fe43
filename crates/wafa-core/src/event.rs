//! # Loyalty Events
//!
//! The closed set of events the engine reacts to, plus the raw envelope
//! the webhook/controller collaborators hand over.
//!
//! ## Boundary Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Event Boundary                                     │
//! │                                                                         │
//! │  Upstream platform webhook (arbitrary strings + JSON metadata)          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EventEnvelope { event, merchant_id, customer, metadata }               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LoyaltyEvent::from_envelope                                            │
//! │       ├── Ok(Some(event))  known name, well-formed metadata             │
//! │       ├── Ok(None)         unknown name → logged no-op downstream       │
//! │       └── Err(..)          known name, broken metadata → caller retries │
//! │                                                                         │
//! │  Inside the engine only the closed LoyaltyEvent enum exists.            │
//! │  Adding an event kind is a compile-time decision with exhaustive        │
//! │  matches, not a new string case.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::RewardType;
use crate::MAX_ORDER_ID_LEN;

// =============================================================================
// Envelope
// =============================================================================

/// Reference to the customer an event concerns.
///
/// Identified by the platform-assigned external id; the engine resolves
/// it to a local customer row (and silently no-ops when absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRef {
    pub external_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// The raw event as delivered by a webhook handler or manual controller.
///
/// `event` is an arbitrary string on purpose: the upstream platform adds
/// webhook topics without notice, and unrecognized ones must stay a
/// no-op rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Platform event name, e.g. "purchase" or "installApp".
    pub event: String,

    /// External id of the merchant store the event belongs to.
    pub merchant_id: String,

    pub customer: CustomerRef,

    /// Event-specific fields, retained verbatim in the activity ledger.
    #[serde(default)]
    pub metadata: Value,
}

// =============================================================================
// Event Kind
// =============================================================================

/// Stable names for the event kinds, as recorded in ledger entries and
/// dedup keys. The names match the upstream platform's webhook topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Purchase,
    PurchaseAmountThreshold,
    Birthday,
    Welcome,
    ShippingFeedback,
    AppRating,
    ProductRating,
    ProfileCompletion,
    RepeatPurchase,
    ShareReferral,
    AppInstall,
    ManualReward,
    PointsDeduction,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::Purchase => "purchase",
            EventKind::PurchaseAmountThreshold => "purchaseAmountThresholdPoints",
            EventKind::Birthday => "birthday",
            EventKind::Welcome => "welcome",
            EventKind::ShippingFeedback => "feedbackShippingPoints",
            EventKind::AppRating => "ratingAppPoints",
            EventKind::ProductRating => "ratingProductPoints",
            EventKind::ProfileCompletion => "profileCompletion",
            EventKind::RepeatPurchase => "repeatPurchase",
            EventKind::ShareReferral => "shareReferral",
            EventKind::AppInstall => "installApp",
            EventKind::ManualReward => "manualReward",
            EventKind::PointsDeduction => "pointsDeduction",
        }
    }

    /// Maps a platform event name to a kind. Unknown names are `None`,
    /// never an error.
    pub fn from_name(name: &str) -> Option<EventKind> {
        match name {
            "purchase" => Some(EventKind::Purchase),
            "purchaseAmountThresholdPoints" => Some(EventKind::PurchaseAmountThreshold),
            "birthday" => Some(EventKind::Birthday),
            "welcome" => Some(EventKind::Welcome),
            "feedbackShippingPoints" => Some(EventKind::ShippingFeedback),
            "ratingAppPoints" => Some(EventKind::AppRating),
            "ratingProductPoints" => Some(EventKind::ProductRating),
            "profileCompletion" => Some(EventKind::ProfileCompletion),
            "repeatPurchase" => Some(EventKind::RepeatPurchase),
            "shareReferral" => Some(EventKind::ShareReferral),
            "installApp" => Some(EventKind::AppInstall),
            "manualReward" => Some(EventKind::ManualReward),
            "pointsDeduction" => Some(EventKind::PointsDeduction),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Deduction Reason
// =============================================================================

/// Why points are being taken back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductionReason {
    OrderCancelled,
    OrderDeleted,
    OrderRefunded,
}

impl DeductionReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeductionReason::OrderCancelled => "order_cancelled",
            DeductionReason::OrderDeleted => "order_deleted",
            DeductionReason::OrderRefunded => "order_refunded",
        }
    }
}

impl FromStr for DeductionReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order_cancelled" => Ok(DeductionReason::OrderCancelled),
            "order_deleted" => Ok(DeductionReason::OrderDeleted),
            "order_refunded" => Ok(DeductionReason::OrderRefunded),
            other => Err(CoreError::UnknownVariant {
                what: "deduction reason",
                value: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Loyalty Event
// =============================================================================

/// A fully parsed loyalty event. Every variant the engine handles is
/// here; matches over this type are exhaustive by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum LoyaltyEvent {
    /// An order was placed. Base award proportional to the amount; the
    /// purchase-amount threshold bonus is evaluated alongside it.
    Purchase { amount: Money, order_id: String },

    /// Standalone evaluation of the purchase-amount threshold bonus.
    PurchaseAmountThreshold { amount: Money, order_id: String },

    /// The customer's birthday, as reported by the platform.
    Birthday { birthday_date: NaiveDate },

    /// First enrollment of a customer.
    Welcome { source: String },

    /// Shipping feedback submitted.
    ShippingFeedback { feedback_id: String, rating: i64 },

    /// The customer rated the app.
    AppRating { rating: i64 },

    /// The customer rated a product.
    ProductRating {
        rating: i64,
        product_id: Option<String>,
    },

    ProfileCompletion,

    RepeatPurchase,

    /// The customer shared their referral link.
    ShareReferral {
        share_count: i64,
        share_date: Option<DateTime<Utc>>,
    },

    AppInstall,

    /// Issue a coupon for a named reward, bypassing the points check.
    ManualReward {
        reward_type: RewardType,
        reward_id: String,
    },

    /// Take points back, clamped at a zero balance.
    PointsDeduction { points: i64, reason: DeductionReason },
}

impl LoyaltyEvent {
    /// The stable kind of this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            LoyaltyEvent::Purchase { .. } => EventKind::Purchase,
            LoyaltyEvent::PurchaseAmountThreshold { .. } => EventKind::PurchaseAmountThreshold,
            LoyaltyEvent::Birthday { .. } => EventKind::Birthday,
            LoyaltyEvent::Welcome { .. } => EventKind::Welcome,
            LoyaltyEvent::ShippingFeedback { .. } => EventKind::ShippingFeedback,
            LoyaltyEvent::AppRating { .. } => EventKind::AppRating,
            LoyaltyEvent::ProductRating { .. } => EventKind::ProductRating,
            LoyaltyEvent::ProfileCompletion => EventKind::ProfileCompletion,
            LoyaltyEvent::RepeatPurchase => EventKind::RepeatPurchase,
            LoyaltyEvent::ShareReferral { .. } => EventKind::ShareReferral,
            LoyaltyEvent::AppInstall => EventKind::AppInstall,
            LoyaltyEvent::ManualReward { .. } => EventKind::ManualReward,
            LoyaltyEvent::PointsDeduction { .. } => EventKind::PointsDeduction,
        }
    }

    /// The order id for order-bearing events, used to build dedup keys.
    pub fn order_id(&self) -> Option<&str> {
        match self {
            LoyaltyEvent::Purchase { order_id, .. }
            | LoyaltyEvent::PurchaseAmountThreshold { order_id, .. } => Some(order_id),
            _ => None,
        }
    }

    /// Parses an envelope into a loyalty event.
    ///
    /// ## Returns
    /// * `Ok(Some(event))` - recognized name, well-formed metadata
    /// * `Ok(None)` - unrecognized event name (caller logs and no-ops)
    /// * `Err(CoreError::InvalidEventPayload)` - recognized name but the
    ///   metadata is missing required fields or malformed
    pub fn from_envelope(envelope: &EventEnvelope) -> CoreResult<Option<LoyaltyEvent>> {
        let Some(kind) = EventKind::from_name(&envelope.event) else {
            return Ok(None);
        };

        let meta = Meta {
            event: kind.as_str(),
            value: &envelope.metadata,
        };

        let event = match kind {
            EventKind::Purchase => LoyaltyEvent::Purchase {
                amount: meta.amount("amount")?,
                order_id: meta.order_id("orderId")?,
            },
            EventKind::PurchaseAmountThreshold => LoyaltyEvent::PurchaseAmountThreshold {
                amount: meta.amount("amount")?,
                order_id: meta.order_id("orderId")?,
            },
            EventKind::Birthday => LoyaltyEvent::Birthday {
                birthday_date: meta.date("birthdayDate")?,
            },
            EventKind::Welcome => LoyaltyEvent::Welcome {
                source: meta.string("source")?,
            },
            EventKind::ShippingFeedback => LoyaltyEvent::ShippingFeedback {
                feedback_id: meta.string("feedbackId")?,
                rating: meta.integer("rating")?,
            },
            EventKind::AppRating => LoyaltyEvent::AppRating {
                rating: meta.integer("rating")?,
            },
            EventKind::ProductRating => LoyaltyEvent::ProductRating {
                rating: meta.integer("rating")?,
                product_id: meta.optional_string("productId"),
            },
            EventKind::ProfileCompletion => LoyaltyEvent::ProfileCompletion,
            EventKind::RepeatPurchase => LoyaltyEvent::RepeatPurchase,
            EventKind::ShareReferral => LoyaltyEvent::ShareReferral {
                share_count: meta.integer("shareCount")?,
                share_date: meta.optional_datetime("shareDate")?,
            },
            EventKind::AppInstall => LoyaltyEvent::AppInstall,
            EventKind::ManualReward => {
                let reward_type: RewardType = meta.string("rewardType")?.parse()?;
                LoyaltyEvent::ManualReward {
                    reward_type,
                    reward_id: meta.string("rewardId")?,
                }
            }
            EventKind::PointsDeduction => {
                let reason: DeductionReason = meta.string("reason")?.parse()?;
                let points = meta.integer("pointsDeducted")?;
                if points < 0 {
                    return Err(meta.invalid("pointsDeducted must not be negative"));
                }
                LoyaltyEvent::PointsDeduction { points, reason }
            }
        };

        Ok(Some(event))
    }
}

// =============================================================================
// Metadata Field Access
// =============================================================================

/// Field accessors over the metadata JSON with uniform error reporting.
struct Meta<'a> {
    event: &'static str,
    value: &'a Value,
}

impl Meta<'_> {
    fn invalid(&self, reason: impl Into<String>) -> CoreError {
        CoreError::InvalidEventPayload {
            event: self.event.to_string(),
            reason: reason.into(),
        }
    }

    fn field(&self, key: &str) -> CoreResult<&Value> {
        match self.value.get(key) {
            Some(Value::Null) | None => Err(self.invalid(format!("missing field '{key}'"))),
            Some(v) => Ok(v),
        }
    }

    fn string(&self, key: &str) -> CoreResult<String> {
        match self.field(key)? {
            Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Value::String(_) => Err(self.invalid(format!("field '{key}' is empty"))),
            _ => Err(self.invalid(format!("field '{key}' must be a string"))),
        }
    }

    fn optional_string(&self, key: &str) -> Option<String> {
        match self.value.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    fn integer(&self, key: &str) -> CoreResult<i64> {
        let v = self.field(key)?;
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| self.invalid(format!("field '{key}' must be a number")))
    }

    /// Reads a monetary amount in major currency units (the platform
    /// sends "amount": 249.99) and converts once to cents.
    fn amount(&self, key: &str) -> CoreResult<Money> {
        let v = self.field(key)?;
        let major = v
            .as_f64()
            .ok_or_else(|| self.invalid(format!("field '{key}' must be a number")))?;
        if !major.is_finite() || major < 0.0 {
            return Err(self.invalid(format!("field '{key}' must be a non-negative amount")));
        }
        Ok(Money::from_cents((major * 100.0).round() as i64))
    }

    fn order_id(&self, key: &str) -> CoreResult<String> {
        let id = self.string(key)?;
        if id.len() > MAX_ORDER_ID_LEN {
            return Err(self.invalid(format!(
                "field '{key}' exceeds {MAX_ORDER_ID_LEN} characters"
            )));
        }
        Ok(id)
    }

    fn date(&self, key: &str) -> CoreResult<NaiveDate> {
        let raw = self.string(key)?;
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| self.invalid(format!("field '{key}' must be a YYYY-MM-DD date")))
    }

    fn optional_datetime(&self, key: &str) -> CoreResult<Option<DateTime<Utc>>> {
        match self.value.get(key) {
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|_| self.invalid(format!("field '{key}' must be an RFC 3339 timestamp"))),
            Some(Value::Null) | None => Ok(None),
            Some(_) => Err(self.invalid(format!("field '{key}' must be a string"))),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event: &str, metadata: Value) -> EventEnvelope {
        EventEnvelope {
            event: event.to_string(),
            merchant_id: "store-1".to_string(),
            customer: CustomerRef {
                external_id: "cust-1".to_string(),
                email: Some("shopper@example.com".to_string()),
                name: None,
            },
            metadata,
        }
    }

    #[test]
    fn test_parse_purchase() {
        let env = envelope("purchase", json!({"amount": 250.0, "orderId": "o1"}));
        let event = LoyaltyEvent::from_envelope(&env).unwrap().unwrap();
        assert_eq!(
            event,
            LoyaltyEvent::Purchase {
                amount: Money::from_cents(25000),
                order_id: "o1".to_string(),
            }
        );
        assert_eq!(event.kind().as_str(), "purchase");
        assert_eq!(event.order_id(), Some("o1"));
    }

    #[test]
    fn test_parse_purchase_fractional_amount() {
        let env = envelope("purchase", json!({"amount": 249.99, "orderId": "o2"}));
        let event = LoyaltyEvent::from_envelope(&env).unwrap().unwrap();
        match event {
            LoyaltyEvent::Purchase { amount, .. } => assert_eq!(amount.cents(), 24999),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_purchase_missing_amount_is_error() {
        let env = envelope("purchase", json!({"orderId": "o1"}));
        let err = LoyaltyEvent::from_envelope(&env).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEventPayload { .. }));
    }

    #[test]
    fn test_parse_unknown_event_is_none() {
        let env = envelope("order.shipped", json!({}));
        assert!(LoyaltyEvent::from_envelope(&env).unwrap().is_none());
    }

    #[test]
    fn test_parse_birthday() {
        let env = envelope("birthday", json!({"birthdayDate": "1990-06-15"}));
        let event = LoyaltyEvent::from_envelope(&env).unwrap().unwrap();
        assert_eq!(
            event,
            LoyaltyEvent::Birthday {
                birthday_date: NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(),
            }
        );
    }

    #[test]
    fn test_parse_deduction() {
        let env = envelope(
            "pointsDeduction",
            json!({"pointsDeducted": 100, "reason": "order_refunded"}),
        );
        let event = LoyaltyEvent::from_envelope(&env).unwrap().unwrap();
        assert_eq!(
            event,
            LoyaltyEvent::PointsDeduction {
                points: 100,
                reason: DeductionReason::OrderRefunded,
            }
        );
    }

    #[test]
    fn test_parse_deduction_bad_reason_is_error() {
        let env = envelope(
            "pointsDeduction",
            json!({"pointsDeducted": 100, "reason": "felt_like_it"}),
        );
        assert!(LoyaltyEvent::from_envelope(&env).is_err());
    }

    #[test]
    fn test_parse_manual_reward() {
        let env = envelope(
            "manualReward",
            json!({"rewardType": "free_shipping", "rewardId": "r-9"}),
        );
        let event = LoyaltyEvent::from_envelope(&env).unwrap().unwrap();
        assert_eq!(
            event,
            LoyaltyEvent::ManualReward {
                reward_type: RewardType::FreeShipping,
                reward_id: "r-9".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_share_referral_optional_date() {
        let env = envelope("shareReferral", json!({"shareCount": 3}));
        let event = LoyaltyEvent::from_envelope(&env).unwrap().unwrap();
        assert_eq!(
            event,
            LoyaltyEvent::ShareReferral {
                share_count: 3,
                share_date: None,
            }
        );

        let env = envelope(
            "shareReferral",
            json!({"shareCount": 4, "shareDate": "2026-03-01T10:00:00Z"}),
        );
        match LoyaltyEvent::from_envelope(&env).unwrap().unwrap() {
            LoyaltyEvent::ShareReferral { share_date, .. } => assert!(share_date.is_some()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_no_metadata_events() {
        for name in ["profileCompletion", "repeatPurchase", "installApp"] {
            let env = envelope(name, Value::Null);
            assert!(LoyaltyEvent::from_envelope(&env).unwrap().is_some());
        }
    }

    #[test]
    fn test_event_kind_names_round_trip() {
        for kind in [
            EventKind::Purchase,
            EventKind::PurchaseAmountThreshold,
            EventKind::Birthday,
            EventKind::Welcome,
            EventKind::ShippingFeedback,
            EventKind::AppRating,
            EventKind::ProductRating,
            EventKind::ProfileCompletion,
            EventKind::RepeatPurchase,
            EventKind::ShareReferral,
            EventKind::AppInstall,
            EventKind::ManualReward,
            EventKind::PointsDeduction,
        ] {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("order.created"), None);
    }
}
