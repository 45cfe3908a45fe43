//! # Validation Module
//!
//! Configuration-time validation for merchant loyalty settings and
//! reward rules.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Settings controller (out-of-scope collaborator)              │
//! │  └── THIS MODULE: rejects bad configuration before it is stored        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine defensiveness                                         │
//! │  ├── calculator treats ratio <= 0 as a disabled rule                   │
//! │  └── tier resolver tolerates unordered thresholds                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (points >= 0) on customers                                  │
//! │  └── UNIQUE constraints on codes and dedup keys                        │
//! │                                                                         │
//! │  Defense in depth: multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{ValidationError, ValidationResult};
use crate::types::{LoyaltySettings, Reward};

// =============================================================================
// Settings Validation
// =============================================================================

/// Validates a merchant's loyalty settings before they are stored.
///
/// ## Rules
/// - tier thresholds strictly increasing (silver < gold < platinum) and
///   silver positive, so bronze keeps a non-empty range
/// - an enabled purchase rule must have a positive currency ratio
/// - an enabled threshold rule must have a positive minimum amount
/// - flat award points must not be negative
pub fn validate_settings(settings: &LoyaltySettings) -> ValidationResult<()> {
    let tiers = &settings.tiers;
    if tiers.silver <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "tiers.silver".to_string(),
        });
    }
    if tiers.gold <= tiers.silver || tiers.platinum <= tiers.gold {
        return Err(ValidationError::UnorderedTiers {
            detail: format!(
                "silver={}, gold={}, platinum={}",
                tiers.silver, tiers.gold, tiers.platinum
            ),
        });
    }

    if settings.purchase.enabled && settings.purchase.cents_per_point <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "purchase.cents_per_point".to_string(),
        });
    }

    let threshold = &settings.purchase_amount_threshold;
    if threshold.enabled {
        if threshold.min_amount_cents <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "purchase_amount_threshold.min_amount_cents".to_string(),
            });
        }
        if threshold.points < 0 {
            return Err(ValidationError::MustBePositive {
                field: "purchase_amount_threshold.points".to_string(),
            });
        }
    }

    for (field, rule) in [
        ("birthday", &settings.birthday),
        ("welcome", &settings.welcome),
        ("shipping_feedback", &settings.shipping_feedback),
        ("app_rating", &settings.app_rating),
        ("product_rating", &settings.product_rating),
        ("profile_completion", &settings.profile_completion),
        ("repeat_purchase", &settings.repeat_purchase),
        ("share_referral", &settings.share_referral),
        ("app_install", &settings.app_install),
    ] {
        if rule.enabled && rule.points < 0 {
            return Err(ValidationError::MustBePositive {
                field: format!("{field}.points"),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Reward Validation
// =============================================================================

/// Validates a reward rule before it is stored.
pub fn validate_reward(reward: &Reward) -> ValidationResult<()> {
    if reward.name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }
    if reward.name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    if reward.points_required <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "points_required".to_string(),
        });
    }

    match reward.reward_type {
        crate::types::RewardType::PercentageDiscount => {
            // basis points: 1 = 0.01%, 10000 = 100%
            if reward.reward_value < 1 || reward.reward_value > 10_000 {
                return Err(ValidationError::OutOfRange {
                    field: "reward_value".to_string(),
                    min: 1,
                    max: 10_000,
                });
            }
        }
        crate::types::RewardType::FixedAmountDiscount => {
            if reward.reward_value <= 0 {
                return Err(ValidationError::MustBePositive {
                    field: "reward_value".to_string(),
                });
            }
        }
        crate::types::RewardType::FreeShipping => {}
    }

    if let Some(limit) = reward.usage_limit {
        if limit <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "usage_limit".to_string(),
            });
        }
    }

    if let (Some(from), Some(until)) = (reward.valid_from, reward.valid_until) {
        if from > until {
            return Err(ValidationError::InvertedValidityWindow);
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
