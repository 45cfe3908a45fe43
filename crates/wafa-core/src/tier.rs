//! # Tier Resolver
//!
//! Maps a cumulative point balance to a tier label using the merchant's
//! configured thresholds. Pure and deterministic.
//!
//! The cached `tier` column on a customer row is derived state: it is
//! recomputed from the balance on every point change and must never be
//! treated as a source of truth.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::TierThresholds;

// =============================================================================
// Tier
// =============================================================================

/// Customer loyalty tiers, ordered from floor to ceiling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Entry tier; every customer starts here.
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Resolves the tier for a point balance.
    ///
    /// Thresholds are evaluated from highest to lowest, so an unordered
    /// configuration (which the settings boundary rejects, but old rows
    /// may still carry) degrades to the highest tier whose threshold is
    /// met rather than panicking or looping.
    ///
    /// ## Example
    /// ```rust
    /// use wafa_core::tier::Tier;
    /// use wafa_core::types::TierThresholds;
    ///
    /// let t = TierThresholds { silver: 100, gold: 500, platinum: 2000 };
    /// assert_eq!(Tier::resolve(99, &t), Tier::Bronze);
    /// assert_eq!(Tier::resolve(100, &t), Tier::Silver);
    /// assert_eq!(Tier::resolve(2500, &t), Tier::Platinum);
    /// ```
    pub fn resolve(points: i64, thresholds: &TierThresholds) -> Tier {
        if points >= thresholds.platinum {
            Tier::Platinum
        } else if points >= thresholds.gold {
            Tier::Gold
        } else if points >= thresholds.silver {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bronze" => Ok(Tier::Bronze),
            "silver" => Ok(Tier::Silver),
            "gold" => Ok(Tier::Gold),
            "platinum" => Ok(Tier::Platinum),
            other => Err(CoreError::UnknownVariant {
                what: "tier",
                value: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> TierThresholds {
        TierThresholds {
            silver: 100,
            gold: 500,
            platinum: 2000,
        }
    }

    #[test]
    fn test_resolve_boundaries() {
        let t = thresholds();
        assert_eq!(Tier::resolve(0, &t), Tier::Bronze);
        assert_eq!(Tier::resolve(99, &t), Tier::Bronze);
        assert_eq!(Tier::resolve(100, &t), Tier::Silver);
        assert_eq!(Tier::resolve(499, &t), Tier::Silver);
        assert_eq!(Tier::resolve(500, &t), Tier::Gold);
        assert_eq!(Tier::resolve(1999, &t), Tier::Gold);
        assert_eq!(Tier::resolve(2000, &t), Tier::Platinum);
        assert_eq!(Tier::resolve(1_000_000, &t), Tier::Platinum);
    }

    #[test]
    fn test_resolve_unordered_thresholds_does_not_panic() {
        // Misconfigured: platinum below silver. The resolver still
        // answers with the highest threshold met.
        let t = TierThresholds {
            silver: 500,
            gold: 300,
            platinum: 100,
        };
        assert_eq!(Tier::resolve(150, &t), Tier::Platinum);
        assert_eq!(Tier::resolve(0, &t), Tier::Bronze);
    }

    #[test]
    fn test_ordering() {
        assert!(Tier::Bronze < Tier::Silver);
        assert!(Tier::Silver < Tier::Gold);
        assert!(Tier::Gold < Tier::Platinum);
    }

    #[test]
    fn test_round_trip() {
        for tier in [Tier::Bronze, Tier::Silver, Tier::Gold, Tier::Platinum] {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
        assert!("diamond".parse::<Tier>().is_err());
    }
}
