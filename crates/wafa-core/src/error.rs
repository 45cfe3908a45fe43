//! # Error Types
//!
//! Domain-specific error types for wafa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  wafa-core errors (this file)                                          │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Configuration validation failures              │
//! │                                                                         │
//! │  wafa-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  wafa-engine errors (separate crate)                                   │
//! │  └── EngineError      - What the webhook collaborator sees             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → EngineError → Caller    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (event name, field, etc.)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to an actionable log line

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or malformed input.
/// They should be caught and translated by the calling layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A recognized event arrived with a malformed or incomplete payload.
    ///
    /// ## When This Occurs
    /// - `purchase` without an `amount` or `orderId`
    /// - `pointsDeduction` with a non-numeric `pointsDeducted`
    /// - a date field that does not parse
    ///
    /// Unknown event *names* are not an error (they are a logged no-op);
    /// a known event with broken metadata is, so the upstream platform can
    /// retry the webhook once the integration is fixed.
    #[error("invalid payload for event '{event}': {reason}")]
    InvalidEventPayload { event: String, reason: String },

    /// An enumerated value stored or transmitted as text failed to parse.
    ///
    /// ## When This Occurs
    /// - unrecognized `rewardType` in a manualReward call
    /// - unrecognized deduction `reason`
    /// - corrupt enum column read back from the database
    #[error("unknown {what}: '{value}'")]
    UnknownVariant { what: &'static str, value: String },

    /// Validation error (wraps ValidationError).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Configuration validation errors.
///
/// These errors occur when merchant-supplied configuration does not meet
/// requirements. Used at the configuration boundary, before the engine
/// ever sees the settings.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Tier thresholds must be strictly increasing.
    ///
    /// ## When This Occurs
    /// - silver <= bronze, gold <= silver, or platinum <= gold
    ///
    /// The resolver itself stays defensive about unordered input, but
    /// configuration writes reject it outright.
    #[error("tier thresholds must be strictly increasing: {detail}")]
    UnorderedTiers { detail: String },

    /// A reward validity window ends before it starts.
    #[error("reward validity window is inverted: valid_from is after valid_until")]
    InvertedValidityWindow,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

/// Convenience type alias for Results with ValidationError.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidEventPayload {
            event: "purchase".to_string(),
            reason: "missing amount".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid payload for event 'purchase': missing amount"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::MustBePositive {
            field: "cents_per_point".to_string(),
        };
        assert_eq!(err.to_string(), "cents_per_point must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
