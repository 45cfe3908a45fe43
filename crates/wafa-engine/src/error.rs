//! # Engine Error Types
//!
//! What the calling layer (webhook handler, manual controller) sees.
//!
//! Precondition gaps (missing merchant, missing customer, unknown event
//! name) are NOT errors: the dispatcher logs them and returns cleanly.
//! Persistence failures propagate so the caller can answer the upstream
//! platform with an error status and get the webhook redelivered.

use thiserror::Error;

/// Engine operation errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed payload for a recognized event, or a corrupt stored
    /// enum value.
    #[error(transparent)]
    Core(#[from] wafa_core::CoreError),

    /// Persistence failure. Fatal for the current invocation; the
    /// upstream platform is expected to retry the webhook (replays of
    /// committed order events are absorbed by the dedup key).
    #[error(transparent)]
    Db(#[from] wafa_db::DbError),

    /// Configuration file could not be read.
    #[error("failed to read config: {0}")]
    ConfigRead(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration carries an unusable value.
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_passthrough() {
        let db_err = wafa_db::DbError::PoolExhausted;
        let engine_err: EngineError = db_err.into();
        assert_eq!(engine_err.to_string(), "connection pool exhausted");
    }
}
