//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError (wafa-engine) ← What the webhook collaborator sees        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  HTTP layer returns an error status, upstream platform retries         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and caller decisions.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate merchant external id
    /// - Duplicate (merchant, customer) external id pair
    /// - Coupon code collision
    /// - Replayed dedup key (handled inside the ledger, surfaced here
    ///   only for non-ledger inserts)
    #[error("duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Optimistic concurrency conflict that survived all retries.
    ///
    /// ## When This Occurs
    /// - Two connections raced on the same customer's balance update
    ///   more times than the retry budget allows
    #[error("concurrent update conflict on customer {customer_id}")]
    ConcurrencyConflict { customer_id: String },

    /// Configuration rejected at the write boundary.
    ///
    /// ## When This Occurs
    /// - Unordered tier thresholds in a settings update
    /// - Enabled purchase rule with a non-positive currency ratio
    /// - Reward rule with an inverted validity window
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] wafa_core::ValidationError),

    /// A coupon redemption was attempted on an already-used code.
    #[error("coupon {code} has already been used")]
    CouponUsed { code: String },

    /// A coupon redemption was attempted on an expired code.
    #[error("coupon {code} expired at {expired_at}")]
    CouponExpired { code: String, expired_at: String },

    /// A manual issuance targeted a reward that is inactive, outside its
    /// validity window, or out of usage budget.
    #[error("reward {id} is not available for issuance")]
    RewardUnavailable { id: String },

    /// Stored data failed to parse back into a domain type.
    ///
    /// ## When This Occurs
    /// - Corrupt settings JSON on a merchant row
    /// - Unknown tier/reward-type text in an enum column
    #[error("corrupt {what} for {id}: {reason}")]
    Corrupt {
        what: &'static str,
        id: String,
        reason: String,
    },

    /// Database connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Corrupt error for a stored value that failed to parse.
    pub fn corrupt(what: &'static str, id: impl Into<String>, reason: impl ToString) -> Self {
        DbError::Corrupt {
            what,
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error is a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                // UNIQUE: "UNIQUE constraint failed: <table>.<column>"
                // FK:     "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
