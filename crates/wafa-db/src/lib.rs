//! # wafa-db: Database Layer for Wafa Loyalty
//!
//! This crate provides database access for the loyalty platform.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Wafa Loyalty Data Flow                            │
//! │                                                                         │
//! │  wafa-engine dispatcher (handle event)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      wafa-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ merchant      │    │  (embedded)  │  │   │
//! │  │   │               │    │ customer      │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ reward/coupon │    │ 001_init.sql │  │   │
//! │  │   │ Connection    │    │ activity      │    │              │  │   │
//! │  │   │ Management    │    │ ledger/outbox │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (one file per deployment, WAL mode)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wafa_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./wafa.db")).await?;
//! let merchant = db.merchants().get_by_external_id("store-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::activity::ActivityRepository;
pub use repository::coupon::CouponRepository;
pub use repository::customer::CustomerRepository;
pub use repository::ledger::{AwardOutcome, DeductOutcome, LedgerRepository, LedgerSettings};
pub use repository::merchant::MerchantRepository;
pub use repository::outbox::{OutboxEntry, OutboxRepository};
pub use repository::reward::{NewReward, RewardRepository};
