//! # wafa-core: Pure Business Logic for the Wafa Loyalty Engine
//!
//! This crate is the **heart** of the loyalty platform. It contains all
//! business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Wafa Loyalty Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              External Collaborators (out of scope)              │   │
//! │  │    Webhook handler ──► Auth ──► Settings controller             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ EventEnvelope                          │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    wafa-engine (dispatcher)                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ wafa-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   event   │  │  points   │  │   tier    │  │ validation│  │   │
//! │  │   │ envelope  │  │ calculator│  │ resolver  │  │   rules   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                     wafa-db (Database Layer)                    │   │
//! │  │           SQLite ledger, coupons, notification outbox           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Merchant, Customer, Reward, Coupon, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`event`] - Closed event union and the raw webhook envelope
//! - [`points`] - Point calculator and threshold-crossing math
//! - [`tier`] - Tier resolver
//! - [`error`] - Domain error types
//! - [`validation`] - Configuration-time validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Closed Event Set**: Event kinds are an enum, not strings - new kinds are
//!    a compile-time decision

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod event;
pub mod money;
pub mod points;
pub mod tier;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use wafa_core::Money` instead of
// `use wafa_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use event::{CustomerRef, DeductionReason, EventEnvelope, EventKind, LoyaltyEvent};
pub use money::Money;
pub use tier::Tier;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum points a single award may carry.
///
/// ## Business Reason
/// Caps the damage of a misconfigured rule (e.g. a ratio typo awarding
/// millions of points for one order). Deliberately generous.
pub const MAX_AWARD_POINTS: i64 = 1_000_000;

/// Maximum length of a merchant-supplied order identifier.
pub const MAX_ORDER_ID_LEN: usize = 64;
