//! # Repository Implementations
//!
//! One repository per aggregate, plus the ledger writer that spans
//! several tables inside a single transaction.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Repository Layout                                 │
//! │                                                                         │
//! │  merchant.rs   Merchant lifecycle, settings JSON, aggregate counter    │
//! │  customer.rs   Get-or-create, soft delete, share counter               │
//! │  reward.rs     Reward rules, active-rule lookup                        │
//! │  coupon.rs     Issued coupons, one-way redemption                      │
//! │  activity.rs   Append-only ledger queries, reconciliation              │
//! │  ledger.rs     THE WRITE PATH: balance + activity + coupons + outbox   │
//! │                in one transaction                                      │
//! │  outbox.rs     Notification outbox queue                               │
//! │                                                                         │
//! │  Only ledger.rs mutates customer balances. Everything else is          │
//! │  reads, lifecycle, or bookkeeping.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod activity;
pub mod coupon;
pub mod customer;
pub mod ledger;
pub mod merchant;
pub mod outbox;
pub mod reward;
