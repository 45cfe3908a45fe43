//! # Engine Configuration
//!
//! Configuration for coupon issuance and notification delivery.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     WAFA_COUPON_VALIDITY_DAYS=14                                       │
//! │     WAFA_NOTIFY_POLL_SECS=10                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/wafa/engine.toml (Linux)                                 │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     30-day coupons, 5s poll, 10s send timeout, 5 attempts              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [coupons]
//! validity_days = 30
//!
//! [notifications]
//! poll_interval_secs = 5
//! batch_size = 50
//! send_timeout_secs = 10
//! max_attempts = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Coupon Settings
// =============================================================================

/// Coupon issuance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponSettings {
    /// Validity window from issuance, in days.
    #[serde(default = "default_validity_days")]
    pub validity_days: i64,
}

fn default_validity_days() -> i64 {
    30
}

impl Default for CouponSettings {
    fn default() -> Self {
        CouponSettings {
            validity_days: default_validity_days(),
        }
    }
}

// =============================================================================
// Notification Settings
// =============================================================================

/// Notification worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Interval between outbox poll cycles (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Number of outbox entries to deliver per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Per-send timeout (seconds). A hanging mail provider costs at
    /// most this long per entry, and the ledger path not at all.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Delivery attempts per entry before it is skipped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_batch_size() -> u32 {
    50
}
fn default_send_timeout() -> u64 {
    10
}
fn default_max_attempts() -> i64 {
    5
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            send_timeout_secs: default_send_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
///
/// ## Example Config File
/// ```toml
/// [coupons]
/// validity_days = 14
///
/// [notifications]
/// poll_interval_secs = 5
/// batch_size = 50
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Coupon issuance settings.
    #[serde(default)]
    pub coupons: CouponSettings,

    /// Notification worker settings.
    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl EngineConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.coupons.validity_days <= 0 {
            return Err(EngineError::InvalidConfig(
                "coupons.validity_days must be greater than 0".into(),
            ));
        }
        if self.notifications.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "notifications.batch_size must be greater than 0".into(),
            ));
        }
        if self.notifications.max_attempts <= 0 {
            return Err(EngineError::InvalidConfig(
                "notifications.max_attempts must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(days) = std::env::var("WAFA_COUPON_VALIDITY_DAYS") {
            if let Ok(d) = days.parse::<i64>() {
                debug!(validity_days = d, "Overriding coupon validity from environment");
                self.coupons.validity_days = d;
            }
        }

        if let Ok(secs) = std::env::var("WAFA_NOTIFY_POLL_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.notifications.poll_interval_secs = s;
            }
        }

        if let Ok(size) = std::env::var("WAFA_NOTIFY_BATCH_SIZE") {
            if let Ok(b) = size.parse::<u32>() {
                self.notifications.batch_size = b;
            }
        }

        if let Ok(secs) = std::env::var("WAFA_NOTIFY_SEND_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.notifications.send_timeout_secs = s;
            }
        }

        if let Ok(attempts) = std::env::var("WAFA_NOTIFY_MAX_ATTEMPTS") {
            if let Ok(a) = attempts.parse::<i64>() {
                self.notifications.max_attempts = a;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "wafa", "loyalty")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
