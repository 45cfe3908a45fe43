//! # Seed Data Generator
//!
//! Populates the database with a demo merchant, customers, and a reward
//! rule for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./wafa.db (default)
//! cargo run -p wafa-db --bin seed
//!
//! # Specify database path
//! cargo run -p wafa-db --bin seed -- --db ./data/wafa.db
//! ```
//!
//! ## Generated Data
//! - One merchant ("demo-store") with purchase and birthday rules enabled
//! - A 10%-off reward rule at 100 points
//! - A handful of customers with seeded purchase history

use std::env;

use serde_json::json;
use tracing::info;

use wafa_core::{EventKind, EventRule, LoyaltySettings, PurchaseThresholdRule, RewardType};
use wafa_db::repository::reward::NewReward;
use wafa_db::{Database, DbConfig};

const CUSTOMERS: &[(&str, &str, &str)] = &[
    ("cust-amira", "amira@example.com", "Amira"),
    ("cust-omar", "omar@example.com", "Omar"),
    ("cust-lina", "lina@example.com", "Lina"),
    ("cust-tariq", "tariq@example.com", "Tariq"),
];

/// Seeded purchase amounts per customer, in whole currency units.
const PURCHASES: &[(&str, &[i64])] = &[
    ("cust-amira", &[120, 85, 240]),
    ("cust-omar", &[35]),
    ("cust-lina", &[560, 90]),
    ("cust-tariq", &[]),
];

fn demo_settings() -> LoyaltySettings {
    let mut settings = LoyaltySettings::default();
    settings.purchase.enabled = true;
    settings.purchase.cents_per_point = 100; // one point per currency unit
    settings.purchase_amount_threshold = PurchaseThresholdRule {
        enabled: true,
        min_amount_cents: 50_000, // 500.00
        points: 75,
    };
    settings.birthday = EventRule {
        enabled: true,
        points: 50,
    };
    settings.welcome = EventRule {
        enabled: true,
        points: 20,
    };
    settings
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Minimal arg parsing: --db <path>
    let args: Vec<String> = env::args().collect();
    let db_path = args
        .iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or("./wafa.db");

    info!(path = db_path, "Seeding database");

    let db = Database::new(DbConfig::new(db_path)).await?;

    let merchant = match db.merchants().get_by_external_id("demo-store").await? {
        Some(existing) => {
            info!(merchant_id = %existing.id, "Demo merchant already present");
            existing
        }
        None => {
            db.merchants()
                .create(
                    "demo-store",
                    "Demo Store",
                    Some("owner@demo-store.example"),
                    demo_settings(),
                )
                .await?
        }
    };

    if db.rewards().list_for_merchant(&merchant.id).await?.is_empty() {
        db.rewards()
            .create(NewReward {
                merchant_id: merchant.id.clone(),
                name: "10% off your next order".to_string(),
                points_required: 100,
                reward_type: RewardType::PercentageDiscount,
                reward_value: 1000,
                usage_limit: None,
                valid_from: None,
                valid_until: None,
            })
            .await?;
    }

    let ledger = db.ledger();
    for (external_id, email, name) in CUSTOMERS {
        let customer = db
            .customers()
            .get_or_create(&merchant.id, external_id, Some(email), Some(name))
            .await?;

        let history = PURCHASES
            .iter()
            .find(|(id, _)| id == external_id)
            .map(|(_, amounts)| *amounts)
            .unwrap_or(&[]);

        for (i, amount) in history.iter().enumerate() {
            let order_id = format!("seed-{external_id}-{i}");
            let metadata = json!({"amount": amount, "orderId": order_id});
            let dedup_key = format!("{}:purchase:{order_id}", merchant.id);
            let outcome = ledger
                .award(
                    &merchant,
                    &customer.id,
                    EventKind::Purchase,
                    *amount, // one point per unit at the demo ratio
                    &metadata,
                    Some(&dedup_key),
                )
                .await?;
            if outcome.applied {
                db.merchants()
                    .add_customers_points(&merchant.id, *amount)
                    .await?;
            }

            info!(
                customer = name,
                order = %order_id,
                points = amount,
                balance = outcome.points_after,
                coupons = outcome.coupons.len(),
                "Seeded purchase"
            );
        }
    }

    let total = db
        .merchants()
        .reconcile_customers_points(&merchant.id)
        .await?;
    info!(customers_points = total, "Seed complete");

    Ok(())
}
