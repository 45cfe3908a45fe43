//! # Notification Outbox Repository
//!
//! The notification outbox queue.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Outbox Pattern Implementation                           │
//! │                                                                         │
//! │  LEDGER OPERATION (award / deduct / issue coupon)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE customers SET points = ..., version = version + 1   │   │
//! │  │  2. INSERT INTO loyalty_activities (...)                       │   │
//! │  │  3. INSERT INTO coupons (...)           (on crossings)         │   │
//! │  │  4. INSERT INTO notification_outbox (...)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← financial state and pending messages land together           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │         NOTIFICATION WORKER (wafa-engine, async)                │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT * FROM notification_outbox WHERE sent_at IS NULL    │   │
//! │  │  2. Render template, send with timeout                         │   │
//! │  │     a. On success: UPDATE ... SET sent_at = NOW()              │   │
//! │  │     b. On failure: UPDATE ... SET attempts += 1, last_error    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • A slow or dead mailer can never block or abort a ledger write       │
//! │  • A committed award always has its pending notification on disk       │
//! │  • Delivery is at-least-once with a bounded retry budget               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use wafa_core::{NotificationKind, NotificationPayload};

/// A queued notification.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: String,
    pub merchant_id: String,
    /// None for administrative alerts addressed to the merchant.
    pub customer_id: Option<String>,
    pub kind: NotificationKind,
    /// Destination email address.
    pub recipient: String,
    pub payload: NotificationPayload,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Raw outbox row; kind and payload are parsed on the way out.
#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: String,
    merchant_id: String,
    customer_id: Option<String>,
    kind: String,
    recipient: String,
    payload: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
}

impl OutboxRow {
    fn into_entry(self) -> DbResult<OutboxEntry> {
        let kind: NotificationKind = self
            .kind
            .parse()
            .map_err(|e| DbError::corrupt("notification kind", &self.id, e))?;
        let payload: NotificationPayload = serde_json::from_str(&self.payload)
            .map_err(|e| DbError::corrupt("notification payload", &self.id, e))?;

        Ok(OutboxEntry {
            id: self.id,
            merchant_id: self.merchant_id,
            customer_id: self.customer_id,
            kind,
            recipient: self.recipient,
            payload,
            attempts: self.attempts,
            last_error: self.last_error,
            created_at: self.created_at,
            attempted_at: self.attempted_at,
            sent_at: self.sent_at,
        })
    }
}

const SELECT_OUTBOX: &str =
    "SELECT id, merchant_id, customer_id, kind, recipient, payload, attempts, last_error, \
     created_at, attempted_at, sent_at FROM notification_outbox";

/// Inserts an outbox row on any executor.
///
/// The ledger writer calls this with its open transaction so the entry
/// commits (or rolls back) together with the balance change.
pub(crate) async fn insert_entry<'e, E>(
    executor: E,
    merchant_id: &str,
    customer_id: Option<&str>,
    kind: NotificationKind,
    recipient: &str,
    payload: &NotificationPayload,
) -> DbResult<String>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = Uuid::new_v4().to_string();
    let payload_json =
        serde_json::to_string(payload).map_err(|e| DbError::Internal(e.to_string()))?;
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO notification_outbox (id, merchant_id, customer_id, kind, recipient, \
         payload, attempts, last_error, created_at, attempted_at, sent_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, NULL, NULL)",
    )
    .bind(&id)
    .bind(merchant_id)
    .bind(customer_id)
    .bind(kind.as_str())
    .bind(recipient)
    .bind(&payload_json)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(id)
}

/// Repository for notification outbox operations.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    /// Creates a new OutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Enqueues a notification outside any ledger transaction.
    ///
    /// Used for administrative alerts that have no accompanying balance
    /// change (e.g. a manualReward naming a missing rule).
    pub async fn enqueue(
        &self,
        merchant_id: &str,
        customer_id: Option<&str>,
        kind: NotificationKind,
        recipient: &str,
        payload: &NotificationPayload,
    ) -> DbResult<String> {
        let id = insert_entry(&self.pool, merchant_id, customer_id, kind, recipient, payload)
            .await?;

        debug!(entry_id = %id, kind = kind.as_str(), "Notification queued");
        Ok(id)
    }

    /// Gets pending entries that need delivery, oldest first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            "{SELECT_OUTBOX} WHERE sent_at IS NULL ORDER BY created_at ASC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxRow::into_entry).collect()
    }

    /// Marks an entry as successfully delivered.
    pub async fn mark_sent(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE notification_outbox SET sent_at = ?2, attempted_at = ?2, \
             attempts = attempts + 1 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a delivery failure.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE notification_outbox SET attempts = attempts + 1, last_error = ?2, \
             attempted_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts undelivered entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification_outbox WHERE sent_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Deletes old delivered entries (cleanup).
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_old_entries(&self, days_old: u32) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM notification_outbox WHERE sent_at IS NOT NULL \
             AND sent_at < datetime('now', '-' || ?1 || ' days')",
        )
        .bind(days_old)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use wafa_core::LoyaltySettings;

    async fn db_with_merchant() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let merchant = db
            .merchants()
            .create("store-1", "Shop", Some("owner@shop.example"), LoyaltySettings::default())
            .await
            .unwrap();
        (db, merchant.id)
    }

    #[tokio::test]
    async fn test_enqueue_and_deliver() {
        let (db, merchant_id) = db_with_merchant().await;
        let outbox = db.outbox();

        let payload = NotificationPayload {
            merchant_name: Some("Shop".to_string()),
            ..NotificationPayload::default()
        };
        let id = outbox
            .enqueue(
                &merchant_id,
                None,
                NotificationKind::MissingRewardRule,
                "owner@shop.example",
                &payload,
            )
            .await
            .unwrap();

        assert_eq!(outbox.count_pending().await.unwrap(), 1);

        let pending = outbox.get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].kind, NotificationKind::MissingRewardRule);
        assert_eq!(pending[0].payload.merchant_name.as_deref(), Some("Shop"));

        outbox.mark_sent(&id).await.unwrap();
        assert_eq!(outbox.count_pending().await.unwrap(), 0);
        assert!(outbox.get_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_failed_keeps_pending() {
        let (db, merchant_id) = db_with_merchant().await;
        let outbox = db.outbox();

        let id = outbox
            .enqueue(
                &merchant_id,
                None,
                NotificationKind::MissingRewardRule,
                "owner@shop.example",
                &NotificationPayload::default(),
            )
            .await
            .unwrap();

        outbox.mark_failed(&id, "smtp timeout").await.unwrap();

        let pending = outbox.get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("smtp timeout"));
        assert!(pending[0].attempted_at.is_some());
    }
}
