//! # Notification Worker
//!
//! Drains the notification outbox and delivers rendered messages
//! through a [`Mailer`].
//!
//! ## Worker Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Notification Worker Flow                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 notification_outbox Table                       │   │
//! │  │                                                                 │   │
//! │  │  id | kind           | recipient | attempts | sent_at          │   │
//! │  │  ───┼────────────────┼───────────┼──────────┼──────────        │   │
//! │  │  1  │ points_earned  │ a@x.com   │ 0        │ NULL             │   │
//! │  │  2  │ coupon_issued  │ a@x.com   │ 1        │ NULL             │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   NotificationWorker                            │   │
//! │  │                                                                 │   │
//! │  │  1. Poll: get_pending(batch_size) on an interval               │   │
//! │  │  2. Skip: entries past max_attempts (logged)                   │   │
//! │  │  3. Render: bilingual template per entry                       │   │
//! │  │  4. Send: mailer.send() under a timeout                        │   │
//! │  │  5. Mark: sent_at on success, attempts+1 + error on failure    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Delivery failures never reach the ledger path. The outbox rows        │
//! │  were committed with the financial state; the worker only ever         │
//! │  flips their delivery bookkeeping.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use wafa_db::{Database, OutboxEntry};

use crate::config::NotificationSettings;
use crate::error::EngineResult;
use crate::templates;

// =============================================================================
// Mailer Abstraction
// =============================================================================

/// Delivery failure reported by a mailer.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MailerError(pub String);

/// Something that can deliver a rendered message.
///
/// Production wires an SMTP/API-backed implementation here; tests and
/// local development use [`LogMailer`].
pub trait Mailer: Send + Sync + 'static {
    fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), MailerError>> + Send;
}

/// Mailer that only logs. Default for local development.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(
        &self,
        to: &str,
        subject: &str,
        _body: &str,
    ) -> impl Future<Output = Result<(), MailerError>> + Send {
        let to = to.to_string();
        let subject = subject.to_string();
        async move {
            info!(to = %to, subject = %subject, "Notification (log only)");
            Ok(())
        }
    }
}

// =============================================================================
// Notification Worker
// =============================================================================

/// Drains the notification outbox in the background.
pub struct NotificationWorker<M: Mailer> {
    db: Database,
    config: NotificationSettings,
    mailer: M,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the notification worker.
#[derive(Clone)]
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl WorkerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) {
        // A dropped worker means shutdown already happened; ignore.
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl<M: Mailer> NotificationWorker<M> {
    /// Creates a new worker and returns a handle.
    pub fn new(db: Database, config: NotificationSettings, mailer: M) -> (Self, WorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = NotificationWorker {
            db,
            config,
            mailer,
            shutdown_rx,
        };

        (worker, WorkerHandle { shutdown_tx })
    }

    /// Runs the worker loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Notification worker starting");

        let poll_interval = Duration::from_secs(self.config.poll_interval_secs);
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.process_batch().await {
                        error!(?e, "Failed to process notification batch");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Notification worker shutting down");
                    break;
                }
            }
        }

        info!("Notification worker stopped");
    }

    /// Processes one batch of pending outbox entries.
    ///
    /// ## Returns
    /// Number of entries successfully delivered.
    pub async fn process_batch(&self) -> EngineResult<usize> {
        let entries = self.db.outbox().get_pending(self.config.batch_size).await?;

        if entries.is_empty() {
            debug!("No pending notifications");
            return Ok(0);
        }

        // Entries that burned their retry budget stay in the table for
        // forensics but are no longer attempted.
        let (deliverable, exhausted): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|e| e.attempts < self.config.max_attempts);

        for entry in exhausted {
            warn!(
                entry_id = %entry.id,
                kind = entry.kind.as_str(),
                attempts = entry.attempts,
                "Skipping notification that exceeded max attempts"
            );
        }

        let mut delivered = 0;
        for entry in deliverable {
            if self.deliver(&entry).await {
                delivered += 1;
            }
        }

        if delivered > 0 {
            debug!(delivered, "Notification batch processed");
        }

        Ok(delivered)
    }

    /// Delivers one entry; returns whether it was sent.
    async fn deliver(&self, entry: &OutboxEntry) -> bool {
        let message = templates::render(entry.kind, &entry.payload);
        let timeout = Duration::from_secs(self.config.send_timeout_secs);

        let result = tokio::time::timeout(
            timeout,
            self.mailer
                .send(&entry.recipient, &message.subject, &message.body),
        )
        .await;

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("send timed out after {}s", timeout.as_secs())),
        };

        match failure {
            None => {
                if let Err(e) = self.db.outbox().mark_sent(&entry.id).await {
                    error!(?e, entry_id = %entry.id, "Failed to mark notification sent");
                    return false;
                }
                debug!(
                    entry_id = %entry.id,
                    kind = entry.kind.as_str(),
                    to = %entry.recipient,
                    "Notification delivered"
                );
                true
            }
            Some(reason) => {
                warn!(
                    entry_id = %entry.id,
                    kind = entry.kind.as_str(),
                    attempts = entry.attempts + 1,
                    error = %reason,
                    "Notification delivery failed"
                );
                if let Err(e) = self.db.outbox().mark_failed(&entry.id, &reason).await {
                    error!(?e, entry_id = %entry.id, "Failed to record delivery failure");
                }
                false
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
