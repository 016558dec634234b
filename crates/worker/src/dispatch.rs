//! Dispatch worker — first-attempt delivery of due notifications.
//!
//! Each run fetches due pending notifications (priority first, oldest due
//! time second), checks eligibility per row, renders the template against the
//! row's current variable bag, and sends through the gateway. Failures go
//! through the shared failure handler with the first-failure backoff policy.
//! A single notification's failure never aborts the batch.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_common::error::AppError;
use courier_common::types::{BatchStats, Notification, NotificationStatus, Priority};

use crate::audit::AuditLog;
use crate::backoff::BackoffPolicy;
use crate::failure::{FailureOutcome, handle_send_failure};
use crate::gateway::{SendMetadata, SendOutcome, SmsGateway};
use crate::quiet::QuietWindow;
use crate::store::NotificationStore;
use crate::template;

/// Tuning knobs for the Dispatch Worker.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub batch_size: usize,
    pub max_retries: i32,
    /// Global quiet window; only high-priority traffic is sent inside it.
    pub quiet_hours: Option<QuietWindow>,
    pub first_failure_backoff: BackoffPolicy,
}

impl DispatchConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self, AppError> {
        let quiet_hours = match (&config.quiet_hours_start, &config.quiet_hours_end) {
            (Some(start), Some(end)) => Some(QuietWindow::parse(start, end)?),
            (None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "QUIET_HOURS_START and QUIET_HOURS_END must be set together".to_string(),
                ));
            }
        };

        Ok(Self {
            batch_size: config.batch_size as usize,
            max_retries: config.max_retries as i32,
            quiet_hours,
            first_failure_backoff: BackoffPolicy::first_failure(config),
        })
    }
}

enum ItemOutcome {
    Sent,
    Skipped,
    FailedAttempt,
    /// A concurrent worker moved the row first; nothing was changed here.
    Raced,
}

/// Polls for due notifications and delivers them.
pub struct DispatchWorker {
    pool: PgPool,
    gateway: Arc<dyn SmsGateway>,
    config: DispatchConfig,
}

impl DispatchWorker {
    pub fn new(pool: PgPool, gateway: Arc<dyn SmsGateway>, config: DispatchConfig) -> Self {
        Self {
            pool,
            gateway,
            config,
        }
    }

    /// Whether the global quiet window contains the current wall-clock time.
    pub fn is_quiet_hours(&self, t: chrono::NaiveTime) -> bool {
        self.config
            .quiet_hours
            .map(|w| w.contains(t))
            .unwrap_or(false)
    }

    /// Run one dispatch pass.
    pub async fn run_once(&self) -> Result<BatchStats, AppError> {
        let now = Utc::now();
        let in_quiet = self.is_quiet_hours(now.time());

        let candidates = NotificationStore::fetch_due(
            &self.pool,
            now,
            (self.config.batch_size * 2) as i64,
            self.config.max_retries,
            in_quiet,
        )
        .await?;

        let mut stats = BatchStats::default();

        for batch in candidates.chunks(self.config.batch_size.max(1)) {
            for notification in batch {
                stats.processed += 1;
                match self.process_one(notification, in_quiet).await {
                    Ok(ItemOutcome::Sent) => stats.sent += 1,
                    Ok(ItemOutcome::Skipped) => stats.skipped += 1,
                    Ok(ItemOutcome::FailedAttempt) => stats.failed += 1,
                    Ok(ItemOutcome::Raced) => {
                        tracing::debug!(
                            notification_id = %notification.id,
                            "Notification claimed by a concurrent worker, skipping"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            notification_id = %notification.id,
                            error = %e,
                            "Dispatch of notification errored"
                        );
                        stats.errors.push(format!("{}: {}", notification.id, e));
                    }
                }
            }
        }

        tracing::info!(
            processed = stats.processed,
            sent = stats.sent,
            failed = stats.failed,
            skipped = stats.skipped,
            errors = stats.errors.len(),
            in_quiet,
            "Dispatch run complete"
        );
        AuditLog::worker(
            &self.pool,
            "dispatch",
            "run_summary",
            serde_json::to_value(&stats).unwrap_or_default(),
        )
        .await;

        Ok(stats)
    }

    async fn process_one(
        &self,
        notification: &Notification,
        in_quiet: bool,
    ) -> Result<ItemOutcome, AppError> {
        let now = Utc::now();

        // Low-priority traffic never leaves during the global quiet window.
        // The fetch already filters, but the window can open between fetch
        // and send.
        if in_quiet && notification.priority == Priority::Low {
            return self.skip(notification, "suppressed by quiet hours").await;
        }

        if let Some(pref) =
            NotificationStore::find_preference(&self.pool, &notification.destination).await?
        {
            if !pref.sms_enabled {
                return self.skip(notification, "sms disabled by preference").await;
            }
            if let Some(window) = QuietWindow::from_preference(&pref)
                && window.contains(now.time())
            {
                return self.skip(notification, "personal quiet hours").await;
            }
        }

        // Re-read for the freshest variable bag; the row may also have been
        // resolved by another worker since the fetch.
        let fresh = match NotificationStore::get(&self.pool, notification.id).await? {
            Some(n) if n.status == NotificationStatus::Pending => n,
            _ => return Ok(ItemOutcome::Raced),
        };

        let body = template::render(&fresh.template, &fresh.variables);
        let meta = SendMetadata {
            is_retry: false,
            attempt_number: fresh.retry_count,
            original_error: None,
            retry_id: None,
        };

        match self.gateway.send(&fresh.destination, &body, &meta).await {
            SendOutcome::Delivered { message_id } => {
                if !NotificationStore::mark_sent(&self.pool, fresh.id, &message_id, now).await? {
                    tracing::warn!(
                        notification_id = %fresh.id,
                        "Delivered but row no longer pending, lost mark-sent race"
                    );
                    return Ok(ItemOutcome::Raced);
                }

                tracing::info!(
                    notification_id = %fresh.id,
                    destination = %fresh.destination,
                    message_id = %message_id,
                    "Notification sent"
                );
                AuditLog::notification(
                    &self.pool,
                    fresh.id,
                    "sent",
                    serde_json::json!({ "message_id": message_id }),
                )
                .await;
                Ok(ItemOutcome::Sent)
            }
            SendOutcome::Rejected { error } => {
                let outcome = handle_send_failure(
                    &self.pool,
                    &fresh,
                    &error,
                    self.config.max_retries,
                    self.config.first_failure_backoff,
                    now,
                )
                .await?;
                match outcome {
                    FailureOutcome::Raced => Ok(ItemOutcome::Raced),
                    _ => Ok(ItemOutcome::FailedAttempt),
                }
            }
        }
    }

    async fn skip(
        &self,
        notification: &Notification,
        reason: &str,
    ) -> Result<ItemOutcome, AppError> {
        if !NotificationStore::mark_skipped(&self.pool, notification.id, reason).await? {
            return Ok(ItemOutcome::Raced);
        }

        tracing::debug!(
            notification_id = %notification.id,
            reason,
            "Notification skipped"
        );
        AuditLog::notification(
            &self.pool,
            notification.id,
            "skipped",
            serde_json::json!({ "reason": reason }),
        )
        .await;
        Ok(ItemOutcome::Skipped)
    }
}
