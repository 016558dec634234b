//! Retry worker — drives scheduled re-attempts to a terminal outcome.
//!
//! Each run starts with a cleanup pass that abandons pending rows whose
//! parent notification has aged past the retry cutoff, then claims due rows,
//! re-validates eligibility, re-renders from the parent's current variable
//! bag, and re-sends. Failures flow through the shared failure handler with
//! the retry backoff policy, so the row chain either ends in `successful`,
//! spawns exactly one successor, or exhausts the parent.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_common::error::AppError;
use courier_common::types::{NotificationStatus, RetrySchedule, RetryStats};

use crate::audit::AuditLog;
use crate::backoff::BackoffPolicy;
use crate::failure::{FailureOutcome, handle_send_failure};
use crate::gateway::{SendMetadata, SendOutcome, SmsGateway};
use crate::store::{NotificationStore, RetryStore};
use crate::template;

/// Tuning knobs for the Retry Worker.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub batch_size: usize,
    pub max_retries: i32,
    /// Pending rows with a parent older than this are abandoned as "too old".
    pub max_retry_age: chrono::Duration,
    pub backoff: BackoffPolicy,
}

impl RetryConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            batch_size: config.batch_size as usize,
            max_retries: config.max_retries as i32,
            max_retry_age: chrono::Duration::hours(config.max_retry_age_hours as i64),
            backoff: BackoffPolicy::retry(config),
        }
    }
}

enum ItemOutcome {
    Successful,
    FailedAttempt,
    Abandoned,
    /// Another worker instance claimed the row first.
    Raced,
}

/// Polls the retry schedule and re-sends eligible attempts.
pub struct RetryWorker {
    pool: PgPool,
    gateway: Arc<dyn SmsGateway>,
    config: RetryConfig,
}

impl RetryWorker {
    pub fn new(pool: PgPool, gateway: Arc<dyn SmsGateway>, config: RetryConfig) -> Self {
        Self {
            pool,
            gateway,
            config,
        }
    }

    /// Run one retry pass: cleanup, then due rows.
    pub async fn run_once(&self) -> Result<RetryStats, AppError> {
        let now = Utc::now();
        let mut stats = RetryStats::default();

        // Cleanup pass runs once per invocation, before any row is claimed.
        let cutoff = now - self.config.max_retry_age;
        let stale = RetryStore::abandon_stale(&self.pool, cutoff, now).await?;
        if stale > 0 {
            stats.abandoned += stale as u32;
            tracing::info!(count = stale, "Abandoned stale retry schedules");
            AuditLog::worker(
                &self.pool,
                "retry",
                "stale_cleanup",
                serde_json::json!({ "abandoned": stale, "cutoff": cutoff }),
            )
            .await;
        }

        let due =
            RetryStore::fetch_due(&self.pool, now, (self.config.batch_size * 2) as i64).await?;

        for batch in due.chunks(self.config.batch_size.max(1)) {
            for row in batch {
                match self.process_one(row).await {
                    Ok(ItemOutcome::Raced) => {
                        tracing::debug!(retry_id = %row.id, "Retry row claimed elsewhere, skipping");
                    }
                    Ok(ItemOutcome::Successful) => {
                        stats.processed += 1;
                        stats.successful += 1;
                    }
                    Ok(ItemOutcome::FailedAttempt) => {
                        stats.processed += 1;
                        stats.failed += 1;
                    }
                    Ok(ItemOutcome::Abandoned) => {
                        stats.processed += 1;
                        stats.abandoned += 1;
                    }
                    Err(e) => {
                        stats.processed += 1;
                        tracing::error!(
                            retry_id = %row.id,
                            notification_id = %row.notification_id,
                            error = %e,
                            "Retry attempt errored"
                        );
                        stats.errors.push(format!("{}: {}", row.id, e));
                    }
                }
            }
        }

        tracing::info!(
            processed = stats.processed,
            successful = stats.successful,
            failed = stats.failed,
            abandoned = stats.abandoned,
            errors = stats.errors.len(),
            "Retry run complete"
        );
        AuditLog::worker(
            &self.pool,
            "retry",
            "run_summary",
            serde_json::to_value(&stats).unwrap_or_default(),
        )
        .await;

        Ok(stats)
    }

    async fn process_one(&self, row: &RetrySchedule) -> Result<ItemOutcome, AppError> {
        let now = Utc::now();

        if !RetryStore::mark_processing(&self.pool, row.id).await? {
            return Ok(ItemOutcome::Raced);
        }

        // Eligibility may have changed since the attempt was scheduled.
        let parent = match NotificationStore::get(&self.pool, row.notification_id).await? {
            Some(n) => n,
            None => return self.abandon(row, "parent notification missing").await,
        };
        if parent.status != NotificationStatus::Pending {
            return self.abandon(row, "parent notification no longer pending").await;
        }
        if parent.retry_count >= self.config.max_retries {
            return self.abandon(row, "retry limit reached").await;
        }
        if let Some(pref) =
            NotificationStore::find_preference(&self.pool, &parent.destination).await?
            && !pref.sms_enabled
        {
            return self.abandon(row, "sms disabled by preference").await;
        }

        // Render from the parent's current variables, not the bag that
        // existed when the retry was scheduled.
        let body = template::render(&parent.template, &parent.variables);
        let meta = SendMetadata {
            is_retry: true,
            attempt_number: row.attempt_number,
            original_error: Some(row.reason.clone()),
            retry_id: Some(row.id),
        };

        match self.gateway.send(&parent.destination, &body, &meta).await {
            SendOutcome::Delivered { message_id } => {
                RetryStore::mark_successful(&self.pool, row.id, &message_id, now).await?;
                if !NotificationStore::mark_sent(&self.pool, parent.id, &message_id, now).await? {
                    tracing::warn!(
                        notification_id = %parent.id,
                        retry_id = %row.id,
                        "Retry delivered but parent no longer pending"
                    );
                }

                tracing::info!(
                    notification_id = %parent.id,
                    retry_id = %row.id,
                    attempt = row.attempt_number,
                    message_id = %message_id,
                    "Retry succeeded"
                );
                AuditLog::retry(
                    &self.pool,
                    row.id,
                    "successful",
                    serde_json::json!({
                        "notification_id": parent.id,
                        "attempt": row.attempt_number,
                        "message_id": message_id,
                    }),
                )
                .await;
                Ok(ItemOutcome::Successful)
            }
            SendOutcome::Rejected { error } => {
                RetryStore::mark_failed(&self.pool, row.id, &error, now).await?;
                AuditLog::retry(
                    &self.pool,
                    row.id,
                    "failed",
                    serde_json::json!({
                        "notification_id": parent.id,
                        "attempt": row.attempt_number,
                        "error": error.as_str(),
                    }),
                )
                .await;

                // The attempt itself failed regardless of how the parent's
                // bookkeeping races resolve.
                let outcome = handle_send_failure(
                    &self.pool,
                    &parent,
                    &error,
                    self.config.max_retries,
                    self.config.backoff,
                    now,
                )
                .await?;
                if outcome == FailureOutcome::Raced {
                    tracing::debug!(
                        notification_id = %parent.id,
                        "Parent moved concurrently while recording retry failure"
                    );
                }
                Ok(ItemOutcome::FailedAttempt)
            }
        }
    }

    async fn abandon(&self, row: &RetrySchedule, reason: &str) -> Result<ItemOutcome, AppError> {
        RetryStore::mark_abandoned(&self.pool, row.id, reason, Utc::now()).await?;

        tracing::info!(
            retry_id = %row.id,
            notification_id = %row.notification_id,
            reason,
            "Retry abandoned"
        );
        AuditLog::retry(
            &self.pool,
            row.id,
            "abandoned",
            serde_json::json!({ "reason": reason }),
        )
        .await;
        Ok(ItemOutcome::Abandoned)
    }
}
