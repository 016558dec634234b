//! Shared failure handler.
//!
//! Both workers funnel failed send attempts through here. Given a
//! notification currently at `retry_count = n`:
//!
//! - `n + 1 < max_retries`: the notification stays pending with
//!   `retry_count = n + 1` and a due time pushed out by the policy's backoff,
//!   and exactly one new automatic retry-schedule row is inserted. The insert
//!   happens only after the prior attempt reached a terminal state, which is
//!   what keeps at most one active retry row per notification.
//! - otherwise: the notification fails permanently and no row is created.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Notification, RetryType};

use crate::audit::AuditLog;
use crate::backoff::BackoffPolicy;
use crate::store::{NotificationStore, RetryStore};

/// What the handler did with the failed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Another attempt was scheduled.
    Rescheduled {
        attempt_number: i32,
        scheduled_at: DateTime<Utc>,
        retry_id: Uuid,
    },
    /// Attempts exhausted; the notification is permanently failed.
    Exhausted,
    /// The notification was no longer pending — a concurrent worker already
    /// moved it, so nothing was changed here.
    Raced,
}

/// Apply the retry-or-fail transition for one failed send attempt.
pub async fn handle_send_failure(
    pool: &PgPool,
    notification: &Notification,
    error: &str,
    max_retries: i32,
    policy: BackoffPolicy,
    now: DateTime<Utc>,
) -> Result<FailureOutcome, AppError> {
    let next_attempt = notification.retry_count + 1;

    if next_attempt < max_retries {
        let delay = policy.delay_for(next_attempt as u32);
        let scheduled_at = now + delay;

        let updated = NotificationStore::schedule_retry(
            pool,
            notification.id,
            next_attempt,
            scheduled_at,
            error,
        )
        .await?;
        if !updated {
            return Ok(FailureOutcome::Raced);
        }

        let row = RetryStore::insert(
            pool,
            notification.id,
            next_attempt,
            scheduled_at,
            error,
            RetryType::Automatic,
        )
        .await?;

        tracing::info!(
            notification_id = %notification.id,
            attempt = next_attempt,
            scheduled_at = %scheduled_at,
            error,
            "Send failed, retry scheduled"
        );
        AuditLog::notification(
            pool,
            notification.id,
            "retry_scheduled",
            serde_json::json!({
                "attempt": next_attempt,
                "scheduled_at": scheduled_at,
                "error": error,
            }),
        )
        .await;

        Ok(FailureOutcome::Rescheduled {
            attempt_number: next_attempt,
            scheduled_at,
            retry_id: row.id,
        })
    } else {
        let updated =
            NotificationStore::mark_failed(pool, notification.id, next_attempt, error).await?;
        if !updated {
            return Ok(FailureOutcome::Raced);
        }

        tracing::warn!(
            notification_id = %notification.id,
            retry_count = next_attempt,
            error,
            "Retries exhausted, notification permanently failed"
        );
        AuditLog::notification(
            pool,
            notification.id,
            "failed_permanently",
            serde_json::json!({ "retry_count": next_attempt, "error": error }),
        )
        .await;

        Ok(FailureOutcome::Exhausted)
    }
}
