//! Manual retry trigger — operator-initiated re-attempts.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{NotificationStatus, RetrySchedule, RetryType};

use crate::audit::AuditLog;
use crate::store::{NotificationStore, RetryStore};

/// Service for operator-triggered retries.
pub struct ManualRetryService;

impl ManualRetryService {
    /// Schedule an immediate manual retry for a notification.
    ///
    /// The notification must exist, be `pending` or `failed`, and have
    /// attempts remaining; a `failed` notification is reset to `pending` so
    /// the Retry Worker's join condition picks the new row up. Rejected with
    /// a validation error when the retry budget is spent or an attempt is
    /// already active — the pipeline keeps at most one live retry row per
    /// notification.
    pub async fn trigger(
        pool: &PgPool,
        notification_id: Uuid,
        reason: &str,
        max_retries: i32,
    ) -> Result<RetrySchedule, AppError> {
        let notification = NotificationStore::get(pool, notification_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Notification {} not found", notification_id))
            })?;

        match notification.status {
            NotificationStatus::Pending | NotificationStatus::Failed => {}
            other => {
                return Err(AppError::Validation(format!(
                    "Notification {} is {} and cannot be retried",
                    notification_id, other
                )));
            }
        }

        if notification.retry_count >= max_retries {
            return Err(AppError::Validation(format!(
                "Notification {} has exhausted its {} retries",
                notification_id, max_retries
            )));
        }

        if RetryStore::count_active(pool, notification_id).await? > 0 {
            return Err(AppError::Validation(format!(
                "Notification {} already has an active retry scheduled",
                notification_id
            )));
        }

        if notification.status == NotificationStatus::Failed
            && !NotificationStore::reset_to_pending(pool, notification_id).await?
        {
            return Err(AppError::Internal(format!(
                "Notification {} changed state during manual retry",
                notification_id
            )));
        }

        let row = RetryStore::insert(
            pool,
            notification_id,
            notification.retry_count + 1,
            Utc::now(),
            reason,
            RetryType::Manual,
        )
        .await?;

        tracing::info!(
            notification_id = %notification_id,
            retry_id = %row.id,
            attempt = row.attempt_number,
            reason,
            "Manual retry scheduled"
        );
        AuditLog::retry(
            pool,
            row.id,
            "manual_trigger",
            serde_json::json!({
                "notification_id": notification_id,
                "attempt": row.attempt_number,
                "reason": reason,
            }),
        )
        .await;

        Ok(row)
    }
}
