//! Store access for notifications and retry schedules.
//!
//! Every worker-side status transition is a conditional update guarded on the
//! row's current status, checked through `rows_affected`. A worker losing a
//! race (another process already moved the row) performs a no-op and the
//! caller skips the bookkeeping that depends on it.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{CommunicationPreference, Notification, RetrySchedule, RetryType};

/// Query layer for notification rows.
pub struct NotificationStore;

impl NotificationStore {
    /// Fetch due dispatch candidates: pending, due, with attempts remaining,
    /// highest priority first then oldest due time. `high_only` restricts the
    /// query to high priority during the global quiet-hours window.
    pub async fn fetch_due(
        pool: &PgPool,
        now: DateTime<Utc>,
        limit: i64,
        max_retries: i32,
        high_only: bool,
    ) -> Result<Vec<Notification>, AppError> {
        let rows: Vec<Notification> = sqlx::query_as(
            r#"
            SELECT *
            FROM notifications
            WHERE status = 'pending'
              AND scheduled_at <= $1
              AND retry_count < $2
              AND ($3 = false OR priority = 'high')
            ORDER BY
              CASE priority WHEN 'high' THEN 0 WHEN 'normal' THEN 1 ELSE 2 END,
              scheduled_at ASC
            LIMIT $4
            "#,
        )
        .bind(now)
        .bind(max_retries)
        .bind(high_only)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Load a single notification. Used to re-read the variable bag at send
    /// time — variables may have changed since the row was fetched.
    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Notification>, AppError> {
        let row: Option<Notification> = sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }

    /// Transition a pending notification to sent. Returns false if the row
    /// was no longer pending.
    pub async fn mark_sent(
        pool: &PgPool,
        id: Uuid,
        external_message_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'sent', external_message_id = $2, sent_at = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(external_message_id)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a pending notification to skipped, recording why.
    pub async fn mark_skipped(pool: &PgPool, id: Uuid, reason: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'skipped', last_error = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Bump the attempt counter and push the row's due time out for the next
    /// retry. The row stays pending so the Retry Worker's join picks it up.
    pub async fn schedule_retry(
        pool: &PgPool,
        id: Uuid,
        next_attempt: i32,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET retry_count = $2, scheduled_at = $3, last_error = $4, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(next_attempt)
        .bind(scheduled_at)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Terminal failure: attempts exhausted.
    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        final_retry_count: i32,
        error: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'failed', retry_count = $2, last_error = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(final_retry_count)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Reset a permanently failed notification to pending (manual retry path).
    pub async fn reset_to_pending(pool: &PgPool, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'pending', updated_at = NOW()
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Look up the destination's delivery preference, if any.
    pub async fn find_preference(
        pool: &PgPool,
        destination: &str,
    ) -> Result<Option<CommunicationPreference>, AppError> {
        let row: Option<CommunicationPreference> =
            sqlx::query_as("SELECT * FROM communication_preferences WHERE destination = $1")
                .bind(destination)
                .fetch_optional(pool)
                .await?;

        Ok(row)
    }
}

/// Query layer for retry-schedule rows.
pub struct RetryStore;

impl RetryStore {
    /// Insert a new scheduled attempt.
    pub async fn insert(
        pool: &PgPool,
        notification_id: Uuid,
        attempt_number: i32,
        scheduled_at: DateTime<Utc>,
        reason: &str,
        retry_type: RetryType,
    ) -> Result<RetrySchedule, AppError> {
        let row: RetrySchedule = sqlx::query_as(
            r#"
            INSERT INTO retry_schedules
                (id, notification_id, attempt_number, scheduled_at, reason, retry_type, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification_id)
        .bind(attempt_number)
        .bind(scheduled_at)
        .bind(reason)
        .bind(retry_type.to_string())
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// Fetch due retry rows whose parent notification is still pending,
    /// oldest first.
    pub async fn fetch_due(
        pool: &PgPool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RetrySchedule>, AppError> {
        let rows: Vec<RetrySchedule> = sqlx::query_as(
            r#"
            SELECT rs.*
            FROM retry_schedules rs
            JOIN notifications n ON n.id = rs.notification_id
            WHERE rs.status = 'pending'
              AND rs.scheduled_at <= $1
              AND n.status = 'pending'
            ORDER BY rs.scheduled_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Claim a pending row for processing. Returns false if another worker
    /// instance claimed it first.
    pub async fn mark_processing(pool: &PgPool, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE retry_schedules SET status = 'processing' WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_successful(
        pool: &PgPool,
        id: Uuid,
        external_message_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE retry_schedules
            SET status = 'successful', external_message_id = $2, completed_at = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(external_message_id)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        failure_reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE retry_schedules
            SET status = 'failed', failure_reason = $2, completed_at = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(failure_reason)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Abandon a row that lost eligibility. Valid from either non-terminal
    /// state — the cleanup pass abandons rows that were never picked up.
    pub async fn mark_abandoned(
        pool: &PgPool,
        id: Uuid,
        failure_reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE retry_schedules
            SET status = 'abandoned', failure_reason = $2, completed_at = $3
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .bind(failure_reason)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Abandon every pending row whose parent notification was created before
    /// `cutoff`, regardless of the parent's current status. Returns the number
    /// of rows abandoned.
    pub async fn abandon_stale(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE retry_schedules rs
            SET status = 'abandoned', failure_reason = 'too old', completed_at = $2
            FROM notifications n
            WHERE rs.notification_id = n.id
              AND rs.status = 'pending'
              AND n.created_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Count a notification's active (pending or processing) retry rows.
    /// The pipeline maintains at most one.
    pub async fn count_active(pool: &PgPool, notification_id: Uuid) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM retry_schedules
            WHERE notification_id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(notification_id)
        .fetch_one(pool)
        .await?;

        Ok(row.0)
    }

    /// Load a row's current state, mostly for tests and operator inspection.
    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<RetrySchedule>, AppError> {
        let row: Option<RetrySchedule> =
            sqlx::query_as("SELECT * FROM retry_schedules WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;

        Ok(row)
    }

    /// All rows for a notification, newest attempt first.
    pub async fn list_for_notification(
        pool: &PgPool,
        notification_id: Uuid,
    ) -> Result<Vec<RetrySchedule>, AppError> {
        let rows: Vec<RetrySchedule> = sqlx::query_as(
            r#"
            SELECT * FROM retry_schedules
            WHERE notification_id = $1
            ORDER BY attempt_number DESC
            "#,
        )
        .bind(notification_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}

// Status strings in the SQL above must stay in lockstep with the enum
// Display impls in courier-common.
#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::types::RetryStatus;

    #[test]
    fn test_status_strings_match_display() {
        assert_eq!(RetryStatus::Pending.to_string(), "pending");
        assert_eq!(RetryStatus::Processing.to_string(), "processing");
        assert_eq!(RetryStatus::Successful.to_string(), "successful");
        assert_eq!(RetryStatus::Abandoned.to_string(), "abandoned");
        assert_eq!(RetryType::Automatic.to_string(), "automatic");
    }
}
