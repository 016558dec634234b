//! Append-only audit log.
//!
//! One row per significant lifecycle transition plus one summary row per
//! worker run. The pipeline only writes here; nothing in core reads it back.
//! Audit failures are logged and swallowed — observability must never abort
//! a batch.

use sqlx::PgPool;
use uuid::Uuid;

/// Append-only writer for the `audit_log` table.
pub struct AuditLog;

impl AuditLog {
    /// Record a notification lifecycle transition.
    pub async fn notification(pool: &PgPool, id: Uuid, action: &str, detail: serde_json::Value) {
        Self::append(pool, "notification", &id.to_string(), action, detail).await;
    }

    /// Record a retry-schedule lifecycle transition.
    pub async fn retry(pool: &PgPool, id: Uuid, action: &str, detail: serde_json::Value) {
        Self::append(pool, "retry_schedule", &id.to_string(), action, detail).await;
    }

    /// Record a per-run summary or a job-level failure for a worker.
    pub async fn worker(pool: &PgPool, worker: &str, action: &str, detail: serde_json::Value) {
        Self::append(pool, "worker", worker, action, detail).await;
    }

    async fn append(
        pool: &PgPool,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        detail: serde_json::Value,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_log (entity_type, entity_id, action, detail)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(action)
        .bind(&detail)
        .execute(pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                entity_type,
                entity_id,
                action,
                error = %e,
                "Audit log write failed"
            );
        }
    }
}
