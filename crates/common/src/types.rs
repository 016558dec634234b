use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery lifecycle state of a notification.
///
/// `Sent` and `Failed` are terminal; `Skipped` is terminal unless an external
/// path re-queues the row. Workers only ever move rows out of `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Skipped,
    Failed,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Skipped => write!(f, "skipped"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Notification priority. During quiet hours only `High` traffic is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// Lifecycle state of a single scheduled re-attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RetryStatus {
    Pending,
    Processing,
    Successful,
    Failed,
    Abandoned,
}

impl std::fmt::Display for RetryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryStatus::Pending => write!(f, "pending"),
            RetryStatus::Processing => write!(f, "processing"),
            RetryStatus::Successful => write!(f, "successful"),
            RetryStatus::Failed => write!(f, "failed"),
            RetryStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// How a retry attempt was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RetryType {
    Automatic,
    Manual,
}

impl std::fmt::Display for RetryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryType::Automatic => write!(f, "automatic"),
            RetryType::Manual => write!(f, "manual"),
        }
    }
}

/// One outbound message and its delivery lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    /// Destination address (E.164 phone number; opaque to the pipeline).
    pub destination: String,
    /// Message body with `{{var}}` placeholders.
    pub template: String,
    /// Variable bag substituted at send time — always re-read, never cached.
    pub variables: serde_json::Value,
    pub priority: Priority,
    pub status: NotificationStatus,
    /// Earliest dispatch time.
    pub scheduled_at: DateTime<Utc>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    /// Gateway-assigned id, set on successful delivery.
    pub external_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One scheduled re-attempt of a previously failed notification.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RetrySchedule {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub attempt_number: i32,
    pub scheduled_at: DateTime<Utc>,
    /// Free text describing the failure that triggered this attempt.
    pub reason: String,
    pub retry_type: RetryType,
    pub status: RetryStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub external_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-destination delivery preferences. Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommunicationPreference {
    pub id: Uuid,
    pub destination: String,
    pub sms_enabled: bool,
    /// Personal quiet window, "HH:MM" pair; may wrap midnight.
    pub quiet_start: Option<String>,
    pub quiet_end: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate result of one Dispatch Worker run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub processed: u32,
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

/// Aggregate result of one Retry Worker run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryStats {
    pub processed: u32,
    pub successful: u32,
    pub failed: u32,
    pub abandoned: u32,
    pub errors: Vec<String>,
}

/// Persisted per-worker heartbeat, upserted by the scheduler around each run.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkerSnapshot {
    pub worker: String,
    pub is_running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_stats: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// Operational status of one worker, served to dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub worker: String,
    pub enabled: bool,
    pub is_running: bool,
    pub interval_secs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_stats: Option<serde_json::Value>,
    pub is_quiet_hours: bool,
}
