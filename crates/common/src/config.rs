use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Outbound SMS gateway endpoint (required by the worker binary)
    pub sms_gateway_url: Option<String>,

    /// Bearer token for the gateway, if the provider requires one
    pub sms_gateway_token: Option<String>,

    /// Request timeout for a single gateway send, in seconds (default: 10)
    pub sms_send_timeout_secs: u64,

    /// Whether the Dispatch Worker runs at all (default: true)
    pub dispatch_enabled: bool,

    /// Whether the Retry Worker runs at all (default: true)
    pub retry_enabled: bool,

    /// Dispatch Worker cadence in seconds (default: 30)
    pub dispatch_interval_secs: u64,

    /// Retry Worker cadence in seconds (default: 120)
    pub retry_interval_secs: u64,

    /// Notifications processed per batch (default: 50)
    pub batch_size: u32,

    /// Maximum delivery attempts per notification (default: 3)
    pub max_retries: u32,

    /// Global quiet-hours window start, "HH:MM" (optional; requires end)
    pub quiet_hours_start: Option<String>,

    /// Global quiet-hours window end, "HH:MM" (optional; requires start)
    pub quiet_hours_end: Option<String>,

    /// Pending retries with a parent older than this are abandoned (default: 24)
    pub max_retry_age_hours: u64,

    /// Backoff base for the very first failure, in seconds (default: 60)
    pub first_retry_base_secs: u64,

    /// Backoff base for retry-originated failures, in seconds (default: 300)
    pub retry_base_secs: u64,

    /// Backoff cap for retry-originated failures, in seconds (default: 3600)
    pub retry_max_delay_secs: u64,

    /// Operator API listen port (default: 3000)
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
            sms_gateway_url: std::env::var("SMS_GATEWAY_URL").ok(),
            sms_gateway_token: std::env::var("SMS_GATEWAY_TOKEN").ok(),
            sms_send_timeout_secs: parse_var("SMS_SEND_TIMEOUT_SECS", 10)?,
            dispatch_enabled: parse_var("DISPATCH_ENABLED", true)?,
            retry_enabled: parse_var("RETRY_ENABLED", true)?,
            dispatch_interval_secs: parse_var("DISPATCH_INTERVAL_SECS", 30)?,
            retry_interval_secs: parse_var("RETRY_INTERVAL_SECS", 120)?,
            batch_size: parse_var("BATCH_SIZE", 50)?,
            max_retries: parse_var("MAX_RETRIES", 3)?,
            quiet_hours_start: std::env::var("QUIET_HOURS_START").ok(),
            quiet_hours_end: std::env::var("QUIET_HOURS_END").ok(),
            max_retry_age_hours: parse_var("MAX_RETRY_AGE_HOURS", 24)?,
            first_retry_base_secs: parse_var("FIRST_RETRY_BASE_SECS", 60)?,
            retry_base_secs: parse_var("RETRY_BASE_SECS", 300)?,
            retry_max_delay_secs: parse_var("RETRY_MAX_DELAY_SECS", 3600)?,
            api_port: parse_var("API_PORT", 3000)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid {}", name, std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}
