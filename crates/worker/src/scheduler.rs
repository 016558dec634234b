//! Scheduler shell — drives both workers on independent fixed cadences.
//!
//! Each worker gets its own interval loop and its own single-flight guard: a
//! tick that arrives while a run is still active is dropped, never queued.
//! A run returning an error is logged and audited, and the loop keeps
//! ticking — a worker crash must never stop the schedule. Around every run
//! the shell upserts a heartbeat row that the operator API serves as worker
//! status.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_common::error::AppError;
use courier_common::types::{WorkerSnapshot, WorkerStatus};

use crate::audit::AuditLog;
use crate::dispatch::DispatchWorker;
use crate::quiet::QuietWindow;
use crate::retry::RetryWorker;

/// Explicit run-state for one worker, claimed atomically before every
/// invocation. Holding the returned token is what "running" means; dropping
/// it releases the slot.
pub struct RunState {
    running: AtomicBool,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    /// Claim the slot. Returns `None` while a prior run still holds it.
    pub fn try_begin(&self) -> Option<RunToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunToken { state: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a claimed run slot.
pub struct RunToken<'a> {
    state: &'a RunState,
}

impl Drop for RunToken<'_> {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Release);
    }
}

/// Invokes the dispatch and retry workers on their configured cadences.
pub struct Scheduler {
    pool: PgPool,
    dispatch: DispatchWorker,
    retry: RetryWorker,
    dispatch_state: RunState,
    retry_state: RunState,
    config: AppConfig,
}

impl Scheduler {
    pub fn new(
        pool: PgPool,
        dispatch: DispatchWorker,
        retry: RetryWorker,
        config: AppConfig,
    ) -> Self {
        Self {
            pool,
            dispatch,
            retry,
            dispatch_state: RunState::new(),
            retry_state: RunState::new(),
            config,
        }
    }

    /// Run both worker loops until the future is dropped (shutdown is a
    /// `select!` against ctrl_c in `main`, which cancels future ticks;
    /// in-flight batches are abandoned with the process).
    pub async fn run(&self) {
        tracing::info!(
            dispatch_enabled = self.config.dispatch_enabled,
            retry_enabled = self.config.retry_enabled,
            dispatch_interval_secs = self.config.dispatch_interval_secs,
            retry_interval_secs = self.config.retry_interval_secs,
            "Scheduler started"
        );

        tokio::join!(self.dispatch_loop(), self.retry_loop());
    }

    async fn dispatch_loop(&self) {
        if !self.config.dispatch_enabled {
            tracing::info!("Dispatch worker disabled, loop idle");
            return;
        }

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.dispatch_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let Some(_token) = self.dispatch_state.try_begin() else {
                tracing::warn!("Dispatch run still active, skipping tick");
                continue;
            };

            self.heartbeat("dispatch", true, None).await;
            match self.dispatch.run_once().await {
                Ok(stats) => {
                    let stats = serde_json::to_value(&stats).unwrap_or_default();
                    self.heartbeat("dispatch", false, Some(stats)).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Dispatch run failed");
                    AuditLog::worker(
                        &self.pool,
                        "dispatch",
                        "run_error",
                        serde_json::json!({ "error": e.to_string() }),
                    )
                    .await;
                    self.heartbeat("dispatch", false, None).await;
                }
            }
        }
    }

    async fn retry_loop(&self) {
        if !self.config.retry_enabled {
            tracing::info!("Retry worker disabled, loop idle");
            return;
        }

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.retry_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let Some(_token) = self.retry_state.try_begin() else {
                tracing::warn!("Retry run still active, skipping tick");
                continue;
            };

            self.heartbeat("retry", true, None).await;
            match self.retry.run_once().await {
                Ok(stats) => {
                    let stats = serde_json::to_value(&stats).unwrap_or_default();
                    self.heartbeat("retry", false, Some(stats)).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Retry run failed");
                    AuditLog::worker(
                        &self.pool,
                        "retry",
                        "run_error",
                        serde_json::json!({ "error": e.to_string() }),
                    )
                    .await;
                    self.heartbeat("retry", false, None).await;
                }
            }
        }
    }

    /// Upsert the worker's heartbeat row. Best-effort: a failed heartbeat is
    /// logged and the schedule continues.
    async fn heartbeat(&self, worker: &str, is_running: bool, stats: Option<serde_json::Value>) {
        let result = sqlx::query(
            r#"
            INSERT INTO worker_state (worker, is_running, last_run_at, last_stats, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (worker) DO UPDATE SET
                is_running = $2,
                last_run_at = COALESCE($3, worker_state.last_run_at),
                last_stats = COALESCE($4, worker_state.last_stats),
                updated_at = NOW()
            "#,
        )
        .bind(worker)
        .bind(is_running)
        .bind(if is_running { Some(Utc::now()) } else { None })
        .bind(stats)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(worker, error = %e, "Worker heartbeat upsert failed");
        }
    }
}

/// Read-side of the heartbeat table, serving `getStatus` for dashboards.
pub struct WorkerStatusService;

impl WorkerStatusService {
    pub async fn get_status(
        pool: &PgPool,
        config: &AppConfig,
    ) -> Result<Vec<WorkerStatus>, AppError> {
        let snapshots: Vec<WorkerSnapshot> =
            sqlx::query_as("SELECT * FROM worker_state ORDER BY worker")
                .fetch_all(pool)
                .await?;

        let quiet = match (&config.quiet_hours_start, &config.quiet_hours_end) {
            (Some(start), Some(end)) => QuietWindow::parse(start, end).ok(),
            _ => None,
        };
        let is_quiet_hours = quiet
            .map(|w| w.contains(Utc::now().time()))
            .unwrap_or(false);

        let mut statuses = Vec::new();
        for worker in ["dispatch", "retry"] {
            let snapshot = snapshots.iter().find(|s| s.worker == worker);
            let (enabled, interval_secs) = match worker {
                "dispatch" => (config.dispatch_enabled, config.dispatch_interval_secs),
                _ => (config.retry_enabled, config.retry_interval_secs),
            };

            statuses.push(WorkerStatus {
                worker: worker.to_string(),
                enabled,
                is_running: snapshot.map(|s| s.is_running).unwrap_or(false),
                interval_secs,
                last_run_at: snapshot.and_then(|s| s.last_run_at),
                last_stats: snapshot.and_then(|s| s.last_stats.clone()),
                is_quiet_hours,
            });
        }

        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight_claim() {
        let state = RunState::new();

        let token = state.try_begin();
        assert!(token.is_some());
        assert!(state.is_running());

        // Second claim while the first is live is refused.
        assert!(state.try_begin().is_none());

        drop(token);
        assert!(!state.is_running());
        assert!(state.try_begin().is_some());
    }

    #[test]
    fn test_token_releases_on_drop_mid_scope() {
        let state = RunState::new();
        {
            let _token = state.try_begin().expect("first claim");
            assert!(state.try_begin().is_none());
        }
        assert!(state.try_begin().is_some());
    }
}
