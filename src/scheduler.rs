//! Weekly refresh of the season's current week.
//!
//! Runs once on start, then every Wednesday at 14:00 local time. Each run is
//! bounded by `RUN_TIMEOUT`; failures are logged and counted in
//! `HealthState` and wait for the next tick.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc, Weekday};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{PoolError, Result};
use crate::service::PoolService;

const RUN_TIMEOUT: Duration = Duration::from_secs(120);

/// Used when the next tick cannot be computed (e.g. 14:00 falls in a DST gap).
const FALLBACK_DELAY: Duration = Duration::from_secs(3600);

/// Scheduler health, shared with the health endpoint.
#[derive(Clone, Default)]
pub struct HealthState {
    pub last_run_time: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_week: Arc<RwLock<Option<i32>>>,
    pub error_count: Arc<RwLock<usize>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_success(&self, week: i32) {
        *self.last_run_time.write().await = Some(Utc::now());
        *self.last_week.write().await = Some(week);
        *self.error_count.write().await = 0;
    }

    pub async fn record_error(&self) {
        *self.error_count.write().await += 1;
    }
}

pub struct CurrentWeekJob {
    service: Arc<PoolService>,
    season_key: String,
    health: HealthState,
}

/// Running job. `stop` cancels it, including a refresh in flight.
pub struct JobHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Current week job ended abnormally: {}", e);
        }
    }
}

impl CurrentWeekJob {
    pub fn new(service: Arc<PoolService>, season_key: impl Into<String>, health: HealthState) -> Self {
        Self {
            service,
            season_key: season_key.into(),
            health,
        }
    }

    /// Spawn the loop. Returns `None` without spawning when there is no
    /// provider or season key to work with.
    pub fn start(self) -> Option<JobHandle> {
        if self.season_key.trim().is_empty() || !self.service.has_provider() {
            info!("Current week job disabled: sports data key or season key not configured");
            return None;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut delay = Duration::ZERO;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => {
                        info!("Current week job stopped");
                        break;
                    }
                }
                tokio::select! {
                    _ = self.run_once() => {}
                    _ = shutdown_rx.changed() => {
                        info!("Current week job stopped during a refresh");
                        break;
                    }
                }
                delay = next_delay(&Local::now());
                info!("Next current week refresh in {}s", delay.as_secs());
            }
        });

        Some(JobHandle { shutdown, task })
    }

    /// One bounded refresh.
    pub async fn run_once(&self) -> Result<i32> {
        let outcome = tokio::time::timeout(
            RUN_TIMEOUT,
            self.service.refresh_current_week(&self.season_key),
        )
        .await
        .unwrap_or_else(|_| {
            Err(PoolError::Upstream(format!(
                "current week refresh timed out after {}s",
                RUN_TIMEOUT.as_secs()
            )))
        });

        match outcome {
            Ok(week) => {
                self.health.record_success(week).await;
                info!("Current week updated to Week {}", week);
                Ok(week)
            }
            Err(e) => {
                self.health.record_error().await;
                error!("Current week refresh failed: {}", e);
                Err(e)
            }
        }
    }
}

fn next_delay<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    next_wednesday_at_two(now)
        .and_then(|next| (next - now.clone()).to_std().ok())
        .filter(|d| !d.is_zero())
        .unwrap_or(FALLBACK_DELAY)
}

/// The first Wednesday 14:00 strictly after `now`, in `now`'s time zone.
pub fn next_wednesday_at_two<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let today = now.weekday().num_days_from_monday() as i64;
    let wednesday = Weekday::Wed.num_days_from_monday() as i64;
    let days_ahead = (wednesday - today + 7) % 7;

    let date = now.date_naive() + chrono::Duration::days(days_ahead);
    let target = at_two(&now.timezone(), date)?;
    if target > *now {
        return Some(target);
    }
    at_two(&now.timezone(), date + chrono::Duration::days(7))
}

fn at_two<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_hms_opt(14, 0, 0)?).earliest()
}
