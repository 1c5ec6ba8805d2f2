use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::{is_valid_cron, SchedulerConfig};
use crate::coordinator::{RefreshCoordinator, RefreshOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub cron_expression: String,
    pub timezone: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Active,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub scheduled: bool,
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub uptime_seconds: u64,
}

/// Cron-driven refresh trigger. Every tick calls
/// [`RefreshCoordinator::trigger_refresh`], so a tick that lands while a
/// refresh is already running simply joins it.
pub struct RefreshScheduler {
    scheduler: JobScheduler,
    coordinator: Arc<RefreshCoordinator>,
    job: Arc<RwLock<Option<JobInfo>>>,
    config: SchedulerConfig,
    start_time: DateTime<Utc>,
}

impl RefreshScheduler {
    pub async fn new(coordinator: Arc<RefreshCoordinator>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            coordinator,
            job: Arc::new(RwLock::new(None)),
            config,
            start_time: Utc::now(),
        })
    }

    /// Registers the refresh job and starts ticking.
    pub async fn start(&mut self) -> Result<()> {
        self.schedule_refresh().await?;
        self.scheduler.start().await?;
        tracing::info!(
            cron = %self.config.normalized_cron(),
            timezone = %self.config.timezone,
            "Refresh scheduler started"
        );
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        tracing::info!("Refresh scheduler shutdown");
        Ok(())
    }

    /// Adds the cron job without starting the scheduler.
    pub async fn schedule_refresh(&self) -> Result<Uuid> {
        if !is_valid_cron(&self.config.cron) {
            return Err(anyhow::anyhow!("Invalid cron expression: {}", self.config.cron));
        }
        let expression = self.config.normalized_cron();
        let tz = self.config.tz()?;

        let coordinator = Arc::clone(&self.coordinator);
        let job_state = Arc::clone(&self.job);

        let job = Job::new_async_tz(expression.as_str(), tz, move |_uuid, _l| {
            let coordinator = Arc::clone(&coordinator);
            let job_state = Arc::clone(&job_state);

            Box::pin(async move {
                tracing::debug!("Scheduled refresh tick");
                let started = tokio::time::Instant::now();
                let outcome = coordinator.trigger_refresh().await;
                Self::record_run(&job_state, &outcome, started.elapsed()).await;
            })
        })?;

        let id = self.scheduler.add(job).await?;

        let mut slot = self.job.write().await;
        *slot = Some(JobInfo {
            id,
            cron_expression: expression.clone(),
            timezone: self.config.timezone.clone(),
            status: JobStatus::Active,
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
            success_count: 0,
            error_count: 0,
            last_error: None,
            last_duration_ms: None,
        });

        tracing::info!(job = %id, cron = %expression, "Scheduled listing refresh");
        Ok(id)
    }

    /// Runs a refresh now, outside of the schedule, and records it like a tick.
    pub async fn run_now(&self) -> RefreshOutcome {
        let started = tokio::time::Instant::now();
        let outcome = self.coordinator.trigger_refresh().await;
        Self::record_run(&self.job, &outcome, started.elapsed()).await;
        outcome
    }

    /// Kicks a background refresh when the current snapshot is older than `ttl`.
    /// Returns whether one was started.
    pub fn refresh_on_start(&self, ttl: Duration) -> bool {
        if !self.config.refresh_on_start {
            return false;
        }
        let started = self.coordinator.refresh_in_background(ttl);
        if started {
            tracing::info!("Snapshot is stale at startup, refreshing in background");
        }
        started
    }

    pub async fn job_info(&self) -> Option<JobInfo> {
        self.job.read().await.clone()
    }

    pub async fn get_stats(&self) -> SchedulerStats {
        let job = self.job.read().await;
        let uptime = Utc::now().signed_duration_since(self.start_time);

        SchedulerStats {
            scheduled: job.is_some(),
            completed_runs: job.as_ref().map(|j| j.success_count).unwrap_or(0),
            failed_runs: job.as_ref().map(|j| j.error_count).unwrap_or(0),
            uptime_seconds: uptime.num_seconds().max(0) as u64,
        }
    }

    async fn record_run(job: &RwLock<Option<JobInfo>>, outcome: &RefreshOutcome, elapsed: Duration) {
        match outcome {
            Ok(snapshot) => tracing::info!(
                listings = snapshot.listings.len(),
                failed_sources = snapshot.errors.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Scheduled refresh completed"
            ),
            Err(e) => tracing::error!(error = %e, "Scheduled refresh failed"),
        }

        let mut job = job.write().await;
        if let Some(info) = job.as_mut() {
            info.last_run = Some(Utc::now());
            info.run_count += 1;
            info.last_duration_ms = Some(elapsed.as_millis() as u64);
            match outcome {
                Ok(_) => {
                    info.success_count += 1;
                    info.last_error = None;
                    info.status = JobStatus::Active;
                }
                Err(e) => {
                    info.error_count += 1;
                    info.last_error = Some(e.to_string());
                    info.status = JobStatus::Error;
                }
            }
        }
    }
}
