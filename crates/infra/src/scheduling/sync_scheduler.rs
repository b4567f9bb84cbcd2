//! Cron-driven synchronization scheduler
//!
//! Periodically renews webhook subscriptions nearing expiry and fans out one
//! reconciliation pass per calendar for the configured users. Join handles
//! are tracked, cancellation is explicit, and every asynchronous operation
//! is wrapped in a timeout. The per-calendar serialization the engine
//! assumes comes from here: one sweep runs at a time and walks calendars
//! sequentially.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dayline_core::CalendarSyncService;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the sync scheduler.
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Cron expression describing the execution schedule.
    pub cron_expression: String,
    /// Users whose calendars are synced each sweep.
    pub user_ids: Vec<String>,
    /// Timeout applied to a single sweep execution.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 */15 * * * *".into(), // every 15 minutes
            user_ids: Vec::new(),
            job_timeout: Duration::from_secs(300),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Synchronization scheduler with explicit lifecycle management.
pub struct SyncScheduler {
    scheduler: Option<JobScheduler>,
    config: SyncSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    service: Arc<CalendarSyncService>,
}

impl SyncScheduler {
    /// Create a scheduler with the default configuration.
    pub fn new(
        cron_expression: String,
        user_ids: Vec<String>,
        service: Arc<CalendarSyncService>,
    ) -> Self {
        let config = SyncSchedulerConfig { cron_expression, user_ids, ..Default::default() };
        Self::with_config(config, service)
    }

    /// Create a scheduler with a custom configuration.
    pub fn with_config(config: SyncSchedulerConfig, service: Arc<CalendarSyncService>) -> Self {
        Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            service,
        }
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        let start_result = tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: start_timeout.as_secs() })?;

        start_result.map_err(|source| SchedulerError::StartFailed(source.to_string()))?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            Self::monitor_task(cancel).await;
        });

        self.monitor_handle = Some(handle);
        info!("Sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let mut scheduler = match self.scheduler.take() {
            Some(scheduler) => scheduler,
            None => return Err(SchedulerError::NotRunning),
        };

        let stop_timeout = self.config.stop_timeout;
        let stop_result =
            tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: stop_timeout.as_secs() })?;

        stop_result.map_err(|source| SchedulerError::StopFailed(source.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|err| SchedulerError::TaskJoinFailed(err.to_string()))?;
        }

        info!("Sync scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|source| SchedulerError::CreationFailed(source.to_string()))?;
        let cron_expr = self.config.cron_expression.clone();
        let service = self.service.clone();
        let job_timeout = self.config.job_timeout;
        let user_ids = self.config.user_ids.clone();

        let job_definition = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let service = service.clone();
            let user_ids = user_ids.clone();

            Box::pin(async move {
                match tokio::time::timeout(job_timeout, Self::run_sweep(service, user_ids)).await
                {
                    Ok(Ok(())) => {
                        debug!("Sync sweep finished successfully");
                    }
                    Ok(Err(err)) => {
                        error!(error = %err, "Sync sweep failed");
                    }
                    Err(_) => {
                        warn!(timeout_secs = job_timeout.as_secs(), "Sync sweep timed out");
                    }
                }
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed(source.to_string()))?;

        let job_id = job_definition.guid();
        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed(source.to_string()))?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "Registered sync sweep job");
        Ok(scheduler)
    }

    /// One sweep: renew expiring channels first so push notifications keep
    /// flowing, then fan out a pass per calendar for every configured user.
    async fn run_sweep(
        service: Arc<CalendarSyncService>,
        user_ids: Vec<String>,
    ) -> Result<(), SweepError> {
        if user_ids.is_empty() {
            debug!("No users configured for sync sweep");
            return Ok(());
        }

        match service.renew_expiring_subscriptions().await {
            Ok(renewed) if !renewed.is_empty() => {
                info!(renewed = renewed.len(), "Renewed expiring webhook subscriptions");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "Subscription renewal sweep failed");
            }
        }

        let mut failures = Vec::new();
        let mut total_calendars = 0;

        for user_id in &user_ids {
            let user_tag = redact_user_id(user_id);
            match service.sync_all_calendars(user_id).await {
                Ok(reports) => {
                    total_calendars += reports.len();
                    for report in reports.iter().filter(|report| !report.succeeded()) {
                        warn!(
                            user = %user_tag,
                            calendar_id = %report.calendar_id,
                            error = report.error.as_deref().unwrap_or("unknown"),
                            "Calendar sync failed in sweep"
                        );
                        failures.push(format!("{user_tag}/{}", report.calendar_id));
                    }
                }
                Err(err) => {
                    warn!(user = %user_tag, error = %err, "User sync fan-out failed");
                    failures.push(user_tag);
                }
            }
        }

        info!(
            users = user_ids.len(),
            calendars = total_calendars,
            failures = failures.len(),
            "Sync sweep completed"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SweepError { failures, total_calendars })
        }
    }

    async fn monitor_task(cancel: CancellationToken) {
        cancel.cancelled().await;
        debug!("Sync scheduler monitor cancelled");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

/// User identifiers may be emails; logs only ever see a salted hash.
fn redact_user_id(user_id: &str) -> String {
    const USER_HASH_SALT: &[u8] = b"dayline-sync-scheduler-user-salt";
    let mut hasher = Sha256::new();
    hasher.update(USER_HASH_SALT);
    hasher.update(user_id.as_bytes());
    let digest = hasher.finalize();
    let hash = hex::encode(&digest[..8]);
    format!("user_hash={hash}")
}

#[derive(Debug)]
struct SweepError {
    failures: Vec<String>,
    total_calendars: usize,
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sync sweep encountered {} failures across {} calendars",
            self.failures.len(),
            self.total_calendars
        )?;

        if !self.failures.is_empty() {
            write!(f, " (failed: ")?;
            for (index, failure) in self.failures.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{failure}")?;
            }
            write!(f, ")")?;
        }

        Ok(())
    }
}

impl std::error::Error for SweepError {}
