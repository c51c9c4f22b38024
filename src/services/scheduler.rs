use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::db::{JobStore, StoreError};
use crate::models::job::GALLERY_QUEUE;
use crate::services::deadline::{within, DeadlineExceeded};
use crate::services::queue::{QueueError, QueuedJob, WorkQueue};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Recorded as the claimer of dispatched jobs.
    pub worker_id: String,
    pub batch_size: i64,
    pub poll_interval: Duration,
    /// Active jobs older than this are assumed lost and made pending again.
    pub visibility_timeout: Duration,
    pub store_timeout: Duration,
}

/// Counts from one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub released: u64,
    pub dispatched: u64,
    pub failed: u64,
}

impl DispatchReport {
    pub fn is_idle(&self) -> bool {
        self.released == 0 && self.dispatched == 0 && self.failed == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

/// Moves due jobs from the job store onto the work queue.
pub struct SchedulerDriver {
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    settings: SchedulerSettings,
}

impl SchedulerDriver {
    pub fn new(jobs: Arc<dyn JobStore>, queue: Arc<dyn WorkQueue>, settings: SchedulerSettings) -> Self {
        Self {
            jobs,
            queue,
            settings,
        }
    }

    /// One dispatch pass at `now`.
    ///
    /// Claiming marks jobs active before they are pushed, so two drivers never
    /// dispatch the same job. A job whose push fails is released for the next
    /// pass.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<DispatchReport, SchedulerError> {
        let mut report = DispatchReport::default();

        let visibility = chrono::Duration::from_std(self.settings.visibility_timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        report.released = self
            .bounded("release stale jobs", self.jobs.release_stale_jobs(now - visibility))
            .await?;
        if report.released > 0 {
            warn!(released = report.released, "Released jobs abandoned by a worker");
        }

        let claimed = self
            .bounded(
                "claim due jobs",
                self.jobs
                    .claim_due_jobs(now, &self.settings.worker_id, self.settings.batch_size),
            )
            .await?;

        for job in &claimed {
            let message = QueuedJob::from(job);
            match self.bounded("push job", self.queue.push_job(&message)).await {
                Ok(()) => {
                    report.dispatched += 1;
                    debug!(job_id = %job.id, job_type = %job.job_type, "Job dispatched");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(job_id = %job.id, error = %e, "Failed to push job, releasing");
                    if let Err(e) = self.bounded("release job", self.jobs.release_job(job.id)).await {
                        error!(
                            job_id = %job.id,
                            error = %e,
                            "Failed to release job, it will be recovered after the visibility timeout"
                        );
                    }
                }
            }
        }

        match self.bounded("queue depth", self.queue.depth(GALLERY_QUEUE)).await {
            Ok(depth) => metrics::gauge!("gallery_queue_depth").set(depth as f64),
            Err(e) => debug!(error = %e, "Could not read queue depth"),
        }
        metrics::counter!("gallery_jobs_dispatched_total").increment(report.dispatched);

        Ok(report)
    }

    /// Tick until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            worker_id = %self.settings.worker_id,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Scheduler started"
        );

        loop {
            match self.tick(Utc::now()).await {
                Ok(report) if report.is_idle() => trace!("No due jobs"),
                Ok(report) => info!(
                    released = report.released,
                    dispatched = report.dispatched,
                    failed = report.failed,
                    "Scheduler tick"
                ),
                Err(e) => error!(error = %e, "Scheduler tick failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        info!("Scheduler stopped");
    }

    async fn bounded<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, SchedulerError>
    where
        F: Future<Output = Result<T, E>>,
        SchedulerError: From<E>,
    {
        Ok(within(self.settings.store_timeout, operation, fut).await??)
    }
}
