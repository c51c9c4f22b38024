use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::{JobStore, StoreError};
use crate::models::job::{Job, JobStatus, JobType, DEFAULT_RETRIES, GALLERY_QUEUE};
use crate::services::deadline::{within, DeadlineExceeded};
use crate::services::queue::{QueueError, QueuedJob, WorkQueue};
use crate::services::sharing::{CleanupOutcome, SharingError, SharingService};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// How long one pull blocks waiting for a message.
    pub queue_wait: Duration,
    pub store_timeout: Duration,
    /// Base delay before a failed job runs again, multiplied by the attempt number.
    pub retry_backoff: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

/// Consumes the gallery lane and executes share and cleanup jobs.
pub struct JobWorker {
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    sharing: Arc<SharingService>,
    settings: WorkerSettings,
}

impl JobWorker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        sharing: Arc<SharingService>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            jobs,
            queue,
            sharing,
            settings,
        }
    }

    /// Put messages this worker pulled but never acknowledged back on the queue.
    pub async fn recover(&self) -> Result<u64, WorkerError> {
        let moved = self
            .bounded("recover queue", self.queue.recover(GALLERY_QUEUE))
            .await?;
        if moved > 0 {
            warn!(moved, "Requeued unacknowledged messages from a previous run");
        }
        Ok(moved)
    }

    /// Pull one message, waiting up to the configured queue wait.
    pub async fn poll(&self) -> Result<Option<QueuedJob>, WorkerError> {
        let limit = self.settings.queue_wait + self.settings.store_timeout;
        Ok(within(
            limit,
            "pull job",
            self.queue.pull_job(GALLERY_QUEUE, self.settings.queue_wait),
        )
        .await??)
    }

    /// Pull and handle one message. Returns `false` when the queue was empty.
    pub async fn process_next(&self, now: DateTime<Utc>) -> Result<bool, WorkerError> {
        match self.poll().await? {
            Some(message) => {
                self.process(&message, now).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Execute the job behind `message` and acknowledge it.
    ///
    /// The job record decides what happens: a message for a job that is gone
    /// or no longer active is dropped. The message is acknowledged even when
    /// recording the outcome fails, since the visibility timeout returns the
    /// job to pending.
    pub async fn process(&self, message: &QueuedJob, now: DateTime<Utc>) -> Result<(), WorkerError> {
        let handled = self.handle(message, now).await;
        self.bounded("ack job", self.queue.ack(message)).await?;
        handled
    }

    async fn handle(&self, message: &QueuedJob, now: DateTime<Utc>) -> Result<(), WorkerError> {
        let job = self
            .bounded("load job", self.jobs.get_job(message.job_id))
            .await?
            .filter(|job| job.status == JobStatus::Active);

        let Some(job) = job else {
            debug!(job_id = %message.job_id, "Job missing or not active, dropping message");
            metrics::counter!("gallery_jobs_processed_total", "outcome" => "dropped").increment(1);
            return Ok(());
        };

        let started = std::time::Instant::now();
        match self.execute(&job, now).await {
            Ok(None) => {
                self.bounded("complete job", self.jobs.complete_job(job.id, now))
                    .await?;
                metrics::counter!("gallery_jobs_processed_total", "outcome" => "complete")
                    .increment(1);
                info!(job_id = %job.id, job_type = %job.job_type, "Job completed");
            }
            Ok(Some(at)) => {
                self.bounded("requeue job", self.jobs.requeue_job(job.id, at))
                    .await?;
                metrics::counter!("gallery_jobs_processed_total", "outcome" => "deferred")
                    .increment(1);
                info!(job_id = %job.id, run_at = %at, "Job deferred");
            }
            Err(e) => {
                let retry_at = now + self.backoff_for(&job);
                let failed = self
                    .bounded("fail job", self.jobs.fail_job(job.id, &e.to_string(), retry_at))
                    .await?;
                match failed {
                    Some(record) if record.status == JobStatus::Failed => {
                        metrics::counter!("gallery_jobs_processed_total", "outcome" => "failed")
                            .increment(1);
                        error!(job_id = %job.id, error = %e, "Job failed, retries exhausted");
                    }
                    _ => {
                        metrics::counter!("gallery_jobs_processed_total", "outcome" => "retry")
                            .increment(1);
                        warn!(job_id = %job.id, error = %e, retry_at = %retry_at, "Job failed, will retry");
                    }
                }
            }
        }
        metrics::histogram!("gallery_job_duration_seconds").record(started.elapsed().as_secs_f64());

        Ok(())
    }

    /// Returns a new due time when the job must run again.
    async fn execute(&self, job: &Job, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, SharingError> {
        let payload = job.gallery_payload()?;
        match job.job_type {
            JobType::Cleanup => match self.sharing.cleanup(payload.gallery_id, job.id, now).await? {
                CleanupOutcome::Deferred(at) => Ok(Some(at)),
                CleanupOutcome::Disabled | CleanupOutcome::Skipped => Ok(None),
            },
            JobType::Share => {
                self.sharing.announce_share(payload.gallery_id, now).await?;
                Ok(None)
            }
        }
    }

    fn backoff_for(&self, job: &Job) -> chrono::Duration {
        let attempt = (DEFAULT_RETRIES - job.retries).max(0) + 1;
        let base = chrono::Duration::from_std(self.settings.retry_backoff)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        base * attempt
    }

    /// Process messages until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        if let Err(e) = self.recover().await {
            error!(error = %e, "Failed to recover unacknowledged messages");
        }
        info!("Worker ready, consuming gallery jobs");

        while !shutdown.is_cancelled() {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.poll() => polled,
            };

            let result = match polled {
                Ok(Some(message)) => self.process(&message, Utc::now()).await,
                Ok(None) => continue,
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                error!(error = %e, "Error processing job, backing off");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(Duration::from_secs(1)) => {}
                }
            }
        }

        info!("Worker stopped");
    }

    async fn bounded<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, WorkerError>
    where
        F: Future<Output = Result<T, E>>,
        WorkerError: From<E>,
    {
        Ok(within(self.settings.store_timeout, operation, fut).await??)
    }
}
