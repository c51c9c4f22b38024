//! Gallery sharing lifecycle.
//!
//! A gallery moves `Unshared -> Shared -> Expired -> Unshared`. `Shared` can
//! be rescheduled in place, and `Shared` or `Expired` can be stopped. Every
//! write goes through [`GalleryStore::update_sharing`] with a precondition on
//! the current sharing fields, so concurrent operations on one gallery
//! serialize without locks and the loser observes a conflict.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{GalleryStore, JobStore, StoreError};
use crate::models::gallery::{Gallery, SharingPrecondition, SharingState, SharingUpdate};
use crate::models::job::{Job, JobType};
use crate::models::sharing::ShareResponse;
use crate::services::deadline::{within, DeadlineExceeded};
use crate::services::notify::Notifier;
use crate::services::token::{generate_access_token, share_url};

/// When the cleanup job fires relative to the sharing expiry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CleanupPolicy {
    /// Exactly at the expiry instant.
    #[default]
    AtExpiry,
    /// One second into the next UTC calendar day, so "until Dec 31" covers all of Dec 31.
    NextDay,
}

impl CleanupPolicy {
    pub fn cleanup_at(self, expiry: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            CleanupPolicy::AtExpiry => expiry,
            CleanupPolicy::NextDay => expiry
                .date_naive()
                .succ_opt()
                .and_then(|day| day.and_hms_opt(0, 0, 1))
                .map(|start| start.and_utc())
                .unwrap_or(expiry),
        }
    }
}

/// A requested expiry must be set and not in the past.
pub fn validate_sharing_expiry(expiry: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expiry != DateTime::<Utc>::MIN_UTC && expiry >= now
}

#[derive(Debug, Clone)]
pub struct SharingSettings {
    pub frontend_origin: String,
    pub cleanup_policy: CleanupPolicy,
    /// Deadline applied to every store call.
    pub store_timeout: Duration,
}

/// Result of executing a cleanup job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Sharing was turned off.
    Disabled,
    /// Nothing to do: the gallery is gone, already unshared, or owned by another job.
    Skipped,
    /// The window was extended after this job was scheduled; run again at the given time.
    Deferred(DateTime<Utc>),
}

impl CleanupOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CleanupOutcome::Disabled => "disabled",
            CleanupOutcome::Skipped => "skipped",
            CleanupOutcome::Deferred(_) => "deferred",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SharingError {
    #[error("Sharing expiry date invalid")]
    InvalidExpiry,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Sharing already active")]
    AlreadyActive,

    #[error("Sharing already inactive")]
    NotActive,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error("Payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Sharing state machine over the gallery and job stores.
pub struct SharingService {
    galleries: Arc<dyn GalleryStore>,
    jobs: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
    settings: SharingSettings,
}

impl SharingService {
    pub fn new(
        galleries: Arc<dyn GalleryStore>,
        jobs: Arc<dyn JobStore>,
        notifier: Arc<dyn Notifier>,
        settings: SharingSettings,
    ) -> Self {
        Self {
            galleries,
            jobs,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &SharingSettings {
        &self.settings
    }

    /// Open a new sharing window ending at `requested_expiry`.
    ///
    /// The cleanup job is written before the gallery, and the gallery write
    /// is conditional on the gallery not being shared. A failure before the
    /// gallery write leaves the gallery untouched.
    pub async fn activate(
        &self,
        gallery_id: Uuid,
        owner: &str,
        requested_expiry: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ShareResponse, SharingError> {
        if !validate_sharing_expiry(requested_expiry, now) {
            return Err(SharingError::InvalidExpiry);
        }

        let gallery = self.load_owned(gallery_id, owner).await?;
        if gallery.sharing.state(now) == SharingState::Shared {
            return Err(SharingError::AlreadyActive);
        }

        let cleanup_job = Job::for_gallery(
            JobType::Cleanup,
            gallery_id,
            self.settings.cleanup_policy.cleanup_at(requested_expiry),
            now,
        )?;
        let cleanup_job_id = self
            .bounded("create cleanup job", self.jobs.create_job(&cleanup_job))
            .await?;

        let access_token = generate_access_token();
        let sharing_url = share_url(&self.settings.frontend_origin, gallery_id, &access_token);
        let update = SharingUpdate::Activate {
            access_token: access_token.clone(),
            expiry: requested_expiry,
            sharing_url: sharing_url.clone(),
            cleanup_job_id,
        };

        // On an error here the job is kept: if the write landed the gallery
        // needs it, and if not it is skipped when it fires.
        let updated = self
            .bounded(
                "activate sharing",
                self.galleries
                    .update_sharing(gallery_id, &update, SharingPrecondition::NotShared { now }),
            )
            .await?;

        if updated.is_none() {
            self.discard_job(cleanup_job_id).await;
            return Err(self
                .conflict_or_missing(gallery_id, SharingError::AlreadyActive)
                .await);
        }

        if let Some(previous) = gallery
            .sharing
            .sharing_cleanup_job_id
            .filter(|id| *id != cleanup_job_id)
        {
            self.discard_job(previous).await;
        }

        self.schedule_share_announcement(gallery_id, now).await;

        metrics::counter!("gallery_sharing_activated_total").increment(1);
        info!(
            gallery_id = %gallery_id,
            cleanup_job_id = %cleanup_job_id,
            sharing_expiry = %requested_expiry,
            "Gallery sharing activated"
        );

        Ok(ShareResponse {
            gallery_id,
            access_token,
            share_url: sharing_url,
            sharing_expiry: requested_expiry,
        })
    }

    /// Move the end of an active window. Token, url and job identity are kept.
    pub async fn reschedule(
        &self,
        gallery_id: Uuid,
        owner: &str,
        new_expiry: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ShareResponse, SharingError> {
        if !validate_sharing_expiry(new_expiry, now) {
            return Err(SharingError::InvalidExpiry);
        }

        let gallery = self.load_owned(gallery_id, owner).await?;
        if gallery.sharing.state(now) != SharingState::Shared {
            return Err(SharingError::NotActive);
        }

        let cleanup_job_id = gallery
            .sharing
            .sharing_cleanup_job_id
            .ok_or(SharingError::NotFound("Cleanup job"))?;
        let access_token = gallery.sharing.access_token.clone().ok_or_else(|| {
            StoreError::Corrupt(format!("gallery {gallery_id} is shared without a token"))
        })?;

        self.bounded(
            "reschedule cleanup job",
            self.jobs.reschedule_job(
                cleanup_job_id,
                self.settings.cleanup_policy.cleanup_at(new_expiry),
            ),
        )
        .await?
        .ok_or(SharingError::NotFound("Cleanup job"))?;

        let updated = self
            .bounded(
                "reschedule sharing",
                self.galleries.update_sharing(
                    gallery_id,
                    &SharingUpdate::Reschedule { expiry: new_expiry },
                    SharingPrecondition::Shared {
                        now,
                        cleanup_job_id: Some(cleanup_job_id),
                    },
                ),
            )
            .await?;

        let Some(updated) = updated else {
            return Err(self
                .conflict_or_missing(gallery_id, SharingError::NotActive)
                .await);
        };

        metrics::counter!("gallery_sharing_rescheduled_total").increment(1);
        info!(
            gallery_id = %gallery_id,
            cleanup_job_id = %cleanup_job_id,
            sharing_expiry = %new_expiry,
            "Gallery sharing rescheduled"
        );

        let url = updated
            .sharing
            .sharing_url
            .unwrap_or_else(|| share_url(&self.settings.frontend_origin, gallery_id, &access_token));

        Ok(ShareResponse {
            gallery_id,
            access_token,
            share_url: url,
            sharing_expiry: new_expiry,
        })
    }

    /// End sharing now, whether the window is still open or already lapsed.
    pub async fn stop(
        &self,
        gallery_id: Uuid,
        owner: &str,
        now: DateTime<Utc>,
    ) -> Result<Gallery, SharingError> {
        let gallery = self.load_owned(gallery_id, owner).await?;
        if gallery.sharing.state(now) == SharingState::Unshared {
            return Err(SharingError::NotActive);
        }

        let updated = self
            .bounded(
                "stop sharing",
                self.galleries.update_sharing(
                    gallery_id,
                    &SharingUpdate::Disable,
                    SharingPrecondition::Enabled,
                ),
            )
            .await?;

        let Some(updated) = updated else {
            return Err(self
                .conflict_or_missing(gallery_id, SharingError::NotActive)
                .await);
        };

        if let Some(job_id) = gallery.sharing.sharing_cleanup_job_id {
            self.discard_job(job_id).await;
        }

        metrics::counter!("gallery_sharing_stopped_total").increment(1);
        info!(gallery_id = %gallery_id, "Gallery sharing stopped");

        Ok(updated)
    }

    /// Execute the cleanup job `job_id` for a gallery. Idempotent.
    ///
    /// Only disables sharing if the gallery still references this job and its
    /// expiry has been reached, so a job scheduled against an expiry that was
    /// since extended never cuts the new window short.
    pub async fn cleanup(
        &self,
        gallery_id: Uuid,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CleanupOutcome, SharingError> {
        let disabled = self
            .bounded(
                "cleanup sharing",
                self.galleries.update_sharing(
                    gallery_id,
                    &SharingUpdate::Disable,
                    SharingPrecondition::CleanupDue {
                        cleanup_job_id: job_id,
                        now,
                    },
                ),
            )
            .await?;

        let outcome = if disabled.is_some() {
            CleanupOutcome::Disabled
        } else {
            let current = self
                .bounded("load gallery", self.galleries.get_gallery(gallery_id))
                .await?;
            match current {
                Some(gallery)
                    if gallery.sharing.sharing_enabled
                        && gallery.sharing.sharing_cleanup_job_id == Some(job_id) =>
                {
                    match gallery.sharing.sharing_expiry_date {
                        Some(expiry) if expiry > now => {
                            CleanupOutcome::Deferred(self.settings.cleanup_policy.cleanup_at(expiry))
                        }
                        // Lost a race with a concurrent write; run again right away.
                        Some(_) => CleanupOutcome::Deferred(now),
                        None => CleanupOutcome::Skipped,
                    }
                }
                _ => CleanupOutcome::Skipped,
            }
        };

        metrics::counter!("gallery_sharing_cleanups_total", "outcome" => outcome.label())
            .increment(1);
        info!(
            gallery_id = %gallery_id,
            job_id = %job_id,
            outcome = outcome.label(),
            "Sharing cleanup executed"
        );

        Ok(outcome)
    }

    /// Execute a share job: tell the owner their gallery is now shared.
    pub async fn announce_share(&self, gallery_id: Uuid, now: DateTime<Utc>) -> Result<(), SharingError> {
        let gallery = self
            .bounded("load gallery", self.galleries.get_gallery(gallery_id))
            .await?;

        let Some(gallery) = gallery.filter(|g| g.sharing.state(now) == SharingState::Shared) else {
            debug!(gallery_id = %gallery_id, "Gallery no longer shared, skipping announcement");
            return Ok(());
        };

        let body = format!("Gallery {} has been shared successfully.", gallery.name);
        let sent = within(
            self.settings.store_timeout,
            "send notification",
            self.notifier.notify(&gallery.user_id, "Gallery Shared", &body),
        )
        .await;

        match sent {
            Ok(Ok(())) => debug!(gallery_id = %gallery_id, "Share notification sent"),
            Ok(Err(e)) => warn!(gallery_id = %gallery_id, error = %e, "Failed to send push notification"),
            Err(e) => warn!(gallery_id = %gallery_id, error = %e, "Failed to send push notification"),
        }
        Ok(())
    }

    async fn load_owned(&self, gallery_id: Uuid, owner: &str) -> Result<Gallery, SharingError> {
        self.bounded("load gallery", self.galleries.get_gallery(gallery_id))
            .await?
            .filter(|gallery| gallery.user_id == owner)
            .ok_or(SharingError::NotFound("Gallery"))
    }

    /// Distinguish a failed precondition from a gallery deleted meanwhile.
    async fn conflict_or_missing(&self, gallery_id: Uuid, conflict: SharingError) -> SharingError {
        match self
            .bounded("load gallery", self.galleries.get_gallery(gallery_id))
            .await
        {
            Ok(Some(_)) => conflict,
            Ok(None) => SharingError::NotFound("Gallery"),
            Err(e) => e,
        }
    }

    async fn schedule_share_announcement(&self, gallery_id: Uuid, now: DateTime<Utc>) {
        let created = match Job::for_gallery(JobType::Share, gallery_id, now, now) {
            Ok(job) => self.bounded("create share job", self.jobs.create_job(&job)).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = created {
            warn!(gallery_id = %gallery_id, error = %e, "Failed to schedule share announcement");
        }
    }

    async fn discard_job(&self, job_id: Uuid) {
        match self.bounded("delete job", self.jobs.delete_job(job_id)).await {
            Ok(_) => debug!(job_id = %job_id, "Discarded cleanup job"),
            Err(e) => warn!(
                job_id = %job_id,
                error = %e,
                "Failed to delete cleanup job, it will be skipped when it fires"
            ),
        }
    }

    async fn bounded<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, SharingError>
    where
        F: Future<Output = Result<T, E>>,
        SharingError: From<E>,
    {
        Ok(within(self.settings.store_timeout, operation, fut).await??)
    }
}
