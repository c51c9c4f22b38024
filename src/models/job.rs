use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical lane shared by all gallery lifecycle jobs.
pub const GALLERY_QUEUE: &str = "gallery";

/// Retry budget given to every new job.
pub const DEFAULT_RETRIES: i32 = 3;

/// Kind of deferred work a job performs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    Share,
    Cleanup,
}

/// Status of a job record in the job store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Active,
    Complete,
    Failed,
}

/// A durable record of deferred work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub queue: String,
    pub status: JobStatus,
    /// Serialized type-specific payload.
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    /// Instant at or after which the job is due.
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub error: Option<String>,
    /// Remaining retry budget.
    pub retries: i32,
}

/// Payload carried by both `share` and `cleanup` jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryJobPayload {
    pub gallery_id: Uuid,
}

impl Job {
    /// Build a pending gallery-lane job due at `scheduled_at`.
    pub fn for_gallery(
        job_type: JobType,
        gallery_id: Uuid,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_vec(&GalleryJobPayload { gallery_id })?;
        Ok(Self {
            id: Uuid::new_v4(),
            job_type,
            queue: GALLERY_QUEUE.to_string(),
            status: JobStatus::Pending,
            payload,
            created_at: now,
            scheduled_at,
            started_at: None,
            completed_at: None,
            worker_id: None,
            error: None,
            retries: DEFAULT_RETRIES,
        })
    }

    pub fn gallery_payload(&self) -> Result<GalleryJobPayload, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_gallery_job_defaults() {
        let now = Utc::now();
        let gallery_id = Uuid::new_v4();
        let job = Job::for_gallery(JobType::Cleanup, gallery_id, now + Duration::hours(1), now)
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.queue, GALLERY_QUEUE);
        assert_eq!(job.retries, DEFAULT_RETRIES);
        assert_eq!(job.gallery_payload().unwrap().gallery_id, gallery_id);
        assert!(!job.is_due(now));
        assert!(job.is_due(now + Duration::hours(1)));
    }

    #[test]
    fn test_status_strings_match_storage_format() {
        assert_eq!(JobStatus::Complete.as_ref(), "complete");
        assert_eq!("active".parse::<JobStatus>().unwrap(), JobStatus::Active);
        assert_eq!(JobType::Cleanup.to_string(), "cleanup");
        assert!("processing".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_payload_wire_format() {
        let gallery_id = Uuid::nil();
        let job = Job::for_gallery(JobType::Share, gallery_id, Utc::now(), Utc::now()).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&job.payload).unwrap();
        assert_eq!(raw["galleryId"], gallery_id.to_string());
    }
}
