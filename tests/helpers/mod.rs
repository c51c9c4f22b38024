//! In-memory collaborators and a wired harness for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use halftone::app_state::{AppState, Collaborators};
use halftone::db::{GalleryStore, JobStore, PhotoStore, StoreError};
use halftone::middleware::owner_auth::{JwtValidator, OwnerClaims};
use halftone::models::gallery::{Gallery, Sharing, SharingPrecondition, SharingUpdate};
use halftone::models::job::{Job, JobStatus, JobType, DEFAULT_RETRIES};
use halftone::models::photo::Photo;
use halftone::services::gate::AccessGate;
use halftone::services::notify::{Notifier, NotifyError};
use halftone::services::queue::{QueueError, QueuedJob, WorkQueue};
use halftone::services::scheduler::{SchedulerDriver, SchedulerSettings};
use halftone::services::sharing::{CleanupPolicy, SharingService, SharingSettings};
use halftone::services::storage::{ObjectStorage, StorageError};
use halftone::services::worker::{JobWorker, WorkerSettings};

pub const OWNER: &str = "owner-1";
pub const FRONTEND_ORIGIN: &str = "https://halftone.test";
pub const JWT_SECRET: &str = "test-jwt-secret";
pub const STORE_TIMEOUT: Duration = Duration::from_secs(2);
pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(300);

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

pub fn new_gallery(owner: &str, name: &str) -> Gallery {
    let now = Utc::now();
    Gallery {
        id: Uuid::new_v4(),
        collection_id: Uuid::new_v4(),
        user_id: owner.to_string(),
        name: name.to_string(),
        created_at: now,
        updated_at: now,
        sharing: Sharing::default(),
    }
}

#[derive(Default)]
pub struct MemoryGalleryStore {
    galleries: Mutex<HashMap<Uuid, Gallery>>,
    fail_reads: AtomicBool,
    fail_updates: AtomicBool,
    yield_after_reads: AtomicBool,
    conditional_writes: AtomicUsize,
}

impl MemoryGalleryStore {
    pub fn insert(&self, gallery: Gallery) {
        self.galleries.lock().unwrap().insert(gallery.id, gallery);
    }

    pub fn get(&self, gallery_id: Uuid) -> Option<Gallery> {
        self.galleries.lock().unwrap().get(&gallery_id).cloned()
    }

    pub fn remove(&self, gallery_id: Uuid) {
        self.galleries.lock().unwrap().remove(&gallery_id);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Hand control back to the executor after every read, so concurrent
    /// callers all observe the same state before any of them writes.
    pub fn set_yield_after_reads(&self, enabled: bool) {
        self.yield_after_reads.store(enabled, Ordering::SeqCst);
    }

    /// Number of `update_sharing` calls that reached the precondition check.
    pub fn conditional_writes(&self) -> usize {
        self.conditional_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GalleryStore for MemoryGalleryStore {
    async fn get_gallery(&self, gallery_id: Uuid) -> Result<Option<Gallery>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let gallery = self.get(gallery_id);
        if self.yield_after_reads.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        Ok(gallery)
    }

    async fn update_sharing(
        &self,
        gallery_id: Uuid,
        update: &SharingUpdate,
        precondition: SharingPrecondition,
    ) -> Result<Option<Gallery>, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.conditional_writes.fetch_add(1, Ordering::SeqCst);
        let mut galleries = self.galleries.lock().unwrap();
        let Some(gallery) = galleries.get_mut(&gallery_id) else {
            return Ok(None);
        };
        if !precondition.holds(&gallery.sharing) {
            return Ok(None);
        }
        update.apply(&mut gallery.sharing);
        gallery.updated_at = Utc::now();
        Ok(Some(gallery.clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
    fail_creates: AtomicBool,
}

impl MemoryJobStore {
    pub fn get(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().get(&job_id).cloned()
    }

    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    pub fn of_type(&self, job_type: JobType) -> Vec<Job> {
        self.all()
            .into_iter()
            .filter(|job| job.job_type == job_type)
            .collect()
    }

    pub fn remove(&self, job_id: Uuid) {
        self.jobs.lock().unwrap().remove(&job_id);
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    fn with_active<F>(&self, job_id: Uuid, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id)?;
        if job.status != JobStatus::Active {
            return None;
        }
        f(job);
        Some(job.clone())
    }
}

fn make_pending(job: &mut Job) {
    job.status = JobStatus::Pending;
    job.started_at = None;
    job.worker_id = None;
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &Job) -> Result<Uuid, StoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job.id)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.get(job_id))
    }

    async fn get_jobs_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Job>, StoreError> {
        let mut due: Vec<Job> = self.all().into_iter().filter(|job| job.is_due(now)).collect();
        due.sort_by_key(|job| job.scheduled_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        worker_id: &str,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut due: Vec<&mut Job> = jobs.values_mut().filter(|job| job.is_due(now)).collect();
        due.sort_by_key(|job| job.scheduled_at);
        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|job| {
                job.status = JobStatus::Active;
                job.started_at = Some(now);
                job.worker_id = Some(worker_id.to_string());
                job.clone()
            })
            .collect())
    }

    async fn reschedule_job(
        &self,
        job_id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        job.scheduled_at = scheduled_at;
        if job.status != JobStatus::Active {
            if job.status == JobStatus::Failed {
                job.retries = DEFAULT_RETRIES;
            }
            job.status = JobStatus::Pending;
            job.completed_at = None;
        }
        Ok(Some(job.clone()))
    }

    async fn delete_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.jobs.lock().unwrap().remove(&job_id).is_some())
    }

    async fn complete_job(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_active(job_id, |job| {
            job.status = JobStatus::Complete;
            job.completed_at = Some(now);
            job.error = None;
        });
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        Ok(self.with_active(job_id, |job| {
            job.retries -= 1;
            job.error = Some(error.to_string());
            if job.retries > 0 {
                make_pending(job);
                job.scheduled_at = retry_at;
            } else {
                job.status = JobStatus::Failed;
                job.started_at = None;
                job.worker_id = None;
                job.completed_at = Some(Utc::now());
            }
        }))
    }

    async fn requeue_job(&self, job_id: Uuid, scheduled_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_active(job_id, |job| {
            make_pending(job);
            job.scheduled_at = scheduled_at;
        });
        Ok(())
    }

    async fn release_job(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.with_active(job_id, make_pending);
        Ok(())
    }

    async fn release_stale_jobs(&self, started_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut released = 0;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Active
                && job.started_at.is_some_and(|started| started < started_before)
            {
                make_pending(job);
                released += 1;
            }
        }
        Ok(released)
    }
}

/// Queue with a single processing list, pulls never block.
#[derive(Default)]
pub struct MemoryQueue {
    ready: Mutex<VecDeque<QueuedJob>>,
    processing: Mutex<Vec<QueuedJob>>,
    fail_push: AtomicBool,
}

impl MemoryQueue {
    pub fn ready_len(&self) -> usize {
        self.ready.lock().unwrap().len()
    }

    pub fn processing_len(&self) -> usize {
        self.processing.lock().unwrap().len()
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn push_job(&self, job: &QueuedJob) -> Result<(), QueueError> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "injected failure",
            ))));
        }
        self.ready.lock().unwrap().push_back(job.clone());
        Ok(())
    }

    async fn pull_job(&self, queue: &str, _wait: Duration) -> Result<Option<QueuedJob>, QueueError> {
        let mut ready = self.ready.lock().unwrap();
        let Some(position) = ready.iter().position(|job| job.queue == queue) else {
            return Ok(None);
        };
        let job = ready.remove(position);
        if let Some(job) = &job {
            self.processing.lock().unwrap().push(job.clone());
        }
        Ok(job)
    }

    async fn ack(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut processing = self.processing.lock().unwrap();
        if let Some(position) = processing.iter().position(|p| p == job) {
            processing.remove(position);
        }
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<u64, QueueError> {
        let mut processing = self.processing.lock().unwrap();
        let mut ready = self.ready.lock().unwrap();
        let mut moved = 0;
        processing.retain(|job| {
            if job.queue == queue {
                ready.push_back(job.clone());
                moved += 1;
                false
            } else {
                true
            }
        });
        Ok(moved)
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        Ok(self
            .ready
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.queue == queue)
            .count() as u64)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub user_id: String,
    pub title: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected("HTTP 503: unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(SentNotification {
            user_id: user_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoredOrder {
    pub id: Uuid,
    pub gallery_id: Uuid,
    pub client_email: String,
    pub photo_ids: Vec<Uuid>,
}

#[derive(Default)]
pub struct MemoryPhotoStore {
    photos: Mutex<Vec<Photo>>,
    orders: Mutex<Vec<StoredOrder>>,
    yield_after_reads: AtomicBool,
}

impl MemoryPhotoStore {
    pub fn add_photo(&self, gallery_id: Uuid, filename: &str) -> Photo {
        let photo = Photo {
            id: Uuid::new_v4(),
            gallery_id,
            original_filename: filename.to_string(),
            object_key: format!("galleries/{gallery_id}/{filename}"),
            client_object_key: format!("galleries/{gallery_id}/client/{filename}"),
            thumbnail_object_key: format!("galleries/{gallery_id}/thumbs/{filename}"),
            created_at: Utc::now(),
        };
        self.photos.lock().unwrap().push(photo.clone());
        photo
    }

    pub fn orders(&self) -> Vec<StoredOrder> {
        self.orders.lock().unwrap().clone()
    }

    /// Hand control back to the executor after every membership check.
    pub fn set_yield_after_reads(&self, enabled: bool) {
        self.yield_after_reads.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl PhotoStore for MemoryPhotoStore {
    async fn list_shared_photos(&self, gallery_id: Uuid) -> Result<Vec<Photo>, StoreError> {
        Ok(self
            .photos
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.gallery_id == gallery_id)
            .cloned()
            .collect())
    }

    async fn get_photo(&self, photo_id: Uuid) -> Result<Option<Photo>, StoreError> {
        Ok(self
            .photos
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == photo_id)
            .cloned())
    }

    async fn photos_in_gallery(&self, gallery_id: Uuid, photo_ids: &[Uuid]) -> Result<bool, StoreError> {
        let owned = {
            let photos = self.photos.lock().unwrap();
            photo_ids
                .iter()
                .all(|id| photos.iter().any(|p| p.id == *id && p.gallery_id == gallery_id))
        };
        if self.yield_after_reads.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        Ok(owned)
    }

    async fn create_order(
        &self,
        gallery_id: Uuid,
        client_email: &str,
        _comment: &str,
        photo_ids: &[Uuid],
    ) -> Result<Option<Uuid>, StoreError> {
        let mut orders = self.orders.lock().unwrap();
        if orders.iter().any(|o| o.gallery_id == gallery_id) {
            return Ok(None);
        }
        let order = StoredOrder {
            id: Uuid::new_v4(),
            gallery_id,
            client_email: client_email.to_string(),
            photo_ids: photo_ids.to_vec(),
        };
        let id = order.id;
        orders.push(order);
        Ok(Some(id))
    }
}

pub struct FakeStorage;

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn presigned_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        if key.is_empty() {
            return Err(StorageError::MissingKey);
        }
        Ok(format!("https://storage.test/{key}?expires={}", ttl.as_secs()))
    }
}

/// Everything wired against in-memory collaborators.
pub struct Harness {
    pub galleries: Arc<MemoryGalleryStore>,
    pub jobs: Arc<MemoryJobStore>,
    pub queue: Arc<MemoryQueue>,
    pub notifier: Arc<RecordingNotifier>,
    pub photos: Arc<MemoryPhotoStore>,
    pub sharing: Arc<SharingService>,
    pub gate: AccessGate,
    pub scheduler: SchedulerDriver,
    pub worker: JobWorker,
    policy: CleanupPolicy,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(CleanupPolicy::AtExpiry)
    }

    pub fn with_policy(policy: CleanupPolicy) -> Self {
        let galleries = Arc::new(MemoryGalleryStore::default());
        let jobs = Arc::new(MemoryJobStore::default());
        let queue = Arc::new(MemoryQueue::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let photos = Arc::new(MemoryPhotoStore::default());

        let sharing = Arc::new(SharingService::new(
            galleries.clone(),
            jobs.clone(),
            notifier.clone(),
            sharing_settings(policy),
        ));
        let gate = AccessGate::new(galleries.clone(), STORE_TIMEOUT);
        let scheduler = SchedulerDriver::new(
            jobs.clone(),
            queue.clone(),
            SchedulerSettings {
                worker_id: "test-worker".to_string(),
                batch_size: 100,
                poll_interval: Duration::from_millis(10),
                visibility_timeout: VISIBILITY_TIMEOUT,
                store_timeout: STORE_TIMEOUT,
            },
        );
        let worker = JobWorker::new(
            jobs.clone(),
            queue.clone(),
            sharing.clone(),
            WorkerSettings {
                queue_wait: Duration::from_millis(10),
                store_timeout: STORE_TIMEOUT,
                retry_backoff: Duration::from_secs(30),
            },
        );

        Self {
            galleries,
            jobs,
            queue,
            notifier,
            photos,
            sharing,
            gate,
            scheduler,
            worker,
            policy,
        }
    }

    /// Insert an unshared gallery owned by [`OWNER`].
    pub fn add_gallery(&self, name: &str) -> Gallery {
        let gallery = new_gallery(OWNER, name);
        self.galleries.insert(gallery.clone());
        gallery
    }

    pub fn gallery(&self, gallery_id: Uuid) -> Gallery {
        self.galleries.get(gallery_id).expect("gallery exists")
    }

    /// The cleanup job referenced by the gallery.
    pub fn cleanup_job(&self, gallery_id: Uuid) -> Job {
        let job_id = self
            .gallery(gallery_id)
            .sharing
            .sharing_cleanup_job_id
            .expect("gallery references a cleanup job");
        self.jobs.get(job_id).expect("cleanup job exists")
    }

    /// Run the scheduler then drain the queue, all at `now`.
    pub async fn run_due(&self, now: DateTime<Utc>) -> usize {
        self.scheduler.tick(now).await.expect("scheduler tick");
        let mut processed = 0;
        while self.worker.process_next(now).await.expect("worker step") {
            processed += 1;
        }
        processed
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            Collaborators {
                galleries: self.galleries.clone(),
                jobs: self.jobs.clone(),
                photos: self.photos.clone(),
                queue: self.queue.clone(),
                storage: Arc::new(FakeStorage),
                notifier: self.notifier.clone(),
            },
            JwtValidator::new(JWT_SECRET),
            sharing_settings(self.policy),
            Duration::from_secs(600),
        )
    }
}

pub fn sharing_settings(policy: CleanupPolicy) -> SharingSettings {
    SharingSettings {
        frontend_origin: FRONTEND_ORIGIN.to_string(),
        cleanup_policy: policy,
        store_timeout: STORE_TIMEOUT,
    }
}

/// Signed owner bearer token valid for an hour.
pub fn owner_token(user_id: &str) -> String {
    let claims = OwnerClaims {
        sub: user_id.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token encodes")
}
