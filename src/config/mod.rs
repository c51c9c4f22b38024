use serde::Deserialize;
use std::time::Duration;
use std::net::{AddrParseError, SocketAddr};

use crate::services::sharing::CleanupPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Ignored by the worker.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the work queue
    pub redis_url: String,

    /// HS256 secret for owner bearer tokens
    pub jwt_secret: String,

    /// Public origin of the client app, prefix of every share URL
    pub frontend_origin: String,

    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    /// Lifetime of presigned photo URLs
    #[serde(default = "default_photo_url_ttl_secs")]
    pub photo_url_ttl_secs: u64,

    /// Push gateway endpoint. Notifications are only logged when unset.
    #[serde(default)]
    pub push_endpoint: Option<String>,

    #[serde(default)]
    pub push_api_key: Option<String>,

    #[serde(default)]
    pub cleanup_policy: CleanupPolicy,

    /// Deadline for every store and queue call
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    #[serde(default = "default_scheduler_poll_interval_ms")]
    pub scheduler_poll_interval_ms: u64,

    #[serde(default = "default_scheduler_batch_size")]
    pub scheduler_batch_size: i64,

    /// How long a dispatched job may stay active before it is released
    #[serde(default = "default_job_visibility_timeout_secs")]
    pub job_visibility_timeout_secs: u64,

    /// Bounded wait of one blocking queue pull
    #[serde(default = "default_queue_wait_secs")]
    pub queue_wait_secs: u64,

    /// Identity of a worker process. Names its Redis processing list, so it
    /// must stay the same across restarts for start-up recovery to find the
    /// messages a previous run left unacknowledged. Required by the worker.
    #[serde(default)]
    pub worker_id: Option<String>,

    /// Address of the worker's Prometheus scrape endpoint
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_s3_region() -> String {
    "auto".to_string()
}

fn default_photo_url_ttl_secs() -> u64 {
    3600
}

fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_scheduler_poll_interval_ms() -> u64 {
    1000
}

fn default_scheduler_batch_size() -> i64 {
    100
}

fn default_job_visibility_timeout_secs() -> u64 {
    300
}

fn default_queue_wait_secs() -> u64 {
    5
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9091".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn photo_url_ttl(&self) -> Duration {
        Duration::from_secs(self.photo_url_ttl_secs)
    }

    pub fn scheduler_poll_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_poll_interval_ms)
    }

    pub fn job_visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.job_visibility_timeout_secs)
    }

    pub fn queue_wait(&self) -> Duration {
        Duration::from_secs(self.queue_wait_secs)
    }

    /// The configured worker id, if set to something non-blank.
    pub fn stable_worker_id(&self) -> Option<&str> {
        self.worker_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn worker_metrics_addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.worker_metrics_addr.parse()
    }
}
