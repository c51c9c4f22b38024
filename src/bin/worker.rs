use halftone::{
    config::AppConfig,
    db::{self, GalleryStore, JobStore, PgGalleryStore, PgJobStore},
    routes::metrics::describe_metrics,
    services::{
        notify::{LogNotifier, Notifier, PushNotifier},
        queue::{RedisWorkQueue, WorkQueue},
        scheduler::{SchedulerDriver, SchedulerSettings},
        sharing::{SharingService, SharingSettings},
        worker::{JobWorker, WorkerSettings},
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const RETRY_BACKOFF_SECS: u64 = 30;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting gallery job worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let worker_id = config
        .stable_worker_id()
        .expect("WORKER_ID must be set to an id that stays the same across restarts")
        .to_string();

    let metrics_addr = config
        .worker_metrics_addr()
        .expect("WORKER_METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to start Prometheus metrics listener");
    describe_metrics();
    tracing::info!("Serving worker metrics on {}", metrics_addr);

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Initializing services");
    let galleries: Arc<dyn GalleryStore> = Arc::new(PgGalleryStore::new(db_pool.clone()));
    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db_pool));
    let queue: Arc<dyn WorkQueue> = Arc::new(
        RedisWorkQueue::new(&config.redis_url, worker_id.clone())
            .expect("Failed to initialize work queue"),
    );
    let notifier: Arc<dyn Notifier> = match &config.push_endpoint {
        Some(endpoint) => Arc::new(
            PushNotifier::new(endpoint.clone(), config.push_api_key.clone())
                .expect("Failed to initialize push notifier"),
        ),
        None => Arc::new(LogNotifier),
    };

    let sharing = Arc::new(SharingService::new(
        galleries,
        jobs.clone(),
        notifier,
        SharingSettings {
            frontend_origin: config.frontend_origin.clone(),
            cleanup_policy: config.cleanup_policy,
            store_timeout: config.store_timeout(),
        },
    ));

    let scheduler = SchedulerDriver::new(
        jobs.clone(),
        queue.clone(),
        SchedulerSettings {
            worker_id: worker_id.clone(),
            batch_size: config.scheduler_batch_size,
            poll_interval: config.scheduler_poll_interval(),
            visibility_timeout: config.job_visibility_timeout(),
            store_timeout: config.store_timeout(),
        },
    );

    let worker = JobWorker::new(
        jobs,
        queue,
        sharing,
        WorkerSettings {
            queue_wait: config.queue_wait(),
            store_timeout: config.store_timeout(),
            retry_backoff: Duration::from_secs(RETRY_BACKOFF_SECS),
        },
    );

    let shutdown = CancellationToken::new();
    let scheduler_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });
    let worker_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    tracing::info!(worker_id = %worker_id, "Worker ready");

    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received, draining");
    shutdown.cancel();

    if let Err(e) = scheduler_task.await {
        tracing::error!(error = %e, "Scheduler task ended abnormally");
    }
    if let Err(e) = worker_task.await {
        tracing::error!(error = %e, "Worker task ended abnormally");
    }

    tracing::info!("Worker stopped");
}
