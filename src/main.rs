use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use halftone::{
    app_state::{AppState, Collaborators},
    config::AppConfig,
    db::{self, PgGalleryStore, PgJobStore, PgPhotoStore},
    middleware::owner_auth::JwtValidator,
    routes,
    services::{
        notify::{LogNotifier, Notifier, PushNotifier},
        queue::RedisWorkQueue,
        sharing::SharingSettings,
        storage::S3Storage,
    },
};

const API_QUEUE_CLIENT_ID: &str = "api";

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing halftone API server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Initializing object storage client");
    let storage = S3Storage::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize object storage client");

    tracing::info!("Connecting to Redis work queue");
    // The API only pushes and pings; it never pulls into a processing list.
    let queue = RedisWorkQueue::new(&config.redis_url, API_QUEUE_CLIENT_ID.to_string())
        .expect("Failed to initialize work queue");

    let notifier: Arc<dyn Notifier> = match &config.push_endpoint {
        Some(endpoint) => Arc::new(
            PushNotifier::new(endpoint.clone(), config.push_api_key.clone())
                .expect("Failed to initialize push notifier"),
        ),
        None => Arc::new(LogNotifier),
    };

    let collaborators = Collaborators {
        galleries: Arc::new(PgGalleryStore::new(db_pool.clone())),
        jobs: Arc::new(PgJobStore::new(db_pool.clone())),
        photos: Arc::new(PgPhotoStore::new(db_pool)),
        queue: Arc::new(queue),
        storage: Arc::new(storage),
        notifier,
    };

    let state = AppState::new(
        collaborators,
        JwtValidator::new(&config.jwt_secret),
        SharingSettings {
            frontend_origin: config.frontend_origin.clone(),
            cleanup_policy: config.cleanup_policy,
            store_timeout: config.store_timeout(),
        },
        config.photo_url_ttl(),
    );

    let app = routes::build_router(state).merge(
        Router::new()
            .route("/metrics", get(routes::metrics::prometheus_metrics))
            .with_state(prometheus_handle),
    );

    tracing::info!(
        cleanup_policy = %config.cleanup_policy,
        "Starting halftone on {}",
        config.bind_addr
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");
}
