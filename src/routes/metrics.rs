use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus scrape endpoint in text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for the metrics emitted by the API and the worker.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "gallery_sharing_activated_total",
        "Sharing windows opened"
    );
    metrics::describe_counter!(
        "gallery_sharing_rescheduled_total",
        "Sharing windows moved"
    );
    metrics::describe_counter!("gallery_sharing_stopped_total", "Sharing windows revoked by the owner");
    metrics::describe_counter!(
        "gallery_sharing_cleanups_total",
        "Cleanup job executions by outcome"
    );
    metrics::describe_counter!(
        "gallery_access_denied_total",
        "Client requests refused by the access gate, by reason"
    );
    metrics::describe_counter!("gallery_orders_created_total", "Client print orders created");
    metrics::describe_counter!(
        "gallery_jobs_dispatched_total",
        "Due jobs pushed to the work queue"
    );
    metrics::describe_counter!(
        "gallery_jobs_processed_total",
        "Jobs handled by workers, by outcome"
    );
    metrics::describe_histogram!(
        "gallery_job_duration_seconds",
        "Time to execute one job"
    );
    metrics::describe_gauge!(
        "gallery_queue_depth",
        "Messages waiting in the gallery lane"
    );
}
