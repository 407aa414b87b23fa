use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus metrics scrape endpoint.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for the metrics emitted by the API and worker.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "weather_jobs_submitted_total",
        "Weather requests accepted and queued"
    );
    metrics::describe_counter!(
        "weather_jobs_finished_total",
        "Weather requests that reached a terminal status, by status"
    );
    metrics::describe_counter!(
        "weather_items_total",
        "City lookups, by outcome"
    );
    metrics::describe_histogram!(
        "weather_job_duration_seconds",
        "Time to execute one weather request"
    );
    metrics::describe_gauge!(
        "weather_queue_depth",
        "Weather requests waiting in the queue"
    );
}
