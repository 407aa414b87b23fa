use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use weather_aggregator::{
    config::AppConfig,
    db::{self, PgJobStore},
    routes::metrics::describe_metrics,
    services::{executor::JobExecutor, queue::JobQueue, weather::WeatherApiClient},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting weather worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Worker metrics are scraped from their own listener
    let metrics_addr: SocketAddr = config
        .worker_metrics_addr
        .parse()
        .expect("Invalid WORKER_METRICS_ADDR");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    describe_metrics();

    if config.weather_api_key.is_empty() {
        tracing::warn!("WEATHER_API_KEY is not set; every city lookup will be rejected upstream");
    }

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    let weather_client = WeatherApiClient::new(
        &config.weather_api_url,
        &config.weather_api_key,
        config.fetch_timeout(),
    )
    .expect("Failed to initialize weather client");

    let executor = JobExecutor::new(Arc::new(PgJobStore::new(db_pool)), Arc::new(weather_client))
        .with_fetch_concurrency(config.fetch_concurrency);

    tracing::info!(
        fetch_concurrency = config.fetch_concurrency,
        fetch_timeout_secs = config.fetch_timeout_secs,
        "Worker ready, starting job processing loop"
    );

    // Main processing loop
    loop {
        match process_next_job(&queue, &executor).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(config.poll_interval()).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing job, will retry");
                sleep(config.poll_interval()).await;
            }
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was processed, Ok(false) if no job available.
async fn process_next_job(
    queue: &JobQueue,
    executor: &JobExecutor,
) -> Result<bool, Box<dyn std::error::Error>> {
    if let Ok(depth) = queue.queue_depth().await {
        metrics::gauge!("weather_queue_depth").set(depth as f64);
    }

    let job = match queue.dequeue().await? {
        Some(j) => j,
        None => return Ok(false),
    };

    tracing::info!(
        job_id = job.job_id,
        task_id = %job.task_id,
        cities = job.cities.len(),
        "Processing weather request"
    );

    // Single attempt per job: whatever the outcome, the message is done.
    let report = executor.execute(job.job_id, &job.cities).await;
    let summary = serde_json::to_string(&report)?;

    match &report.error {
        None => tracing::info!(
            job_id = report.job_id,
            task_id = %job.task_id,
            report = %summary,
            "Weather request processed"
        ),
        Some(e) => tracing::error!(
            job_id = report.job_id,
            task_id = %job.task_id,
            error = %e,
            report = %summary,
            "Weather request ended with a job-level error"
        ),
    }

    queue.complete(&job).await?;

    Ok(true)
}
