//! Submission and lookup operations used by the HTTP layer.

use garde::Validate;

use crate::models::job::{JobId, JobStatus};
use crate::models::request::{JobDetail, JobListResponse, SubmitWeatherRequest, SubmitWeatherResponse};
use crate::services::queue::{JobDispatcher, QueueError, QueuedJob};
use crate::services::store::{JobStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to dispatch weather request {job_id}: {source}")]
    Dispatch {
        job_id: JobId,
        #[source]
        source: QueueError,
    },
}

/// Validate the batch, create a `PENDING` job and hand it to the worker.
///
/// If the dispatcher rejects the message the job is marked `FAILED` so it
/// never lingers as pending.
pub async fn submit_job(
    store: &dyn JobStore,
    dispatcher: &dyn JobDispatcher,
    origin: Option<&str>,
    request: SubmitWeatherRequest,
) -> Result<SubmitWeatherResponse, SubmitError> {
    let request = request.normalized();
    request
        .validate()
        .map_err(|report| SubmitError::Validation(report.to_string()))?;

    let job = store.create(origin, request.cities.len() as i32).await?;
    let message = QueuedJob::new(job.id, request.cities);

    if let Err(e) = dispatcher.dispatch(&message).await {
        tracing::error!(job_id = job.id, error = %e, "Failed to enqueue weather request");
        if let Err(status_err) = store.set_status(job.id, JobStatus::Failed).await {
            tracing::error!(job_id = job.id, error = %status_err, "Failed to mark undispatched request FAILED");
        }
        return Err(SubmitError::Dispatch {
            job_id: job.id,
            source: e,
        });
    }

    metrics::counter!("weather_jobs_submitted_total").increment(1);
    tracing::info!(
        job_id = job.id,
        task_id = %message.task_id,
        cities = message.cities.len(),
        origin = origin.unwrap_or("-"),
        "Weather request submitted"
    );

    Ok(SubmitWeatherResponse {
        message: "Weather request submitted successfully".to_string(),
        request_id: job.id,
        task_id: message.task_id,
        cities: message.cities,
        status: job.status,
    })
}

/// A job with every recorded result.
pub async fn job_detail(store: &dyn JobStore, job_id: JobId) -> Result<JobDetail, StoreError> {
    let job = store.get(job_id).await?;
    let results = store.results(job_id).await?;
    Ok(JobDetail {
        job,
        results: Some(results),
    })
}

/// Jobs for an origin, newest first. Results are loaded only on request.
pub async fn list_jobs(
    store: &dyn JobStore,
    origin: Option<&str>,
    include_results: bool,
) -> Result<JobListResponse, StoreError> {
    let jobs = store.list_by_origin(origin).await?;

    let mut details = Vec::with_capacity(jobs.len());
    for job in jobs {
        let results = if include_results {
            Some(store.results(job.id).await?)
        } else {
            None
        };
        details.push(JobDetail { job, results });
    }

    Ok(JobListResponse {
        count: details.len(),
        results: details,
    })
}
