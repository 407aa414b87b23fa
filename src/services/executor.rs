use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;

use crate::models::job::{ItemOutcome, ItemResult, JobId, JobStatus, WeatherJob};
use crate::models::weather::{FetchError, FetchErrorKind};
use crate::services::aggregate::status_for_tally;
use crate::services::store::{JobStore, StoreError};
use crate::services::weather::WeatherFetcher;

pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Job-level failure. Item failures never show up here.
#[derive(Debug, Clone, Serialize, PartialEq, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobError {
    #[error("Weather request {0} not found")]
    NotFound(JobId),

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => JobError::NotFound(id),
            other => JobError::Persistence(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Per-city line of an [`ExecutionReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub city: String,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FetchErrorKind>,
    pub detail: String,
}

impl From<&ItemResult> for ItemReport {
    fn from(result: &ItemResult) -> Self {
        match &result.outcome {
            ItemOutcome::Success(snapshot) => ItemReport {
                city: result.city.clone(),
                outcome: OutcomeKind::Success,
                error_kind: None,
                detail: format!(
                    "{:.1}C, wind {:.1} kph, humidity {:.0}%",
                    snapshot.temperature, snapshot.wind_kph, snapshot.humidity
                ),
            },
            ItemOutcome::Failure(error) => ItemReport {
                city: result.city.clone(),
                outcome: OutcomeKind::Failure,
                error_kind: Some(error.kind),
                detail: error.detail.clone(),
            },
        }
    }
}

/// Summary of one `execute` call, for logs. The stored job and results are
/// the record of truth.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub job_id: JobId,
    pub item_count: i32,
    pub success_count: u32,
    pub final_status: Option<JobStatus>,
    pub items: Vec<ItemReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl ExecutionReport {
    fn started(job: &WeatherJob) -> Self {
        Self {
            job_id: job.id,
            item_count: job.item_count,
            success_count: 0,
            final_status: None,
            items: Vec::new(),
            error: None,
        }
    }

    fn aborted(job_id: JobId, error: JobError) -> Self {
        Self {
            job_id,
            item_count: 0,
            success_count: 0,
            final_status: None,
            items: Vec::new(),
            error: Some(error),
        }
    }

    fn record(&mut self, result: &ItemResult) {
        if result.outcome.is_success() {
            self.success_count += 1;
        }
        self.items.push(ItemReport::from(result));
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs one batch: fetch every city, append each outcome, then settle the
/// job's terminal status.
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    fetcher: Arc<dyn WeatherFetcher>,
    fetch_concurrency: usize,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn JobStore>, fetcher: Arc<dyn WeatherFetcher>) -> Self {
        Self {
            store,
            fetcher,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    /// Maximum in-flight fetches per job. `1` fetches sequentially.
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency.max(1);
        self
    }

    /// Execute a batch for an existing job.
    ///
    /// Never fails: job-level problems are returned in
    /// [`ExecutionReport::error`]. Calling this again for the same job
    /// appends another full set of results and recomputes the status over
    /// everything recorded.
    pub async fn execute(&self, job_id: JobId, cities: &[String]) -> ExecutionReport {
        let started = Instant::now();

        let job = match self.store.get(job_id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Weather request unavailable, nothing executed");
                return ExecutionReport::aborted(job_id, e.into());
            }
        };

        tracing::info!(
            job_id,
            cities = cities.len(),
            item_count = job.item_count,
            "Executing weather request"
        );

        let mut report = ExecutionReport::started(&job);
        let concurrency = self.fetch_concurrency.min(cities.len()).max(1);

        // `buffered` yields in input order, so results are appended in the
        // order the cities were submitted.
        let mut outcomes = pin!(stream::iter(cities.iter().cloned())
            .map(|city| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    let outcome = fetch_isolated(fetcher, city.clone()).await;
                    (city, outcome)
                }
            })
            .buffered(concurrency));

        let mut persist_error = None;
        while let Some((city, outcome)) = outcomes.next().await {
            let result = ItemResult::new(job_id, city, outcome);

            match &result.outcome {
                ItemOutcome::Success(_) => {
                    tracing::debug!(job_id, city = %result.city, "City fetched");
                    metrics::counter!("weather_items_total", "outcome" => "success").increment(1);
                }
                ItemOutcome::Failure(err) => {
                    tracing::warn!(job_id, city = %result.city, error = %err, "City fetch failed");
                    metrics::counter!("weather_items_total", "outcome" => "failure").increment(1);
                }
            }

            if let Err(e) = self.store.append_result(&result).await {
                tracing::error!(job_id, city = %result.city, error = %e, "Failed to record city result");
                persist_error = Some(e);
                break;
            }
            report.record(&result);
        }

        if let Some(e) = persist_error {
            return self.fail_job(report, e, started).await;
        }

        let tally = match self.store.tally(job_id).await {
            Ok(tally) => tally,
            Err(e) => return self.fail_job(report, e, started).await,
        };
        let status = status_for_tally(tally);

        if let Err(e) = self.store.set_status(job_id, status).await {
            tracing::error!(job_id, status = %status, error = %e, "Failed to persist final status");
            return self.fail_job(report, e, started).await;
        }
        report.final_status = Some(status);

        record_finished(status, started);

        tracing::info!(
            job_id,
            status = %status,
            success_count = report.success_count,
            attempted = tally.attempted,
            duration_ms = started.elapsed().as_millis() as u64,
            "Weather request finished"
        );

        report
    }

    /// Best-effort move to `FAILED` after a persistence error.
    async fn fail_job(
        &self,
        mut report: ExecutionReport,
        cause: StoreError,
        started: Instant,
    ) -> ExecutionReport {
        let job_id = report.job_id;

        match self.store.set_status(job_id, JobStatus::Failed).await {
            Ok(()) => {
                report.final_status = Some(JobStatus::Failed);
                tracing::warn!(job_id, error = %cause, "Weather request marked FAILED");
            }
            Err(e) => {
                tracing::error!(
                    job_id,
                    error = %cause,
                    status_error = %e,
                    "Weather request could not be marked FAILED"
                );
            }
        }

        record_finished(JobStatus::Failed, started);
        report.error = Some(cause.into());
        report
    }
}

fn record_finished(status: JobStatus, started: Instant) {
    metrics::counter!("weather_jobs_finished_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("weather_job_duration_seconds").record(started.elapsed().as_secs_f64());
}

/// Run one fetch on its own task so a panic becomes an item failure
/// instead of tearing down the batch.
async fn fetch_isolated(fetcher: Arc<dyn WeatherFetcher>, city: String) -> ItemOutcome {
    let handle = tokio::spawn(async move { fetcher.fetch(&city).await });

    match handle.await {
        Ok(result) => result.into(),
        Err(join_err) => ItemOutcome::Failure(FetchError::new(
            FetchErrorKind::Unexpected,
            format!("Unexpected error: {}", join_err),
        )),
    }
}
