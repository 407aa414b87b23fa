use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::job::{ItemResult, JobId, JobStatus, ResultTally, WeatherJob};

/// Persistence for jobs and their append-only city results.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job in `PENDING` for `item_count` cities.
    async fn create(&self, origin: Option<&str>, item_count: i32) -> Result<WeatherJob, StoreError>;

    async fn get(&self, job_id: JobId) -> Result<WeatherJob, StoreError>;

    /// All results recorded for a job, in append order.
    async fn results(&self, job_id: JobId) -> Result<Vec<ItemResult>, StoreError>;

    /// Append one result. Fails with `NotFound` if the job is gone.
    async fn append_result(&self, result: &ItemResult) -> Result<(), StoreError>;

    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), StoreError>;

    async fn tally(&self, job_id: JobId) -> Result<ResultTally, StoreError>;

    /// Jobs submitted from `origin`, most recent first.
    async fn list_by_origin(&self, origin: Option<&str>) -> Result<Vec<WeatherJob>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Weather request {0} not found")]
    NotFound(JobId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[derive(Default)]
struct MemoryState {
    next_id: JobId,
    jobs: HashMap<JobId, WeatherJob>,
    results: HashMap<JobId, Vec<ItemResult>>,
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct InMemoryJobStore {
    state: RwLock<MemoryState>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a job and cascade its results.
    pub async fn delete(&self, job_id: JobId) -> bool {
        let mut state = self.state.write().await;
        state.results.remove(&job_id);
        state.jobs.remove(&job_id).is_some()
    }

    /// Total result rows across all jobs.
    pub async fn result_row_count(&self) -> usize {
        self.state.read().await.results.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, origin: Option<&str>, item_count: i32) -> Result<WeatherJob, StoreError> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let now = Utc::now();
        let job = WeatherJob {
            id: state.next_id,
            origin: origin.map(str::to_string),
            status: JobStatus::Pending,
            item_count,
            created_at: now,
            updated_at: now,
        };
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, job_id: JobId) -> Result<WeatherJob, StoreError> {
        self.state
            .read()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn results(&self, job_id: JobId) -> Result<Vec<ItemResult>, StoreError> {
        let state = self.state.read().await;
        if !state.jobs.contains_key(&job_id) {
            return Err(StoreError::NotFound(job_id));
        }
        Ok(state.results.get(&job_id).cloned().unwrap_or_default())
    }

    async fn append_result(&self, result: &ItemResult) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(&result.job_id)
            .ok_or(StoreError::NotFound(result.job_id))?;
        job.updated_at = Utc::now();
        state
            .results
            .entry(result.job_id)
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let job = state.jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        job.status = status;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn tally(&self, job_id: JobId) -> Result<ResultTally, StoreError> {
        let state = self.state.read().await;
        if !state.jobs.contains_key(&job_id) {
            return Err(StoreError::NotFound(job_id));
        }
        let results = state.results.get(&job_id).map(Vec::as_slice).unwrap_or_default();
        Ok(ResultTally {
            attempted: results.len() as u32,
            succeeded: results.iter().filter(|r| r.outcome.is_success()).count() as u32,
        })
    }

    async fn list_by_origin(&self, origin: Option<&str>) -> Result<Vec<WeatherJob>, StoreError> {
        let state = self.state.read().await;
        let mut jobs: Vec<WeatherJob> = state
            .jobs
            .values()
            .filter(|job| job.origin.as_deref() == origin)
            .cloned()
            .collect();
        // Ids break ties between jobs created within the same instant.
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
