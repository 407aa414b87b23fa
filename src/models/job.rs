use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::weather::{FetchError, Snapshot};

pub type JobId = i64;

/// Status of a batch weather job.
///
/// A job starts `Pending` and is moved to exactly one of the terminal
/// states by the executor once every city has been attempted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Success,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// A batch weather request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherJob {
    pub id: JobId,
    pub origin: Option<String>,
    pub status: JobStatus,
    pub item_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome for one city. Success and failure are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Success(Snapshot),
    Failure(FetchError),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            ItemOutcome::Success(snapshot) => Some(snapshot),
            ItemOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            ItemOutcome::Success(_) => None,
            ItemOutcome::Failure(error) => Some(error),
        }
    }
}

impl From<Result<Snapshot, FetchError>> for ItemOutcome {
    fn from(result: Result<Snapshot, FetchError>) -> Self {
        match result {
            Ok(snapshot) => ItemOutcome::Success(snapshot),
            Err(error) => ItemOutcome::Failure(error),
        }
    }
}

/// Persisted outcome for one city within a job. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemResult {
    pub job_id: JobId,
    pub city: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
    pub completed_at: DateTime<Utc>,
}

impl ItemResult {
    pub fn new(job_id: JobId, city: impl Into<String>, outcome: ItemOutcome) -> Self {
        Self {
            job_id,
            city: city.into(),
            outcome,
            completed_at: Utc::now(),
        }
    }
}

/// Counts over every result recorded for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultTally {
    pub attempted: u32,
    pub succeeded: u32,
}
