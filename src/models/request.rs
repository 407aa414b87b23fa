use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{ItemResult, JobId, JobStatus, WeatherJob};

/// Body of `POST /api/v1/weather/requests`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitWeatherRequest {
    #[garde(
        length(min = 1, max = 10),
        inner(length(chars, min = 1, max = 100), custom(printable_city))
    )]
    pub cities: Vec<String>,
}

/// City names end up in `TEXT` columns, which cannot hold NUL, so control
/// characters are refused at the door.
fn printable_city(value: &str, _ctx: &()) -> garde::Result {
    if value.chars().any(char::is_control) {
        return Err(garde::Error::new("must not contain control characters"));
    }
    Ok(())
}

impl SubmitWeatherRequest {
    /// Trim every city name. Blank names become empty and fail validation.
    pub fn normalized(self) -> Self {
        Self {
            cities: self
                .cities
                .into_iter()
                .map(|city| city.trim().to_string())
                .collect(),
        }
    }
}

/// Response after submitting a batch.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitWeatherResponse {
    pub message: String,
    pub request_id: JobId,
    pub task_id: Uuid,
    pub cities: Vec<String>,
    pub status: JobStatus,
}

/// A job together with its recorded city results.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: WeatherJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ItemResult>>,
}

/// Query string of the listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub include_results: bool,
}

/// Response of the listing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub count: usize,
    pub results: Vec<JobDetail>,
}
