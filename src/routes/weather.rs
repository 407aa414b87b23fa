use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::app_state::AppState;
use crate::models::job::JobId;
use crate::models::request::{
    JobDetail, JobListResponse, ListJobsQuery, SubmitWeatherRequest, SubmitWeatherResponse,
};
use crate::services::jobs::{self, SubmitError};
use crate::services::store::StoreError;

/// Caller address used to scope listings: the first `X-Forwarded-For` hop,
/// else the peer address.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOrigin(pub Option<String>);

impl<S> FromRequestParts<S> for ClientOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);

        let origin = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(ClientOrigin(origin))
    }
}

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound,
    Dispatch { request_id: JobId, details: String },
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(details) => ApiError::Validation(details),
            SubmitError::Store(e) => ApiError::Internal(e.to_string()),
            SubmitError::Dispatch { job_id, source } => ApiError::Dispatch {
                request_id: job_id,
                details: source.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid input", "details": details }),
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "Weather request not found" }),
            ),
            ApiError::Dispatch { request_id, details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Failed to process weather request",
                    "details": details,
                    "request_id": request_id,
                }),
            ),
            ApiError::Internal(details) => {
                tracing::error!(error = %details, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// POST /api/v1/weather/requests: submit a batch of cities.
pub async fn submit_weather_request(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    payload: Result<Json<SubmitWeatherRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitWeatherResponse>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    let response = jobs::submit_job(
        state.store.as_ref(),
        state.dispatcher.as_ref(),
        origin.as_deref(),
        request,
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /api/v1/weather/requests/{request_id}: job with its city results.
pub async fn get_weather_request(
    State(state): State<AppState>,
    Path(request_id): Path<JobId>,
) -> Result<Json<JobDetail>, ApiError> {
    let detail = jobs::job_detail(state.store.as_ref(), request_id).await?;
    Ok(Json(detail))
}

/// GET /api/v1/weather/requests: jobs submitted from the caller's address.
pub async fn list_weather_requests(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let list = jobs::list_jobs(state.store.as_ref(), origin.as_deref(), query.include_results).await?;
    Ok(Json(list))
}
