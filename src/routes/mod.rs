use axum::routing::get;
use axum::Router;

use crate::app_state::AppState;

pub mod health;
pub mod metrics;
pub mod weather;

/// API routes backed by the shared state.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/weather/requests",
            get(weather::list_weather_requests).post(weather::submit_weather_request),
        )
        .route(
            "/api/v1/weather/requests/{request_id}",
            get(weather::get_weather_request),
        )
        .with_state(state)
}
