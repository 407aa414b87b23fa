use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

use crate::models::weather::{CurrentWeatherResponse, FetchError, FetchErrorKind, Snapshot};

/// One lookup of current conditions for one city.
///
/// Implementations never panic or return anything but the two result
/// shapes; every failure is categorized as a [`FetchError`].
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    async fn fetch(&self, city: &str) -> Result<Snapshot, FetchError>;
}

/// Client for the WeatherAPI `current.json` endpoint.
pub struct WeatherApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl WeatherApiClient {
    /// Build a client with a fixed per-request timeout.
    ///
    /// An empty or wrong `api_key` is accepted here; the provider rejects it
    /// per request, which surfaces as `Upstream` item failures.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("weather-aggregator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl WeatherFetcher for WeatherApiClient {
    async fn fetch(&self, city: &str) -> Result<Snapshot, FetchError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("key", self.api_key.as_str()), ("q", city)])
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(classify_request_error)?;

        if !status.is_success() {
            return Err(FetchError::new(
                FetchErrorKind::Upstream,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        let parsed: CurrentWeatherResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::new(FetchErrorKind::Parse, e.to_string()))?;

        Ok(parsed.current.into_snapshot(Utc::now()))
    }
}

/// Map a reqwest failure to an item error. The URL is stripped so the API
/// key never reaches stored error details.
fn classify_request_error(err: reqwest::Error) -> FetchError {
    let kind = if err.is_builder() {
        FetchErrorKind::Unexpected
    } else {
        FetchErrorKind::Transport
    };
    FetchError::new(kind, format!("Request failed: {}", err.without_url()))
}
