use serde::Deserialize;
use std::time::Duration;

use crate::services::executor::DEFAULT_FETCH_CONCURRENCY;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for job queue
    pub redis_url: String,

    /// WeatherAPI key. A missing key is not a startup error; every city
    /// then fails with an upstream error.
    #[serde(default)]
    pub weather_api_key: String,

    /// Current-conditions endpoint
    #[serde(default = "default_weather_api_url")]
    pub weather_api_url: String,

    /// Per-city request timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Maximum concurrent city fetches within one job
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Worker sleep between empty queue polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Prometheus listener of the worker process
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_weather_api_url() -> String {
    "https://api.weatherapi.com/v1/current.json".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_fetch_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
