//! Shared harness for executor and API tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use weather_aggregator::services::executor::JobExecutor;
use weather_aggregator::services::queue::{JobDispatcher, QueueError, QueuedJob};
use weather_aggregator::services::store::InMemoryJobStore;
use weather_aggregator::services::weather::WeatherApiClient;

pub const PROVIDER_PATH: &str = "/v1/current.json";
pub const API_KEY: &str = "test-key";

/// Stand-in for the weather provider.
pub struct Provider {
    pub server: MockServer,
}

impl Provider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub async fn respond_json(&self, city: &str, body: Value) {
        self.respond(city, ResponseTemplate::new(200).set_body_json(body)).await;
    }

    pub async fn respond_status(&self, city: &str, status: u16, body: &str) {
        self.respond(city, ResponseTemplate::new(status).set_body_string(body.to_string()))
            .await;
    }

    pub async fn respond(&self, city: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(PROVIDER_PATH))
            .and(query_param("q", city))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    pub fn client(&self, timeout: Duration) -> WeatherApiClient {
        WeatherApiClient::new(format!("{}{}", self.server.uri(), PROVIDER_PATH), API_KEY, timeout)
            .expect("client should build")
    }
}

/// Executor over an in-memory store and the mock provider.
pub fn executor(provider: &Provider, store: Arc<InMemoryJobStore>, timeout: Duration) -> JobExecutor {
    JobExecutor::new(store, Arc::new(provider.client(timeout)))
}

pub fn cities(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Dispatcher that keeps messages in memory, or refuses them.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<QueuedJob>>,
    pub reject: bool,
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), QueueError> {
        if self.reject {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "queue unavailable",
            ))));
        }
        self.sent.lock().await.push(job.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        if self.reject {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "queue unavailable",
            ))));
        }
        Ok(())
    }
}
