//! Batch execution against a mocked provider and the in-memory store

mod fixtures;
mod helpers;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use wiremock::ResponseTemplate;

use helpers::*;
use weather_aggregator::models::job::{ItemResult, JobId, JobStatus, ResultTally, WeatherJob};
use weather_aggregator::models::weather::{FetchError, FetchErrorKind, Snapshot};
use weather_aggregator::services::executor::{JobError, JobExecutor, OutcomeKind};
use weather_aggregator::services::store::{InMemoryJobStore, JobStore, StoreError};
use weather_aggregator::services::weather::WeatherFetcher;

const TIMEOUT: Duration = Duration::from_secs(5);

fn assert_well_shaped(results: &[ItemResult]) {
    for result in results {
        let has_snapshot = result.outcome.snapshot().is_some();
        let has_error = result.outcome.error().is_some();
        assert!(has_snapshot ^ has_error, "malformed result for {}", result.city);
    }
}

#[tokio::test]
async fn test_single_city_success() {
    let provider = Provider::start().await;
    provider.respond_json("London", fixtures::london()).await;
    let store = Arc::new(InMemoryJobStore::new());
    let job = store.create(Some("127.0.0.1"), 1).await.unwrap();

    let report = executor(&provider, store.clone(), TIMEOUT)
        .execute(job.id, &cities(&["London"]))
        .await;

    assert!(report.is_ok());
    assert_eq!(report.final_status, Some(JobStatus::Success));
    assert_eq!(report.success_count, 1);
    assert_eq!(store.get(job.id).await.unwrap().status, JobStatus::Success);

    let results = store.results(job.id).await.unwrap();
    assert_eq!(results.len(), 1);
    let snapshot = results[0].outcome.snapshot().expect("success-shaped");
    assert_eq!(results[0].city, "London");
    assert_eq!(snapshot.temperature, 14.0);
    assert_eq!(snapshot.wind_kph, 19.1);
    assert_eq!(snapshot.humidity, 77.0);
    assert_eq!(
        snapshot.observed_at,
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap()
    );
}

#[tokio::test]
async fn test_unknown_city_fails_job_with_upstream_error() {
    let provider = Provider::start().await;
    provider
        .respond_status("Nowhereville", 404, fixtures::NO_LOCATION_FOUND)
        .await;
    let store = Arc::new(InMemoryJobStore::new());
    let job = store.create(None, 1).await.unwrap();

    let report = executor(&provider, store.clone(), TIMEOUT)
        .execute(job.id, &cities(&["Nowhereville"]))
        .await;

    assert_eq!(report.final_status, Some(JobStatus::Failed));
    assert!(report.is_ok(), "item failures are not job errors");

    let results = store.results(job.id).await.unwrap();
    assert_eq!(results.len(), 1);
    let error = results[0].outcome.error().expect("failure-shaped");
    assert_eq!(error.kind, FetchErrorKind::Upstream);
    assert!(error.detail.contains("404"));
    assert!(error.detail.contains("No matching location found."));
}

#[tokio::test]
async fn test_mixed_outcomes_are_partial() {
    let provider = Provider::start().await;
    provider.respond_json("London", fixtures::london()).await;
    provider
        .respond_status("Nowhereville", 404, fixtures::NO_LOCATION_FOUND)
        .await;
    let store = Arc::new(InMemoryJobStore::new());
    let job = store.create(None, 2).await.unwrap();

    let report = executor(&provider, store.clone(), TIMEOUT)
        .execute(job.id, &cities(&["London", "Nowhereville"]))
        .await;

    assert_eq!(report.final_status, Some(JobStatus::Partial));
    assert_eq!(report.item_count, 2);
    assert_eq!(report.success_count, 1);
    assert_eq!(report.items[0].outcome, OutcomeKind::Success);
    assert_eq!(report.items[1].outcome, OutcomeKind::Failure);

    let results = store.results(job.id).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].outcome.is_success());
    assert!(!results[1].outcome.is_success());
    assert_well_shaped(&results);
}

#[tokio::test]
async fn test_timeouts_for_every_city_fail_the_job() {
    let provider = Provider::start().await;
    for city in ["A", "B", "C"] {
        provider
            .respond(
                city,
                ResponseTemplate::new(200)
                    .set_body_json(fixtures::london())
                    .set_delay(Duration::from_millis(500)),
            )
            .await;
    }
    let store = Arc::new(InMemoryJobStore::new());
    let job = store.create(None, 3).await.unwrap();

    let report = executor(&provider, store.clone(), Duration::from_millis(50))
        .execute(job.id, &cities(&["A", "B", "C"]))
        .await;

    assert_eq!(report.final_status, Some(JobStatus::Failed));
    let results = store.results(job.id).await.unwrap();
    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(
            result.outcome.error().map(|e| e.kind),
            Some(FetchErrorKind::Transport)
        );
    }
}

#[tokio::test]
async fn test_missing_job_writes_nothing() {
    let provider = Provider::start().await;
    provider.respond_json("London", fixtures::london()).await;
    let store = Arc::new(InMemoryJobStore::new());

    let report = executor(&provider, store.clone(), TIMEOUT)
        .execute(9999, &cities(&["London"]))
        .await;

    assert_eq!(report.error, Some(JobError::NotFound(9999)));
    assert_eq!(report.final_status, None);
    assert_eq!(store.result_row_count().await, 0);
    assert!(provider.server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_unparsable_last_updated_still_counts_as_success() {
    let provider = Provider::start().await;
    provider
        .respond_json(
            "London",
            fixtures::current_weather(9.5, 4.0, 88, "sometime this morning"),
        )
        .await;
    let store = Arc::new(InMemoryJobStore::new());
    let job = store.create(None, 1).await.unwrap();
    let before = Utc::now();

    let report = executor(&provider, store.clone(), TIMEOUT)
        .execute(job.id, &cities(&["London"]))
        .await;

    assert_eq!(report.final_status, Some(JobStatus::Success));
    assert_eq!(report.success_count, 1);
    let results = store.results(job.id).await.unwrap();
    let snapshot = results[0].outcome.snapshot().expect("success-shaped");
    assert!(snapshot.observed_at >= before);
}

#[tokio::test]
async fn test_numeric_last_updated_still_counts_as_success() {
    let provider = Provider::start().await;
    let mut body = fixtures::current_weather(9.5, 4.0, 88, "");
    body["current"]["last_updated"] = serde_json::json!(1714550100);
    provider.respond_json("Oslo", body).await;
    let store = Arc::new(InMemoryJobStore::new());
    let job = store.create(None, 1).await.unwrap();

    let report = executor(&provider, store.clone(), TIMEOUT)
        .execute(job.id, &cities(&["Oslo"]))
        .await;

    assert_eq!(report.final_status, Some(JobStatus::Success));
    assert_eq!(report.success_count, 1);
}

#[tokio::test]
async fn test_malformed_body_is_parse_failure() {
    let provider = Provider::start().await;
    provider
        .respond_json("London", serde_json::json!({"current": {"temp_c": "warm"}}))
        .await;
    let store = Arc::new(InMemoryJobStore::new());
    let job = store.create(None, 1).await.unwrap();

    executor(&provider, store.clone(), TIMEOUT)
        .execute(job.id, &cities(&["London"]))
        .await;

    let results = store.results(job.id).await.unwrap();
    assert_eq!(
        results[0].outcome.error().map(|e| e.kind),
        Some(FetchErrorKind::Parse)
    );
    assert_eq!(store.get(job.id).await.unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn test_duplicate_cities_are_fetched_and_recorded_twice() {
    let provider = Provider::start().await;
    provider.respond_json("Paris", fixtures::london()).await;
    let store = Arc::new(InMemoryJobStore::new());
    let job = store.create(None, 2).await.unwrap();

    executor(&provider, store.clone(), TIMEOUT)
        .execute(job.id, &cities(&["Paris", "Paris"]))
        .await;

    assert_eq!(store.results(job.id).await.unwrap().len(), 2);
    assert_eq!(provider.server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_reexecution_appends_and_recomputes_over_all_results() {
    let provider = Provider::start().await;
    provider.respond_json("London", fixtures::london()).await;
    provider
        .respond_status("Nowhereville", 404, fixtures::NO_LOCATION_FOUND)
        .await;
    let store = Arc::new(InMemoryJobStore::new());
    let job = store.create(None, 2).await.unwrap();
    let executor = executor(&provider, store.clone(), TIMEOUT);
    let batch = cities(&["London", "Nowhereville"]);

    executor.execute(job.id, &batch).await;
    let second = executor.execute(job.id, &batch).await;

    assert_eq!(second.final_status, Some(JobStatus::Partial));
    assert_eq!(store.results(job.id).await.unwrap().len(), 4);
    assert_eq!(
        store.tally(job.id).await.unwrap(),
        ResultTally { attempted: 4, succeeded: 2 }
    );
    assert_eq!(store.get(job.id).await.unwrap().item_count, 2);
}

#[tokio::test]
async fn test_result_count_matches_cities_for_every_mix() {
    let provider = Provider::start().await;
    provider.respond_json("Good", fixtures::london()).await;
    provider.respond_status("Bad", 500, "internal error").await;
    let store = Arc::new(InMemoryJobStore::new());
    let executor = executor(&provider, store.clone(), TIMEOUT);

    for good in 0..=3usize {
        for bad in 0..=3usize {
            let total = good + bad;
            if total == 0 {
                continue;
            }
            let mut batch = vec!["Good".to_string(); good];
            batch.extend(std::iter::repeat("Bad".to_string()).take(bad));
            let job = store.create(None, total as i32).await.unwrap();

            let report = executor.execute(job.id, &batch).await;

            let results = store.results(job.id).await.unwrap();
            assert_eq!(results.len(), total);
            assert_well_shaped(&results);
            let expected = if good == total {
                JobStatus::Success
            } else if good == 0 {
                JobStatus::Failed
            } else {
                JobStatus::Partial
            };
            assert_eq!(report.final_status, Some(expected), "{good} good / {bad} bad");
        }
    }
}

/// Fetcher that deletes the job while a given city is being looked up.
struct DeletingFetcher {
    store: Arc<InMemoryJobStore>,
    job_id: JobId,
    delete_on: &'static str,
}

#[async_trait]
impl WeatherFetcher for DeletingFetcher {
    async fn fetch(&self, city: &str) -> Result<Snapshot, FetchError> {
        if city == self.delete_on {
            self.store.delete(self.job_id).await;
        }
        Ok(Snapshot {
            temperature: 1.0,
            wind_kph: 1.0,
            humidity: 1.0,
            observed_at: Utc::now(),
        })
    }
}

#[tokio::test]
async fn test_job_deleted_mid_run_reports_not_found() {
    let store = Arc::new(InMemoryJobStore::new());
    let job = store.create(None, 3).await.unwrap();
    let fetcher = Arc::new(DeletingFetcher {
        store: store.clone(),
        job_id: job.id,
        delete_on: "B",
    });
    let executor = JobExecutor::new(store.clone(), fetcher).with_fetch_concurrency(1);

    let report = executor.execute(job.id, &cities(&["A", "B", "C"])).await;

    assert_eq!(report.error, Some(JobError::NotFound(job.id)));
    assert_eq!(report.final_status, None, "FAILED cannot be written to a deleted job");
    assert_eq!(report.items.len(), 1);
    assert_eq!(store.result_row_count().await, 0);
}

/// Recorder that remembers the name of every histogram touched.
#[derive(Default)]
struct HistogramNames(std::sync::Mutex<Vec<String>>);

impl metrics::Recorder for HistogramNames {
    fn describe_counter(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
    fn describe_gauge(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
    fn describe_histogram(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}

    fn register_counter(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
        metrics::Counter::noop()
    }

    fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
        metrics::Gauge::noop()
    }

    fn register_histogram(&self, key: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Histogram {
        self.0.lock().unwrap().push(key.name().to_string());
        metrics::Histogram::noop()
    }
}

#[test]
fn test_failed_persistence_still_records_duration() {
    let recorder = HistogramNames::default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let report = metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let store = Arc::new(InMemoryJobStore::new());
            let job = store.create(None, 2).await.unwrap();
            let fetcher = Arc::new(DeletingFetcher {
                store: store.clone(),
                job_id: job.id,
                delete_on: "A",
            });
            JobExecutor::new(store, fetcher)
                .with_fetch_concurrency(1)
                .execute(job.id, &cities(&["A", "B"]))
                .await
        })
    });

    assert!(report.error.is_some());
    let names = recorder.0.lock().unwrap();
    assert!(names.iter().any(|n| n == "weather_job_duration_seconds"), "{names:?}");
}

/// Store whose status writes fail, optionally only for non-FAILED values.
struct StatusFailingStore {
    inner: InMemoryJobStore,
    allow_failed: bool,
    attempted_failed: AtomicBool,
}

#[async_trait]
impl JobStore for StatusFailingStore {
    async fn create(&self, origin: Option<&str>, item_count: i32) -> Result<WeatherJob, StoreError> {
        self.inner.create(origin, item_count).await
    }

    async fn get(&self, job_id: JobId) -> Result<WeatherJob, StoreError> {
        self.inner.get(job_id).await
    }

    async fn results(&self, job_id: JobId) -> Result<Vec<ItemResult>, StoreError> {
        self.inner.results(job_id).await
    }

    async fn append_result(&self, result: &ItemResult) -> Result<(), StoreError> {
        self.inner.append_result(result).await
    }

    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), StoreError> {
        if status == JobStatus::Failed {
            self.attempted_failed.store(true, Ordering::SeqCst);
            if self.allow_failed {
                return self.inner.set_status(job_id, status).await;
            }
        }
        Err(StoreError::Corrupt("status column unavailable".to_string()))
    }

    async fn tally(&self, job_id: JobId) -> Result<ResultTally, StoreError> {
        self.inner.tally(job_id).await
    }

    async fn list_by_origin(&self, origin: Option<&str>) -> Result<Vec<WeatherJob>, StoreError> {
        self.inner.list_by_origin(origin).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_final_status_failure_falls_back_to_failed() {
    let provider = Provider::start().await;
    provider.respond_json("London", fixtures::london()).await;
    let store = Arc::new(StatusFailingStore {
        inner: InMemoryJobStore::new(),
        allow_failed: true,
        attempted_failed: AtomicBool::new(false),
    });
    let job = store.create(None, 1).await.unwrap();
    let executor = JobExecutor::new(store.clone(), Arc::new(provider.client(TIMEOUT)));

    let report = executor.execute(job.id, &cities(&["London"])).await;

    assert!(matches!(report.error, Some(JobError::Persistence(_))));
    assert_eq!(report.final_status, Some(JobStatus::Failed));
    assert_eq!(store.get(job.id).await.unwrap().status, JobStatus::Failed);
    assert_eq!(store.results(job.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unwritable_status_is_reported_not_raised() {
    let provider = Provider::start().await;
    provider.respond_json("London", fixtures::london()).await;
    let store = Arc::new(StatusFailingStore {
        inner: InMemoryJobStore::new(),
        allow_failed: false,
        attempted_failed: AtomicBool::new(false),
    });
    let job = store.create(None, 1).await.unwrap();
    let executor = JobExecutor::new(store.clone(), Arc::new(provider.client(TIMEOUT)));

    let report = executor.execute(job.id, &cities(&["London"])).await;

    assert!(matches!(report.error, Some(JobError::Persistence(_))));
    assert!(store.attempted_failed.load(Ordering::SeqCst));
    assert_eq!(report.final_status, None);
    assert_eq!(store.get(job.id).await.unwrap().status, JobStatus::Pending);
    assert_eq!(store.results(job.id).await.unwrap().len(), 1);
    assert!(matches!(report.items[0].outcome, OutcomeKind::Success));
}
