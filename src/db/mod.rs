use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::models::job::{ItemResult, JobId, JobStatus, ResultTally, WeatherJob};
use crate::services::store::{JobStore, StoreError};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

pub mod queries;

/// PostgreSQL-backed [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, origin: Option<&str>, item_count: i32) -> Result<WeatherJob, StoreError> {
        queries::create_job(&self.pool, origin, item_count).await
    }

    async fn get(&self, job_id: JobId) -> Result<WeatherJob, StoreError> {
        queries::get_job(&self.pool, job_id)
            .await?
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn results(&self, job_id: JobId) -> Result<Vec<ItemResult>, StoreError> {
        // Distinguish "no results yet" from "no such job".
        self.get(job_id).await?;
        queries::get_results(&self.pool, job_id).await
    }

    async fn append_result(&self, result: &ItemResult) -> Result<(), StoreError> {
        queries::insert_result(&self.pool, result).await
    }

    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), StoreError> {
        queries::update_job_status(&self.pool, job_id, status).await
    }

    async fn tally(&self, job_id: JobId) -> Result<ResultTally, StoreError> {
        queries::count_results(&self.pool, job_id).await
    }

    async fn list_by_origin(&self, origin: Option<&str>) -> Result<Vec<WeatherJob>, StoreError> {
        queries::list_jobs_by_origin(&self.pool, origin).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
