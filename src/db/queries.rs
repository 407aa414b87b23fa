use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::models::job::{ItemOutcome, ItemResult, JobId, JobStatus, ResultTally, WeatherJob};
use crate::models::weather::{FetchError, FetchErrorKind, Snapshot};
use crate::services::store::StoreError;

const JOB_COLUMNS: &str = "id, origin, status, item_count, created_at, updated_at";

fn job_from_row(row: &PgRow) -> Result<WeatherJob, StoreError> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|_| StoreError::Corrupt(format!("unknown job status '{}'", status_str)))?;

    Ok(WeatherJob {
        id: row.try_get("id")?,
        origin: row.try_get("origin")?,
        status,
        item_count: row.try_get("item_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn result_from_row(row: &PgRow) -> Result<ItemResult, StoreError> {
    let error_kind: Option<String> = row.try_get("error_kind")?;

    let outcome = match error_kind {
        Some(kind) => {
            let kind = FetchErrorKind::from_str(&kind)
                .map_err(|_| StoreError::Corrupt(format!("unknown error kind '{}'", kind)))?;
            let detail: Option<String> = row.try_get("error_detail")?;
            ItemOutcome::Failure(FetchError::new(kind, detail.unwrap_or_default()))
        }
        None => {
            let temperature: Option<f64> = row.try_get("temperature")?;
            let wind_kph: Option<f64> = row.try_get("wind_kph")?;
            let humidity: Option<f64> = row.try_get("humidity")?;
            let observed_at: Option<DateTime<Utc>> = row.try_get("observed_at")?;

            match (temperature, wind_kph, humidity, observed_at) {
                (Some(temperature), Some(wind_kph), Some(humidity), Some(observed_at)) => {
                    ItemOutcome::Success(Snapshot {
                        temperature,
                        wind_kph,
                        humidity,
                        observed_at,
                    })
                }
                _ => {
                    let id: i64 = row.try_get("id")?;
                    return Err(StoreError::Corrupt(format!(
                        "result {} has neither a snapshot nor an error",
                        id
                    )));
                }
            }
        }
    };

    Ok(ItemResult {
        job_id: row.try_get("job_id")?,
        city: row.try_get("city")?,
        outcome,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Insert a new weather job in `PENDING`
pub async fn create_job(
    pool: &PgPool,
    origin: Option<&str>,
    item_count: i32,
) -> Result<WeatherJob, StoreError> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO weather_jobs (origin, status, item_count)
        VALUES ($1, 'PENDING', $2)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(origin)
    .bind(item_count)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: JobId) -> Result<Option<WeatherJob>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM weather_jobs WHERE id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Results of a job in insertion order
pub async fn get_results(pool: &PgPool, job_id: JobId) -> Result<Vec<ItemResult>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, job_id, city, temperature, wind_kph, humidity, observed_at,
               error_kind, error_detail, completed_at
        FROM weather_results
        WHERE job_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(result_from_row).collect()
}

/// Append a city result and touch the owning job.
///
/// Returns `NotFound` if the job row no longer exists. Both writes share a
/// transaction so a result never outlives a concurrent delete.
pub async fn insert_result(pool: &PgPool, result: &ItemResult) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    let touched = sqlx::query("UPDATE weather_jobs SET updated_at = NOW() WHERE id = $1")
        .bind(result.job_id)
        .execute(&mut *tx)
        .await?;

    if touched.rows_affected() == 0 {
        return Err(StoreError::NotFound(result.job_id));
    }

    let snapshot = result.outcome.snapshot();
    let error = result.outcome.error();

    sqlx::query(
        r#"
        INSERT INTO weather_results
            (job_id, city, temperature, wind_kph, humidity, observed_at,
             error_kind, error_detail, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(result.job_id)
    .bind(&result.city)
    .bind(snapshot.map(|s| s.temperature))
    .bind(snapshot.map(|s| s.wind_kph))
    .bind(snapshot.map(|s| s.humidity))
    .bind(snapshot.map(|s| s.observed_at))
    .bind(error.map(|e| e.kind.to_string()))
    .bind(error.map(|e| e.detail.as_str()))
    .bind(result.completed_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Update job status
pub async fn update_job_status(
    pool: &PgPool,
    job_id: JobId,
    status: JobStatus,
) -> Result<(), StoreError> {
    let updated = sqlx::query(
        r#"
        UPDATE weather_jobs
        SET status = $1,
            updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(status.to_string())
    .bind(job_id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(StoreError::NotFound(job_id));
    }
    Ok(())
}

/// Count attempted and successful results for a job
pub async fn count_results(pool: &PgPool, job_id: JobId) -> Result<ResultTally, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(r.id) AS attempted,
               COUNT(r.id) FILTER (WHERE r.error_kind IS NULL) AS succeeded
        FROM weather_jobs j
        LEFT JOIN weather_results r ON r.job_id = j.id
        WHERE j.id = $1
        GROUP BY j.id
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound(job_id))?;

    let attempted: i64 = row.try_get("attempted")?;
    let succeeded: i64 = row.try_get("succeeded")?;

    Ok(ResultTally {
        attempted: attempted as u32,
        succeeded: succeeded as u32,
    })
}

/// Jobs for an origin, newest first
pub async fn list_jobs_by_origin(
    pool: &PgPool,
    origin: Option<&str>,
) -> Result<Vec<WeatherJob>, StoreError> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM weather_jobs
        WHERE origin IS NOT DISTINCT FROM $1
        ORDER BY created_at DESC, id DESC
        "#
    ))
    .bind(origin)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}
