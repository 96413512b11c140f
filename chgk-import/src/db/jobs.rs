//! Import job persistence
//!
//! Timestamps are stored as RFC 3339 strings with millisecond precision and a
//! `Z` suffix, so string comparison in SQL matches time order.

use chgk_common::db::get_setting_i64;
use chgk_common::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::models::{ImportJob, ImportStep, JobStatus};
use crate::utils::retry_on_lock;

/// Message stored on jobs found RUNNING at startup
pub const INTERRUPTED_MESSAGE: &str = "Import was interrupted by a service restart";

const JOB_COLUMNS: &str = r#"
    id, owner_id, original_file_name, input_file_path, converted_file_path,
    status, current_step, progress, attempts, next_retry_at, package_id,
    error, error_kind, warnings, created_at, updated_at, started_at, completed_at
"#;

pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn parse_optional_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(column);
    value.map(|v| parse_timestamp(column, &v)).transpose()
}

fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn job_from_row(row: &SqliteRow) -> Result<ImportJob> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let step: String = row.get("current_step");
    let warnings: String = row.get("warnings");
    let package_id: Option<String> = row.get("package_id");
    let error_kind: Option<String> = row.get("error_kind");
    let converted: Option<String> = row.get("converted_file_path");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(ImportJob {
        id: parse_uuid("id", &id)?,
        owner_id: row.get("owner_id"),
        original_file_name: row.get("original_file_name"),
        input_file_path: PathBuf::from(row.get::<String, _>("input_file_path")),
        converted_file_path: converted.map(PathBuf::from),
        status: JobStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown job status: {}", status)))?,
        current_step: ImportStep::parse(&step)
            .ok_or_else(|| Error::Internal(format!("Unknown job step: {}", step)))?,
        progress: row.get::<i64, _>("progress").clamp(0, 100) as u8,
        attempts: row.get::<i64, _>("attempts").max(0) as u32,
        next_retry_at: parse_optional_timestamp(row, "next_retry_at")?,
        package_id: package_id.map(|p| parse_uuid("package_id", &p)).transpose()?,
        error: row.get("error"),
        error_kind: error_kind.as_deref().and_then(ErrorKind::parse),
        warnings: serde_json::from_str(&warnings)
            .map_err(|e| Error::Internal(format!("Failed to deserialize warnings: {}", e)))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        started_at: parse_optional_timestamp(row, "started_at")?,
        completed_at: parse_optional_timestamp(row, "completed_at")?,
    })
}

async fn max_lock_wait_ms(pool: &SqlitePool) -> Result<u64> {
    Ok(get_setting_i64(pool, "database_max_lock_wait_ms", 5000).await?.max(0) as u64)
}

/// Insert a new job record
pub async fn insert_job(pool: &SqlitePool, job: &ImportJob) -> Result<()> {
    let warnings = serde_json::to_string(&job.warnings)
        .map_err(|e| Error::Internal(format!("Failed to serialize warnings: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO import_jobs (
            id, owner_id, original_file_name, input_file_path, converted_file_path,
            status, current_step, progress, attempts, next_retry_at, package_id,
            error, error_kind, warnings, created_at, updated_at, started_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.id.to_string())
    .bind(&job.owner_id)
    .bind(&job.original_file_name)
    .bind(job.input_file_path.to_string_lossy().into_owned())
    .bind(job.converted_file_path.as_ref().map(|p| p.to_string_lossy().into_owned()))
    .bind(job.status.as_str())
    .bind(job.current_step.as_str())
    .bind(job.progress as i64)
    .bind(job.attempts as i64)
    .bind(job.next_retry_at.map(format_timestamp))
    .bind(job.package_id.map(|p| p.to_string()))
    .bind(&job.error)
    .bind(job.error_kind.map(|k| k.as_str()))
    .bind(&warnings)
    .bind(format_timestamp(job.created_at))
    .bind(format_timestamp(job.updated_at))
    .bind(job.started_at.map(format_timestamp))
    .bind(job.completed_at.map(format_timestamp))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a job by id
pub async fn load_job(pool: &SqlitePool, id: Uuid) -> Result<Option<ImportJob>> {
    let sql = format!("SELECT {} FROM import_jobs WHERE id = ?", JOB_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Write every mutable column of `job`
///
/// Workers own their claimed job, so last-writer-wins is safe here.
pub async fn update_job(pool: &SqlitePool, job: &ImportJob) -> Result<()> {
    let id = job.id.to_string();
    let warnings = serde_json::to_string(&job.warnings)
        .map_err(|e| Error::Internal(format!("Failed to serialize warnings: {}", e)))?;
    let converted = job
        .converted_file_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());
    let next_retry_at = job.next_retry_at.map(format_timestamp);
    let package_id = job.package_id.map(|p| p.to_string());
    let updated_at = format_timestamp(job.updated_at);
    let completed_at = job.completed_at.map(format_timestamp);

    let max_wait_ms = max_lock_wait_ms(pool).await?;

    retry_on_lock("update_job", max_wait_ms, || async {
        sqlx::query(
            r#"
            UPDATE import_jobs SET
                converted_file_path = ?,
                status = ?,
                current_step = ?,
                progress = ?,
                next_retry_at = ?,
                package_id = ?,
                error = ?,
                error_kind = ?,
                warnings = ?,
                updated_at = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&converted)
        .bind(job.status.as_str())
        .bind(job.current_step.as_str())
        .bind(job.progress as i64)
        .bind(&next_retry_at)
        .bind(&package_id)
        .bind(&job.error)
        .bind(job.error_kind.map(|k| k.as_str()))
        .bind(&warnings)
        .bind(&updated_at)
        .bind(&completed_at)
        .bind(&id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Atomically claim the next runnable job
///
/// QUEUED jobs go first, then FAILED jobs whose retry time has come, oldest
/// first within each group. The claim flips the job to RUNNING and counts the
/// attempt in the same statement, so two workers never get the same job.
/// Error and warnings of the previous attempt are cleared.
pub async fn claim_next_job(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Option<ImportJob>> {
    let now = format_timestamp(now);
    let sql = format!(
        r#"
        UPDATE import_jobs SET
            status = 'RUNNING',
            current_step = 'QUEUED',
            progress = 0,
            attempts = attempts + 1,
            next_retry_at = NULL,
            error = NULL,
            error_kind = NULL,
            warnings = '[]',
            started_at = ?,
            updated_at = ?
        WHERE id = (
            SELECT id FROM import_jobs
            WHERE status = 'QUEUED'
               OR (status = 'FAILED' AND next_retry_at IS NOT NULL AND next_retry_at <= ?)
            ORDER BY CASE status WHEN 'QUEUED' THEN 0 ELSE 1 END, created_at
            LIMIT 1
        )
        RETURNING {}
        "#,
        JOB_COLUMNS
    );

    let max_wait_ms = max_lock_wait_ms(pool).await?;
    let row = retry_on_lock("claim_next_job", max_wait_ms, || async {
        sqlx::query(&sql)
            .bind(&now)
            .bind(&now)
            .bind(&now)
            .fetch_optional(pool)
            .await
            .map_err(Error::Database)
    })
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Force every RUNNING job to terminal FAILED; returns how many were found
///
/// Called once at startup, before any worker runs.
pub async fn recover_interrupted_jobs(pool: &SqlitePool) -> Result<u64> {
    let now = format_timestamp(Utc::now());
    let recovered = sqlx::query(
        r#"
        UPDATE import_jobs SET
            status = 'FAILED',
            next_retry_at = NULL,
            error = ?,
            error_kind = ?,
            updated_at = ?,
            completed_at = ?
        WHERE status = 'RUNNING'
        "#,
    )
    .bind(INTERRUPTED_MESSAGE)
    .bind(ErrorKind::Cancelled.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(recovered)
}

/// Jobs of one owner, newest first
pub async fn list_jobs_for_owner(pool: &SqlitePool, owner_id: &str, limit: u32) -> Result<Vec<ImportJob>> {
    let sql = format!(
        "SELECT {} FROM import_jobs WHERE owner_id = ? ORDER BY created_at DESC LIMIT ?",
        JOB_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}
