//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates every table used by the
//! import service. All statements are idempotent, so initialization runs on
//! every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const DEFAULT_BUSY_TIMEOUT_MS: i64 = 250;

/// Initialize database connection and create tables if needed
///
/// Schema setup runs on a single bootstrap connection. The pool handed back
/// is opened afterwards so that every connection carries the busy timeout
/// stored in `settings`.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL allows the status API to read while a worker holds the write lock
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS as u64));

    let bootstrap = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options.clone())
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&bootstrap).await?;

    let timeout_ms = get_setting_i64(&bootstrap, "database_lock_retry_ms", DEFAULT_BUSY_TIMEOUT_MS)
        .await?
        .max(0);
    bootstrap.close().await;

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect_with(options.busy_timeout(Duration::from_millis(timeout_ms as u64)))
        .await?;

    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

/// Create all tables and default settings on an already-open pool
///
/// Used directly by tests with `sqlite::memory:` pools.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_settings_table(pool).await?;
    create_import_jobs_table(pool).await?;
    create_authors_table(pool).await?;
    create_package_tables(pool).await?;
    create_media_assets_table(pool).await?;

    init_default_settings(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores runtime key-value settings (lock wait times and similar).
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the import_jobs table
///
/// Timestamps are RFC 3339 strings; `warnings` is a JSON array.
pub async fn create_import_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_jobs (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            original_file_name TEXT NOT NULL,
            input_file_path TEXT NOT NULL,
            converted_file_path TEXT,
            status TEXT NOT NULL,
            current_step TEXT NOT NULL,
            progress INTEGER NOT NULL DEFAULT 0,
            attempts INTEGER NOT NULL DEFAULT 0,
            next_retry_at TEXT,
            package_id TEXT,
            error TEXT,
            error_kind TEXT,
            warnings TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_import_jobs_status_created ON import_jobs(status, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_authors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(first_name, last_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_package_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS packages (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            preamble TEXT,
            source_url TEXT,
            played_from TEXT,
            played_to TEXT,
            numbering_mode TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0.0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS package_editors (
            package_id TEXT NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
            author_id TEXT NOT NULL REFERENCES authors(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (package_id, author_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS package_tags (
            package_id TEXT NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
            tag TEXT NOT NULL,
            PRIMARY KEY (package_id, tag)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tours (
            id TEXT PRIMARY KEY,
            package_id TEXT NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
            number TEXT NOT NULL,
            order_index INTEGER NOT NULL,
            tour_type TEXT NOT NULL,
            preamble TEXT,
            comment TEXT,
            UNIQUE(package_id, order_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tour_editors (
            tour_id TEXT NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
            author_id TEXT NOT NULL REFERENCES authors(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (tour_id, author_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            id TEXT PRIMARY KEY,
            tour_id TEXT NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
            name TEXT,
            order_index INTEGER NOT NULL,
            preamble TEXT,
            UNIQUE(tour_id, order_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS block_editors (
            block_id TEXT NOT NULL REFERENCES blocks(id) ON DELETE CASCADE,
            author_id TEXT NOT NULL REFERENCES authors(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (block_id, author_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id TEXT PRIMARY KEY,
            tour_id TEXT NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
            block_id TEXT REFERENCES blocks(id) ON DELETE CASCADE,
            order_index INTEGER NOT NULL,
            number TEXT NOT NULL,
            host_instructions TEXT,
            handout_text TEXT,
            handout_asset_url TEXT,
            text TEXT NOT NULL,
            answer TEXT NOT NULL,
            accepted_answers TEXT,
            rejected_answers TEXT,
            comment TEXT,
            comment_asset_url TEXT,
            source TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS question_authors (
            question_id TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
            author_id TEXT NOT NULL REFERENCES authors(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (question_id, author_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_media_assets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_assets (
            id TEXT PRIMARY KEY,
            package_id TEXT NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
            file_name TEXT NOT NULL,
            public_url TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            sha256 TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure every runtime setting exists, resetting NULL values to defaults
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "database_max_lock_wait_ms", "5000").await?;
    ensure_setting(pool, "database_lock_retry_ms", "250").await?;

    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE tolerates concurrent initialization
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        info!("Reset NULL setting '{}' to default value: {}", key, default_value);
    }

    Ok(())
}

/// Read an integer setting, falling back to `default` when absent or unparsable
pub async fn get_setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<i64> =
        sqlx::query_scalar("SELECT CAST(value AS INTEGER) FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.unwrap_or(default))
}
