//! Tests for database initialization
//!
//! Covers automatic creation, reopening an existing file, default settings,
//! and the presence of every table the importer writes to.

use chgk_common::db::init::{get_setting_i64, init_database};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("chgk.db");

    assert!(!db_path.exists());

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());

    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("chgk.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    // Second initialization must be idempotent
    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("chgk.db")).await.unwrap();

    let max_wait = get_setting_i64(&pool, "database_max_lock_wait_ms", 0).await.unwrap();
    assert_eq!(max_wait, 5000);

    let retry = get_setting_i64(&pool, "database_lock_retry_ms", 0).await.unwrap();
    assert_eq!(retry, 250);

    // Unknown keys fall back to the supplied default
    let missing = get_setting_i64(&pool, "no_such_setting", 42).await.unwrap();
    assert_eq!(missing, 42);
}

#[tokio::test]
async fn test_null_setting_reset_on_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("chgk.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'database_max_lock_wait_ms'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'database_max_lock_wait_ms'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(value.as_deref(), Some("5000"));
}

#[tokio::test]
async fn test_all_tables_created() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("chgk.db")).await.unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for expected in [
        "authors",
        "block_editors",
        "blocks",
        "import_jobs",
        "media_assets",
        "package_editors",
        "package_tags",
        "packages",
        "question_authors",
        "questions",
        "settings",
        "tour_editors",
        "tours",
    ] {
        assert!(
            tables.iter().any(|t| t == expected),
            "Table '{}' missing, found {:?}",
            expected,
            tables
        );
    }
}

#[tokio::test]
async fn test_busy_timeout_and_foreign_keys_on_every_connection() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("chgk.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = '900' WHERE key = 'database_lock_retry_ms'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let mut connections = Vec::new();
    for _ in 0..3 {
        connections.push(pool.acquire().await.unwrap());
    }
    for conn in connections.iter_mut() {
        let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
            .fetch_one(&mut **conn)
            .await
            .unwrap();
        assert_eq!(timeout, 900);

        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&mut **conn)
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }
}
