//! Job orchestrator tests
//!
//! Every test owns a temp root folder with a file-backed database, the same
//! layout the service uses.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chgk_common::config::{ImportSettings, RootLayout};
use chgk_import::db::jobs::{claim_next_job, format_timestamp, insert_job, load_job};
use chgk_import::jobs::{DocumentExtractor, ExtractedDocument};
use chgk_import::models::{ImportJob, ImportStep, JobStatus};
use chgk_import::{ErrorKind, ImportError, JobOrchestrator};
use chrono::Utc;
use serial_test::serial;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const FEED: &str = r#"{
    "sourceFileName": "Кубок_Дніпра_2024.docx",
    "blocks": [
        {"text": "ТУР 1"},
        {"text": "1. Хто написав Гамлета?"},
        {"text": "Відповідь: Шекспір"},
        {"text": "2. Назвіть столицю України."},
        {"text": "Відповідь: Київ"}
    ]
}"#;

struct TestRoot {
    _dir: TempDir,
    layout: RootLayout,
    uploads: PathBuf,
    pool: SqlitePool,
}

impl TestRoot {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let layout = RootLayout::new(dir.path());
        layout.ensure_directories().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let pool = chgk_common::db::init_database(&layout.database_path())
            .await
            .unwrap();
        Self {
            _dir: dir,
            layout,
            uploads,
            pool,
        }
    }

    fn upload(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.uploads.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    async fn enqueue(&self, path: &Path) -> Uuid {
        let job = ImportJob::new("user-1", path);
        insert_job(&self.pool, &job).await.unwrap();
        job.id
    }

    async fn job(&self, id: Uuid) -> ImportJob {
        load_job(&self.pool, id).await.unwrap().unwrap()
    }

    fn orchestrator(&self, settings: ImportSettings) -> JobOrchestrator {
        JobOrchestrator::new(self.pool.clone(), &self.layout, settings).unwrap()
    }
}

/// Fails every attempt with a retriable error
struct FlakyExtractor;

#[async_trait]
impl DocumentExtractor for FlakyExtractor {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn extensions(&self) -> &[&'static str] {
        &["txt"]
    }

    async fn extract(
        &self,
        _input: &Path,
        _work_dir: &Path,
        _cancel: &CancellationToken,
    ) -> Result<ExtractedDocument, ImportError> {
        Err(ImportError::transient("Converter unavailable"))
    }
}

/// Never finishes on its own
struct StuckExtractor;

#[async_trait]
impl DocumentExtractor for StuckExtractor {
    fn name(&self) -> &'static str {
        "stuck"
    }

    fn extensions(&self) -> &[&'static str] {
        &["slow"]
    }

    async fn extract(
        &self,
        _input: &Path,
        _work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExtractedDocument, ImportError> {
        cancel.cancelled().await;
        Err(ImportError::cancelled())
    }
}

async fn make_retry_due(pool: &SqlitePool, id: Uuid) {
    sqlx::query("UPDATE import_jobs SET next_retry_at = ? WHERE id = ?")
        .bind(format_timestamp(Utc::now() - chrono::Duration::seconds(1)))
        .bind(id.to_string())
        .execute(pool)
        .await
        .unwrap();
}

/// Leave warnings on the job record as an earlier attempt would
async fn set_warnings(pool: &SqlitePool, id: Uuid, warnings: &[&str]) {
    sqlx::query("UPDATE import_jobs SET warnings = ? WHERE id = ?")
        .bind(serde_json::to_string(warnings).unwrap())
        .bind(id.to_string())
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_block_feed_job_succeeds() {
    let root = TestRoot::new().await;
    let input = root.upload("cup.json", FEED.as_bytes());
    let id = root.enqueue(&input).await;

    let orchestrator = root.orchestrator(ImportSettings::default());
    assert_eq!(orchestrator.drain().await.unwrap(), 1);

    let job = root.job(id).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.current_step, ImportStep::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.attempts, 1);
    assert!(job.error.is_none());
    assert!(job.completed_at.is_some());
    assert!(job.is_terminal());

    let package_id = job.package_id.expect("package id recorded");
    let (title, questions): (String, i64) = sqlx::query_as(
        "SELECT p.title, (SELECT COUNT(*) FROM questions) FROM packages p WHERE p.id = ?",
    )
    .bind(package_id.to_string())
    .fetch_one(&root.pool)
    .await
    .unwrap();
    assert_eq!(title, "Кубок Дніпра 2024");
    assert_eq!(questions, 2);

    // parser warnings reach the job record
    assert!(job.warnings.iter().any(|w| w.contains("No package title")));
    assert!(!root.layout.work_dir().join(id.to_string()).exists());
}

#[tokio::test]
async fn test_archive_job_succeeds() {
    let root = TestRoot::new().await;
    let manifest = r#"{
        "formatVersion": 1,
        "title": "Архівний пакет",
        "tours": [{"number": 1, "questions": [
            {"number": 1, "text": "Q", "answer": "A", "handoutAssetFileName": "map.png"}
        ]}]
    }"#;
    let path = root.uploads.join("package.zip");
    let mut writer = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("package.json", options).unwrap();
    writer.write_all(manifest.as_bytes()).unwrap();
    writer.start_file("assets/map.png", options).unwrap();
    writer.write_all(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();
    writer.finish().unwrap();

    let id = root.enqueue(&path).await;
    root.orchestrator(ImportSettings::default()).drain().await.unwrap();

    let job = root.job(id).await;
    assert_eq!(job.status, JobStatus::Succeeded, "error: {:?}", job.error);
    let package_id = job.package_id.unwrap();

    let url: Option<String> = sqlx::query_scalar("SELECT handout_asset_url FROM questions")
        .fetch_one(&root.pool)
        .await
        .unwrap();
    assert_eq!(url, Some(format!("/media/{}/map.png", package_id)));
    assert!(root
        .layout
        .media_dir()
        .join(package_id.to_string())
        .join("map.png")
        .is_file());
}

#[tokio::test]
async fn test_document_without_questions_fails_terminally() {
    let root = TestRoot::new().await;
    let feed = r#"{"blocks": [{"text": "Просто текст без запитань"}]}"#;
    let input = root.upload("empty.json", feed.as_bytes());
    let id = root.enqueue(&input).await;

    root.orchestrator(ImportSettings::default()).drain().await.unwrap();

    let job = root.job(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_kind, Some(ErrorKind::Parsing));
    assert!(job.next_retry_at.is_none());
    assert!(job.is_terminal());

    let packages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM packages")
        .fetch_one(&root.pool)
        .await
        .unwrap();
    assert_eq!(packages, 0);
}

#[tokio::test]
async fn test_invalid_inputs_fail_validation() {
    let root = TestRoot::new().await;
    let unsupported = root.upload("scan.pdf", b"%PDF");
    let broken = root.upload("broken.json", b"{not json");
    let missing = root.uploads.join("gone.json");

    let ids = [
        root.enqueue(&unsupported).await,
        root.enqueue(&broken).await,
        root.enqueue(&missing).await,
    ];

    let orchestrator = root.orchestrator(ImportSettings::default());
    assert_eq!(orchestrator.drain().await.unwrap(), 3);

    for id in ids {
        let job = root.job(id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_kind, Some(ErrorKind::Validation));
        assert!(job.is_terminal());
    }
}

#[tokio::test]
async fn test_oversized_input_rejected() {
    let root = TestRoot::new().await;
    let input = root.upload("cup.json", FEED.as_bytes());
    let id = root.enqueue(&input).await;

    let settings = ImportSettings {
        max_file_size_bytes: 16,
        ..Default::default()
    };
    root.orchestrator(settings).drain().await.unwrap();

    let job = root.job(id).await;
    assert_eq!(job.error_kind, Some(ErrorKind::Validation));
}

#[tokio::test]
async fn test_transient_failure_retried_until_exhausted() {
    let root = TestRoot::new().await;
    let input = root.upload("doc.txt", b"text");
    let id = root.enqueue(&input).await;

    let orchestrator = root
        .orchestrator(ImportSettings::default())
        .with_extractor(Arc::new(FlakyExtractor));

    let before = Utc::now();
    assert_eq!(orchestrator.drain().await.unwrap(), 1);
    let job = root.job(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_kind, Some(ErrorKind::Transient));
    assert_eq!(job.attempts, 1);
    let retry_at = job.next_retry_at.expect("retry scheduled");
    let delay = (retry_at - before).num_seconds();
    assert!((29..=31).contains(&delay), "first backoff was {}s", delay);

    // not yet due
    assert_eq!(orchestrator.drain().await.unwrap(), 0);

    set_warnings(&root.pool, id, &["Question 3: no answer found"]).await;
    make_retry_due(&root.pool, id).await;
    orchestrator.drain().await.unwrap();
    let job = root.job(id).await;
    assert_eq!(job.attempts, 2);
    assert!(job.warnings.is_empty(), "stale warnings kept: {:?}", job.warnings);
    let delay = (job.next_retry_at.unwrap() - Utc::now()).num_seconds();
    assert!((115..=120).contains(&delay), "second backoff was {}s", delay);

    make_retry_due(&root.pool, id).await;
    orchestrator.drain().await.unwrap();
    let job = root.job(id).await;
    assert_eq!(job.attempts, 3);
    assert!(job.next_retry_at.is_none());
    assert!(job.is_terminal());
}

// wall-clock deadlines; keep away from parallel load
#[tokio::test]
#[serial]
async fn test_timeout_fails_terminally() {
    let root = TestRoot::new().await;
    let input = root.upload("doc.slow", b"text");
    let id = root.enqueue(&input).await;

    let settings = ImportSettings {
        job_timeout_secs: 1,
        ..Default::default()
    };
    let orchestrator = root
        .orchestrator(settings)
        .with_extractor(Arc::new(StuckExtractor));

    tokio::time::timeout(Duration::from_secs(10), orchestrator.drain())
        .await
        .expect("job must end at its deadline")
        .unwrap();

    let job = root.job(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_kind, Some(ErrorKind::Timeout));
    assert!(job.next_retry_at.is_none());
}

#[tokio::test]
async fn test_running_job_recovered_as_failed() {
    let root = TestRoot::new().await;
    let input = root.upload("cup.json", FEED.as_bytes());
    let id = root.enqueue(&input).await;

    // a worker claimed it, then the process died
    let claimed = claim_next_job(&root.pool, Utc::now()).await.unwrap().unwrap();
    assert_eq!(claimed.status, JobStatus::Running);

    let orchestrator = root.orchestrator(ImportSettings::default());
    assert_eq!(orchestrator.recover().await.unwrap(), 1);

    let job = root.job(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.next_retry_at.is_none());
    assert_eq!(job.error_kind, Some(ErrorKind::Cancelled));
    assert!(job.is_terminal());

    // never picked up again
    assert_eq!(orchestrator.drain().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_run_loop_processes_queue_and_stops() {
    let root = TestRoot::new().await;
    let first = root.enqueue(&root.upload("a.json", FEED.as_bytes())).await;
    let second = root.enqueue(&root.upload("b.json", FEED.as_bytes())).await;

    let settings = ImportSettings {
        poll_interval_ms: 20,
        ..Default::default()
    };
    let orchestrator = Arc::new(root.orchestrator(settings));
    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(Arc::clone(&orchestrator).run(shutdown.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let done = root.job(first).await.is_terminal() && root.job(second).await.is_terminal();
        if done || tokio::time::Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown.cancel();
    worker.await.unwrap().unwrap();

    assert_eq!(root.job(first).await.status, JobStatus::Succeeded);
    assert_eq!(root.job(second).await.status, JobStatus::Succeeded);
}
