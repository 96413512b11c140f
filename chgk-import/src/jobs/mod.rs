//! Import job orchestrator
//!
//! A single-process worker pool. The poll loop claims one job per free
//! permit, and each claimed job runs its pipeline on its own task under a
//! deadline. Outcomes are classified here: success, retry later, or terminal
//! failure.
//!
//! Shutdown stops polling and waits for in-flight jobs to finish. Jobs that
//! never finish (process killed) are found RUNNING at the next start and
//! forced to terminal FAILED.

pub mod extractor;
pub mod pipeline;
pub mod retry;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chgk_common::config::{ImportSettings, RootLayout};
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::archive::ArchiveExtractor;
use crate::db::jobs::{claim_next_job, recover_interrupted_jobs, update_job};
use crate::error::{ErrorKind, ImportError};
use crate::importer::PackageImporter;
use crate::models::ImportJob;

pub use extractor::{DocumentExtractor, ExtractedDocument, JsonBlockExtractor};
pub use pipeline::Pipeline;

pub struct JobOrchestrator {
    pool: SqlitePool,
    settings: ImportSettings,
    work_root: PathBuf,
    pipeline: Pipeline,
    permits: Arc<Semaphore>,
    /// Parent of every job token; independent of the poll loop's shutdown
    jobs_token: CancellationToken,
}

impl JobOrchestrator {
    /// Orchestrator with the archive extractor and the JSON block feed extractor
    pub fn new(
        pool: SqlitePool,
        layout: &RootLayout,
        settings: ImportSettings,
    ) -> Result<Self, ImportError> {
        let importer = PackageImporter::new(pool.clone(), layout.media_dir());
        let mut pipeline = Pipeline::new(
            pool.clone(),
            settings.clone(),
            ArchiveExtractor::new()?,
            importer,
        );
        pipeline.register_extractor(Arc::new(JsonBlockExtractor));

        Ok(Self {
            permits: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
            pool,
            settings,
            work_root: layout.work_dir(),
            pipeline,
            jobs_token: CancellationToken::new(),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.pipeline.register_extractor(extractor);
        self
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        self.pipeline.supported_extensions()
    }

    /// Cancel every running job; they end FAILED with kind CANCELLED
    pub fn cancel_running_jobs(&self) {
        self.jobs_token.cancel();
    }

    /// Force jobs left RUNNING by a previous process to terminal FAILED
    pub async fn recover(&self) -> Result<u64, ImportError> {
        let recovered = recover_interrupted_jobs(&self.pool).await?;
        if recovered > 0 {
            tracing::warn!(count = recovered, "Interrupted jobs marked as failed");
        }
        Ok(recovered)
    }

    /// Poll and run jobs until `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), ImportError> {
        self.recover().await?;

        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms);
        let mut workers = JoinSet::new();

        tracing::info!(
            max_concurrency = self.settings.max_concurrency,
            timeout_secs = self.settings.job_timeout_secs,
            "Job orchestrator started"
        );

        loop {
            while let Some(finished) = workers.try_join_next() {
                log_worker_exit(finished);
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match claim_next_job(&self.pool, Utc::now()).await {
                Ok(Some(job)) => {
                    let this = Arc::clone(&self);
                    workers.spawn(async move {
                        let _permit = permit;
                        this.run_job(job).await;
                    });
                    continue;
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    drop(permit);
                    tracing::warn!(error = %e, "Failed to claim next job");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        if !workers.is_empty() {
            tracing::info!(in_flight = workers.len(), "Waiting for running jobs to finish");
        }
        while let Some(finished) = workers.join_next().await {
            log_worker_exit(finished);
        }

        tracing::info!("Job orchestrator stopped");
        Ok(())
    }

    /// Run claimable jobs one after another until none is left
    ///
    /// Returns how many jobs ran.
    pub async fn drain(&self) -> Result<usize, ImportError> {
        let mut ran = 0;
        while let Some(job) = claim_next_job(&self.pool, Utc::now()).await? {
            self.run_job(job).await;
            ran += 1;
        }
        Ok(ran)
    }

    /// Run one claimed job to its outcome and persist it
    async fn run_job(&self, mut job: ImportJob) {
        let job_id = job.id;
        let work_dir = pipeline::job_work_dir(&self.work_root, job_id);
        let cancel = self.jobs_token.child_token();
        let limit_secs = self.settings.job_timeout_secs;

        tracing::info!(
            job_id = %job_id,
            attempt = job.attempts,
            file = %job.original_file_name,
            "Job started"
        );

        // leftovers from an interrupted attempt
        pipeline::remove_work_dir(&work_dir).await;

        let timed_out = Arc::new(AtomicBool::new(false));
        let deadline = {
            let cancel = cancel.clone();
            let timed_out = Arc::clone(&timed_out);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(limit_secs)).await;
                timed_out.store(true, Ordering::SeqCst);
                cancel.cancel();
            })
        };

        let result = self.pipeline.run(&mut job, &work_dir, &cancel).await;
        deadline.abort();

        let result = match result {
            Err(e) if e.kind == ErrorKind::Cancelled && timed_out.load(Ordering::SeqCst) => {
                Err(ImportError::timeout(limit_secs))
            }
            other => other,
        };

        match result {
            Ok(package_id) => {
                job.mark_succeeded(package_id);
                tracing::info!(
                    job_id = %job_id,
                    package_id = %package_id,
                    warnings = job.warnings.len(),
                    "Job succeeded"
                );
            }
            Err(error) => {
                let now = Utc::now();
                let next = retry::next_retry_at(
                    &error,
                    job.attempts,
                    self.settings.max_retry_attempts,
                    now,
                );
                job.mark_failed(&error, next);
                match next {
                    Some(at) => tracing::warn!(
                        job_id = %job_id,
                        attempt = job.attempts,
                        kind = %error.kind,
                        error = %error.user_message,
                        retry_at = %at,
                        "Job failed, retry scheduled"
                    ),
                    None => tracing::error!(
                        job_id = %job_id,
                        attempt = job.attempts,
                        kind = %error.kind,
                        error = %error.user_message,
                        "Job failed"
                    ),
                }
            }
        }

        if let Err(e) = update_job(&self.pool, &job).await {
            // stays RUNNING; recovery at next start marks it failed
            tracing::error!(job_id = %job_id, error = %e, "Failed to persist job outcome");
        }

        pipeline::remove_work_dir(&work_dir).await;
    }
}

fn log_worker_exit(finished: Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        tracing::error!(error = %e, "Job worker task panicked");
    }
}
