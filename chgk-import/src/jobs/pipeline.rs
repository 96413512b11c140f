//! One attempt of one job: Extract → Parse → Import
//!
//! Progress is persisted at every step boundary, and cancellation is checked
//! there too. The pipeline never decides about retries; it returns the
//! failure and the orchestrator classifies it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chgk_common::config::ImportSettings;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::archive::ArchiveExtractor;
use crate::db::jobs::update_job;
use crate::error::ImportError;
use crate::importer::PackageImporter;
use crate::models::{ImportJob, ImportStep, ParseResult};
use crate::parser::{parse_blocks, ParserOptions};

use super::extractor::DocumentExtractor;

pub const ARCHIVE_EXTENSION: &str = "zip";

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), ImportError> {
    if cancel.is_cancelled() {
        Err(ImportError::cancelled())
    } else {
        Ok(())
    }
}

pub struct Pipeline {
    pool: SqlitePool,
    settings: ImportSettings,
    archive: ArchiveExtractor,
    extractors: Vec<Arc<dyn DocumentExtractor>>,
    importer: PackageImporter,
}

impl Pipeline {
    pub fn new(
        pool: SqlitePool,
        settings: ImportSettings,
        archive: ArchiveExtractor,
        importer: PackageImporter,
    ) -> Self {
        Self {
            pool,
            settings,
            archive,
            extractors: Vec::new(),
            importer,
        }
    }

    pub fn register_extractor(&mut self, extractor: Arc<dyn DocumentExtractor>) {
        self.extractors.push(extractor);
    }

    /// Every extension some step can handle
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions = vec![ARCHIVE_EXTENSION.to_string()];
        for extractor in &self.extractors {
            for ext in extractor.extensions() {
                if !extensions.iter().any(|e| e == ext) {
                    extensions.push(ext.to_string());
                }
            }
        }
        extensions
    }

    fn extractor_for(&self, extension: &str) -> Option<&Arc<dyn DocumentExtractor>> {
        self.extractors
            .iter()
            .find(|e| e.extensions().iter().any(|ext| *ext == extension))
    }

    async fn enter_step(&self, job: &mut ImportJob, step: ImportStep) -> Result<(), ImportError> {
        job.advance_to(step);
        update_job(&self.pool, job).await?;
        tracing::debug!(job_id = %job.id, step = step.as_str(), progress = job.progress, "Job step started");
        Ok(())
    }

    async fn check_input(&self, job: &ImportJob) -> Result<(), ImportError> {
        let extension = job.input_extension();
        if extension != ARCHIVE_EXTENSION && self.extractor_for(&extension).is_none() {
            return Err(ImportError::validation(format!(
                "Unsupported file type \".{}\"",
                extension
            )));
        }

        let metadata = tokio::fs::metadata(&job.input_file_path)
            .await
            .map_err(|_| ImportError::validation("Uploaded file not found"))?;
        if !metadata.is_file() {
            return Err(ImportError::validation("Uploaded path is not a file"));
        }
        if metadata.len() > self.settings.max_file_size_bytes {
            return Err(ImportError::validation(format!(
                "File is larger than {} bytes",
                self.settings.max_file_size_bytes
            )));
        }
        Ok(())
    }

    /// Extract and parse the input into a package tree
    async fn extract_and_parse(
        &self,
        job: &mut ImportJob,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ParseResult, ImportError> {
        let extension = job.input_extension();
        let input = job.input_file_path.clone();

        if extension == ARCHIVE_EXTENSION {
            let result = self.archive.extract(&input, work_dir, cancel).await?;
            ensure_not_cancelled(cancel)?;
            // manifest data is already structured
            self.enter_step(job, ImportStep::Parsing).await?;
            return Ok(result);
        }

        let extractor = self.extractor_for(&extension).ok_or_else(|| {
            ImportError::validation(format!("Unsupported file type \".{}\"", extension))
        })?;
        tracing::debug!(job_id = %job.id, extractor = extractor.name(), "Extracting document");

        let document = extractor.extract(&input, work_dir, cancel).await?;
        job.converted_file_path = document.converted_file.clone();
        job.warnings.extend(document.warnings);

        ensure_not_cancelled(cancel)?;
        self.enter_step(job, ImportStep::Parsing).await?;

        let options = ParserOptions {
            fallback_title: document
                .fallback_title
                .or_else(|| super::extractor::title_from_file_name(&job.original_file_name)),
        };
        let blocks = document.blocks;
        tokio::task::spawn_blocking(move || parse_blocks(&blocks, &options))
            .await
            .map_err(|e| ImportError::parsing(format!("Parser failed: {}", e)))
    }

    /// Run every step; returns the new package id
    pub async fn run(
        &self,
        job: &mut ImportJob,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Uuid, ImportError> {
        self.check_input(job).await?;

        tokio::fs::create_dir_all(work_dir)
            .await
            .map_err(|e| ImportError::extraction(format!("Cannot create working directory: {}", e)))?;

        ensure_not_cancelled(cancel)?;
        self.enter_step(job, ImportStep::Extracting).await?;

        let result = self.extract_and_parse(job, work_dir, cancel).await?;
        job.warnings.extend(result.warnings.iter().cloned());

        if result.tours.is_empty() {
            return Err(ImportError::parsing("No tours found in the document"));
        }
        if result.question_count() == 0 {
            return Err(ImportError::parsing("No questions found in the document"));
        }
        tracing::info!(
            job_id = %job.id,
            tours = result.tours.len(),
            questions = result.question_count(),
            confidence = result.confidence,
            warnings = result.warnings.len(),
            "Package parsed"
        );

        ensure_not_cancelled(cancel)?;
        self.enter_step(job, ImportStep::Importing).await?;

        let outcome = self
            .importer
            .import(&result, &job.owner_id, work_dir, cancel)
            .await?;
        job.warnings.extend(outcome.warnings);

        self.enter_step(job, ImportStep::Finalizing).await?;
        Ok(outcome.package_id)
    }
}

/// Working directory of one job
pub fn job_work_dir(work_root: &Path, job_id: Uuid) -> PathBuf {
    work_root.join(job_id.to_string())
}

/// Remove a job working directory; a missing directory is fine
pub async fn remove_work_dir(work_dir: &Path) {
    match tokio::fs::remove_dir_all(work_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(dir = %work_dir.display(), error = %e, "Failed to remove working directory");
        }
    }
}
