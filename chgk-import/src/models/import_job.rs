//! Import job state machine
//!
//! ```text
//! QUEUED ──claim──▶ RUNNING ──▶ SUCCEEDED
//!                      │
//!                      └──────▶ FAILED ──(next_retry_at reached)──▶ RUNNING
//! ```
//!
//! A FAILED job with `next_retry_at = None` is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{ErrorKind, ImportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(JobStatus::Queued),
            "RUNNING" => Some(JobStatus::Running),
            "SUCCEEDED" => Some(JobStatus::Succeeded),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Pipeline step currently executing, with its progress checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImportStep {
    Queued,
    Extracting,
    Parsing,
    Importing,
    Finalizing,
    Completed,
}

impl ImportStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStep::Queued => "QUEUED",
            ImportStep::Extracting => "EXTRACTING",
            ImportStep::Parsing => "PARSING",
            ImportStep::Importing => "IMPORTING",
            ImportStep::Finalizing => "FINALIZING",
            ImportStep::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(ImportStep::Queued),
            "EXTRACTING" => Some(ImportStep::Extracting),
            "PARSING" => Some(ImportStep::Parsing),
            "IMPORTING" => Some(ImportStep::Importing),
            "FINALIZING" => Some(ImportStep::Finalizing),
            "COMPLETED" => Some(ImportStep::Completed),
            _ => None,
        }
    }

    /// Progress percentage reported when the step begins
    pub fn progress(&self) -> u8 {
        match self {
            ImportStep::Queued => 0,
            ImportStep::Extracting => 10,
            ImportStep::Parsing => 40,
            ImportStep::Importing => 70,
            ImportStep::Finalizing => 90,
            ImportStep::Completed => 100,
        }
    }
}

/// Persisted import job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub owner_id: String,
    /// Name of the uploaded file as the user sent it
    pub original_file_name: String,
    pub input_file_path: PathBuf,
    /// Intermediate file produced by extraction, if any
    pub converted_file_path: Option<PathBuf>,
    pub status: JobStatus,
    pub current_step: ImportStep,
    pub progress: u8,
    /// Number of times a worker has claimed this job
    pub attempts: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub package_id: Option<Uuid>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// Create a new QUEUED job
    pub fn new(owner_id: impl Into<String>, input_file_path: impl Into<PathBuf>) -> Self {
        let input_file_path = input_file_path.into();
        let original_file_name = input_file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            original_file_name,
            input_file_path,
            converted_file_path: None,
            status: JobStatus::Queued,
            current_step: ImportStep::Queued,
            progress: 0,
            attempts: 0,
            next_retry_at: None,
            package_id: None,
            error: None,
            error_kind: None,
            warnings: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Lowercase extension of the input file
    pub fn input_extension(&self) -> String {
        self.input_file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default()
    }

    /// Move to the next pipeline step
    pub fn advance_to(&mut self, step: ImportStep) {
        self.current_step = step;
        self.progress = step.progress();
        self.updated_at = Utc::now();
    }

    pub fn mark_succeeded(&mut self, package_id: Uuid) {
        let now = Utc::now();
        self.status = JobStatus::Succeeded;
        self.advance_to(ImportStep::Completed);
        self.package_id = Some(package_id);
        self.error = None;
        self.error_kind = None;
        self.next_retry_at = None;
        self.completed_at = Some(now);
    }

    /// Record a failure; `next_retry_at = None` makes it terminal
    pub fn mark_failed(&mut self, error: &ImportError, next_retry_at: Option<DateTime<Utc>>) {
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error = Some(error.user_message.clone());
        self.error_kind = Some(error.kind);
        self.next_retry_at = next_retry_at;
        self.updated_at = now;
        if next_retry_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    /// Check if job will never run again
    pub fn is_terminal(&self) -> bool {
        match self.status {
            JobStatus::Succeeded => true,
            JobStatus::Failed => self.next_retry_at.is_none(),
            JobStatus::Queued | JobStatus::Running => false,
        }
    }
}
