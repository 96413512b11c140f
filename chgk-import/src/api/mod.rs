//! HTTP status API
//!
//! Uploads are stored by the caller; this API only registers a stored file as
//! a job and reports job state. Processing happens in the orchestrator.

pub mod health;
pub mod jobs;

use std::sync::Arc;

use axum::Router;
use chgk_common::config::ImportSettings;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

pub use health::health_routes;
pub use jobs::job_routes;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: Arc<ImportSettings>,
    /// Extensions the orchestrator can process
    pub supported_extensions: Arc<Vec<String>>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, settings: ImportSettings, supported_extensions: Vec<String>) -> Self {
        Self {
            db,
            settings: Arc::new(settings),
            supported_extensions: Arc::new(supported_extensions),
            startup_time: Utc::now(),
        }
    }

    /// Allowed by configuration and processable by some extractor
    pub fn accepts_file(&self, file_name: &str) -> bool {
        let extension = std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match extension {
            Some(ext) => {
                self.settings.is_allowed_extension(file_name)
                    && self.supported_extensions.iter().any(|s| *s == ext)
            }
            None => false,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(job_routes())
        .with_state(state)
}
