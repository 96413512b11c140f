//! chgk-import library interface
//!
//! Imports quiz packages (ЧГК) into the database:
//! - [`parser`]: free-form document blocks → package tree
//! - [`archive`]: zip archive with `package.json` → package tree
//! - [`importer`]: package tree → database, in one transaction
//! - [`jobs`]: queued import jobs with retry, timeout and crash recovery
//! - [`api`]: HTTP status surface

pub mod api;
pub mod archive;
pub mod db;
pub mod error;
pub mod importer;
pub mod jobs;
pub mod models;
pub mod parser;
pub mod utils;

pub use crate::api::{build_router, AppState};
pub use crate::error::{ApiError, ApiResult, ErrorKind, ImportError};
pub use crate::jobs::JobOrchestrator;
pub use crate::parser::{parse_blocks, ParserOptions};
