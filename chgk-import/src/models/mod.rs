//! Data models
//!
//! - [`document`]: block feed handed over by the external extraction step
//! - [`package`]: parsed package tree shared by parser, archive extractor and importer
//! - [`import_job`]: persisted job record and its state machine

pub mod document;
pub mod import_job;
pub mod package;

pub use document::{DocBlock, DocumentFeed};
pub use import_job::{ImportJob, ImportStep, JobStatus};
pub use package::{
    AssetReference, Block, NumberingMode, ParseResult, Question, Tour, TourType,
};
