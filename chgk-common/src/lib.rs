//! # chgk-common
//!
//! Shared code for the quiz package import service:
//! - Error type and `Result` alias
//! - TOML configuration and root folder resolution
//! - SQLite pool initialization and schema

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
