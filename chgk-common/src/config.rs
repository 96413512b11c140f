//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a small TOML file. Missing files are not an
//! error: every field has a built-in default, and the service starts with a
//! warning.
//!
//! Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`CHGK_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CHGK_ROOT_FOLDER";

/// Environment variable overriding the TOML config path
pub const CONFIG_PATH_ENV: &str = "CHGK_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database, uploads, working dirs and media
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub import: ImportSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// HTTP status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Import pipeline limits
///
/// These are owned by whoever deploys the service; the pipeline only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Largest accepted input file
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    /// Accepted input file extensions (lowercase, without dot)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Wall-clock limit for one Extract → Parse → Import run
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Number of jobs processed at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Attempts before a retriable failure becomes terminal
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Delay between queue polls when no job is claimable
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size_bytes(),
            allowed_extensions: default_allowed_extensions(),
            job_timeout_secs: default_job_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            max_retry_attempts: default_max_retry_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ImportSettings {
    /// Reject settings the worker pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Config("import.max_concurrency must be at least 1".to_string()));
        }
        if self.max_retry_attempts == 0 {
            return Err(Error::Config(
                "import.max_retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.job_timeout_secs == 0 {
            return Err(Error::Config("import.job_timeout_secs must be positive".to_string()));
        }
        if self.allowed_extensions.is_empty() {
            return Err(Error::Config(
                "import.allowed_extensions must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// True when `file_name` carries one of the allowed extensions
    pub fn is_allowed_extension(&self, file_name: &str) -> bool {
        let Some(ext) = Path::new(file_name).extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        self.allowed_extensions.iter().any(|allowed| *allowed == ext)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1:5780".to_string()
}

fn default_max_file_size_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["zip".to_string(), "json".to_string()]
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_max_concurrency() -> usize {
    2
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl TomlConfig {
    /// Load configuration from `path`
    ///
    /// A missing file yields defaults with a warning; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file not found at {}, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

        config.import.validate()?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// Resolve the config file path: explicit argument, then `CHGK_CONFIG`, then platform default
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .map(|d| d.join("chgk").join("chgk-import.toml"))
        .unwrap_or_else(|| PathBuf::from("chgk-import.toml"))
}

/// Resolve the root folder following the priority order in the module docs
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("chgk"))
        .unwrap_or_else(|| PathBuf::from("./chgk_data"))
}

/// Well-known locations under the root folder
#[derive(Debug, Clone)]
pub struct RootLayout {
    pub root: PathBuf,
}

impl RootLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("chgk.db")
    }

    /// Per-job scratch directories
    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Permanent media storage for promoted assets
    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    /// Create every directory the service writes to
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.root.clone(), self.work_dir(), self.media_dir()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}
