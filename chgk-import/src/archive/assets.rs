//! Asset resolution for archive packages
//!
//! A referenced file is taken from `assets/` inside the archive when present,
//! otherwise downloaded from its URL. Downloads are capped in size and time.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::models::AssetReference;

/// Largest asset accepted, bundled or remote
pub const MAX_DOWNLOAD_BYTES: u64 = 20 * 1024 * 1024;
/// Whole-request ceiling for one remote asset
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = concat!("chgk-import/", env!("CARGO_PKG_VERSION"));
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid file name \"{0}\"")]
    InvalidName(String),

    #[error("unsupported URL \"{0}\"")]
    InvalidUrl(String),

    #[error("not bundled and no URL given")]
    Missing,

    #[error("larger than {0} bytes")]
    TooLarge(u64),

    #[error("download failed: {0}")]
    Network(String),

    #[error("download timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reduce a manifest-supplied name to a bare file name
///
/// Directory parts are dropped, so nothing can be written outside the
/// assets directory.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let normalized = raw.trim().replace('\\', "/");
    let name = normalized.rsplit('/').next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// File name for a downloaded asset that has no name of its own
pub fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let path = path.split("://").nth(1).unwrap_or(path);
    let (_, tail) = path.split_once('/')?;
    sanitize_file_name(tail)
}

/// Content type from magic bytes
pub fn sniff_content_type(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

/// Pick a name not yet used in this package
pub fn unique_file_name(name: &str, used: &HashSet<String>) -> String {
    if !used.contains(name) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
        _ => (name, String::new()),
    };
    (2..)
        .map(|n| format!("{}-{}{}", stem, n, ext))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Entries copied out of the archive's `assets/` directory
#[derive(Debug, Default)]
pub struct BundledAssets {
    pub found: HashMap<String, AssetReference>,
    /// Present in the archive but over the size cap; not written
    pub oversized: HashSet<String>,
}

/// Copy the named entries of `assets/` out of the archive (blocking)
///
/// Names missing from the archive are simply absent from the result. The
/// declared size of an entry is not trusted: reading stops one byte past
/// `max_bytes`.
pub fn extract_bundled(
    archive_path: &Path,
    names: &[String],
    assets_dir: &Path,
    max_bytes: u64,
) -> Result<BundledAssets, AssetError> {
    let file = File::open(archive_path)?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| AssetError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let mut bundled = BundledAssets::default();
    for name in names {
        let mut entry = match zip.by_name(&format!("assets/{}", name)) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => continue,
            Err(e) => {
                tracing::debug!(file = %name, error = %e, "Bundled asset unreadable");
                continue;
            }
        };

        if entry.size() > max_bytes {
            tracing::debug!(file = %name, size = entry.size(), "Bundled asset over size cap");
            bundled.oversized.insert(name.clone());
            continue;
        }

        let mut bytes = Vec::new();
        entry.by_ref().take(max_bytes + 1).read_to_end(&mut bytes)?;
        if bytes.len() as u64 > max_bytes {
            tracing::debug!(file = %name, "Bundled asset larger than declared");
            bundled.oversized.insert(name.clone());
            continue;
        }
        std::fs::write(assets_dir.join(name), &bytes)?;

        bundled.found.insert(
            name.clone(),
            AssetReference::new(name.clone(), sniff_content_type(&bytes), bytes.len() as u64),
        );
    }

    Ok(bundled)
}

/// HTTP downloader for remote assets
#[derive(Clone)]
pub struct AssetDownloader {
    http_client: reqwest::Client,
    max_bytes: u64,
}

impl AssetDownloader {
    pub fn new() -> Result<Self, AssetError> {
        Self::with_limits(MAX_DOWNLOAD_BYTES, DOWNLOAD_TIMEOUT)
    }

    pub fn with_limits(max_bytes: u64, timeout: Duration) -> Result<Self, AssetError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AssetError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            max_bytes,
        })
    }

    /// Download `url`, stopping early once the size cap is exceeded
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, AssetError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AssetError::InvalidUrl(url.to_string()));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AssetError::Cancelled),
            result = self.fetch_inner(url) => result,
        }
    }

    async fn fetch_inner(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        tracing::debug!(url = %url, "Downloading asset");

        let mut response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Network(format!("HTTP {}", status.as_u16())));
        }

        if response.content_length().map_or(false, |len| len > self.max_bytes) {
            return Err(AssetError::TooLarge(self.max_bytes));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_reqwest_error)? {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_bytes {
                return Err(AssetError::TooLarge(self.max_bytes));
            }
        }

        Ok(body)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AssetError {
    if e.is_timeout() {
        AssetError::Timeout
    } else {
        AssetError::Network(e.to_string())
    }
}
