//! Document extraction seam
//!
//! Word-processor conversion happens outside this service. What arrives here
//! is either a zip archive (handled by [`crate::archive`]) or a block feed
//! that some converter already produced. Each supported feed format is a
//! [`DocumentExtractor`] registered with the orchestrator by file extension.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::archive::assets::{sanitize_file_name, sniff_content_type, unique_file_name};
use crate::archive::ASSETS_DIR;
use crate::error::ImportError;
use crate::models::{AssetReference, DocBlock, DocumentFeed};

/// Block feed ready for the structural parser
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub blocks: Vec<DocBlock>,
    /// Used as package title when the document has none
    pub fallback_title: Option<String>,
    /// Intermediate file worth keeping on the job record
    pub converted_file: Option<PathBuf>,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extractor name for logs
    fn name(&self) -> &'static str;

    /// Lowercase file extensions this extractor accepts
    fn extensions(&self) -> &[&'static str];

    /// Turn `input` into blocks; images go to `work_dir/assets`
    async fn extract(
        &self,
        input: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExtractedDocument, ImportError>;
}

/// Title from a file name: extension dropped, separators turned into spaces
pub fn title_from_file_name(file_name: &str) -> Option<String> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;
    let title = stem.replace(['_', '-'], " ");
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

/// Reads a JSON [`DocumentFeed`] and copies its images into the working directory
///
/// Image paths in the feed are relative to the feed file.
#[derive(Debug, Default, Clone)]
pub struct JsonBlockExtractor;

impl JsonBlockExtractor {
    fn extract_blocking(input: &Path, work_dir: &Path) -> Result<ExtractedDocument, ImportError> {
        let bytes = std::fs::read(input)
            .map_err(|e| ImportError::extraction(format!("Cannot read block feed: {}", e)))?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| ImportError::validation("Block feed is not UTF-8 text"))?;
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
        let feed: DocumentFeed = serde_json::from_str(text)
            .map_err(|e| ImportError::validation(format!("Block feed is not valid: {}", e)))?;

        let source_dir = input.parent().unwrap_or_else(|| Path::new("."));
        let assets_dir = work_dir.join(ASSETS_DIR);
        let mut warnings = Vec::new();
        let mut used = HashSet::new();
        let mut copies = HashMap::new();
        let mut blocks = feed.blocks;

        let has_assets = blocks.iter().any(|b| !b.assets.is_empty());
        if has_assets {
            std::fs::create_dir_all(&assets_dir).map_err(|e| {
                ImportError::extraction(format!("Cannot create assets directory: {}", e))
            })?;
        }

        for block in &mut blocks {
            let mut copied = Vec::with_capacity(block.assets.len());
            for asset in block.assets.drain(..) {
                match copy_asset(&asset, source_dir, &assets_dir, &mut used, &mut copies) {
                    Ok(reference) => copied.push(reference),
                    Err(reason) => {
                        tracing::debug!(file = %asset.file_name, reason = %reason, "Feed image skipped");
                        warnings.push(format!("Image {} skipped: {}", asset.file_name, reason));
                    }
                }
            }
            block.assets = copied;
        }

        let fallback_title = feed
            .source_file_name
            .as_deref()
            .or_else(|| input.file_name().and_then(|n| n.to_str()))
            .and_then(title_from_file_name);

        Ok(ExtractedDocument {
            blocks,
            fallback_title,
            converted_file: None,
            warnings,
        })
    }
}

/// Copy one feed image; a source path seen before reuses its first copy
fn copy_asset(
    asset: &AssetReference,
    source_dir: &Path,
    assets_dir: &Path,
    used: &mut HashSet<String>,
    copies: &mut HashMap<PathBuf, AssetReference>,
) -> Result<AssetReference, String> {
    let relative = Path::new(&asset.relative_url);
    if relative.is_absolute()
        || relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(format!("path {} leaves the feed directory", asset.relative_url));
    }

    let source: PathBuf = relative.components().collect();
    if let Some(reference) = copies.get(&source) {
        return Ok(reference.clone());
    }

    let name = sanitize_file_name(&asset.file_name)
        .ok_or_else(|| format!("invalid file name \"{}\"", asset.file_name))?;
    let bytes = std::fs::read(source_dir.join(&source)).map_err(|e| e.to_string())?;

    let name = unique_file_name(&name, used);
    std::fs::write(assets_dir.join(&name), &bytes).map_err(|e| e.to_string())?;
    used.insert(name.clone());

    let reference = AssetReference::new(name, sniff_content_type(&bytes), bytes.len() as u64);
    copies.insert(source, reference.clone());
    Ok(reference)
}

#[async_trait]
impl DocumentExtractor for JsonBlockExtractor {
    fn name(&self) -> &'static str {
        "json-blocks"
    }

    fn extensions(&self) -> &[&'static str] {
        &["json"]
    }

    async fn extract(
        &self,
        input: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExtractedDocument, ImportError> {
        if cancel.is_cancelled() {
            return Err(ImportError::cancelled());
        }

        let input = input.to_path_buf();
        let work_dir = work_dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::extract_blocking(&input, &work_dir))
            .await
            .map_err(|e| ImportError::extraction(format!("Block feed reader failed: {}", e)))?
    }
}
