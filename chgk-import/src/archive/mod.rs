//! Archive package extractor
//!
//! An archive is a zip file with a `package.json` manifest and an optional
//! `assets/` directory. The manifest maps directly onto [`ParseResult`]; the
//! extractor validates it and turns every asset reference into a file in the
//! job working directory. An asset that cannot be resolved is a warning, not
//! a failure.

pub mod assets;
pub mod manifest;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

use crate::error::ImportError;
use crate::models::{AssetReference, ParseResult, Question, Tour};
use crate::parser::finalize::order_tours;

use assets::{
    extract_bundled, file_name_from_url, sanitize_file_name, sniff_content_type,
    unique_file_name, AssetDownloader, AssetError, MAX_DOWNLOAD_BYTES,
};
use manifest::{AssetRequest, AssetSlot, PackageManifest, QuestionLocation};

pub const MANIFEST_FILE: &str = "package.json";
/// Directory (inside the archive and inside the working directory) holding assets
pub const ASSETS_DIR: &str = "assets";

const MAX_MANIFEST_BYTES: u64 = 10 * 1024 * 1024;

fn read_manifest(archive_path: &Path) -> Result<PackageManifest, ImportError> {
    let file = File::open(archive_path)
        .map_err(|e| ImportError::extraction(format!("Cannot open archive: {}", e)))?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| ImportError::extraction(format!("Not a valid zip archive: {}", e)))?;

    let entry = zip
        .by_name(MANIFEST_FILE)
        .map_err(|_| ImportError::validation(format!("Archive has no {}", MANIFEST_FILE)))?;
    if entry.size() > MAX_MANIFEST_BYTES {
        return Err(ImportError::validation(format!("{} is too large", MANIFEST_FILE)));
    }

    let mut text = String::new();
    entry
        .take(MAX_MANIFEST_BYTES)
        .read_to_string(&mut text)
        .map_err(|e| ImportError::extraction(format!("Cannot read {}: {}", MANIFEST_FILE, e)))?;

    let text = text.strip_prefix('\u{FEFF}').unwrap_or(&text);
    serde_json::from_str(text)
        .map_err(|e| ImportError::validation(format!("{} is not valid: {}", MANIFEST_FILE, e)))
}

fn question_mut(tours: &mut [Tour], location: QuestionLocation) -> Option<&mut Question> {
    let tour = tours.get_mut(location.tour)?;
    match location.block {
        Some(b) => tour.blocks.get_mut(b)?.questions.get_mut(location.index),
        None => tour.questions.get_mut(location.index),
    }
}

fn slot_label(slot: AssetSlot) -> &'static str {
    match slot {
        AssetSlot::Handout => "handout",
        AssetSlot::Comment => "comment",
    }
}

/// Assets resolved so far for one archive
struct Resolution {
    bundled: HashMap<String, AssetReference>,
    oversized: HashSet<String>,
    downloaded: HashMap<String, AssetReference>,
    used_names: HashSet<String>,
}

pub struct ArchiveExtractor {
    downloader: AssetDownloader,
}

impl ArchiveExtractor {
    pub fn new() -> Result<Self, ImportError> {
        let downloader = AssetDownloader::new()
            .map_err(|e| ImportError::extraction(format!("Cannot create HTTP client: {}", e)))?;
        Ok(Self { downloader })
    }

    pub fn with_downloader(downloader: AssetDownloader) -> Self {
        Self { downloader }
    }

    /// Read, validate and convert an archive; assets land in `work_dir/assets`
    pub async fn extract(
        &self,
        archive_path: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ParseResult, ImportError> {
        let path = archive_path.to_path_buf();
        let manifest = tokio::task::spawn_blocking(move || read_manifest(&path))
            .await
            .map_err(|e| ImportError::extraction(format!("Archive reader failed: {}", e)))??;

        manifest.validate()?;
        let (mut result, requests) = manifest.into_parse_result();

        if !requests.is_empty() {
            self.resolve_assets(archive_path, work_dir, &mut result, requests, cancel)
                .await?;
        }

        order_tours(&mut result.tours);
        result.confidence = result.compute_confidence();

        tracing::info!(
            title = %result.title,
            tours = result.tours.len(),
            questions = result.question_count(),
            assets = result.assets.len(),
            warnings = result.warnings.len(),
            "Archive package extracted"
        );
        Ok(result)
    }

    async fn resolve_assets(
        &self,
        archive_path: &Path,
        work_dir: &Path,
        result: &mut ParseResult,
        requests: Vec<AssetRequest>,
        cancel: &CancellationToken,
    ) -> Result<(), ImportError> {
        let assets_dir = work_dir.join(ASSETS_DIR);
        tokio::fs::create_dir_all(&assets_dir)
            .await
            .map_err(|e| ImportError::extraction(format!("Cannot create assets directory: {}", e)))?;

        let wanted: Vec<String> = requests
            .iter()
            .filter_map(|r| r.file_name.as_deref().and_then(sanitize_file_name))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let bundled = {
            let archive: PathBuf = archive_path.to_path_buf();
            let dir = assets_dir.clone();
            tokio::task::spawn_blocking(move || {
                extract_bundled(&archive, &wanted, &dir, MAX_DOWNLOAD_BYTES)
            })
                .await
                .map_err(|e| ImportError::extraction(format!("Archive reader failed: {}", e)))?
                .map_err(|e| ImportError::extraction(format!("Cannot unpack assets: {}", e)))?
        };

        let mut resolution = Resolution {
            used_names: bundled.found.keys().cloned().collect(),
            bundled: bundled.found,
            oversized: bundled.oversized,
            downloaded: HashMap::new(),
        };

        for request in requests {
            if cancel.is_cancelled() {
                return Err(ImportError::cancelled());
            }

            match self.resolve_one(&request, &assets_dir, &mut resolution, cancel).await {
                Ok(asset) => {
                    if let Some(question) = question_mut(&mut result.tours, request.location) {
                        let slot = match request.slot {
                            AssetSlot::Handout => &mut question.handout_asset_file_name,
                            AssetSlot::Comment => &mut question.comment_asset_file_name,
                        };
                        *slot = Some(asset.file_name.clone());
                    }
                    if result.asset(&asset.file_name).is_none() {
                        result.assets.push(asset);
                    }
                }
                Err(AssetError::Cancelled) => return Err(ImportError::cancelled()),
                Err(e) => {
                    let reference = request
                        .file_name
                        .as_deref()
                        .or(request.url.as_deref())
                        .unwrap_or_default();
                    tracing::warn!(
                        question = %request.question_number,
                        asset = %reference,
                        error = %e,
                        "Archive asset not resolved"
                    );
                    result.warnings.push(format!(
                        "Question {}: {} asset {} skipped: {}",
                        request.question_number,
                        slot_label(request.slot),
                        reference,
                        e
                    ));
                }
            }
        }

        Ok(())
    }

    async fn resolve_one(
        &self,
        request: &AssetRequest,
        assets_dir: &Path,
        resolution: &mut Resolution,
        cancel: &CancellationToken,
    ) -> Result<AssetReference, AssetError> {
        let name = match &request.file_name {
            Some(raw) => Some(
                sanitize_file_name(raw).ok_or_else(|| AssetError::InvalidName(raw.clone()))?,
            ),
            None => None,
        };

        if let Some(name) = &name {
            if let Some(asset) = resolution.bundled.get(name) {
                return Ok(asset.clone());
            }
            if resolution.oversized.contains(name) {
                return Err(AssetError::TooLarge(MAX_DOWNLOAD_BYTES));
            }
        }

        let url = request.url.as_deref().ok_or(AssetError::Missing)?;
        if let Some(asset) = resolution.downloaded.get(url) {
            return Ok(asset.clone());
        }

        let bytes = self.downloader.fetch(url, cancel).await?;

        let base = name
            .or_else(|| file_name_from_url(url))
            .unwrap_or_else(|| "asset".to_string());
        let file_name = unique_file_name(&base, &resolution.used_names);
        tokio::fs::write(assets_dir.join(&file_name), &bytes).await?;

        let asset = AssetReference::new(
            file_name.clone(),
            sniff_content_type(&bytes),
            bytes.len() as u64,
        );
        resolution.used_names.insert(file_name);
        resolution.downloaded.insert(url.to_string(), asset.clone());
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::TourType;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    const PNG: [u8; 12] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn write_zip(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("package.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        for (name, bytes) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[tokio::test]
    async fn test_extracts_manifest_and_bundled_asset() {
        let dir = TempDir::new().unwrap();
        let manifest = r#"{
            "formatVersion": 1,
            "title": "Кубок Дніпра",
            "tours": [
                {"isShootout": true, "questions": [
                    {"number": "П1", "text": "Q", "answer": "A"}
                ]},
                {"number": 1, "questions": [
                    {"number": 1, "text": "Q", "answer": "A", "handoutAssetFileName": "map.png"},
                    {"number": 2, "text": "Q", "answer": "A", "commentAssetFileName": "gone.png"},
                    {"number": 3, "text": "Q", "answer": "A", "commentAssetUrl": "ftp://example.com/x.png"}
                ]}
            ]
        }"#;
        let archive = write_zip(
            dir.path(),
            &[("package.json", manifest.as_bytes()), ("assets/map.png", &PNG)],
        );
        let work_dir = dir.path().join("work");

        let extractor = ArchiveExtractor::new().unwrap();
        let result = extractor
            .extract(&archive, &work_dir, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.title, "Кубок Дніпра");
        assert_eq!(result.tours[0].tour_type, TourType::Regular);
        assert_eq!(result.tours[1].tour_type, TourType::Shootout);
        assert_eq!(result.tours[1].order_index, 1);

        let questions = &result.tours[0].questions;
        assert_eq!(questions[0].handout_asset_file_name.as_deref(), Some("map.png"));
        assert!(questions[1].comment_asset_file_name.is_none());
        assert!(questions[2].comment_asset_file_name.is_none());

        assert_eq!(result.assets.len(), 1);
        assert_eq!(result.assets[0].content_type, "image/png");
        assert!(work_dir.join("assets/map.png").exists());
        assert_eq!(
            result.warnings.iter().filter(|w| w.contains("skipped")).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_missing_manifest_is_validation_error() {
        let dir = TempDir::new().unwrap();
        let archive = write_zip(dir.path(), &[("readme.txt", b"hello")]);
        let err = ArchiveExtractor::new()
            .unwrap()
            .extract(&archive, dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_not_a_zip_is_extraction_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        let err = ArchiveExtractor::new()
            .unwrap()
            .extract(&path, dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Extraction);
    }

    #[tokio::test]
    async fn test_manifest_with_bom() {
        let dir = TempDir::new().unwrap();
        let manifest = "\u{FEFF}{\"title\": \"T\", \"tours\": [{\"number\": 1, \"questions\": [{\"number\": 1, \"text\": \"Q\", \"answer\": \"A\"}]}]}";
        let archive = write_zip(dir.path(), &[("package.json", manifest.as_bytes())]);
        let result = ArchiveExtractor::new()
            .unwrap()
            .extract(&archive, dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.question_count(), 1);
        assert!((result.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancelled_before_assets() {
        let dir = TempDir::new().unwrap();
        let manifest = r#"{"title": "T", "tours": [{"number": 1, "questions": [
            {"number": 1, "text": "Q", "answer": "A", "handoutAssetUrl": "http://10.255.255.1/a.png"}
        ]}]}"#;
        let archive = write_zip(dir.path(), &[("package.json", manifest.as_bytes())]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ArchiveExtractor::new()
            .unwrap()
            .extract(&archive, dir.path(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }
}
