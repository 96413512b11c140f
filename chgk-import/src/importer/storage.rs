//! Promotion of job assets into permanent media storage
//!
//! Files referenced by question slots are copied from the job working
//! directory into `<media>/<package_id>/` before the package transaction
//! starts. Unreferenced files stay behind and disappear with the working
//! directory.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::archive::assets::sniff_content_type;
use crate::archive::ASSETS_DIR;
use crate::error::ImportError;
use crate::models::ParseResult;

#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub file_name: String,
    pub public_url: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub sha256: String,
}

pub fn public_url(package_id: Uuid, file_name: &str) -> String {
    format!("/media/{}/{}", package_id, file_name)
}

pub fn package_media_dir(media_root: &Path, package_id: Uuid) -> PathBuf {
    media_root.join(package_id.to_string())
}

/// File names used by at least one question slot
fn referenced_file_names(result: &ParseResult) -> BTreeSet<String> {
    result
        .questions()
        .flat_map(|q| {
            [
                q.handout_asset_file_name.clone(),
                q.comment_asset_file_name.clone(),
            ]
        })
        .flatten()
        .collect()
}

/// Copy every referenced asset into the package media directory
///
/// A missing source file is a warning; the slot is imported without a URL.
pub async fn promote_assets(
    result: &ParseResult,
    work_dir: &Path,
    package_dir: &Path,
    package_id: Uuid,
    warnings: &mut Vec<String>,
) -> Result<HashMap<String, StoredAsset>, ImportError> {
    let names = referenced_file_names(result);
    let mut stored = HashMap::new();
    if names.is_empty() {
        return Ok(stored);
    }

    tokio::fs::create_dir_all(package_dir)
        .await
        .map_err(|e| ImportError::database(format!("Cannot create media directory: {}", e)))?;

    for name in names {
        let known = result.asset(&name);
        let source = match known {
            Some(asset) => work_dir.join(&asset.relative_url),
            None => work_dir.join(ASSETS_DIR).join(&name),
        };

        let bytes = match tokio::fs::read(&source).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "Referenced asset missing from working directory");
                warnings.push(format!("Asset {} could not be stored: {}", name, e));
                continue;
            }
        };

        let sha256 = format!("{:x}", Sha256::digest(&bytes));
        tokio::fs::write(package_dir.join(&name), &bytes)
            .await
            .map_err(|e| ImportError::database(format!("Cannot store asset {}: {}", name, e)))?;

        let content_type = known
            .map(|a| a.content_type.clone())
            .unwrap_or_else(|| sniff_content_type(&bytes));

        stored.insert(
            name.clone(),
            StoredAsset {
                public_url: public_url(package_id, &name),
                file_name: name,
                content_type,
                size_bytes: bytes.len() as u64,
                sha256,
            },
        );
    }

    tracing::debug!(package_id = %package_id, count = stored.len(), "Assets promoted");
    Ok(stored)
}

/// Remove promoted files after a failed import
pub async fn discard_package_media(package_dir: &Path) {
    match tokio::fs::remove_dir_all(package_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(dir = %package_dir.display(), error = %e, "Failed to remove media directory");
        }
    }
}
