//! Database importer
//!
//! Persists a [`ParseResult`] as one package. Field limits are applied
//! first, then referenced assets are promoted to media storage, then the
//! whole tree is written in a single transaction. Any failure rolls the
//! transaction back and removes the promoted files.

pub mod authors;
pub mod storage;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chgk_common::Result;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ImportError;
use crate::models::{ParseResult, Question};
use crate::utils::{begin_monitored, retry_on_lock};

use authors::AuthorCache;
use storage::{discard_package_media, package_media_dir, promote_assets, StoredAsset};

pub const TITLE_MAX_CHARS: usize = 200;
pub const SHORT_FIELD_MAX_CHARS: usize = 500;
pub const LONG_FIELD_MAX_CHARS: usize = 10_000;

const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Successful import
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub package_id: Uuid,
    /// Importer warnings only; parser warnings stay with the caller
    pub warnings: Vec<String>,
}

fn truncate_chars(text: &mut String, max: usize) -> bool {
    match text.char_indices().nth(max) {
        Some((cut, _)) => {
            text.truncate(cut);
            true
        }
        None => false,
    }
}

fn limit(text: &mut String, max: usize, what: &str, warnings: &mut Vec<String>) {
    if truncate_chars(text, max) {
        warnings.push(format!("{} truncated to {} characters", what, max));
    }
}

fn limit_opt(text: &mut Option<String>, max: usize, what: &str, warnings: &mut Vec<String>) {
    if let Some(text) = text {
        limit(text, max, what, warnings);
    }
}

fn limit_question(question: &mut Question, warnings: &mut Vec<String>) {
    let label = format!("Question {}", question.number);
    let field = |name: &str| format!("{} {}", label, name);

    limit(&mut question.number, SHORT_FIELD_MAX_CHARS, &field("number"), warnings);
    limit(&mut question.answer, SHORT_FIELD_MAX_CHARS, &field("answer"), warnings);
    limit(&mut question.text, LONG_FIELD_MAX_CHARS, &field("text"), warnings);
    limit_opt(&mut question.host_instructions, LONG_FIELD_MAX_CHARS, &field("host instructions"), warnings);
    limit_opt(&mut question.handout_text, LONG_FIELD_MAX_CHARS, &field("handout"), warnings);
    limit_opt(&mut question.accepted_answers, LONG_FIELD_MAX_CHARS, &field("accepted answers"), warnings);
    limit_opt(&mut question.rejected_answers, LONG_FIELD_MAX_CHARS, &field("rejected answers"), warnings);
    limit_opt(&mut question.comment, LONG_FIELD_MAX_CHARS, &field("comment"), warnings);
    limit_opt(&mut question.source, LONG_FIELD_MAX_CHARS, &field("source"), warnings);
}

/// Apply storage limits to every text field, reporting each cut
pub fn apply_field_limits(result: &mut ParseResult, warnings: &mut Vec<String>) {
    limit(&mut result.title, TITLE_MAX_CHARS, "Package title", warnings);
    limit_opt(&mut result.description, SHORT_FIELD_MAX_CHARS, "Package description", warnings);
    limit_opt(&mut result.source_url, SHORT_FIELD_MAX_CHARS, "Package source URL", warnings);
    limit_opt(&mut result.preamble, LONG_FIELD_MAX_CHARS, "Package preamble", warnings);
    for tag in &mut result.tags {
        limit(tag, SHORT_FIELD_MAX_CHARS, "Package tag", warnings);
    }

    for tour in &mut result.tours {
        let label = format!("Tour {}", tour.number);
        limit(&mut tour.number, SHORT_FIELD_MAX_CHARS, &format!("{} number", label), warnings);
        limit_opt(&mut tour.preamble, LONG_FIELD_MAX_CHARS, &format!("{} preamble", label), warnings);
        limit_opt(&mut tour.comment, LONG_FIELD_MAX_CHARS, &format!("{} comment", label), warnings);
        for block in &mut tour.blocks {
            limit_opt(&mut block.name, SHORT_FIELD_MAX_CHARS, &format!("{} block name", label), warnings);
            limit_opt(&mut block.preamble, LONG_FIELD_MAX_CHARS, &format!("{} block preamble", label), warnings);
        }
        for question in tour.all_questions_mut() {
            limit_question(question, warnings);
        }
    }
}

pub struct PackageImporter {
    pool: SqlitePool,
    media_root: PathBuf,
    max_lock_wait_ms: u64,
}

impl PackageImporter {
    pub fn new(pool: SqlitePool, media_root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            media_root: media_root.into(),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    /// Persist `result` for `owner_id`; asset files are read from `work_dir`
    pub async fn import(
        &self,
        result: &ParseResult,
        owner_id: &str,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<ImportOutcome, ImportError> {
        if cancel.is_cancelled() {
            return Err(ImportError::cancelled());
        }

        let package_id = Uuid::new_v4();
        let mut warnings = Vec::new();
        let mut package = result.clone();
        apply_field_limits(&mut package, &mut warnings);

        let package_dir = package_media_dir(&self.media_root, package_id);
        let stored =
            match promote_assets(&package, work_dir, &package_dir, package_id, &mut warnings).await {
                Ok(stored) => stored,
                Err(e) => {
                    discard_package_media(&package_dir).await;
                    return Err(e);
                }
            };

        if cancel.is_cancelled() {
            discard_package_media(&package_dir).await;
            return Err(ImportError::cancelled());
        }

        let written = retry_on_lock("importer::write_package", self.max_lock_wait_ms, || {
            write_package(&self.pool, package_id, owner_id, &package, &stored)
        })
        .await;

        match written {
            Ok(author_warnings) => {
                warnings.extend(author_warnings);
                tracing::info!(
                    package_id = %package_id,
                    owner_id = %owner_id,
                    tours = package.tours.len(),
                    questions = package.question_count(),
                    assets = stored.len(),
                    "Package imported"
                );
                Ok(ImportOutcome {
                    package_id,
                    warnings,
                })
            }
            Err(e) => {
                tracing::error!(package_id = %package_id, error = %e, "Package import rolled back");
                discard_package_media(&package_dir).await;
                Err(e.into())
            }
        }
    }
}

fn asset_url(stored: &HashMap<String, StoredAsset>, file_name: &Option<String>) -> Option<String> {
    file_name
        .as_ref()
        .and_then(|name| stored.get(name))
        .map(|asset| asset.public_url.clone())
}

/// Write the whole tree in one transaction; returns author warnings
async fn write_package(
    pool: &SqlitePool,
    package_id: Uuid,
    owner_id: &str,
    package: &ParseResult,
    stored: &HashMap<String, StoredAsset>,
) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let mut authors = AuthorCache::new();
    let mut tx = begin_monitored(pool, "importer::write_package").await?;
    let package_key = package_id.to_string();

    sqlx::query(
        r#"
        INSERT INTO packages (
            id, owner_id, title, description, preamble, source_url,
            played_from, played_to, numbering_mode, confidence
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&package_key)
    .bind(owner_id)
    .bind(&package.title)
    .bind(&package.description)
    .bind(&package.preamble)
    .bind(&package.source_url)
    .bind(package.played_from.map(|d| d.to_string()))
    .bind(package.played_to.map(|d| d.to_string()))
    .bind(package.numbering_mode.as_str())
    .bind(package.confidence)
    .execute(tx.conn()?)
    .await?;

    let editor_ids = authors
        .resolve_all(tx.conn()?, &package.editors, "Package editor", &mut warnings)
        .await?;
    for (position, author_id) in editor_ids.iter().enumerate() {
        sqlx::query("INSERT INTO package_editors (package_id, author_id, position) VALUES (?, ?, ?)")
            .bind(&package_key)
            .bind(author_id.to_string())
            .bind(position as i64)
            .execute(tx.conn()?)
            .await?;
    }

    for tag in &package.tags {
        sqlx::query("INSERT OR IGNORE INTO package_tags (package_id, tag) VALUES (?, ?)")
            .bind(&package_key)
            .bind(tag)
            .execute(tx.conn()?)
            .await?;
    }

    for asset in stored.values() {
        sqlx::query(
            r#"
            INSERT INTO media_assets (id, package_id, file_name, public_url, content_type, size_bytes, sha256)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&package_key)
        .bind(&asset.file_name)
        .bind(&asset.public_url)
        .bind(&asset.content_type)
        .bind(asset.size_bytes as i64)
        .bind(&asset.sha256)
        .execute(tx.conn()?)
        .await?;
    }

    for tour in &package.tours {
        let tour_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO tours (id, package_id, number, order_index, tour_type, preamble, comment)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tour_id)
        .bind(&package_key)
        .bind(&tour.number)
        .bind(tour.order_index as i64)
        .bind(tour.tour_type.as_str())
        .bind(&tour.preamble)
        .bind(&tour.comment)
        .execute(tx.conn()?)
        .await?;

        let context = format!("Tour {} editor", tour.number);
        let editor_ids = authors
            .resolve_all(tx.conn()?, &tour.editors, &context, &mut warnings)
            .await?;
        for (position, author_id) in editor_ids.iter().enumerate() {
            sqlx::query("INSERT INTO tour_editors (tour_id, author_id, position) VALUES (?, ?, ?)")
                .bind(&tour_id)
                .bind(author_id.to_string())
                .bind(position as i64)
                .execute(tx.conn()?)
                .await?;
        }

        let mut question_index = 0usize;
        for question in &tour.questions {
            insert_question(&mut tx, &mut authors, &tour_id, None, question_index, question, stored, &mut warnings)
                .await?;
            question_index += 1;
        }

        for block in &tour.blocks {
            let block_id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO blocks (id, tour_id, name, order_index, preamble) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&block_id)
            .bind(&tour_id)
            .bind(&block.name)
            .bind(block.order_index as i64)
            .bind(&block.preamble)
            .execute(tx.conn()?)
            .await?;

            let context = format!("Tour {} block editor", tour.number);
            let editor_ids = authors
                .resolve_all(tx.conn()?, &block.editors, &context, &mut warnings)
                .await?;
            for (position, author_id) in editor_ids.iter().enumerate() {
                sqlx::query("INSERT INTO block_editors (block_id, author_id, position) VALUES (?, ?, ?)")
                    .bind(&block_id)
                    .bind(author_id.to_string())
                    .bind(position as i64)
                    .execute(tx.conn()?)
                    .await?;
            }

            for question in &block.questions {
                insert_question(
                    &mut tx,
                    &mut authors,
                    &tour_id,
                    Some(&block_id),
                    question_index,
                    question,
                    stored,
                    &mut warnings,
                )
                .await?;
                question_index += 1;
            }
        }
    }

    tx.commit().await?;
    Ok(warnings)
}

#[allow(clippy::too_many_arguments)]
async fn insert_question(
    tx: &mut crate::utils::MonitoredTransaction<'_>,
    authors: &mut AuthorCache,
    tour_id: &str,
    block_id: Option<&str>,
    order_index: usize,
    question: &Question,
    stored: &HashMap<String, StoredAsset>,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let question_id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO questions (
            id, tour_id, block_id, order_index, number,
            host_instructions, handout_text, handout_asset_url,
            text, answer, accepted_answers, rejected_answers,
            comment, comment_asset_url, source
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&question_id)
    .bind(tour_id)
    .bind(block_id)
    .bind(order_index as i64)
    .bind(&question.number)
    .bind(&question.host_instructions)
    .bind(&question.handout_text)
    .bind(asset_url(stored, &question.handout_asset_file_name))
    .bind(&question.text)
    .bind(&question.answer)
    .bind(&question.accepted_answers)
    .bind(&question.rejected_answers)
    .bind(&question.comment)
    .bind(asset_url(stored, &question.comment_asset_file_name))
    .bind(&question.source)
    .execute(tx.conn()?)
    .await?;

    let context = format!("Question {} author", question.number);
    let author_ids = authors
        .resolve_all(tx.conn()?, &question.authors, &context, warnings)
        .await?;
    for (position, author_id) in author_ids.iter().enumerate() {
        sqlx::query("INSERT INTO question_authors (question_id, author_id, position) VALUES (?, ?, ?)")
            .bind(&question_id)
            .bind(author_id.to_string())
            .bind(position as i64)
            .execute(tx.conn()?)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        let mut text = "ї".repeat(5);
        assert!(truncate_chars(&mut text, 3));
        assert_eq!(text, "їїї");
        assert!(!truncate_chars(&mut text, 3));
    }

    #[test]
    fn test_field_limits_warn() {
        let mut result = ParseResult {
            title: "Т".repeat(TITLE_MAX_CHARS + 1),
            ..Default::default()
        };
        let mut tour = crate::models::Tour::new("1", crate::models::TourType::Regular);
        let mut question = Question::new("1");
        question.answer = "a".repeat(SHORT_FIELD_MAX_CHARS + 10);
        question.text = "short".to_string();
        tour.questions.push(question);
        result.tours.push(tour);

        let mut warnings = Vec::new();
        apply_field_limits(&mut result, &mut warnings);

        assert_eq!(result.title.chars().count(), TITLE_MAX_CHARS);
        assert_eq!(result.tours[0].questions[0].answer.len(), SHORT_FIELD_MAX_CHARS);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].starts_with("Question 1 answer"));
    }
}
