//! `package.json` manifest of an archive package
//!
//! The manifest is already structured, so conversion is a direct mapping. The
//! only work is validation and collecting the asset references that still
//! have to be resolved to files.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::ImportError;
use crate::models::{Block, NumberingMode, ParseResult, Question, Tour, TourType};
use crate::parser::structure::{SHOOTOUT_TOUR_NUMBER, WARMUP_TOUR_NUMBER};

/// Newest manifest layout this importer understands
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    SUPPORTED_FORMAT_VERSION
}

/// Question and tour numbers may be written as JSON numbers or strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ManifestNumber {
    Int(i64),
    Text(String),
}

impl ManifestNumber {
    pub fn as_text(&self) -> String {
        match self {
            ManifestNumber::Int(n) => n.to_string(),
            ManifestNumber::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub preamble: Option<String>,
    pub source_url: Option<String>,
    pub played_from: Option<NaiveDate>,
    pub played_to: Option<NaiveDate>,
    pub numbering_mode: Option<String>,
    /// Package editors also edit every tour that lists none
    #[serde(default)]
    pub shared_editors: bool,
    #[serde(default)]
    pub editors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tours: Vec<ManifestTour>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestTour {
    pub number: Option<ManifestNumber>,
    #[serde(default)]
    pub is_warmup: bool,
    #[serde(default)]
    pub is_shootout: bool,
    #[serde(default)]
    pub editors: Vec<String>,
    pub preamble: Option<String>,
    pub comment: Option<String>,
    #[serde(default)]
    pub questions: Vec<ManifestQuestion>,
    #[serde(default)]
    pub blocks: Vec<ManifestBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestBlock {
    pub name: Option<String>,
    #[serde(default)]
    pub editors: Vec<String>,
    pub preamble: Option<String>,
    #[serde(default)]
    pub questions: Vec<ManifestQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestQuestion {
    pub number: Option<ManifestNumber>,
    pub host_instructions: Option<String>,
    pub handout_text: Option<String>,
    pub handout_asset_file_name: Option<String>,
    pub handout_asset_url: Option<String>,
    pub text: Option<String>,
    pub answer: Option<String>,
    pub accepted_answers: Option<String>,
    pub rejected_answers: Option<String>,
    pub comment: Option<String>,
    pub comment_asset_file_name: Option<String>,
    pub comment_asset_url: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

/// Question slot an archive asset belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSlot {
    Handout,
    Comment,
}

/// Position of a question in the converted (not yet reordered) tour list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionLocation {
    pub tour: usize,
    pub block: Option<usize>,
    pub index: usize,
}

/// Asset that still has to become a file in the working directory
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRequest {
    pub location: QuestionLocation,
    pub slot: AssetSlot,
    pub question_number: String,
    pub file_name: Option<String>,
    pub url: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_blank(value: &Option<String>) -> bool {
    non_blank(value).is_none()
}

fn parse_numbering_mode(raw: &str) -> Option<NumberingMode> {
    match raw.trim().to_lowercase().replace(['-', '_'], "").as_str() {
        "global" => Some(NumberingMode::Global),
        "pertour" => Some(NumberingMode::PerTour),
        "manual" => Some(NumberingMode::Manual),
        _ => None,
    }
}

impl ManifestTour {
    fn display_number(&self) -> String {
        match &self.number {
            Some(number) => number.as_text(),
            None if self.is_warmup => WARMUP_TOUR_NUMBER.to_string(),
            None if self.is_shootout => SHOOTOUT_TOUR_NUMBER.to_string(),
            None => String::new(),
        }
    }
}

impl PackageManifest {
    /// Check required fields; every problem is listed in one error
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ImportError::validation(format!(
                "Unsupported formatVersion {} (supported: {})",
                self.format_version, SUPPORTED_FORMAT_VERSION
            )));
        }

        let mut problems = Vec::new();
        if self.title.trim().is_empty() {
            problems.push("title is required".to_string());
        }
        if self.tours.is_empty() {
            problems.push("at least one tour is required".to_string());
        }

        for (tour_index, tour) in self.tours.iter().enumerate() {
            let tour_label = format!("tour {}", tour_index + 1);
            if !tour.blocks.is_empty() && !tour.questions.is_empty() {
                problems.push(format!("{} has both blocks and questions", tour_label));
            }

            let questions = tour
                .questions
                .iter()
                .chain(tour.blocks.iter().flat_map(|b| b.questions.iter()));
            for (question_index, question) in questions.enumerate() {
                let label = format!("{} question {}", tour_label, question_index + 1);
                if question.number.as_ref().map_or(true, |n| n.as_text().is_empty()) {
                    problems.push(format!("{}: number is required", label));
                }
                if is_blank(&question.text) {
                    problems.push(format!("{}: text is required", label));
                }
                if is_blank(&question.answer) {
                    problems.push(format!("{}: answer is required", label));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ImportError::validation(format!(
                "Invalid package.json: {}",
                problems.join("; ")
            )))
        }
    }

    /// Map onto the package tree; asset slots stay empty until resolved
    pub fn into_parse_result(self) -> (ParseResult, Vec<AssetRequest>) {
        let mut warnings = Vec::new();
        let mut requests = Vec::new();

        let numbering_mode = match self.numbering_mode.as_deref() {
            Some(raw) => parse_numbering_mode(raw).or_else(|| {
                warnings.push(format!("Unknown numberingMode \"{}\", inferring from numbers", raw));
                None
            }),
            None => None,
        };

        let mut regular_count = 0;
        let mut tours = Vec::with_capacity(self.tours.len());
        for (tour_index, manifest_tour) in self.tours.iter().enumerate() {
            let tour_type = if manifest_tour.is_warmup {
                TourType::Warmup
            } else if manifest_tour.is_shootout {
                TourType::Shootout
            } else {
                regular_count += 1;
                TourType::Regular
            };

            let mut number = manifest_tour.display_number();
            if number.is_empty() {
                number = regular_count.to_string();
            }

            let mut tour = Tour::new(number, tour_type);
            tour.order_index = tour_index;
            tour.editors = manifest_tour.editors.clone();
            if tour.editors.is_empty() && self.shared_editors {
                tour.editors = self.editors.clone();
            }
            tour.preamble = non_blank(&manifest_tour.preamble);
            tour.comment = non_blank(&manifest_tour.comment);

            for (index, question) in manifest_tour.questions.iter().enumerate() {
                let location = QuestionLocation {
                    tour: tour_index,
                    block: None,
                    index,
                };
                tour.questions.push(convert_question(question, location, &mut requests));
            }

            for (block_index, manifest_block) in manifest_tour.blocks.iter().enumerate() {
                let mut block = Block {
                    name: non_blank(&manifest_block.name),
                    order_index: block_index,
                    editors: manifest_block.editors.clone(),
                    preamble: non_blank(&manifest_block.preamble),
                    questions: Vec::new(),
                };
                for (index, question) in manifest_block.questions.iter().enumerate() {
                    let location = QuestionLocation {
                        tour: tour_index,
                        block: Some(block_index),
                        index,
                    };
                    block.questions.push(convert_question(question, location, &mut requests));
                }
                tour.blocks.push(block);
            }

            tours.push(tour);
        }

        let mut result = ParseResult {
            title: self.title.trim().to_string(),
            description: non_blank(&self.description),
            preamble: non_blank(&self.preamble),
            editors: self.editors,
            tags: self.tags,
            source_url: non_blank(&self.source_url),
            played_from: self.played_from,
            played_to: self.played_to,
            warnings,
            tours,
            ..Default::default()
        };
        result.numbering_mode = numbering_mode.unwrap_or_else(|| infer_numbering_mode(&result));

        (result, requests)
    }
}

fn convert_question(
    question: &ManifestQuestion,
    location: QuestionLocation,
    requests: &mut Vec<AssetRequest>,
) -> Question {
    let number = question
        .number
        .as_ref()
        .map(ManifestNumber::as_text)
        .unwrap_or_default();

    for (slot, file_name, url) in [
        (
            AssetSlot::Handout,
            &question.handout_asset_file_name,
            &question.handout_asset_url,
        ),
        (
            AssetSlot::Comment,
            &question.comment_asset_file_name,
            &question.comment_asset_url,
        ),
    ] {
        let file_name = non_blank(file_name);
        let url = non_blank(url);
        if file_name.is_some() || url.is_some() {
            requests.push(AssetRequest {
                location,
                slot,
                question_number: number.clone(),
                file_name,
                url,
            });
        }
    }

    Question {
        number,
        host_instructions: non_blank(&question.host_instructions),
        handout_text: non_blank(&question.handout_text),
        handout_asset_file_name: None,
        text: question.text.clone().unwrap_or_default().trim().to_string(),
        answer: question.answer.clone().unwrap_or_default().trim().to_string(),
        accepted_answers: non_blank(&question.accepted_answers),
        rejected_answers: non_blank(&question.rejected_answers),
        comment: non_blank(&question.comment),
        comment_asset_file_name: None,
        source: non_blank(&question.source),
        authors: question
            .authors
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
    }
}

/// Manual if any number is not an integer; per-tour if every regular tour
/// after the first restarts at 0 or 1; global otherwise
fn infer_numbering_mode(result: &ParseResult) -> NumberingMode {
    if result.questions().any(|q| q.numeric_number().is_none()) {
        return NumberingMode::Manual;
    }

    let first_numbers: Vec<u32> = result
        .tours
        .iter()
        .filter(|t| t.tour_type == TourType::Regular)
        .filter_map(|t| t.all_questions().next().and_then(|q| q.numeric_number()))
        .collect();

    if first_numbers.len() > 1 && first_numbers[1..].iter().all(|n| *n <= 1) {
        NumberingMode::PerTour
    } else {
        NumberingMode::Global
    }
}
