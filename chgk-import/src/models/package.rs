//! Parsed package tree
//!
//! Package → tours → optional blocks → questions. A tour holds either blocks or
//! direct questions, never both; producers keep that invariant and consumers
//! rely on it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How question numbers relate across tours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NumberingMode {
    /// One counter across the whole package
    Global,
    /// Numbers restart in every tour
    PerTour,
    /// At least one number is not a plain integer
    Manual,
}

impl NumberingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumberingMode::Global => "GLOBAL",
            NumberingMode::PerTour => "PER_TOUR",
            NumberingMode::Manual => "MANUAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TourType {
    Regular,
    /// Always ordered first
    Warmup,
    /// Always ordered last
    Shootout,
}

impl TourType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TourType::Regular => "REGULAR",
            TourType::Warmup => "WARMUP",
            TourType::Shootout => "SHOOTOUT",
        }
    }
}

/// Media file referenced by a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReference {
    /// Unique within one package
    pub file_name: String,
    /// Location relative to the job working directory
    pub relative_url: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl AssetReference {
    /// Reference to a file stored under `assets/` in the working directory
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, size_bytes: u64) -> Self {
        let file_name = file_name.into();
        Self {
            relative_url: format!("assets/{}", file_name),
            file_name,
            content_type: content_type.into(),
            size_bytes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub number: String,
    pub host_instructions: Option<String>,
    pub handout_text: Option<String>,
    pub handout_asset_file_name: Option<String>,
    pub text: String,
    pub answer: String,
    pub accepted_answers: Option<String>,
    pub rejected_answers: Option<String>,
    pub comment: Option<String>,
    pub comment_asset_file_name: Option<String>,
    pub source: Option<String>,
    pub authors: Vec<String>,
}

impl Question {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            ..Default::default()
        }
    }

    /// Numeric value of the question number, if it is a plain integer
    pub fn numeric_number(&self) -> Option<u32> {
        let trimmed = self.number.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        trimmed.parse().ok()
    }

    /// Nothing but a number has been filled in
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
            && self.answer.trim().is_empty()
            && self.host_instructions.is_none()
            && self.handout_text.is_none()
            && self.handout_asset_file_name.is_none()
            && self.comment.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: Option<String>,
    /// Unique within the owning tour
    pub order_index: usize,
    pub editors: Vec<String>,
    pub preamble: Option<String>,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    /// Display number ("1", "3", "Розминка")
    pub number: String,
    pub order_index: usize,
    pub tour_type: TourType,
    pub editors: Vec<String>,
    pub preamble: Option<String>,
    pub comment: Option<String>,
    /// Populated only when `questions` is empty
    pub blocks: Vec<Block>,
    /// Populated only when `blocks` is empty
    pub questions: Vec<Question>,
}

impl Tour {
    pub fn new(number: impl Into<String>, tour_type: TourType) -> Self {
        Self {
            number: number.into(),
            order_index: 0,
            tour_type,
            editors: Vec::new(),
            preamble: None,
            comment: None,
            blocks: Vec::new(),
            questions: Vec::new(),
        }
    }

    /// All questions in document order, whether direct or inside blocks
    pub fn all_questions(&self) -> impl Iterator<Item = &Question> {
        self.questions
            .iter()
            .chain(self.blocks.iter().flat_map(|b| b.questions.iter()))
    }

    pub fn all_questions_mut(&mut self) -> impl Iterator<Item = &mut Question> {
        self.questions
            .iter_mut()
            .chain(self.blocks.iter_mut().flat_map(|b| b.questions.iter_mut()))
    }

    pub fn question_count(&self) -> usize {
        self.questions.len() + self.blocks.iter().map(|b| b.questions.len()).sum::<usize>()
    }
}

/// Output of the structural parser and the archive extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub title: String,
    pub description: Option<String>,
    pub preamble: Option<String>,
    pub editors: Vec<String>,
    pub tags: Vec<String>,
    pub source_url: Option<String>,
    pub played_from: Option<NaiveDate>,
    pub played_to: Option<NaiveDate>,
    pub numbering_mode: NumberingMode,
    /// Heuristic completeness score in [0, 1]
    pub confidence: f64,
    pub warnings: Vec<String>,
    pub tours: Vec<Tour>,
    /// Files referenced by question asset slots
    pub assets: Vec<AssetReference>,
}

impl Default for ParseResult {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: None,
            preamble: None,
            editors: Vec::new(),
            tags: Vec::new(),
            source_url: None,
            played_from: None,
            played_to: None,
            numbering_mode: NumberingMode::Global,
            confidence: 0.0,
            warnings: Vec::new(),
            tours: Vec::new(),
            assets: Vec::new(),
        }
    }
}

impl ParseResult {
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.tours.iter().flat_map(|t| t.all_questions())
    }

    pub fn question_count(&self) -> usize {
        self.tours.iter().map(|t| t.question_count()).sum()
    }

    pub fn asset(&self, file_name: &str) -> Option<&AssetReference> {
        self.assets.iter().find(|a| a.file_name == file_name)
    }

    /// 0.6 × share of questions with an answer + 0.4 × share with text
    pub fn compute_confidence(&self) -> f64 {
        let total = self.question_count();
        if total == 0 {
            return 0.0;
        }

        let with_answer = self.questions().filter(|q| !q.answer.trim().is_empty()).count();
        let with_text = self.questions().filter(|q| !q.text.trim().is_empty()).count();

        0.6 * (with_answer as f64 / total as f64) + 0.4 * (with_text as f64 / total as f64)
    }
}
