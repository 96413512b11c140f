//! Parser state
//!
//! One [`ParserState`] lives for exactly one `parse_blocks` call. Line handlers
//! take it by `&mut` and are otherwise pure.

use std::collections::HashSet;

use crate::models::{AssetReference, Question, Tour};

use super::header::HeaderLine;
use super::numbering::{NumberingValidator, QuestionFormat};

/// Field (or header) that unlabeled text currently flows into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    PackageHeader,
    TourHeader,
    BlockHeader,
    QuestionText,
    HostInstructions,
    Handout,
    Answer,
    AcceptedAnswers,
    RejectedAnswers,
    Comment,
    Source,
    Authors,
}

impl Section {
    /// Sections after the question body; images seen here belong to the comment
    pub fn is_answer_related(&self) -> bool {
        matches!(
            self,
            Section::Answer
                | Section::AcceptedAnswers
                | Section::RejectedAnswers
                | Section::Comment
                | Section::Source
                | Section::Authors
        )
    }

    /// Sections where images belong to the handout
    pub fn is_handout_context(&self) -> bool {
        matches!(
            self,
            Section::QuestionText | Section::HostInstructions | Section::Handout
        )
    }
}

/// Question slot an image can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSlot {
    Handout,
    Comment,
}

impl AssetSlot {
    pub fn for_section(section: Section) -> Self {
        if section.is_answer_related() {
            AssetSlot::Comment
        } else {
            AssetSlot::Handout
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssetSlot::Handout => "handout",
            AssetSlot::Comment => "comment",
        }
    }
}

/// Default authors declared for a closed range of question numbers
#[derive(Debug, Clone)]
pub struct AuthorRange {
    pub from: u32,
    pub to: u32,
    pub authors: Vec<String>,
    /// Tour the declaration appeared in; `None` applies to every tour
    pub tour_index: Option<usize>,
}

/// Bracket opened on one line and not yet closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenBracket {
    pub section: Section,
}

/// Location of a closed question inside `ParserState::tours`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionRef {
    pub tour: usize,
    pub block: Option<usize>,
    pub index: usize,
}

/// Bookkeeping for the document block being processed, reset per block
#[derive(Debug, Default)]
pub struct BlockScope {
    /// Asset file names already attributed from this block
    pub associated: HashSet<String>,
    /// A handout marker was seen for the newest question of this block
    pub handout_seen: bool,
    /// Question closed by a new question starting inside this block
    pub previous_question: Option<QuestionRef>,
    /// A line of this block already went into the open question
    pub question_content_seen: bool,
    /// Section before the block moved from handout context into answer context
    pub pre_transition: Option<Section>,
}

/// Mutable state for a single parse
pub struct ParserState {
    pub section: Section,
    pub tours: Vec<Tour>,
    /// Question being filled; pushed into its tour/block when closed
    pub current_question: Option<Question>,
    /// Index into the current tour's `blocks` if the tour uses blocks
    pub current_block: Option<usize>,
    /// Format locked by the first question of the current tour
    pub tour_format: Option<QuestionFormat>,
    pub numbering: NumberingValidator,
    pub open_bracket: Option<OpenBracket>,
    /// Images seen before any question existed
    pub pending_assets: Vec<AssetReference>,
    pub scope: BlockScope,
    /// The open question was created by an implicit warm-up line and may be replaced
    pub placeholder_question: bool,
    pub header_lines: Vec<HeaderLine>,
    pub author_ranges: Vec<AuthorRange>,
    /// Every asset placed into a question slot
    pub attached_assets: Vec<AssetReference>,
    pub warnings: Vec<String>,
}

impl ParserState {
    pub fn new() -> Self {
        Self {
            section: Section::PackageHeader,
            tours: Vec::new(),
            current_question: None,
            current_block: None,
            tour_format: None,
            numbering: NumberingValidator::default(),
            open_bracket: None,
            pending_assets: Vec::new(),
            scope: BlockScope::default(),
            placeholder_question: false,
            header_lines: Vec::new(),
            author_ranges: Vec::new(),
            attached_assets: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(warning = %message, "Parser warning");
        self.warnings.push(message);
    }

    /// Reset per-block bookkeeping before a document block is processed
    pub fn begin_block(&mut self) {
        self.scope = BlockScope::default();
    }

    /// Switch the active section, remembering a handout → answer transition
    pub fn set_section(&mut self, section: Section) {
        if self.section.is_handout_context()
            && section.is_answer_related()
            && self.scope.pre_transition.is_none()
        {
            self.scope.pre_transition = Some(self.section);
        }
        self.section = section;
    }

    pub fn has_tour(&self) -> bool {
        !self.tours.is_empty()
    }

    pub fn current_tour_index(&self) -> Option<usize> {
        self.tours.len().checked_sub(1)
    }

    /// Move the open question into its tour or block
    ///
    /// Missing text or answer is a warning; the question is kept.
    pub fn close_question(&mut self) -> Option<QuestionRef> {
        let question = self.current_question.take()?;

        if question.text.trim().is_empty() {
            self.warn(format!("Question {}: no question text found", question.number));
        }
        if question.answer.trim().is_empty() {
            self.warn(format!("Question {}: no answer found", question.number));
        }

        let tour_index = self.current_tour_index()?;
        let block_index = self.current_block;
        let tour = &mut self.tours[tour_index];
        match block_index.and_then(|i| tour.blocks.get_mut(i)) {
            Some(block) => {
                block.questions.push(question);
                Some(QuestionRef {
                    tour: tour_index,
                    block: block_index,
                    index: block.questions.len() - 1,
                })
            }
            None => {
                tour.questions.push(question);
                Some(QuestionRef {
                    tour: tour_index,
                    block: None,
                    index: tour.questions.len() - 1,
                })
            }
        }
    }

    pub fn question_at(&mut self, location: QuestionRef) -> Option<&mut Question> {
        let tour = self.tours.get_mut(location.tour)?;
        match location.block {
            Some(b) => tour.blocks.get_mut(b)?.questions.get_mut(location.index),
            None => tour.questions.get_mut(location.index),
        }
    }
}

impl Default for ParserState {
    fn default() -> Self {
        Self::new()
    }
}
