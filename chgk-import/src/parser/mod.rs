//! Structural parser for free-form quiz documents
//!
//! Turns the ordered block feed of a document into a [`ParseResult`]. Lines
//! are classified one at a time in a fixed priority order:
//!
//! 1. continuation of an open `[...]` bracket
//! 2. tour heading
//! 3. block heading
//! 4. author-range declaration
//! 5. question start
//! 6. package header text (before the first tour)
//! 7. `[Ведучому: ...]` host instruction
//! 8. `[Роздатка: ...]` handout
//! 9. field label, or plain content for the active field
//!
//! Anything the parser cannot make sense of becomes a warning; parsing itself
//! never fails.

pub mod assets;
pub mod fields;
pub mod finalize;
pub mod header;
pub mod names;
pub mod normalizer;
pub mod numbering;
pub mod patterns;
pub mod state;
pub mod structure;

use crate::models::{DocBlock, ParseResult};

use normalizer::{normalize, normalize_line, NormalizeOptions};
use patterns::{HANDOUT_BRACKET, HOST_BRACKET};
use state::{ParserState, Section};

pub use finalize::trim_blank_lines;

#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    /// Title to use when the document header has none (usually the file name)
    pub fallback_title: Option<String>,
}

/// Move images from image-only blocks onto the nearest preceding text block
///
/// Word processors often anchor a picture in its own paragraph right after
/// the text it illustrates.
fn merge_asset_only_blocks(blocks: &[DocBlock]) -> Vec<DocBlock> {
    let mut merged: Vec<DocBlock> = Vec::with_capacity(blocks.len());

    for block in blocks {
        if block.is_asset_only() {
            if let Some(target) = merged.iter_mut().rev().find(|b| !b.is_blank()) {
                target.assets.extend(block.assets.iter().cloned());
                continue;
            }
        }
        merged.push(block.clone());
    }

    merged
}

/// Steps 7 to 9: content of an open question (or header)
fn dispatch_content(state: &mut ParserState, text: &str, source_text: &str) {
    if text.is_empty() {
        return;
    }

    for (pattern, section) in [
        (&*HOST_BRACKET, Section::HostInstructions),
        (&*HANDOUT_BRACKET, Section::Handout),
    ] {
        if let Some(caps) = pattern.captures(text) {
            let content = caps.get(1).map_or("", |m| m.as_str()).to_string();
            if let Some(rest) = fields::open_bracket(state, section, &content) {
                dispatch_content(state, &rest, &rest);
            }
            return;
        }
    }

    fields::route(state, text, source_text);
}

fn dispatch_line(state: &mut ParserState, raw: &str, block: &DocBlock) {
    let text = normalize(raw);
    if text.is_empty() {
        fields::append_blank(state);
        return;
    }

    if state.open_bracket.is_some() {
        if let Some(rest) = fields::continue_bracket(state, &text) {
            dispatch_content(state, &rest, &rest);
        }
        return;
    }

    if let Some(rest) = structure::try_start_tour(state, &text, block) {
        dispatch_content(state, &rest, &rest);
        return;
    }
    if let Some(rest) = structure::try_start_block(state, &text) {
        dispatch_content(state, &rest, &rest);
        return;
    }
    if structure::try_author_range(state, &text) {
        return;
    }
    if let Some(rest) = structure::try_start_question(state, &text) {
        dispatch_content(state, &rest, &rest);
        return;
    }

    if !state.has_tour() && state.current_question.is_none() {
        header::collect(state, &text, block);
        return;
    }

    let source_text = normalize_line(raw, NormalizeOptions { apostrophes: false });
    dispatch_content(state, &text, &source_text);
}

/// Parse an extracted document into a package tree
pub fn parse_blocks(blocks: &[DocBlock], options: &ParserOptions) -> ParseResult {
    let blocks = merge_asset_only_blocks(blocks);
    let mut state = ParserState::new();

    for block in &blocks {
        state.begin_block();

        if block.is_blank() {
            fields::append_blank(&mut state);
        } else {
            for raw in block.text.split('\n') {
                dispatch_line(&mut state, raw, block);
                if state.current_question.is_some() && !raw.trim().is_empty() {
                    state.scope.question_content_seen = true;
                }
            }
        }

        assets::attribute_block_assets(&mut state, &block.assets);
    }

    let result = finalize::finalize(state, options);
    tracing::debug!(
        tours = result.tours.len(),
        questions = result.question_count(),
        warnings = result.warnings.len(),
        confidence = result.confidence,
        "Parsed document"
    );
    result
}
