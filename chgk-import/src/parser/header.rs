//! Package header
//!
//! Lines before the first tour are collected verbatim and split into title,
//! editors and preamble once the whole document has been read.

use crate::models::DocBlock;

use super::names::split_names;
use super::patterns::EDITORS_LABEL;
use super::state::ParserState;

/// Title candidates must be at least this fraction of the first line's font size
const TITLE_FONT_RATIO: f32 = 0.7;

/// One pre-tour line with the formatting of its document block
#[derive(Debug, Clone)]
pub struct HeaderLine {
    pub text: String,
    pub is_heading: bool,
    pub font_size: Option<f32>,
}

impl HeaderLine {
    fn is_blank(&self) -> bool {
        self.text.is_empty()
    }

    /// Lines that end the title run
    fn is_title_stop(&self) -> bool {
        self.is_blank() || self.text.starts_with('[') || EDITORS_LABEL.is_match(&self.text)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct HeaderInfo {
    pub title: Option<String>,
    pub editors: Vec<String>,
    pub preamble: Option<String>,
}

pub fn collect(state: &mut ParserState, line: &str, block: &DocBlock) {
    state.header_lines.push(HeaderLine {
        text: line.to_string(),
        is_heading: block.is_heading_style(),
        font_size: block.font_size,
    });
}

/// Index range of the title lines within `lines`
fn title_span(lines: &[HeaderLine]) -> Option<(usize, usize)> {
    let start = lines.iter().position(|l| !l.is_blank())?;
    let first = &lines[start];
    if first.is_title_stop() {
        return None;
    }

    let mut end = start + 1;
    if first.is_heading {
        while end < lines.len() && lines[end].is_heading && !lines[end].is_title_stop() {
            end += 1;
        }
    } else if let Some(first_size) = first.font_size {
        let min_size = first_size * TITLE_FONT_RATIO;
        while end < lines.len()
            && !lines[end].is_title_stop()
            && lines[end].font_size.map_or(false, |size| size >= min_size)
        {
            end += 1;
        }
    }

    Some((start, end))
}

/// Split collected header lines into title, editors and preamble
pub fn build_header(lines: &[HeaderLine]) -> HeaderInfo {
    let mut info = HeaderInfo::default();
    let span = title_span(lines);

    if let Some((start, end)) = span {
        let title = lines[start..end]
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        info.title = Some(title);
    }

    let mut preamble = String::new();
    for (i, line) in lines.iter().enumerate() {
        if span.map_or(false, |(start, end)| i >= start && i < end) {
            continue;
        }

        if let Some(caps) = EDITORS_LABEL.captures(&line.text) {
            let names = caps.get(1).map_or("", |m| m.as_str());
            info.editors.extend(split_names(names));
            continue;
        }

        if !preamble.is_empty() {
            preamble.push('\n');
        }
        preamble.push_str(&line.text);
    }

    let preamble = super::finalize::trim_blank_lines(&preamble);
    if !preamble.is_empty() {
        info.preamble = Some(preamble);
    }

    info
}
