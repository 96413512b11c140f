//! End-of-document pass: close, reorder, clean up, score

use crate::models::{NumberingMode, ParseResult, Question, Tour, TourType};

use super::header::build_header;
use super::state::ParserState;
use super::ParserOptions;

/// Title used when neither the document nor the caller supplies one
pub const UNTITLED: &str = "Пакет без назви";

/// Drop leading and trailing blank lines; blank lines in between stay
pub fn trim_blank_lines(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let Some(start) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(start);
    lines[start..=end].join("\n")
}

fn trim_optional(field: &mut Option<String>) {
    if let Some(text) = field.take() {
        let trimmed = trim_blank_lines(&text);
        if !trimmed.is_empty() {
            *field = Some(trimmed);
        }
    }
}

fn trim_question(question: &mut Question) {
    question.text = trim_blank_lines(&question.text);
    question.answer = trim_blank_lines(&question.answer);
    trim_optional(&mut question.host_instructions);
    trim_optional(&mut question.handout_text);
    trim_optional(&mut question.accepted_answers);
    trim_optional(&mut question.rejected_answers);
    trim_optional(&mut question.comment);
    trim_optional(&mut question.source);
}

fn trim_tour(tour: &mut Tour) {
    trim_optional(&mut tour.preamble);
    trim_optional(&mut tour.comment);
    for block in &mut tour.blocks {
        trim_optional(&mut block.preamble);
    }
    for question in tour.all_questions_mut() {
        trim_question(question);
    }
}

/// Warm-up first, shoot-out last, document order otherwise; then reindex
pub fn order_tours(tours: &mut [Tour]) {
    tours.sort_by_key(|tour| match tour.tour_type {
        TourType::Warmup => 0,
        TourType::Regular => 1,
        TourType::Shootout => 2,
    });

    for (i, tour) in tours.iter_mut().enumerate() {
        tour.order_index = i;
        for (j, block) in tour.blocks.iter_mut().enumerate() {
            block.order_index = j;
        }
    }
}

/// Give range authors to numbered questions that name none themselves
///
/// A range declared inside a tour wins over one declared before any tour.
fn apply_author_ranges(state: &mut ParserState) {
    let ranges = &state.author_ranges;
    if ranges.is_empty() {
        return;
    }

    for (tour_index, tour) in state.tours.iter_mut().enumerate() {
        for question in tour.all_questions_mut() {
            if !question.authors.is_empty() {
                continue;
            }
            let Some(n) = question.numeric_number() else {
                continue;
            };

            let covering = |scope: Option<usize>| {
                ranges
                    .iter()
                    .rev()
                    .find(|r| r.tour_index == scope && r.from <= n && n <= r.to)
            };
            if let Some(range) = covering(Some(tour_index)).or_else(|| covering(None)) {
                question.authors = range.authors.clone();
            }
        }
    }
}

pub fn finalize(mut state: ParserState, options: &ParserOptions) -> ParseResult {
    state.close_question();

    if let Some(open) = state.open_bracket.take() {
        state.warn(format!("Unclosed bracket in {:?} at end of document", open.section));
    }
    for asset in std::mem::take(&mut state.pending_assets) {
        state.warn(format!("Image {} is not attached to any question", asset.file_name));
    }

    apply_author_ranges(&mut state);

    let header = build_header(&state.header_lines);
    let missing_title = header.title.is_none();
    let mut tours = std::mem::take(&mut state.tours);
    order_tours(&mut tours);
    for tour in &mut tours {
        trim_tour(tour);
    }

    let mut warnings = std::mem::take(&mut state.warnings);
    let title = match header.title.or_else(|| options.fallback_title.clone()) {
        Some(title) if !title.trim().is_empty() => title,
        _ => UNTITLED.to_string(),
    };
    if missing_title {
        warnings.push(format!("No package title found, using \"{}\"", title));
    }

    let mut result = ParseResult {
        title,
        preamble: header.preamble,
        editors: header.editors,
        warnings,
        tours,
        assets: std::mem::take(&mut state.attached_assets),
        ..Default::default()
    };

    result.numbering_mode = if result.questions().any(|q| q.numeric_number().is_none()) {
        NumberingMode::Manual
    } else {
        state.numbering.resolved_mode()
    };
    result.confidence = result.compute_confidence();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_blank_lines() {
        assert_eq!(trim_blank_lines("\n\na\n\n\nb\n \n"), "a\n\n\nb");
        assert_eq!(trim_blank_lines(" \n "), "");
        assert_eq!(trim_blank_lines("a"), "a");
    }

    #[test]
    fn test_trim_is_idempotent() {
        for input in ["\n\nx\n\ny\n\n", "x", "", "\n \n", "a\n\n\n\nb"] {
            let once = trim_blank_lines(input);
            assert_eq!(trim_blank_lines(&once), once);
        }
    }

    #[test]
    fn test_order_tours_moves_special_tours() {
        let mut tours = vec![
            Tour::new("Перестрілка", TourType::Shootout),
            Tour::new("1", TourType::Regular),
            Tour::new("Розминка", TourType::Warmup),
            Tour::new("2", TourType::Regular),
        ];
        order_tours(&mut tours);

        let order: Vec<_> = tours.iter().map(|t| t.number.as_str()).collect();
        assert_eq!(order, vec!["Розминка", "1", "2", "Перестрілка"]);
        assert!(tours.iter().enumerate().all(|(i, t)| t.order_index == i));
    }

    #[test]
    fn test_empty_optional_becomes_none() {
        let mut field = Some("\n\n".to_string());
        trim_optional(&mut field);
        assert!(field.is_none());
    }
}
