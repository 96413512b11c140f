//! Field routing
//!
//! Labeled lines switch the active section; everything else is appended to
//! whatever field the active section points at.

use crate::models::Question;

use super::header::HeaderLine;
use super::names::split_names;
use super::patterns::{match_label, EDITORS_LABEL, INLINE_ACCEPT_REJECT};
use super::state::{OpenBracket, ParserState, Section};

/// Append a line, separating it from existing content with `\n`
pub fn push_line(target: &mut String, text: &str) {
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(text);
}

pub fn push_line_opt(target: &mut Option<String>, text: &str) {
    push_line(target.get_or_insert_with(String::new), text);
}

fn question_field(question: &mut Question, section: Section, text: &str) {
    match section {
        Section::QuestionText => push_line(&mut question.text, text),
        Section::Answer => push_line(&mut question.answer, text),
        Section::HostInstructions => push_line_opt(&mut question.host_instructions, text),
        Section::Handout => push_line_opt(&mut question.handout_text, text),
        Section::AcceptedAnswers => push_line_opt(&mut question.accepted_answers, text),
        Section::RejectedAnswers => push_line_opt(&mut question.rejected_answers, text),
        Section::Comment => push_line_opt(&mut question.comment, text),
        Section::Source => push_line_opt(&mut question.source, text),
        Section::Authors => question.authors.extend(split_names(text)),
        Section::PackageHeader | Section::TourHeader | Section::BlockHeader => {}
    }
}

/// Preamble of the innermost open header (block, else tour)
fn header_preamble(state: &mut ParserState) -> Option<&mut Option<String>> {
    let block_index = state.current_block;
    let tour = state.tours.last_mut()?;
    match block_index.and_then(|i| tour.blocks.get_mut(i)) {
        Some(block) => Some(&mut block.preamble),
        None => Some(&mut tour.preamble),
    }
}

/// Append text to the field behind `section`
///
/// Question sections with no open question fall back to the tour: a comment
/// becomes the tour comment, anything else the block or tour preamble.
pub fn append(state: &mut ParserState, section: Section, text: &str) {
    if let Some(question) = state.current_question.as_mut() {
        if !matches!(
            section,
            Section::PackageHeader | Section::TourHeader | Section::BlockHeader
        ) {
            question_field(question, section, text);
            return;
        }
    }

    if !state.has_tour() {
        state.header_lines.push(HeaderLine {
            text: text.to_string(),
            is_heading: false,
            font_size: None,
        });
        return;
    }

    match section {
        Section::TourHeader => {
            if let Some(tour) = state.tours.last_mut() {
                push_line_opt(&mut tour.preamble, text);
            }
        }
        Section::Comment if state.current_block.is_none() => {
            if let Some(tour) = state.tours.last_mut() {
                push_line_opt(&mut tour.comment, text);
            }
        }
        // stray author names outside a question carry no meaning
        Section::Authors => {}
        _ => {
            if let Some(preamble) = header_preamble(state) {
                push_line_opt(preamble, text);
            }
        }
    }
}

/// Blank line inside the document
///
/// Keeps paragraph breaks in multi-line fields; in the author list it ends
/// the list.
pub fn append_blank(state: &mut ParserState) {
    if let Some(open) = state.open_bracket {
        append(state, open.section, "");
        return;
    }

    match state.section {
        Section::Authors => state.set_section(Section::Comment),
        section => append(state, section, ""),
    }
}

/// Feed a line to an open bracket; returns the text following `]`, if any
pub fn continue_bracket(state: &mut ParserState, text: &str) -> Option<String> {
    let open = state.open_bracket?;

    let Some(close) = text.find(']') else {
        append(state, open.section, text);
        return None;
    };

    let inside = text[..close].trim();
    if !inside.is_empty() {
        append(state, open.section, inside);
    }
    state.open_bracket = None;
    state.set_section(Section::QuestionText);

    let rest = text[close + 1..].trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

/// Start a bracketed handout or host instruction
///
/// `content` is the text after the bracket label. The bracket stays open
/// until some line supplies `]`.
pub fn open_bracket(state: &mut ParserState, section: Section, content: &str) -> Option<String> {
    state.set_section(section);
    if section == Section::Handout {
        state.scope.handout_seen = true;
    }
    state.open_bracket = Some(OpenBracket { section });

    if content.is_empty() {
        return None;
    }
    continue_bracket(state, content)
}

fn set_header_editors(state: &mut ParserState, names: Vec<String>) {
    let block_index = state.current_block;
    let section = state.section;
    let Some(tour) = state.tours.last_mut() else {
        return;
    };

    match (section, block_index.and_then(|i| tour.blocks.get_mut(i))) {
        (Section::BlockHeader, Some(block)) => block.editors.extend(names),
        _ => tour.editors.extend(names),
    }
}

fn splits_inline(section: Section) -> bool {
    matches!(
        section,
        Section::Answer | Section::AcceptedAnswers | Section::RejectedAnswers
    )
}

/// Append content to the active section, splitting off inline Залік/Незалік
fn append_content(state: &mut ParserState, content: &str) {
    if splits_inline(state.section) {
        let inline = INLINE_ACCEPT_REJECT
            .find_iter(content)
            .find(|m| m.start() > 0)
            .map(|m| m.start());

        if let Some(start) = inline {
            let head = content[..start].trim_end();
            if !head.is_empty() {
                append(state, state.section, head);
            }
            let tail = &content[start..];
            route(state, tail, tail);
            return;
        }
    }

    append(state, state.section, content);
}

/// Route one content line: label switch or plain append
///
/// `source_text` is the same line without apostrophe canonicalization; it is
/// what lands in the source field.
pub fn route(state: &mut ParserState, text: &str, source_text: &str) {
    if matches!(state.section, Section::TourHeader | Section::BlockHeader) {
        if let Some(caps) = EDITORS_LABEL.captures(text) {
            let names = split_names(caps.get(1).map_or("", |m| m.as_str()));
            set_header_editors(state, names);
            return;
        }
    }

    if let Some((section, end)) = match_label(text) {
        state.set_section(section);
        if section == Section::Handout {
            state.scope.handout_seen = true;
        }

        let remainder = if section == Section::Source {
            match match_label(source_text) {
                Some((_, source_end)) => &source_text[source_end..],
                None => &text[end..],
            }
        } else {
            &text[end..]
        };

        if !remainder.is_empty() {
            append_content(state, remainder);
        }
        return;
    }

    let content = if state.section == Section::Source {
        source_text
    } else {
        text
    };
    append_content(state, content);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Tour, TourType};

    fn state_with_question() -> ParserState {
        let mut state = ParserState::new();
        state.tours.push(Tour::new("1", TourType::Regular));
        state.current_question = Some(Question::new("1"));
        state.section = Section::QuestionText;
        state
    }

    #[test]
    fn test_push_line_preserves_internal_blank() {
        let mut text = String::new();
        push_line(&mut text, "");
        push_line(&mut text, "a");
        push_line(&mut text, "");
        push_line(&mut text, "b");
        assert_eq!(text, "a\n\nb");
    }

    #[test]
    fn test_labels_switch_sections() {
        let mut state = state_with_question();
        route(&mut state, "Хто написав Гамлета?", "Хто написав Гамлета?");
        route(&mut state, "Відповідь: Шекспір", "Відповідь: Шекспір");
        route(&mut state, "Коментар: очевидно.", "Коментар: очевидно.");
        route(&mut state, "Автори: Іван Петренко, Олена Коваль", "Автори: Іван Петренко, Олена Коваль");

        let q = state.current_question.as_ref().unwrap();
        assert_eq!(q.text, "Хто написав Гамлета?");
        assert_eq!(q.answer, "Шекспір");
        assert_eq!(q.comment.as_deref(), Some("очевидно."));
        assert_eq!(q.authors, vec!["Іван Петренко", "Олена Коваль"]);
        assert_eq!(state.section, Section::Authors);
    }

    #[test]
    fn test_inline_accept_and_reject_split() {
        let mut state = state_with_question();
        let line = "Відповідь: Шекспір. Залік: Вільям Шекспір. Незалік: Бекон";
        route(&mut state, line, line);

        let q = state.current_question.as_ref().unwrap();
        assert_eq!(q.answer, "Шекспір.");
        assert_eq!(q.accepted_answers.as_deref(), Some("Вільям Шекспір."));
        assert_eq!(q.rejected_answers.as_deref(), Some("Бекон"));
        assert_eq!(state.section, Section::RejectedAnswers);
    }

    #[test]
    fn test_source_keeps_original_apostrophes() {
        let mut state = state_with_question();
        route(&mut state, "Джерело: п'ять", "Джерело: п\u{2019}ять");
        route(&mut state, "https://uk.wikipedia.org/wiki/Об'єкт", "https://uk.wikipedia.org/wiki/Об\u{2019}єкт");

        let q = state.current_question.as_ref().unwrap();
        assert_eq!(
            q.source.as_deref(),
            Some("п\u{2019}ять\nhttps://uk.wikipedia.org/wiki/Об\u{2019}єкт")
        );
    }

    #[test]
    fn test_bracket_same_line_and_multiline() {
        let mut state = state_with_question();
        assert!(open_bracket(&mut state, Section::Handout, "Карта]").is_none());
        assert!(state.open_bracket.is_none());
        assert_eq!(state.section, Section::QuestionText);

        assert!(open_bracket(&mut state, Section::HostInstructions, "читати").is_none());
        assert!(state.open_bracket.is_some());
        let rest = continue_bracket(&mut state, "повільно] Текст після");
        assert_eq!(rest.as_deref(), Some("Текст після"));

        let q = state.current_question.as_ref().unwrap();
        assert_eq!(q.handout_text.as_deref(), Some("Карта"));
        assert_eq!(q.host_instructions.as_deref(), Some("читати\nповільно"));
        assert!(state.scope.handout_seen);
    }

    #[test]
    fn test_blank_line_closes_author_list() {
        let mut state = state_with_question();
        route(&mut state, "Автор: Іван Петренко", "Автор: Іван Петренко");
        append_blank(&mut state);
        assert_eq!(state.section, Section::Comment);
        route(&mut state, "Дрібний текст", "Дрібний текст");

        let q = state.current_question.as_ref().unwrap();
        assert_eq!(q.authors, vec!["Іван Петренко"]);
        assert_eq!(q.comment.as_deref(), Some("Дрібний текст"));
    }

    #[test]
    fn test_tour_header_editors_and_preamble() {
        let mut state = ParserState::new();
        state.tours.push(Tour::new("1", TourType::Regular));
        state.section = Section::TourHeader;
        route(&mut state, "Редактор: Іван Петренко", "Редактор: Іван Петренко");
        route(&mut state, "Тур про море", "Тур про море");

        let tour = &state.tours[0];
        assert_eq!(tour.editors, vec!["Іван Петренко"]);
        assert_eq!(tour.preamble.as_deref(), Some("Тур про море"));
    }
}
