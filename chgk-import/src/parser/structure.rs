//! Tour, block and question boundaries
//!
//! Each `try_*` function returns `None` when the line is not a boundary of its
//! kind. On a match it updates the state and returns whatever text followed
//! the marker on the same line, for the caller to route as content.

use regex::Captures;

use crate::models::{Block, DocBlock, Question, Tour, TourType};

use super::assets;
use super::names::{genitive_to_nominative, split_names};
use super::numbering::QuestionFormat;
use super::patterns::{
    AUTHOR_RANGE, BLOCK_NAMED, BLOCK_NUMBERED, IMPLICIT_WARMUP, QUESTION_NAMED,
    QUESTION_NUMBERED, TOUR_NUMBER_AFTER, TOUR_NUMBER_BEFORE, TOUR_ROMAN_AFTER,
    TOUR_ROMAN_BEFORE, TOUR_SHOOTOUT, TOUR_WARMUP, TOUR_WORD_AFTER, TOUR_WORD_BEFORE,
};
use super::state::{AuthorRange, ParserState, Section};

pub const WARMUP_TOUR_NUMBER: &str = "Розминка";
pub const SHOOTOUT_TOUR_NUMBER: &str = "Перестрілка";

const MAX_ROMAN_TOUR: i32 = 50;

const ORDINALS: &[(&str, u32)] = &[
    ("перший", 1),
    ("другий", 2),
    ("третій", 3),
    ("четвертий", 4),
    ("п'ятий", 5),
    ("шостий", 6),
    ("сьомий", 7),
    ("восьмий", 8),
    ("дев'ятий", 9),
    ("десятий", 10),
    ("одинадцятий", 11),
    ("дванадцятий", 12),
];

#[derive(Debug, Clone, PartialEq)]
pub struct TourStart {
    pub number: String,
    pub tour_type: TourType,
    pub remainder: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionStart {
    pub number: String,
    pub format: QuestionFormat,
    pub remainder: String,
}

fn group(caps: &Captures<'_>, index: usize) -> String {
    caps.get(index)
        .map_or("", |m| m.as_str())
        .trim()
        .to_string()
}

/// Roman numeral with Cyrillic І/Х accepted as I/X; 1..=50 only
pub fn roman_to_number(raw: &str) -> Option<u32> {
    let mut total: i32 = 0;
    let mut max_seen: i32 = 0;

    for c in raw.to_uppercase().chars().rev() {
        let value = match c {
            'I' | 'І' => 1,
            'V' => 5,
            'X' | 'Х' => 10,
            'L' => 50,
            _ => return None,
        };
        if value < max_seen {
            total -= value;
        } else {
            total += value;
            max_seen = value;
        }
    }

    (1..=MAX_ROMAN_TOUR)
        .contains(&total)
        .then_some(total as u32)
}

/// Ukrainian ordinal word ("перший", "Другий") to its number
pub fn ordinal_to_number(word: &str) -> Option<u32> {
    let word = word.to_lowercase();
    ORDINALS
        .iter()
        .find(|(ordinal, _)| *ordinal == word)
        .map(|(_, n)| *n)
}

fn regular_or_warmup(n: u32, remainder: String) -> TourStart {
    if n == 0 {
        TourStart {
            number: WARMUP_TOUR_NUMBER.to_string(),
            tour_type: TourType::Warmup,
            remainder,
        }
    } else {
        TourStart {
            number: n.to_string(),
            tour_type: TourType::Regular,
            remainder,
        }
    }
}

/// Recognize an explicit tour heading
pub fn detect_tour(line: &str) -> Option<TourStart> {
    if let Some(caps) = TOUR_WARMUP.captures(line) {
        return Some(TourStart {
            number: WARMUP_TOUR_NUMBER.to_string(),
            tour_type: TourType::Warmup,
            remainder: group(&caps, 1),
        });
    }
    if let Some(caps) = TOUR_SHOOTOUT.captures(line) {
        return Some(TourStart {
            number: SHOOTOUT_TOUR_NUMBER.to_string(),
            tour_type: TourType::Shootout,
            remainder: group(&caps, 1),
        });
    }

    for pattern in [&*TOUR_NUMBER_AFTER, &*TOUR_NUMBER_BEFORE] {
        if let Some(caps) = pattern.captures(line) {
            if let Ok(n) = caps[1].parse::<u32>() {
                return Some(regular_or_warmup(n, group(&caps, 2)));
            }
        }
    }

    for pattern in [&*TOUR_ROMAN_AFTER, &*TOUR_ROMAN_BEFORE] {
        if let Some(caps) = pattern.captures(line) {
            if let Some(n) = roman_to_number(&caps[1]) {
                return Some(regular_or_warmup(n, group(&caps, 2)));
            }
        }
    }

    for pattern in [&*TOUR_WORD_BEFORE, &*TOUR_WORD_AFTER] {
        if let Some(caps) = pattern.captures(line) {
            if let Some(n) = ordinal_to_number(&caps[1]) {
                return Some(regular_or_warmup(n, group(&caps, 2)));
            }
        }
    }

    None
}

fn begin_tour(state: &mut ParserState, number: &str, tour_type: TourType) {
    state.close_question();
    state.placeholder_question = false;
    state.open_bracket = None;
    state.current_block = None;
    state.tour_format = None;
    state.numbering.start_tour();
    state.tours.push(Tour::new(number, tour_type));
    state.set_section(Section::TourHeader);
    tracing::debug!(tour = %number, tour_type = tour_type.as_str(), "Tour started");
}

pub fn try_start_tour(state: &mut ParserState, line: &str, block: &DocBlock) -> Option<String> {
    if let Some(start) = detect_tour(line) {
        begin_tour(state, &start.number, start.tour_type);
        return Some(start.remainder);
    }

    // a bold "Розминочне питання" before any tour opens a warm-up question
    if state.has_tour() || !block.is_bold {
        return None;
    }
    let caps = IMPLICIT_WARMUP.captures(line)?;
    let remainder = group(&caps, 1);

    begin_tour(state, WARMUP_TOUR_NUMBER, TourType::Warmup);
    state.numbering.accept("0", TourType::Warmup);
    state.current_question = Some(Question::new("0"));
    state.placeholder_question = true;
    state.section = Section::QuestionText;
    assets::flush_pending(state);

    Some(remainder)
}

/// `Some(None)` for a numbered block, `Some(Some(name))` for a named one
pub fn detect_block(line: &str) -> Option<Option<String>> {
    if BLOCK_NUMBERED.is_match(line) {
        return Some(None);
    }
    let caps = BLOCK_NAMED.captures(line)?;
    let genitive = format!("{} {}", &caps[1], &caps[2]);
    Some(Some(genitive_to_nominative(&genitive)))
}

pub fn try_start_block(state: &mut ParserState, line: &str) -> Option<String> {
    if !state.has_tour() {
        return None;
    }
    let name = detect_block(line)?;

    state.close_question();
    state.placeholder_question = false;
    state.open_bracket = None;

    let tour = state.tours.last_mut()?;
    let mut wrapped = false;
    if tour.blocks.is_empty() && !tour.questions.is_empty() {
        let questions = std::mem::take(&mut tour.questions);
        tour.blocks.push(Block {
            questions,
            ..Default::default()
        });
        wrapped = true;
    }

    let order_index = tour.blocks.len();
    tour.blocks.push(Block {
        name: name.clone(),
        order_index,
        editors: name.iter().cloned().collect(),
        ..Default::default()
    });
    let tour_number = tour.number.clone();

    state.current_block = Some(order_index);
    state.set_section(Section::BlockHeader);

    if wrapped {
        state.warn(format!(
            "Tour {}: questions before the first block were grouped into an unnamed block",
            tour_number
        ));
    }

    Some(String::new())
}

/// "Автор запитань 1-18: ..." inside a tour applies to that tour only
pub fn try_author_range(state: &mut ParserState, line: &str) -> bool {
    let Some(caps) = AUTHOR_RANGE.captures(line) else {
        return false;
    };
    let (Ok(a), Ok(b)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
        return false;
    };

    let authors = split_names(&caps[3]);
    if authors.is_empty() {
        return true;
    }

    state.author_ranges.push(AuthorRange {
        from: a.min(b),
        to: a.max(b),
        authors,
        tour_index: state.current_tour_index(),
    });
    true
}

pub fn detect_question(line: &str) -> Option<QuestionStart> {
    if let Some(caps) = QUESTION_NAMED.captures(line) {
        return Some(QuestionStart {
            number: caps[1].to_string(),
            format: QuestionFormat::Named,
            remainder: group(&caps, 2),
        });
    }
    let caps = QUESTION_NUMBERED.captures(line)?;
    Some(QuestionStart {
        number: caps[1].to_string(),
        format: QuestionFormat::Numbered,
        remainder: group(&caps, 2),
    })
}

pub fn try_start_question(state: &mut ParserState, line: &str) -> Option<String> {
    let start = detect_question(line)?;

    if start.format == QuestionFormat::Numbered {
        if state.tour_format == Some(QuestionFormat::Named) {
            return None;
        }
        // numbered citations inside a source list
        if state.section == Section::Source {
            let n = start.number.parse::<u32>().ok();
            if n.is_some() && n != state.numbering.expected_in_tour() {
                return None;
            }
        }
    }

    let tour_type = state
        .tours
        .last()
        .map_or(TourType::Regular, |t| t.tour_type);
    if !state.numbering.fits(&start.number, tour_type) {
        tracing::debug!(number = %start.number, "Out-of-sequence number treated as text");
        return None;
    }

    if !state.has_tour() {
        begin_tour(state, "1", TourType::Regular);
        state.warn("Questions found before any tour heading; grouped into tour 1");
    }

    if state.placeholder_question
        && state
            .current_question
            .as_ref()
            .map_or(false, |q| q.is_blank())
    {
        state.current_question = None;
    }
    state.placeholder_question = false;

    // the closed question only shares this block if it received lines from it
    let previous = state.close_question();
    if previous.is_some() && state.scope.question_content_seen {
        state.scope.previous_question = previous;
    }
    state.scope.handout_seen = false;
    state.scope.pre_transition = None;

    state.numbering.accept(&start.number, tour_type);
    if state.tour_format.is_none() {
        state.tour_format = Some(start.format);
    }

    state.open_bracket = None;
    state.current_question = Some(Question::new(start.number));
    state.section = Section::QuestionText;
    assets::flush_pending(state);

    Some(start.remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tour(line: &str) -> Option<(String, TourType)> {
        detect_tour(line).map(|t| (t.number, t.tour_type))
    }

    #[test]
    fn test_numeric_tour_forms() {
        assert_eq!(tour("Тур 1"), Some(("1".into(), TourType::Regular)));
        assert_eq!(tour("ТУР 2."), Some(("2".into(), TourType::Regular)));
        assert_eq!(tour("Тур: 3"), Some(("3".into(), TourType::Regular)));
        assert_eq!(tour("Тур - 4"), Some(("4".into(), TourType::Regular)));
        assert_eq!(tour("5 тур"), Some(("5".into(), TourType::Regular)));
        assert_eq!(tour("Турнір 2"), None);
    }

    #[test]
    fn test_roman_tour_forms() {
        assert_eq!(tour("Тур IV"), Some(("4".into(), TourType::Regular)));
        // Cyrillic І and Х
        assert_eq!(tour("Тур ІІ"), Some(("2".into(), TourType::Regular)));
        assert_eq!(tour("ХІ тур"), Some(("11".into(), TourType::Regular)));
        assert_eq!(roman_to_number("XLIX"), Some(49));
        assert_eq!(roman_to_number("LI"), None);
    }

    #[test]
    fn test_ordinal_tour_forms() {
        assert_eq!(tour("Перший тур"), Some(("1".into(), TourType::Regular)));
        assert_eq!(tour("Тур другий"), Some(("2".into(), TourType::Regular)));
        assert_eq!(tour("Відбірковий тур"), None);
    }

    #[test]
    fn test_special_tours() {
        assert_eq!(tour("Розминка"), Some((WARMUP_TOUR_NUMBER.into(), TourType::Warmup)));
        assert_eq!(tour("Перестрілка"), Some((SHOOTOUT_TOUR_NUMBER.into(), TourType::Shootout)));
        assert_eq!(tour("Тур 0"), Some((WARMUP_TOUR_NUMBER.into(), TourType::Warmup)));
    }

    #[test]
    fn test_tour_remainder() {
        let start = detect_tour("Тур 1. Редактор: Іван Петренко").unwrap();
        assert_eq!(start.remainder, "Редактор: Іван Петренко");
    }

    #[test]
    fn test_block_forms() {
        assert_eq!(detect_block("Блок 1"), Some(None));
        assert_eq!(detect_block("Блок"), Some(None));
        assert_eq!(
            detect_block("Блок Станіслава Мерляна"),
            Some(Some("Станіслав Мерлян".to_string()))
        );
        assert_eq!(detect_block("Блокнот"), None);
    }

    #[test]
    fn test_block_requires_tour() {
        let mut state = ParserState::new();
        assert!(try_start_block(&mut state, "Блок 1").is_none());
    }

    #[test]
    fn test_named_format_locks_tour() {
        let mut state = ParserState::new();
        try_start_tour(&mut state, "Тур 1", &DocBlock::default());
        assert!(try_start_question(&mut state, "Запитання 1").is_some());
        assert!(try_start_question(&mut state, "2. Пункт переліку").is_none());
        assert!(try_start_question(&mut state, "Запитання 2").is_some());
    }

    #[test]
    fn test_source_list_not_questions() {
        let mut state = ParserState::new();
        try_start_tour(&mut state, "Тур 1", &DocBlock::default());
        try_start_question(&mut state, "1. Текст");
        state.section = Section::Source;
        assert!(try_start_question(&mut state, "1. Книга").is_none());
        assert!(try_start_question(&mut state, "2. Наступне запитання").is_some());
    }

    #[test]
    fn test_implicit_warmup_requires_bold_and_no_tour() {
        let mut state = ParserState::new();
        let plain = DocBlock::text("Розминочне питання");
        assert!(try_start_tour(&mut state, "Розминочне питання", &plain).is_none());

        let bold = DocBlock {
            is_bold: true,
            ..plain
        };
        assert!(try_start_tour(&mut state, "Розминочне питання", &bold).is_some());
        assert_eq!(state.tours[0].tour_type, TourType::Warmup);
        assert_eq!(state.current_question.as_ref().unwrap().number, "0");
    }

    #[test]
    fn test_wrapping_direct_questions_into_block() {
        let mut state = ParserState::new();
        try_start_tour(&mut state, "Тур 1", &DocBlock::default());
        try_start_question(&mut state, "1. Текст");
        try_start_block(&mut state, "Блок Олени Коваль");

        let tour = &state.tours[0];
        assert!(tour.questions.is_empty());
        assert_eq!(tour.blocks.len(), 2);
        assert_eq!(tour.blocks[0].name, None);
        assert_eq!(tour.blocks[0].questions.len(), 1);
        assert_eq!(tour.blocks[1].editors, vec!["Олена Коваль"]);
        assert_eq!(tour.blocks[1].order_index, 1);
    }

    #[test]
    fn test_author_range_recorded_for_current_tour() {
        let mut state = ParserState::new();
        try_start_tour(&mut state, "Тур 1", &DocBlock::default());
        assert!(try_author_range(&mut state, "Автор запитань 1-12: Іван Петренко"));
        assert_eq!(state.author_ranges[0].tour_index, Some(0));
        assert_eq!(state.author_ranges[0].to, 12);
    }
}
