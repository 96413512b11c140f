//! Line classification patterns
//!
//! All patterns run against normalized text (see [`super::normalizer`]).
//! [`LABEL_RULES`] is ordered: earlier rules win where patterns overlap.

use once_cell::sync::Lazy;
use regex::Regex;

use super::state::Section;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {}: {}", pattern, e))
}

// ---------------------------------------------------------------- tours

pub static TOUR_WARMUP: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?i)(?:розминка|розминковий\s+тур|нульовий\s+тур|тур\s*(?:№\s*)?0)(?:\s*[.:\-]\s*(.*))?$")
});

pub static TOUR_SHOOTOUT: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?i)(?:перестрілка|тур\s+перестрілки|додатковий\s+тур|додаткові\s+(?:запитання|питання))(?:\s*[.:\-]\s*(.*))?$")
});

pub static TOUR_NUMBER_AFTER: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?i)тур\s*(?:№\s*)?[:\-]?\s*(\d{1,2})(?:\s*[.:\-]\s*(.*))?$")
});

pub static TOUR_NUMBER_BEFORE: Lazy<Regex> =
    Lazy::new(|| re(r"^(?i)(\d{1,2})(?:-?и?й)?\s+тур(?:\s*[.:\-]\s*(.*))?$"));

/// Latin I/V/X/L plus the Cyrillic І and Х look-alikes
pub static TOUR_ROMAN_AFTER: Lazy<Regex> =
    Lazy::new(|| re(r"^(?i)тур\s*[:\-]?\s*([IVXLІХ]{1,7})(?:\s*[.:\-]\s*(.*))?$"));

pub static TOUR_ROMAN_BEFORE: Lazy<Regex> =
    Lazy::new(|| re(r"^(?i)([IVXLІХ]{1,7})\s+тур(?:\s*[.:\-]\s*(.*))?$"));

pub static TOUR_WORD_BEFORE: Lazy<Regex> =
    Lazy::new(|| re(r"^(?i)([\p{L}']+)\s+тур(?:\s*[.:\-]\s*(.*))?$"));

pub static TOUR_WORD_AFTER: Lazy<Regex> =
    Lazy::new(|| re(r"^(?i)тур\s+([\p{L}']+)(?:\s*[.:\-]\s*(.*))?$"));

/// Bold line announcing a warm-up question before any tour exists
pub static IMPLICIT_WARMUP: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?i)розмин(?:очне|кове|очні|кові)\s+(?:запитання|питання)(?:\s*[.:\-]\s*(.*))?$")
});

// ---------------------------------------------------------------- blocks

pub static BLOCK_NUMBERED: Lazy<Regex> =
    Lazy::new(|| re(r"^(?i)блок\s*(?:№\s*)?(\d{1,2})?\s*[.:]?\s*$"));

/// "Блок Станіслава Мерляна"; capitalization is significant for the name
pub static BLOCK_NAMED: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?i:блок)\s+(\p{Lu}[\p{L}'\-]*)\s+(\p{Lu}[\p{L}'\-]*)\s*\.?\s*$")
});

// ---------------------------------------------------------------- questions

pub static AUTHOR_RANGE: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?i)автор(?:и|ка|ки)?\s+(?:запитань|питань)\s*(?:№\s*)?(\d{1,3})\s*-\s*(\d{1,3})\s*[:.]?\s*(.+)$")
});

pub static QUESTION_NAMED: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?i)(?:запитання|питання)\s*(?:№\s*)?(\d{1,3}\p{L}?)(?:\s*[.:)]\s*|\s+|$)(.*)$")
});

pub static QUESTION_NUMBERED: Lazy<Regex> = Lazy::new(|| re(r"^(\d{1,3})[.)](?:\s+(.*))?$"));

// ---------------------------------------------------------------- brackets

pub static HOST_BRACKET: Lazy<Regex> = Lazy::new(|| {
    re(r"^\[\s*(?i:вказівка\s+ведучому|примітка\s+для\s+ведучого|для\s+ведучого|ведучому|ведучим)\s*[:.]?\s*(.*)$")
});

pub static HANDOUT_BRACKET: Lazy<Regex> = Lazy::new(|| {
    re(r"^\[\s*(?i:роздатковий\s+матеріал|роздатка)\s*[:.]?\s*(.*)$")
});

// ---------------------------------------------------------------- labels

pub static EDITORS_LABEL: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?i)(?:редактор(?:и|ка|ки)?(?:\s+(?:туру|блоку|пакета|пакету))?|редакторська\s+група)\s*[:\-]\s*(.*)$")
});

/// Залік / Незалік appearing after other text on the same line
pub static INLINE_ACCEPT_REJECT: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)(?:\bне\s*залік|\bнезалік|\bзаліки?)\s*:"));

/// Field label rule: the pattern matches the label and its separator only
pub struct LabelRule {
    pub pattern: Regex,
    pub section: Section,
}

/// Field labels in priority order
pub static LABEL_RULES: Lazy<Vec<LabelRule>> = Lazy::new(|| {
    let rule = |pattern: &str, section| LabelRule {
        pattern: re(pattern),
        section,
    };

    vec![
        rule(r"^(?i)(?:незалік|не\s*залік|не\s*зараховується)\s*[:.]\s*", Section::RejectedAnswers),
        rule(r"^(?i)(?:заліки?|зараховується|зарахування)\s*[:.]\s*", Section::AcceptedAnswers),
        rule(r"^(?i)відповід(?:ь|і)\s*[:.]\s*", Section::Answer),
        rule(r"^(?i)коментар(?:і)?(?:\s+ведучого)?\s*[:.]\s*", Section::Comment),
        rule(r"^(?i)джерел(?:о|а)(?:\s*\(а\))?\s*[:.]\s*", Section::Source),
        rule(r"^(?i)автор(?:и|ка|ки|\(и\))?(?:\s+запитання)?\s*[:.]\s*", Section::Authors),
        rule(r"^(?i)роздатк(?:а|овий\s+матеріал)\s*[:.]\s*", Section::Handout),
        rule(r"^(?i)(?:вказівка\s+ведучому|для\s+ведучого|ведучому)\s*[:.]\s*", Section::HostInstructions),
    ]
});

/// Find the first label rule matching at the start of `line`
///
/// Returns the section and the byte offset where the label ends.
pub fn match_label(line: &str) -> Option<(Section, usize)> {
    LABEL_RULES
        .iter()
        .find_map(|rule| rule.pattern.find(line).map(|m| (rule.section, m.end())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_priority_rejected_before_accepted() {
        assert_eq!(match_label("Незалік: Бекон").map(|m| m.0), Some(Section::RejectedAnswers));
        assert_eq!(match_label("Не залік: Бекон").map(|m| m.0), Some(Section::RejectedAnswers));
        assert_eq!(match_label("Заліки: Шекспір").map(|m| m.0), Some(Section::AcceptedAnswers));
        assert_eq!(match_label("Залік: Шекспір").map(|m| m.0), Some(Section::AcceptedAnswers));
    }

    #[test]
    fn test_label_remainder_offset() {
        let line = "Відповідь: Шекспір";
        let (section, end) = match_label(line).unwrap();
        assert_eq!(section, Section::Answer);
        assert_eq!(&line[end..], "Шекспір");
    }

    #[test]
    fn test_author_labels() {
        for line in ["Автор: Іван Петренко", "Автори: А Б, В Г", "Авторка: Олена Коваль", "Автор(и): X Y"] {
            assert_eq!(match_label(line).map(|m| m.0), Some(Section::Authors), "{}", line);
        }
    }

    #[test]
    fn test_plain_text_has_no_label() {
        assert!(match_label("Хто написав Гамлета?").is_none());
        assert!(match_label("Відповідальність — важлива річ").is_none());
    }

    #[test]
    fn test_author_range_not_plain_author_label_pattern() {
        assert!(AUTHOR_RANGE.is_match("Автор запитань 1-18: Іван Петренко"));
        assert!(!AUTHOR_RANGE.is_match("Автор: Іван Петренко"));
    }

    #[test]
    fn test_numbered_question_shapes() {
        assert!(QUESTION_NUMBERED.is_match("1. Хто написав Гамлета?"));
        assert!(QUESTION_NUMBERED.is_match("12)"));
        assert!(!QUESTION_NUMBERED.is_match("1.5 мільйона"));
        assert!(!QUESTION_NUMBERED.is_match("12.03.2020"));
    }

    #[test]
    fn test_named_question_shapes() {
        let caps = QUESTION_NAMED.captures("Запитання 7. Текст").unwrap();
        assert_eq!(&caps[1], "7");
        assert_eq!(&caps[2], "Текст");

        let caps = QUESTION_NAMED.captures("Питання №12").unwrap();
        assert_eq!(&caps[1], "12");
    }

    #[test]
    fn test_block_named_requires_capitals() {
        assert!(BLOCK_NAMED.is_match("Блок Станіслава Мерляна"));
        assert!(BLOCK_NAMED.is_match("БЛОК Станіслава Мерляна"));
        assert!(!BLOCK_NAMED.is_match("блок питань про історію"));
    }

    #[test]
    fn test_inline_accept_finds_rejected_first() {
        let line = "Шекспір. Незалік: Бекон";
        let m = INLINE_ACCEPT_REJECT.find(line).unwrap();
        assert_eq!(&line[m.start()..], "Незалік: Бекон");
    }
}
