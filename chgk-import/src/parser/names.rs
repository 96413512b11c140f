//! Person-name helpers
//!
//! Block headings name their editor in the genitive case ("Блок Станіслава
//! Мерляна"). The suffix table below recovers the nominative form for the
//! common Ukrainian declension patterns. It is a heuristic and gets some
//! names wrong ("Дмитра" becomes "Дмитр").

/// Genitive suffix → nominative suffix, longest first
const GENITIVE_SUFFIXES: &[(&str, &str)] = &[
    ("ського", "ський"),
    ("цького", "цький"),
    ("зького", "зький"),
    ("ської", "ська"),
    ("цької", "цька"),
    ("ької", "ька"),
    ("ової", "ова"),
    ("евої", "ева"),
    ("євої", "єва"),
    ("іної", "іна"),
    ("иної", "ина"),
    ("енка", "енко"),
    ("ого", "ий"),
    ("ії", "ія"),
    ("ія", "ій"),
    ("ля", "ль"),
    ("я", ""),
    ("и", "а"),
    ("і", "я"),
    ("а", ""),
];

/// Convert one name token from genitive to nominative
pub fn nominative_token(token: &str) -> String {
    let lower = token.to_lowercase();
    let char_count = lower.chars().count();

    for (genitive, nominative) in GENITIVE_SUFFIXES {
        let suffix_len = genitive.chars().count();
        // keep at least two letters of stem
        if char_count < suffix_len + 2 || !lower.ends_with(genitive) {
            continue;
        }
        let stem: String = token.chars().take(char_count - suffix_len).collect();
        return format!("{}{}", stem, nominative);
    }

    token.to_string()
}

/// "Станіслава Мерляна" → "Станіслав Мерлян"
pub fn genitive_to_nominative(name: &str) -> String {
    name.split_whitespace()
        .map(nominative_token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_conjunction(token: &str) -> bool {
    matches!(token.to_lowercase().as_str(), "та" | "і" | "й" | "and" | "&")
}

fn push_name(names: &mut Vec<String>, raw: &str) {
    let name = raw.trim().trim_end_matches('.').trim();
    if !name.is_empty() {
        names.push(name.to_string());
    }
}

/// Split a free-text person list into individual names
///
/// Separators are `,`, `;` and the conjunctions та/і/й/and. Separators inside
/// parentheses ("Іван Петренко (Київ, Україна)") are ignored. A trailing
/// period is dropped from each name.
pub fn split_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for token in text.split_whitespace() {
        if depth == 0 && is_conjunction(token) {
            push_name(&mut names, &current);
            current.clear();
            continue;
        }

        for c in token.chars() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' | ';' if depth == 0 => {
                    push_name(&mut names, &current);
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(c);
        }
        current.push(' ');
    }
    push_name(&mut names, &current);

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masculine_names() {
        assert_eq!(genitive_to_nominative("Станіслава Мерляна"), "Станіслав Мерлян");
        assert_eq!(genitive_to_nominative("Андрія Петренка"), "Андрій Петренко");
        assert_eq!(genitive_to_nominative("Ігоря Ковальського"), "Ігор Ковальський");
        assert_eq!(genitive_to_nominative("Василя Білого"), "Василь Білий");
    }

    #[test]
    fn test_feminine_names() {
        assert_eq!(genitive_to_nominative("Олени Коваль"), "Олена Коваль");
        assert_eq!(genitive_to_nominative("Марії Петрової"), "Марія Петрова");
        assert_eq!(genitive_to_nominative("Ольги Ковальської"), "Ольга Ковальська");
    }

    #[test]
    fn test_indeclinable_unchanged() {
        assert_eq!(nominative_token("Іваненко"), "Іваненко");
        assert_eq!(nominative_token("Савчук"), "Савчук");
        assert_eq!(nominative_token("Ія"), "Ія");
    }

    #[test]
    fn test_split_separators() {
        assert_eq!(
            split_names("Іван Петренко, Олена Коваль; Марія Шевченко та Петро Сидоренко."),
            vec!["Іван Петренко", "Олена Коваль", "Марія Шевченко", "Петро Сидоренко"]
        );
    }

    #[test]
    fn test_split_keeps_parenthesized_city() {
        assert_eq!(
            split_names("Іван Петренко (Київ, Україна) і Олена Коваль (Львів)"),
            vec!["Іван Петренко (Київ, Україна)", "Олена Коваль (Львів)"]
        );
    }

    #[test]
    fn test_split_empty() {
        assert!(split_names("  ").is_empty());
        assert!(split_names(", ;").is_empty());
    }
}
