//! Text normalization
//!
//! Word processors emit many look-alike characters. Classification runs on a
//! canonical form: single ASCII spaces, ASCII hyphen for every dash, ASCII
//! apostrophe for every apostrophe variant, no stress accents and no
//! zero-width characters.

use unicode_normalization::UnicodeNormalization;

const COMBINING_ACUTE: char = '\u{0301}';

/// Which canonicalizations to apply
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Rewrite apostrophe variants to `'`. Off for source citations, which may hold URLs.
    pub apostrophes: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { apostrophes: true }
    }
}

/// Canonicalize one line of text
pub fn normalize_line(input: &str, options: NormalizeOptions) -> String {
    // NFD splits stress marks off their vowels, NFC puts й/ї back together
    let decomposed: String = input.nfd().filter(|c| *c != COMBINING_ACUTE).collect();
    let recomposed: String = decomposed.nfc().collect();

    let mut out = String::with_capacity(recomposed.len());
    let mut last_was_space = false;

    for c in recomposed.chars() {
        let mapped = match c {
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{00AD}' => continue,
            '\t' | '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{2002}' | '\u{2003}'
            | '\u{2009}' => ' ',
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' => '-',
            '\u{2019}' | '\u{2018}' | '\u{02BC}' | '\u{0060}' | '\u{2032}' | '\u{00B4}'
                if options.apostrophes =>
            {
                '\''
            }
            other => other,
        };

        if mapped.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(mapped);
            last_was_space = false;
        }
    }

    out.trim().to_string()
}

/// Normalize with default options
pub fn normalize(input: &str) -> String {
    normalize_line(input, NormalizeOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(normalize("  Тур\u{00A0}\u{00A0}1\t "), "Тур 1");
    }

    #[test]
    fn test_dashes_unified() {
        assert_eq!(normalize("Автор запитань 1\u{2013}18"), "Автор запитань 1-18");
        assert_eq!(normalize("Тур \u{2014} 2"), "Тур - 2");
    }

    #[test]
    fn test_apostrophes_unified() {
        assert_eq!(normalize("П\u{2019}ятий тур"), "П'ятий тур");
        assert_eq!(normalize("м\u{02BC}яч"), "м'яч");
    }

    #[test]
    fn test_apostrophes_preserved_when_disabled() {
        let opts = NormalizeOptions { apostrophes: false };
        assert_eq!(normalize_line("it\u{2019}s", opts), "it\u{2019}s");
    }

    #[test]
    fn test_stress_accents_removed_but_letters_kept() {
        assert_eq!(normalize("замо\u{0301}к"), "замок");
        // й and ї must survive the NFD/NFC round trip
        assert_eq!(normalize("Київ, який"), "Київ, який");
    }

    #[test]
    fn test_zero_width_removed() {
        assert_eq!(normalize("Від\u{200B}повідь:"), "Відповідь:");
    }

    #[test]
    fn test_idempotent() {
        let once = normalize(" Відповідь\u{00A0}\u{2013} «Шекспі\u{0301}р» ");
        assert_eq!(normalize(&once), once);
    }
}
