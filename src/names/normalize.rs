//! Token normalization shared by learning and validation.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// A maximal run of letters (and their combining marks) between word
/// boundaries. Runs touching a digit or underscore have no boundary there.
static LETTER_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[\p{L}\p{M}]+\b").expect("letter-run pattern is valid"));

/// Case-fold and strip diacritics: `"José"` → `"jose"`, `"Núñez"` → `"nunez"`.
pub fn normalize_token(token: &str) -> String {
    token
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Letter-only words of `text`, normalized, in order.
///
/// Punctuation splits words, so OCR output glued as `"Marisol.Guevara"`
/// yields both names. Words fused with digits are skipped entirely, so
/// noise like `"Ana2"` never reaches the vocabulary.
pub fn name_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    LETTER_RUN
        .find_iter(text)
        .map(|m| normalize_token(m.as_str()))
}

/// Title case in the Python `str.istitle` sense: every cased run starts
/// with an uppercase letter and continues in lowercase.
pub fn is_title_case(word: &str) -> bool {
    let mut saw_cased = false;
    let mut prev_cased = false;
    for c in word.chars() {
        if c.is_uppercase() {
            if prev_cased {
                return false;
            }
            prev_cased = true;
            saw_cased = true;
        } else if c.is_lowercase() {
            if !prev_cased {
                return false;
            }
            prev_cased = true;
            saw_cased = true;
        } else {
            prev_cased = false;
        }
    }
    saw_cased
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_spanish_diacritics() {
        assert_eq!(normalize_token("José"), "jose");
        assert_eq!(normalize_token("ZELEDÓN"), "zeledon");
        assert_eq!(normalize_token("Núñez"), "nunez");
        assert_eq!(normalize_token("Güell"), "guell");
    }

    #[test]
    fn tokens_skip_words_with_digits() {
        let tokens: Vec<String> = name_tokens("Ana2 María, 12/03 López").collect();
        assert_eq!(tokens, vec!["maria", "lopez"]);
    }

    #[test]
    fn punctuation_between_letters_splits_tokens() {
        let tokens: Vec<String> = name_tokens("Marisol.Guevara Quiñónez:Mena O'Brien").collect();
        assert_eq!(tokens, vec!["marisol", "guevara", "quinonez", "mena", "o", "brien"]);
    }

    #[test]
    fn decomposed_accents_stay_in_one_token() {
        let tokens: Vec<String> = name_tokens("Jose\u{301} Rivera").collect();
        assert_eq!(tokens, vec!["jose", "rivera"]);
    }

    #[test]
    fn title_case_follows_python_rules() {
        assert!(is_title_case("Jose"));
        assert!(is_title_case("José"));
        assert!(is_title_case("O'Brien"));
        assert!(!is_title_case("JOSE"));
        assert!(!is_title_case("jose"));
        assert!(!is_title_case("McDonald"));
        assert!(!is_title_case("123"));
        assert!(!is_title_case(""));
    }
}
