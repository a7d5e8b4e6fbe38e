//! Name resolution — pick the most trustworthy name in one row's OCR text.
//!
//! Strategies run in a fixed order and the first that yields anything
//! wins:
//!   1. person entities from the tagger (taken as-is)
//!   2. proper-noun tokens in title case that the vocabulary accepts
//!   3. capitalized words (`Xxxx`) that the vocabulary accepts
//!   4. the raw text, verbatim
//! Whatever wins is fed back into the vocabulary.

use super::normalize::is_title_case;
use super::vocabulary::Vocabulary;
use crate::ocr::Annotations;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// One uppercase letter followed by lowercase letters, any script.
static CAPITALIZED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\p{Lu}\p{Ll}+\b").expect("capitalized-word pattern is valid")
});

/// Which strategy produced the resolved name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    EntityTags,
    ProperNouns,
    CapitalizedWords,
    RawText,
}

/// Strategies tried before falling back to the raw text, in order.
pub const STRATEGY_CHAIN: [ResolutionTier; 3] = [
    ResolutionTier::EntityTags,
    ResolutionTier::ProperNouns,
    ResolutionTier::CapitalizedWords,
];

impl ResolutionTier {
    /// Candidate names this strategy finds; empty means "not applicable".
    pub fn candidates(
        self,
        raw_text: &str,
        annotations: &Annotations,
        vocabulary: &Vocabulary,
    ) -> Vec<String> {
        match self {
            ResolutionTier::EntityTags => {
                annotations.person_names().map(str::to_string).collect()
            }
            ResolutionTier::ProperNouns => annotations
                .proper_nouns()
                .filter(|t| is_title_case(t) && vocabulary.is_valid(t))
                .map(str::to_string)
                .collect(),
            ResolutionTier::CapitalizedWords => CAPITALIZED_WORD
                .find_iter(raw_text)
                .map(|m| m.as_str())
                .filter(|w| vocabulary.is_valid(w))
                .map(str::to_string)
                .collect(),
            ResolutionTier::RawText => vec![raw_text.to_string()],
        }
    }
}

/// Outcome of resolving one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub name: String,
    pub tier: ResolutionTier,
    pub candidates: Vec<String>,
    /// Tokens the vocabulary learned from this resolution.
    pub learned: usize,
}

/// Resolve one row's text and teach the vocabulary the result.
///
/// Never fails: with no usable candidates the raw text comes back unchanged.
pub fn resolve(
    raw_text: &str,
    annotations: &Annotations,
    vocabulary: &mut Vocabulary,
) -> Resolution {
    let (tier, candidates) = STRATEGY_CHAIN
        .iter()
        .map(|&tier| (tier, tier.candidates(raw_text, annotations, vocabulary)))
        .find(|(_, candidates)| !candidates.is_empty())
        .unwrap_or_else(|| {
            (
                ResolutionTier::RawText,
                ResolutionTier::RawText.candidates(raw_text, annotations, vocabulary),
            )
        });

    let name = candidates.join(" ");
    let learned = vocabulary.learn(&name);
    log::info!(
        "[NAMES] {:?} → {:?} ({:?}, learned {})",
        raw_text,
        name,
        tier,
        learned
    );

    Resolution {
        name,
        tier,
        candidates,
        learned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::DEFAULT_FUZZY_CUTOFF;
    use crate::ocr::{Entity, Token};

    fn entity(text: &str, label: &str) -> Entity {
        Entity {
            text: text.into(),
            label: label.into(),
        }
    }

    fn token(text: &str, pos: &str) -> Token {
        Token {
            text: text.into(),
            pos: pos.into(),
        }
    }

    #[test]
    fn person_entities_win_even_with_empty_vocabulary() {
        let mut vocab = Vocabulary::empty(DEFAULT_FUZZY_CUTOFF);
        let ann = Annotations {
            entities: vec![entity("Jose Rivera", "PER")],
            tokens: vec![token("Jose", "PROPN"), token("Rivera", "PROPN")],
        };
        let res = resolve("Jose Rivera", &ann, &mut vocab);
        assert_eq!(res.name, "Jose Rivera");
        assert_eq!(res.tier, ResolutionTier::EntityTags);
    }

    #[test]
    fn entities_beat_capitalized_words() {
        let mut vocab = Vocabulary::default();
        let ann = Annotations {
            entities: vec![entity("Yadder Mena", "PER")],
            tokens: vec![],
        };
        // "Isabella Torres" would satisfy the regex tier.
        let res = resolve("Isabella Torres Yadder Mena", &ann, &mut vocab);
        assert_eq!(res.name, "Yadder Mena");
        assert_eq!(res.tier, ResolutionTier::EntityTags);
    }

    #[test]
    fn multiple_person_spans_are_concatenated() {
        let mut vocab = Vocabulary::default();
        let ann = Annotations {
            entities: vec![entity("Ana", "PER"), entity("Lucía Pérez", "PER")],
            tokens: vec![],
        };
        assert_eq!(resolve("Ana Lucía Pérez", &ann, &mut vocab).name, "Ana Lucía Pérez");
    }

    #[test]
    fn proper_nouns_need_title_case_and_vocabulary() {
        let mut vocab = Vocabulary::default();
        let ann = Annotations {
            entities: vec![],
            tokens: vec![
                token("David", "PROPN"),
                token("FECHA", "PROPN"),
                token("Managua", "PROPN"),
                token("silva", "PROPN"),
                token("Orlando", "NOUN"),
            ],
        };
        let res = resolve("David FECHA Managua silva Orlando", &ann, &mut vocab);
        assert_eq!(res.tier, ResolutionTier::ProperNouns);
        assert_eq!(res.name, "David");
    }

    #[test]
    fn capitalized_words_filtered_by_vocabulary() {
        let mut vocab = Vocabulary::default();
        let res = resolve("1. Bryan Zeledón Firma 12/03", &Annotations::default(), &mut vocab);
        assert_eq!(res.tier, ResolutionTier::CapitalizedWords);
        assert_eq!(res.name, "Bryan Zeledón");
    }

    #[test]
    fn falls_back_to_raw_text() {
        let mut vocab = Vocabulary::default();
        let res = resolve("xq 12 ##", &Annotations::default(), &mut vocab);
        assert_eq!(res.tier, ResolutionTier::RawText);
        assert_eq!(res.name, "xq 12 ##");
    }

    #[test]
    fn empty_text_resolves_to_empty() {
        let mut vocab = Vocabulary::default();
        let res = resolve("", &Annotations::default(), &mut vocab);
        assert_eq!(res.name, "");
        assert_eq!(res.tier, ResolutionTier::RawText);
        assert_eq!(res.learned, 0);
    }

    #[test]
    fn raw_fallback_still_teaches_vocabulary() {
        let mut vocab = Vocabulary::default();
        let res = resolve("marisol guevara", &Annotations::default(), &mut vocab);
        assert_eq!(res.tier, ResolutionTier::RawText);
        assert_eq!(res.learned, 2);
        // A later row now accepts the learned surname through the regex tier.
        let later = resolve("Guevara", &Annotations::default(), &mut vocab);
        assert_eq!(later.tier, ResolutionTier::CapitalizedWords);
        assert_eq!(later.name, "Guevara");
    }
}
