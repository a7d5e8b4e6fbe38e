//! Name vocabulary — the validator that gates heuristic name candidates.
//!
//! Starts from a seed set of roster names and grows as rows are resolved,
//! so later rows on the same sheet benefit from names already seen. There
//! is no removal: a wrongly learned token stays for the rest of the run.

use super::normalize::{name_tokens, normalize_token};
use super::similarity::ratio;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Default similarity a fuzzy match must reach.
pub const DEFAULT_FUZZY_CUTOFF: f64 = 0.7;

/// Tokens this short or shorter are never learned.
const MIN_LEARN_CHARS: usize = 3;

/// Names observed on the rosters this tool was first built for.
const SEED_NAMES: &[&str] = &[
    "isabella", "dompe", "estrada", "jesus", "abraham", "silva", "ampre", "david", "orlando",
    "mena", "valverde", "yadder", "fernando", "torres", "eduardo", "domingo", "zeledon",
    "mercado", "roman", "alfonso", "grios", "boza", "bryan", "alexander", "cano", "hotep",
    "antonio", "ruiz", "lezama", "cristina", "jozabed", "carvajal", "ronier", "jose", "rivera",
];

#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
    #[error("failed to access vocabulary file: {0}")]
    Io(#[from] std::io::Error),
    #[error("vocabulary file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// On-disk form of a persisted vocabulary.
#[derive(Debug, Serialize, Deserialize)]
struct VocabularyFile {
    tokens: BTreeSet<String>,
}

/// Growing set of normalized name tokens plus the fuzzy-match cutoff.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: BTreeSet<String>,
    cutoff: f64,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::seeded(DEFAULT_FUZZY_CUTOFF)
    }
}

impl Vocabulary {
    /// The seed roster names with the given cutoff.
    pub fn seeded(cutoff: f64) -> Self {
        Self {
            tokens: SEED_NAMES.iter().map(|s| s.to_string()).collect(),
            cutoff,
        }
    }

    /// An empty vocabulary; every token is invalid until learned.
    pub fn empty(cutoff: f64) -> Self {
        Self {
            tokens: BTreeSet::new(),
            cutoff,
        }
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(&normalize_token(token))
    }

    /// True when the normalized token is known, or its best fuzzy match
    /// reaches the cutoff.
    pub fn is_valid(&self, token: &str) -> bool {
        let normalized = normalize_token(token);
        if normalized.is_empty() {
            return false;
        }
        if self.tokens.contains(&normalized) {
            return true;
        }
        self.closest_match(&normalized).is_some()
    }

    /// Best-scoring known token at or above the cutoff.
    pub fn closest_match(&self, normalized: &str) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for known in &self.tokens {
            let score = ratio(known, normalized);
            if score >= self.cutoff && best.map_or(true, |(_, s)| score > s) {
                best = Some((known.as_str(), score));
            }
        }
        best.map(|(token, _)| token)
    }

    /// Add every alphabetic word longer than three characters. Returns how
    /// many tokens were new.
    pub fn learn(&mut self, text: &str) -> usize {
        let mut added = 0;
        for token in name_tokens(text) {
            if token.chars().count() > MIN_LEARN_CHARS && self.tokens.insert(token.clone()) {
                log::debug!("[NAMES] Learned '{}'", token);
                added += 1;
            }
        }
        added
    }

    /// Load a persisted vocabulary; a missing file yields the seed set.
    pub fn load_or_seed(path: &Path, cutoff: f64) -> Result<Self, VocabularyError> {
        if !path.exists() {
            log::info!(
                "[NAMES] No vocabulary at {}, starting from seed names",
                path.display()
            );
            return Ok(Self::seeded(cutoff));
        }
        let raw = std::fs::read_to_string(path)?;
        let file: VocabularyFile = serde_json::from_str(&raw)?;
        let mut vocabulary = Self::seeded(cutoff);
        vocabulary.tokens.extend(file.tokens);
        log::info!(
            "[NAMES] Loaded {} tokens from {}",
            vocabulary.len(),
            path.display()
        );
        Ok(vocabulary)
    }

    /// Persist the token set as sorted JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), VocabularyError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&VocabularyFile {
            tokens: self.tokens.clone(),
        })?;
        std::fs::write(path, json)?;
        log::info!("[NAMES] Saved {} tokens to {}", self.len(), path.display());
        Ok(())
    }
}
