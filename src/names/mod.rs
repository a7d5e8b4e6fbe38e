//! Name resolution domain — public API.
//!
//! Turns a row's raw OCR text into the name written on it:
//!   - normalize.rs  — accent/case folding and tokenization
//!   - similarity.rs — difflib-compatible similarity ratio
//!   - vocabulary.rs — growing set of accepted name tokens
//!   - resolver.rs   — tiered strategy chain with raw-text fallback

pub mod normalize;
pub mod resolver;
pub mod similarity;
pub mod vocabulary;

pub use normalize::{is_title_case, name_tokens, normalize_token};
pub use resolver::{resolve, Resolution, ResolutionTier, STRATEGY_CHAIN};
pub use similarity::ratio;
pub use vocabulary::{Vocabulary, VocabularyError, DEFAULT_FUZZY_CUTOFF};
