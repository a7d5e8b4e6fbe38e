//! OCR domain — contracts for the external recognition and tagging engines.
//!
//! The pipeline never recognizes text or tags parts of speech itself; it
//! talks to collaborators through the two traits here. Adapters:
//!   - worker.rs        — long-lived child process speaking NDJSON on stdio
//!   - google_vision.rs — Google Cloud Vision `images:annotate` over HTTPS
//!   - `NoTagger`       — empty annotations when no tagger is configured

pub mod google_vision;
pub mod worker;

pub use google_vision::GoogleVisionRecognizer;
pub use worker::WorkerProcess;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Entity labels that mark a person's name.
pub const PERSON_LABELS: &[&str] = &["PER", "PERSON"];

/// Part-of-speech tag for proper nouns.
pub const PROPER_NOUN: &str = "PROPN";

/// Failure talking to an external engine.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("failed to start '{command}': {reason}")]
    Spawn { command: String, reason: String },
    #[error("'{engine}' did not answer within {secs}s")]
    Timeout { engine: String, secs: u64 },
    #[error("'{engine}' I/O failed: {source}")]
    Io {
        engine: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{engine}' protocol error: {reason}")]
    Protocol { engine: String, reason: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("missing credential: {0}")]
    Missing(String),
}

/// One recognized text region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    /// Polygon around the text, in row-image pixels.
    #[serde(default)]
    pub bbox: Vec<(i32, i32)>,
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
}

/// A named-entity span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
}

/// A token with its part-of-speech tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub pos: String,
}

/// Everything the tagger said about one string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

impl Annotations {
    /// Texts of entities labelled as a person, in order.
    pub fn person_names(&self) -> impl Iterator<Item = &str> {
        self.entities
            .iter()
            .filter(|e| PERSON_LABELS.contains(&e.label.as_str()))
            .map(|e| e.text.trim())
            .filter(|t| !t.is_empty())
    }

    /// Tokens tagged as proper nouns, in order.
    pub fn proper_nouns(&self) -> impl Iterator<Item = &str> {
        self.tokens
            .iter()
            .filter(|t| t.pos == PROPER_NOUN)
            .map(|t| t.text.as_str())
    }
}

/// Optical character recognition over one row crop.
pub trait TextRecognizer {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Recognize text in a grayscale row. `paragraph` asks the engine to
    /// merge nearby words into paragraph-level spans.
    fn recognize(
        &self,
        row: &GrayImage,
        paragraph: bool,
    ) -> impl Future<Output = Result<Vec<TextSpan>, CollaboratorError>> + Send;
}

/// Named-entity and part-of-speech annotation of recognized text.
pub trait EntityTagger {
    fn name(&self) -> &str;

    fn annotate(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Annotations, CollaboratorError>> + Send;
}

/// Tagger used when none is configured: tiers that need tags never fire.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTagger;

impl EntityTagger for NoTagger {
    fn name(&self) -> &str {
        "none"
    }

    async fn annotate(&self, _text: &str) -> Result<Annotations, CollaboratorError> {
        Ok(Annotations::default())
    }
}

/// Space-joined span texts, the row's raw OCR text.
pub fn join_spans(spans: &[TextSpan]) -> String {
    spans
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// PNG-encode a row for transport to an engine.
pub(crate) fn encode_png(row: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut png = Vec::new();
    row.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(text: &str, label: &str) -> Entity {
        Entity {
            text: text.into(),
            label: label.into(),
        }
    }

    fn span(text: &str, confidence: f32) -> TextSpan {
        TextSpan {
            bbox: vec![],
            text: text.into(),
            confidence,
        }
    }

    #[test]
    fn person_names_filter_labels() {
        let ann = Annotations {
            entities: vec![
                entity("Jose Rivera", "PER"),
                entity("Managua", "LOC"),
                entity(" Ana Silva ", "PERSON"),
            ],
            tokens: vec![],
        };
        assert_eq!(ann.person_names().collect::<Vec<_>>(), vec!["Jose Rivera", "Ana Silva"]);
    }

    #[test]
    fn join_spans_skips_blank_text() {
        let spans = vec![span(" Jose ", 0.9), span("", 0.1), span("Rivera", 0.8)];
        assert_eq!(join_spans(&spans), "Jose Rivera");
        assert_eq!(join_spans(&[]), "");
    }

    #[test]
    fn annotations_tolerate_missing_fields() {
        let ann: Annotations = serde_json::from_str(r#"{"entities":[]}"#).unwrap();
        assert!(ann.tokens.is_empty());
    }

    #[test]
    fn png_encoding_roundtrips_dimensions() {
        let row = GrayImage::new(30, 7);
        let png = encode_png(&row).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 7));
    }
}
