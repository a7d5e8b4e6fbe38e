//! Google Cloud Vision recognizer — `images:annotate` over HTTPS.
//!
//! - API key in the URL query param, read from `GOOGLE_VISION_API_KEY`
//! - `DOCUMENT_TEXT_DETECTION` with a Spanish language hint
//! - paragraph mode: the full-text annotation as one span
//! - word mode: one span per word annotation (the first entry is the full
//!   text and is skipped)

use super::{encode_png, CollaboratorError, TextRecognizer, TextSpan};
use base64::Engine;
use image::GrayImage;
use serde::Deserialize;

pub const API_KEY_ENV: &str = "GOOGLE_VISION_API_KEY";

const ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

#[derive(Debug, Default, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    full_text_annotation: Option<FullText>,
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityAnnotation {
    description: String,
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
}

#[derive(Debug, Default, Deserialize)]
struct Vertex {
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
}

#[derive(Debug, Deserialize)]
struct FullText {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    message: String,
}

pub struct GoogleVisionRecognizer {
    api_key: String,
    client: reqwest::Client,
}

impl GoogleVisionRecognizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from `GOOGLE_VISION_API_KEY`.
    pub fn from_env() -> Result<Self, CollaboratorError> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Ok(Self::new(key)),
            _ => Err(CollaboratorError::Missing(API_KEY_ENV.to_string())),
        }
    }

    /// True when an API key is present in the environment.
    pub fn is_configured() -> bool {
        std::env::var(API_KEY_ENV)
            .map(|k| !k.is_empty())
            .unwrap_or(false)
    }
}

impl TextRecognizer for GoogleVisionRecognizer {
    fn name(&self) -> &str {
        "google-vision"
    }

    async fn recognize(
        &self,
        row: &GrayImage,
        paragraph: bool,
    ) -> Result<Vec<TextSpan>, CollaboratorError> {
        let png = encode_png(row).map_err(|e| CollaboratorError::Protocol {
            engine: self.name().to_string(),
            reason: format!("PNG encode failed: {}", e),
        })?;

        let start = std::time::Instant::now();
        let url = format!("{}?key={}", ENDPOINT, self.api_key);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "requests": [
                    {
                        "image": {
                            "content": base64::engine::general_purpose::STANDARD.encode(&png)
                        },
                        "features": [
                            { "type": "DOCUMENT_TEXT_DETECTION" }
                        ],
                        "imageContext": {
                            "languageHints": ["es"]
                        }
                    }
                ]
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Protocol {
                engine: self.name().to_string(),
                reason: format!("API returned {}: {}", status, body),
            });
        }

        let body: AnnotateResponse = response.json().await?;
        log::info!("[OCR] Google Vision: {}ms", start.elapsed().as_millis());
        spans_from_response(body, paragraph).map_err(|reason| CollaboratorError::Protocol {
            engine: self.name().to_string(),
            reason,
        })
    }
}

fn spans_from_response(body: AnnotateResponse, paragraph: bool) -> Result<Vec<TextSpan>, String> {
    let Some(image) = body.responses.into_iter().next() else {
        return Ok(Vec::new());
    };
    if let Some(status) = image.error {
        return Err(status.message);
    }

    if paragraph {
        let bbox = image
            .text_annotations
            .first()
            .map(polygon)
            .unwrap_or_default();
        return Ok(image
            .full_text_annotation
            .map(|full| full.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .map(|text| TextSpan {
                bbox,
                text,
                confidence: 1.0,
            })
            .into_iter()
            .collect());
    }

    Ok(image
        .text_annotations
        .iter()
        .skip(1)
        .map(|word| TextSpan {
            bbox: polygon(word),
            text: word.description.clone(),
            confidence: 1.0,
        })
        .collect())
}

fn polygon(annotation: &EntityAnnotation) -> Vec<(i32, i32)> {
    annotation
        .bounding_poly
        .as_ref()
        .map(|poly| poly.vertices.iter().map(|v| (v.x, v.y)).collect())
        .unwrap_or_default()
}
