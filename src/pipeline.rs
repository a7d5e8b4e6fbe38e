//! Sheet pipeline — segmentation, then one row at a time:
//! OCR → tag → resolve → append.
//!
//! Rows run strictly in order because each resolution teaches the
//! vocabulary that later rows are validated against. A collaborator
//! failure only empties that row's text; the batch always continues.

use crate::config::{PipelineConfig, VocabularyMode};
use crate::error::Result;
use crate::names::{resolve, ResolutionTier, Vocabulary};
use crate::ocr::{join_spans, Annotations, CollaboratorError, EntityTagger, TextRecognizer};
use crate::segment::{
    row_file_name, segment_sheet, write_row_images, DetectionAttempt, TextStyle,
};
use crate::table;
use image::{DynamicImage, GrayImage};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Hex digits of the pixel hash kept as the sheet id.
const SHEET_ID_LEN: usize = 12;

/// Shared stop request, honoured between rows only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a sheet's results go.
#[derive(Debug, Clone)]
pub struct SheetOutput {
    /// Result table CSV, appended once per row.
    pub table: PathBuf,
    /// When set, row crops are written here as PNG.
    pub rows_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    pub index: usize,
    pub source_identifier: String,
    /// Space-joined OCR text for the row.
    pub raw_text: String,
    pub resolved_name: String,
    pub tier: ResolutionTier,
    /// Recovered failure, if any (OCR, tagger, or table write).
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetReport {
    pub sheet_id: String,
    pub style: TextStyle,
    pub attempt: DetectionAttempt,
    pub used_full_image_fallback: bool,
    pub rows: Vec<RowOutcome>,
    pub cancelled: bool,
}

/// First hex digits of SHA-256 over the decoded pixels.
pub fn sheet_id(image: &DynamicImage) -> String {
    let digest = Sha256::digest(image.as_bytes());
    digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
        .chars()
        .take(SHEET_ID_LEN)
        .collect()
}

/// Vocabulary for a run: the seed set, or the persisted one.
pub fn open_vocabulary(config: &PipelineConfig) -> Result<Vocabulary> {
    match config.vocabulary_mode {
        VocabularyMode::PerRun => Ok(Vocabulary::seeded(config.fuzzy_match_cutoff)),
        VocabularyMode::Persistent => Ok(Vocabulary::load_or_seed(
            &config.vocabulary_file(),
            config.fuzzy_match_cutoff,
        )?),
    }
}

/// Persist the vocabulary when the mode asks for it.
pub fn close_vocabulary(config: &PipelineConfig, vocabulary: &Vocabulary) -> Result<()> {
    if config.vocabulary_mode == VocabularyMode::Persistent {
        vocabulary.save(&config.vocabulary_file())?;
    }
    Ok(())
}

pub struct Pipeline<R, T> {
    config: PipelineConfig,
    recognizer: R,
    tagger: T,
}

impl<R: TextRecognizer, T: EntityTagger> Pipeline<R, T> {
    pub fn new(config: PipelineConfig, recognizer: R, tagger: T) -> Self {
        Self {
            config,
            recognizer,
            tagger,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    pub fn tagger(&self) -> &T {
        &self.tagger
    }

    /// Process one sheet end to end.
    ///
    /// Fails only when the image is degenerate or row crops cannot be
    /// written; per-row failures are recorded in the report.
    pub async fn process_sheet(
        &self,
        image: &DynamicImage,
        vocabulary: &mut Vocabulary,
        output: &SheetOutput,
        cancel: &CancelFlag,
    ) -> Result<SheetReport> {
        let pipeline_start = std::time::Instant::now();
        let segmentation = segment_sheet(image, &self.config.segment_config())?;
        let sheet_id = sheet_id(image);

        if segmentation.full_image_fallback {
            log::warn!("[PIPELINE] No row bands survived; using the whole sheet as one row");
        }
        if let Some(dir) = &output.rows_dir {
            write_row_images(&segmentation.rows, dir, &sheet_id)?;
        }

        let mut report = SheetReport {
            sheet_id: sheet_id.clone(),
            style: segmentation.style,
            attempt: segmentation.attempt,
            used_full_image_fallback: segmentation.full_image_fallback,
            rows: Vec::with_capacity(segmentation.rows.len()),
            cancelled: false,
        };

        for row in &segmentation.rows {
            if cancel.is_cancelled() {
                log::warn!(
                    "[PIPELINE] Cancelled after {} of {} rows",
                    report.rows.len(),
                    segmentation.rows.len()
                );
                report.cancelled = true;
                break;
            }
            let source_identifier = row_file_name(&sheet_id, row.index);
            let outcome = self
                .process_row(
                    row.index,
                    source_identifier,
                    &row.image.to_luma8(),
                    vocabulary,
                    output,
                )
                .await;
            report.rows.push(outcome);
        }

        log::info!(
            "[PIPELINE] Sheet {}: {} rows in {}ms",
            sheet_id,
            report.rows.len(),
            pipeline_start.elapsed().as_millis()
        );
        Ok(report)
    }

    async fn process_row(
        &self,
        index: usize,
        source_identifier: String,
        row: &GrayImage,
        vocabulary: &mut Vocabulary,
        output: &SheetOutput,
    ) -> RowOutcome {
        let mut errors = Vec::new();

        let ocr_start = std::time::Instant::now();
        let raw_text = match self.read_text(row).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[OCR] Row {} failed, treating as empty: {}", index, e);
                errors.push(e.to_string());
                String::new()
            }
        };
        log::info!(
            "[OCR] Row {}: {:?} in {}ms",
            index,
            raw_text,
            ocr_start.elapsed().as_millis()
        );

        let annotations = match self.annotate(&raw_text).await {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[NAMES] Tagger failed on row {}: {}", index, e);
                errors.push(e.to_string());
                Annotations::default()
            }
        };

        let resolution = resolve(&raw_text, &annotations, vocabulary);

        if let Err(e) = table::append(&source_identifier, &resolution.name, &output.table) {
            log::error!("[TABLE] Row {} not recorded: {}", index, e);
            errors.push(e.to_string());
        }

        RowOutcome {
            index,
            source_identifier,
            raw_text,
            resolved_name: resolution.name,
            tier: resolution.tier,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        }
    }

    /// Recognize a row in paragraph mode and join the span texts.
    pub async fn read_text(
        &self,
        row: &GrayImage,
    ) -> std::result::Result<String, CollaboratorError> {
        let spans = bounded(
            self.recognizer.name(),
            self.config.collaborator_timeout(),
            self.recognizer.recognize(row, true),
        )
        .await?;
        Ok(join_spans(&spans))
    }

    /// Tag text; empty text is never sent to the tagger.
    pub async fn annotate(
        &self,
        text: &str,
    ) -> std::result::Result<Annotations, CollaboratorError> {
        if text.trim().is_empty() {
            return Ok(Annotations::default());
        }
        bounded(
            self.tagger.name(),
            self.config.collaborator_timeout(),
            self.tagger.annotate(text),
        )
        .await
    }
}

async fn bounded<V>(
    engine: &str,
    limit: Duration,
    call: impl Future<Output = std::result::Result<V, CollaboratorError>>,
) -> std::result::Result<V, CollaboratorError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| CollaboratorError::Timeout {
            engine: engine.to_string(),
            secs: limit.as_secs(),
        })?
}
