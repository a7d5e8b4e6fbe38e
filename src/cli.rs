//! Command-line surface: argument parsing and subcommand dispatch.

use crate::config::{resolve_engine, OcrEngine, PipelineConfig, VocabularyMode};
use crate::error::Result;
use crate::names::resolve;
use crate::ocr::{
    Annotations, CollaboratorError, EntityTagger, GoogleVisionRecognizer, NoTagger,
    TextRecognizer, TextSpan, WorkerProcess,
};
use crate::pipeline::{
    close_vocabulary, open_vocabulary, sheet_id, CancelFlag, Pipeline, SheetOutput,
};
use crate::segment::{load_image, segment_sheet, write_row_images};
use crate::table::create_attendance_sheet;
use clap::{Args, Parser, Subcommand};
use image::GrayImage;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "roster-scan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Segment attendance sheets into rows and resolve each row to a name",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Segment a sheet and write one PNG per row
    Segment {
        image: PathBuf,
        /// Directory for the row images
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Segment, recognize and resolve every row, appending to a result table
    Process {
        image: PathBuf,
        /// Result table (CSV)
        #[arg(long)]
        table: PathBuf,
        /// Also write row images here
        #[arg(long = "rows-dir")]
        rows_dir: Option<PathBuf>,
        #[command(flatten)]
        engines: Engines,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Resolve a single line of text to a name
    Resolve {
        text: String,
        /// Entity tagger worker command
        #[arg(long)]
        tagger: Option<String>,
        #[arg(long = "tagger-arg", allow_hyphen_values = true)]
        tagger_args: Vec<String>,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Write an attendance sheet marking every name present
    Attendance {
        /// Destination CSV (must not exist)
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        date: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct Engines {
    /// OCR worker command
    #[arg(long)]
    pub worker: Option<String>,
    #[arg(long = "worker-arg", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,
    /// Entity tagger worker command
    #[arg(long)]
    pub tagger: Option<String>,
    #[arg(long = "tagger-arg", allow_hyphen_values = true)]
    pub tagger_args: Vec<String>,
}

/// Flags that override file and environment configuration.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Config file (defaults to the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long = "laplacian-threshold")]
    pub laplacian_threshold: Option<f64>,
    #[arg(long = "row-gap")]
    pub row_gap: Option<u32>,
    #[arg(long = "min-band-height")]
    pub min_band_height: Option<u32>,
    #[arg(long = "fuzzy-cutoff")]
    pub fuzzy_cutoff: Option<f64>,
    /// Keep learned names across runs
    #[arg(long = "persist-vocabulary")]
    pub persist_vocabulary: bool,
}

impl Overrides {
    /// Load layered configuration and apply these flags on top.
    pub fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(v) = self.laplacian_threshold {
            config.laplacian_variance_threshold = v;
        }
        if let Some(v) = self.row_gap {
            config.row_gap_px = v;
        }
        if let Some(v) = self.min_band_height {
            config.min_band_height_px = v;
        }
        if let Some(v) = self.fuzzy_cutoff {
            config.fuzzy_match_cutoff = v;
        }
        if self.persist_vocabulary {
            config.vocabulary_mode = VocabularyMode::Persistent;
        }
    }
}

/// Recognizer chosen at startup.
enum Recognizer {
    Worker(WorkerProcess),
    Google(GoogleVisionRecognizer),
}

impl TextRecognizer for Recognizer {
    fn name(&self) -> &str {
        match self {
            Recognizer::Worker(w) => TextRecognizer::name(w),
            Recognizer::Google(g) => g.name(),
        }
    }

    async fn recognize(
        &self,
        row: &GrayImage,
        paragraph: bool,
    ) -> std::result::Result<Vec<TextSpan>, CollaboratorError> {
        match self {
            Recognizer::Worker(w) => w.recognize(row, paragraph).await,
            Recognizer::Google(g) => g.recognize(row, paragraph).await,
        }
    }
}

/// Tagger chosen at startup.
enum Tagger {
    Worker(WorkerProcess),
    None(NoTagger),
}

impl EntityTagger for Tagger {
    fn name(&self) -> &str {
        match self {
            Tagger::Worker(w) => EntityTagger::name(w),
            Tagger::None(n) => n.name(),
        }
    }

    async fn annotate(&self, text: &str) -> std::result::Result<Annotations, CollaboratorError> {
        match self {
            Tagger::Worker(w) => w.annotate(text).await,
            Tagger::None(n) => n.annotate(text).await,
        }
    }
}

impl Tagger {
    fn spawn(command: Option<&str>, args: &[String], config: &PipelineConfig) -> Result<Self> {
        Ok(match command {
            Some(cmd) => Tagger::Worker(WorkerProcess::spawn(
                "tagger",
                cmd,
                args,
                config.collaborator_timeout(),
            )?),
            None => {
                log::info!("[NAMES] No tagger configured; entity and proper-noun tiers disabled");
                Tagger::None(NoTagger)
            }
        })
    }

    async fn shutdown(&self) {
        if let Tagger::Worker(w) = self {
            w.shutdown().await;
        }
    }
}

fn build_recognizer(engines: &Engines, config: &PipelineConfig) -> Result<Recognizer> {
    match resolve_engine(engines.worker.is_some()) {
        OcrEngine::Google => Ok(Recognizer::Google(GoogleVisionRecognizer::from_env()?)),
        OcrEngine::Worker => {
            let command = engines.worker.as_deref().ok_or_else(|| {
                CollaboratorError::Missing("OCR worker command (--worker)".to_string())
            })?;
            Ok(Recognizer::Worker(WorkerProcess::spawn(
                "ocr",
                command,
                &engines.worker_args,
                config.collaborator_timeout(),
            )?))
        }
    }
}

/// Run one parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Segment {
            image,
            out,
            overrides,
        } => {
            let config = overrides.resolve()?;
            let sheet = load_image(&image)?;
            let segmentation = segment_sheet(&sheet, &config.segment_config())?;
            let paths = write_row_images(&segmentation.rows, &out, &sheet_id(&sheet))?;
            for (row, path) in segmentation.rows.iter().zip(&paths) {
                println!(
                    "{}\t{}..{}\t{}",
                    row.index,
                    row.band.start_row,
                    row.band.end_row,
                    path.display()
                );
            }
            Ok(())
        }
        Command::Process {
            image,
            table,
            rows_dir,
            engines,
            overrides,
        } => {
            let config = overrides.resolve()?;
            let sheet = load_image(&image)?;
            let recognizer = build_recognizer(&engines, &config)?;
            let tagger = Tagger::spawn(engines.tagger.as_deref(), &engines.tagger_args, &config)?;
            let mut vocabulary = open_vocabulary(&config)?;
            let output = SheetOutput { table, rows_dir };

            let pipeline = Pipeline::new(config, recognizer, tagger);
            let result = pipeline
                .process_sheet(&sheet, &mut vocabulary, &output, &CancelFlag::new())
                .await;

            if let Recognizer::Worker(w) = pipeline.recognizer() {
                w.shutdown().await;
            }
            pipeline.tagger().shutdown().await;

            let report = result?;
            close_vocabulary(pipeline.config(), &vocabulary)?;
            for row in &report.rows {
                println!("{}\t{}\t{}", row.index, row.source_identifier, row.resolved_name);
            }
            Ok(())
        }
        Command::Resolve {
            text,
            tagger,
            tagger_args,
            overrides,
        } => {
            let config = overrides.resolve()?;
            let tagger = Tagger::spawn(tagger.as_deref(), &tagger_args, &config)?;
            let mut vocabulary = open_vocabulary(&config)?;

            let pipeline = Pipeline::new(config, NoRecognizer, tagger);
            let annotations = match pipeline.annotate(&text).await {
                Ok(a) => a,
                Err(e) => {
                    log::warn!("[NAMES] Tagger failed: {}", e);
                    Annotations::default()
                }
            };
            pipeline.tagger().shutdown().await;

            let resolution = resolve(&text, &annotations, &mut vocabulary);
            close_vocabulary(pipeline.config(), &vocabulary)?;
            println!("{}", resolution.name);
            Ok(())
        }
        Command::Attendance { out, date, names } => {
            create_attendance_sheet(&out, &names, &date)?;
            println!("{}", out.display());
            Ok(())
        }
    }
}

/// Stand-in for the `resolve` command, which never recognizes images.
struct NoRecognizer;

impl TextRecognizer for NoRecognizer {
    fn name(&self) -> &str {
        "none"
    }

    async fn recognize(
        &self,
        _row: &GrayImage,
        _paragraph: bool,
    ) -> std::result::Result<Vec<TextSpan>, CollaboratorError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_flags_parse() {
        let cli = Cli::try_parse_from([
            "roster-scan",
            "process",
            "sheet.png",
            "--table",
            "out.csv",
            "--worker",
            "python3",
            "--worker-arg",
            "ocr_worker.py",
            "--worker-arg",
            "--gpu",
            "--row-gap",
            "14",
            "--persist-vocabulary",
        ])
        .unwrap();
        match cli.command {
            Command::Process {
                image,
                engines,
                overrides,
                ..
            } => {
                assert_eq!(image, PathBuf::from("sheet.png"));
                assert_eq!(engines.worker.as_deref(), Some("python3"));
                assert_eq!(engines.worker_args, vec!["ocr_worker.py", "--gpu"]);
                assert_eq!(overrides.row_gap, Some(14));
                assert!(overrides.persist_vocabulary);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn attendance_requires_names() {
        let args = ["roster-scan", "attendance", "--out", "a.csv", "--date", "d"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn overrides_win_over_loaded_values() {
        let overrides = Overrides {
            laplacian_threshold: Some(60.0),
            fuzzy_cutoff: Some(0.9),
            persist_vocabulary: true,
            ..Overrides::default()
        };
        let mut config = PipelineConfig {
            row_gap_px: 12,
            ..PipelineConfig::default()
        };
        overrides.apply(&mut config);
        assert_eq!(config.laplacian_variance_threshold, 60.0);
        assert_eq!(config.fuzzy_match_cutoff, 0.9);
        assert_eq!(config.row_gap_px, 12);
        assert_eq!(config.vocabulary_mode, VocabularyMode::Persistent);
    }
}
