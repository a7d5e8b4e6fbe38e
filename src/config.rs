//! Pipeline configuration — defaults, JSON file, environment, flags.
//!
//! Layers, lowest to highest precedence:
//!   1. built-in defaults
//!   2. `~/.config/roster-scan/config.json` (or an explicit path)
//!   3. `ROSTER_*` environment variables
//!   4. command-line flags (applied by the caller)

use crate::names::DEFAULT_FUZZY_CUTOFF;
use crate::segment::{SegmentConfig, DEFAULT_VARIANCE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that forces the OCR engine.
pub const OCR_ENGINE_ENV: &str = "ROSTER_OCR_ENGINE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Whether learned names survive the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabularyMode {
    #[default]
    PerRun,
    Persistent,
}

impl std::str::FromStr for VocabularyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_run" | "per-run" => Ok(Self::PerRun),
            "persistent" => Ok(Self::Persistent),
            other => Err(format!("expected per_run or persistent, got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub laplacian_variance_threshold: f64,
    pub row_gap_px: u32,
    pub min_band_height_px: u32,
    pub fuzzy_match_cutoff: f64,
    pub collaborator_timeout_secs: u64,
    pub vocabulary_mode: VocabularyMode,
    pub vocabulary_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let segment = SegmentConfig::default();
        Self {
            laplacian_variance_threshold: DEFAULT_VARIANCE_THRESHOLD,
            row_gap_px: segment.row_gap_px,
            min_band_height_px: segment.min_band_height_px,
            fuzzy_match_cutoff: DEFAULT_FUZZY_CUTOFF,
            collaborator_timeout_secs: 15,
            vocabulary_mode: VocabularyMode::PerRun,
            vocabulary_path: None,
        }
    }
}

/// `~/.config/roster-scan/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("roster-scan")
        .join("config.json")
}

/// `~/.local/share/roster-scan/vocabulary.json` (platform data dir).
pub fn default_vocabulary_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("roster-scan")
        .join("vocabulary.json")
}

impl PipelineConfig {
    /// Defaults, then the config file, then `ROSTER_*` variables.
    ///
    /// An explicit `path` must exist; the default location may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let p = default_config_path();
                if p.exists() {
                    Self::from_file(&p)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("[CONFIG] Loaded {}", path.display());
        Ok(config)
    }

    /// Overlay environment values. `lookup` is `std::env::var` in production.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("ROSTER_LAPLACIAN_THRESHOLD") {
            self.laplacian_variance_threshold = parse_var("ROSTER_LAPLACIAN_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("ROSTER_ROW_GAP_PX") {
            self.row_gap_px = parse_var("ROSTER_ROW_GAP_PX", &v)?;
        }
        if let Some(v) = lookup("ROSTER_MIN_BAND_HEIGHT_PX") {
            self.min_band_height_px = parse_var("ROSTER_MIN_BAND_HEIGHT_PX", &v)?;
        }
        if let Some(v) = lookup("ROSTER_FUZZY_CUTOFF") {
            self.fuzzy_match_cutoff = parse_var("ROSTER_FUZZY_CUTOFF", &v)?;
        }
        if let Some(v) = lookup("ROSTER_COLLABORATOR_TIMEOUT_SECS") {
            self.collaborator_timeout_secs = parse_var("ROSTER_COLLABORATOR_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("ROSTER_VOCABULARY_MODE") {
            self.vocabulary_mode = parse_var("ROSTER_VOCABULARY_MODE", &v)?;
        }
        if let Some(v) = lookup("ROSTER_VOCABULARY_PATH") {
            if !v.trim().is_empty() {
                self.vocabulary_path = Some(PathBuf::from(v.trim()));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.laplacian_variance_threshold.is_finite()
            || self.laplacian_variance_threshold < 0.0
        {
            return Err(invalid(
                "laplacian_variance_threshold",
                "must be a finite, non-negative number",
            ));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_match_cutoff) {
            return Err(invalid("fuzzy_match_cutoff", "must be within [0, 1]"));
        }
        if self.collaborator_timeout_secs == 0 {
            return Err(invalid("collaborator_timeout_secs", "must be at least 1"));
        }
        Ok(())
    }

    pub fn segment_config(&self) -> SegmentConfig {
        SegmentConfig {
            laplacian_variance_threshold: self.laplacian_variance_threshold,
            row_gap_px: self.row_gap_px,
            min_band_height_px: self.min_band_height_px,
        }
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }

    /// Where a persistent vocabulary lives.
    pub fn vocabulary_file(&self) -> PathBuf {
        self.vocabulary_path
            .clone()
            .unwrap_or_else(default_vocabulary_path)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, &format!("'{}' ({})", value, e)))
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Which recognizer backs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrEngine {
    Worker,
    Google,
}

/// Pick the OCR engine from the environment.
pub fn resolve_engine(worker_configured: bool) -> OcrEngine {
    choose_engine(
        std::env::var(OCR_ENGINE_ENV).ok(),
        crate::ocr::GoogleVisionRecognizer::is_configured(),
        worker_configured,
    )
}

/// Explicit override first, then Google when only it is available.
pub fn choose_engine(
    explicit: Option<String>,
    google_key_present: bool,
    worker_configured: bool,
) -> OcrEngine {
    if let Some(engine) = explicit {
        match engine.to_lowercase().as_str() {
            "google" => {
                log::info!("[CONFIG] OCR engine override: google");
                return OcrEngine::Google;
            }
            "worker" => {
                log::info!("[CONFIG] OCR engine override: worker");
                return OcrEngine::Worker;
            }
            other => log::warn!("[CONFIG] Ignoring unknown {}='{}'", OCR_ENGINE_ENV, other),
        }
    }

    if google_key_present && !worker_configured {
        return OcrEngine::Google;
    }
    OcrEngine::Worker
}
