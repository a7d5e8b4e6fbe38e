//! Crate-level error, wrapping each domain's error type.

use crate::config::ConfigError;
use crate::names::VocabularyError;
use crate::ocr::CollaboratorError;
use crate::segment::SegmentError;
use crate::table::TableError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),
}

pub type Result<T> = std::result::Result<T, Error>;
