//! Result table domain — public API.
//!
//! The result table is a two-column CSV (`source_identifier`,
//! `resolved_name`) rewritten in full on every append. A missing,
//! undersized, or unreadable file is replaced by the example template
//! before the new row goes in; broken content is discarded, never merged.

pub mod attendance;
mod csv;

pub use attendance::create_attendance_sheet;
pub use csv::{escape_field, parse_records, write_records, CsvFault};

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Files smaller than this are treated as broken.
pub const MIN_TABLE_BYTES: u64 = 100;

pub const HEADER: [&str; 2] = ["source_identifier", "resolved_name"];

const TEMPLATE_ROWS: [(&str, &str); 3] = [
    ("example1.png", "Example Name 1"),
    ("example2.png", "Example Name 2"),
    ("example3.png", "Example Name 3"),
];

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed table: {0}")]
    Malformed(String),
    #[error("file name must end in .csv: {0}")]
    InvalidFileName(String),
    #[error("no names to write")]
    EmptyNames,
    #[error("attendance date is empty")]
    EmptyDate,
    #[error("{0} already exists")]
    AlreadyExists(PathBuf),
}

impl TableError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        TableError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub source_identifier: String,
    pub resolved_name: String,
}

impl ResultRow {
    pub fn new(source_identifier: impl Into<String>, resolved_name: impl Into<String>) -> Self {
        Self {
            source_identifier: source_identifier.into(),
            resolved_name: resolved_name.into(),
        }
    }
}

/// What `append` found at the destination before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    /// A readable table; the row was added after its rows.
    Existing,
    /// Missing or undersized; started from the template.
    Initialized,
    /// Present but unreadable; replaced by the template.
    Reinitialized,
}

/// Data rows under a fixed two-column header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    /// The three example rows new tables start with.
    pub fn template() -> Self {
        Self {
            rows: TEMPLATE_ROWS
                .iter()
                .map(|(source, name)| ResultRow::new(*source, *name))
                .collect(),
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    /// Parse CSV text. The header must match exactly and every record must
    /// have two fields.
    pub fn parse(body: &str) -> Result<Self, TableError> {
        let records = parse_records(body).map_err(|e| TableError::Malformed(e.to_string()))?;
        let mut records = records.into_iter();

        let header = records
            .next()
            .ok_or_else(|| TableError::Malformed("missing header".to_string()))?;
        if header != HEADER {
            return Err(TableError::Malformed(format!(
                "unexpected header {:?}",
                header
            )));
        }

        let mut rows = Vec::new();
        for (i, record) in records.enumerate() {
            let [source, name]: [String; 2] = record.try_into().map_err(|r: Vec<String>| {
                TableError::Malformed(format!("row {} has {} fields, expected 2", i + 1, r.len()))
            })?;
            rows.push(ResultRow::new(source, name));
        }
        Ok(Self { rows })
    }

    pub fn to_csv(&self) -> String {
        let body = std::iter::once(HEADER.to_vec()).chain(
            self.rows
                .iter()
                .map(|r| vec![r.source_identifier.as_str(), r.resolved_name.as_str()]),
        );
        write_records(body)
    }

    /// Read the destination, falling back to the template when it is
    /// missing, too small, or unreadable.
    pub fn load_or_template(path: &Path) -> (Self, TableState) {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                log::info!("[TABLE] {} missing, starting from template", path.display());
                return (Self::template(), TableState::Initialized);
            }
        };
        if size < MIN_TABLE_BYTES {
            log::warn!(
                "[TABLE] {} is {} bytes (< {}), starting from template",
                path.display(),
                size,
                MIN_TABLE_BYTES
            );
            return (Self::template(), TableState::Initialized);
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| TableError::io(path, e))
            .and_then(|body| Self::parse(&body));
        match parsed {
            Ok(table) => (table, TableState::Existing),
            Err(e) => {
                log::warn!("[TABLE] {} unreadable ({}), reinitializing", path.display(), e);
                (Self::template(), TableState::Reinitialized)
            }
        }
    }

    /// Rewrite the whole file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| TableError::io(dir, e))?;
        }
        std::fs::write(path, self.to_csv()).map_err(|e| TableError::io(path, e))
    }
}

/// Append one row to the table at `destination`, rewriting the file.
///
/// Only a failed write is an error; a broken destination is recovered.
pub fn append(
    source_identifier: &str,
    resolved_name: &str,
    destination: &Path,
) -> Result<TableState, TableError> {
    let (mut table, state) = ResultTable::load_or_template(destination);
    table.push(ResultRow::new(source_identifier, resolved_name));
    table.save(destination)?;
    log::info!(
        "[TABLE] Appended '{}' → {} ({} data rows)",
        source_identifier,
        destination.display(),
        table.len()
    );
    Ok(state)
}
