//! Attendance sheet export: a numbered name list with one date column
//! marked present for everyone.

use super::{write_records, TableError};
use std::path::Path;

pub const PRESENT_MARK: &str = "✓";

/// Write a new attendance sheet. Never overwrites an existing file.
pub fn create_attendance_sheet(
    path: &Path,
    names: &[String],
    date: &str,
) -> Result<(), TableError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !file_name.to_lowercase().ends_with(".csv") || file_name.len() <= ".csv".len() {
        return Err(TableError::InvalidFileName(file_name));
    }
    let names: Vec<&str> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return Err(TableError::EmptyNames);
    }
    let date = date.trim();
    if date.is_empty() {
        return Err(TableError::EmptyDate);
    }
    if path.exists() {
        return Err(TableError::AlreadyExists(path.to_path_buf()));
    }

    let header = vec!["No.".to_string(), "Name".to_string(), date.to_string()];
    let rows = names.iter().enumerate().map(|(i, name)| {
        vec![(i + 1).to_string(), name.to_string(), PRESENT_MARK.to_string()]
    });
    let body = write_records(std::iter::once(header).chain(rows));

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| TableError::io(dir, e))?;
    }
    std::fs::write(path, body).map_err(|e| TableError::io(path, e))?;
    log::info!(
        "[TABLE] Attendance for {} with {} names → {}",
        date,
        names.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::parse_records;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn writes_numbered_rows_marked_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asistencia.csv");
        create_attendance_sheet(&path, &names(&["Jose Rivera", " ", "Ana Silva"]), "2024-03-12")
            .unwrap();

        let records = parse_records(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(records[0], vec!["No.", "Name", "2024-03-12"]);
        assert_eq!(records[1], vec!["1", "Jose Rivera", "✓"]);
        assert_eq!(records[2], vec!["2", "Ana Silva", "✓"]);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "keep me").unwrap();
        let err = create_attendance_sheet(&path, &names(&["Ana"]), "lunes").unwrap_err();
        assert!(matches!(err, TableError::AlreadyExists(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn validates_inputs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            create_attendance_sheet(&dir.path().join("a.xlsx"), &names(&["Ana"]), "d"),
            Err(TableError::InvalidFileName(_))
        ));
        assert!(matches!(
            create_attendance_sheet(&dir.path().join(".csv"), &names(&["Ana"]), "d"),
            Err(TableError::InvalidFileName(_))
        ));
        assert!(matches!(
            create_attendance_sheet(&dir.path().join("a.csv"), &names(&["", "  "]), "d"),
            Err(TableError::EmptyNames)
        ));
        assert!(matches!(
            create_attendance_sheet(&dir.path().join("a.csv"), &names(&["Ana"]), "  "),
            Err(TableError::EmptyDate)
        ));
    }
}
