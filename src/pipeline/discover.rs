//! Input discovery: enumerate the PDFs of an input directory.
//!
//! Discovery order is the order of the combined CSV, so it must be stable
//! across runs: entries are sorted by file name rather than left in
//! whatever order the OS returns them.

use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// List all `*.pdf` files (case-insensitive extension) in `dir`, sorted by
/// file name.
///
/// Subdirectories are not descended into; the batch is a flat folder of
/// exam papers. An empty result is not an error — the caller decides
/// whether an empty batch is worth reporting.
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    if !dir.exists() {
        return Err(PipelineError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(PipelineError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::InputDirUnreadable {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_pdf_extension(path))
        .collect();

    pdfs.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

    debug!("Discovered {} PDFs in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

/// True when the path ends in `.pdf`, ignoring case.
fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// File stem used for intermediate text files and the per-exam CSV.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "exam".to_string())
}

/// File name of the source PDF as recorded in the `filename` CSV column.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "exam.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovers_pdfs_sorted_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_exam.PDF", "a_exam.pdf", "notes.txt", "c_exam.pdf"] {
            fs::write(dir.path().join(name), b"%PDF-1.4").unwrap();
        }
        fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let pdfs = discover_pdfs(dir.path()).unwrap();
        let names: Vec<String> = pdfs.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a_exam.pdf", "b_exam.PDF", "c_exam.pdf"]);
    }

    #[test]
    fn missing_dir_is_fatal() {
        let err = discover_pdfs(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, PipelineError::InputDirNotFound { .. }));
    }

    #[test]
    fn file_as_input_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("exam.pdf");
        fs::write(&file, b"%PDF-1.4").unwrap();
        let err = discover_pdfs(&file).unwrap_err();
        assert!(matches!(err, PipelineError::NotADirectory { .. }));
    }

    #[test]
    fn empty_dir_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_pdfs(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn stem_and_name() {
        let p = Path::new("/pdfs/surgery_1990.pdf");
        assert_eq!(file_stem(p), "surgery_1990");
        assert_eq!(file_name(p), "surgery_1990.pdf");
    }
}
