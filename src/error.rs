//! Error types for the exam2csv library.
//!
//! Three distinct error types reflect three distinct failure scopes:
//!
//! * [`PipelineError`] — **Fatal**: the batch cannot proceed at all
//!   (missing input directory, no LLM provider configured, output
//!   directory not writable). Returned as `Err(PipelineError)` from the
//!   top-level `run` functions.
//!
//! * [`ExamError`] — **Non-fatal, per exam**: one PDF could not be opened
//!   or read. Stored inside [`crate::output::ExamResult`] so the rest of
//!   the batch continues.
//!
//! * [`PageError`] — **Non-fatal, per page**: the LLM call timed out or
//!   was exhausted after retries. Stored inside
//!   [`crate::output::PageRows`]; the rest of the exam continues.
//!
//! OCR problems are deliberately not an error type: a page whose OCR
//! fails keeps its (possibly empty) embedded text and the gap shows up
//! as missing rows, which matches how the batch is inspected.
//!
//! The separation lets callers decide their own tolerance: abort on the
//! first skipped exam, log and continue, or collect all errors for a
//! post-run report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the exam2csv library.
///
/// Exam-level failures use [`ExamError`] and page-level failures use
/// [`PageError`]; both are stored in the batch output rather than
/// propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory was not found at the given path.
    #[error("Input directory not found: '{path}'\nCheck the path exists and is readable.")]
    InputDirNotFound { path: PathBuf },

    /// The input path exists but is not a directory.
    #[error("Input path is not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    /// Reading the input directory failed.
    #[error("Failed to read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file or directory.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single exam PDF.
///
/// Stored in [`crate::output::ExamResult`] when a whole file is skipped.
/// The overall batch continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ExamError {
    /// The PDF could not be opened or parsed by pdfium.
    #[error("Failed to open '{path}': {detail}")]
    Unreadable { path: PathBuf, detail: String },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'")]
    NotAPdf { path: PathBuf },

    /// Page text files or the per-exam CSV could not be written.
    #[error("Failed to write artifacts for '{filename}': {detail}")]
    ArtifactWriteFailed { filename: String, detail: String },
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageRows`] when a page fails.
/// The overall exam continues unless every page fails.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// LLM call failed after retries.
    #[error("Page {page}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        page: usize,
        retries: u8,
        detail: String,
    },

    /// LLM call timed out.
    #[error("Page {page}: LLM call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}
