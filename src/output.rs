//! Output types: structured question records, per-exam results, and
//! batch-level statistics.
//!
//! Everything here derives `Serialize`/`Deserialize` so the CLI can emit a
//! machine-readable batch summary (`--json`) and callers can persist or
//! post-process results without extra glue.

use crate::error::{ExamError, PageError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One structured question extracted from an exam page.
///
/// This is the unit written as one CSV row. `marks` and `year` stay
/// optional: when the source page does not state them (or the model's
/// value does not parse as a number) the CSV field is left empty rather
/// than dropping the whole row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Question text with numbering stripped by the structurer.
    pub question: String,
    /// Marks awarded for the question, when stated or inferred.
    pub marks: Option<u32>,
    /// Exam heading used as the paper title for every row of the exam.
    pub paper_title: String,
    /// Source PDF file name, e.g. `surgery_1990.pdf`.
    pub filename: String,
    /// 1-indexed page the question appears on.
    pub page: usize,
    /// Exam year parsed from the paper heading, when present.
    pub year: Option<i32>,
}

/// Text extracted from a single PDF page.
///
/// Immutable once produced; persisted as `<stem>_page_<n>.txt` next to the
/// other pages of the same exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number.
    pub page: usize,
    /// Extracted (or OCR'd) text. May be empty for blank pages or when no
    /// OCR engine is available.
    pub text: String,
    /// True when the embedded text fell below the threshold and the page
    /// went through the OCR path.
    pub ocr: bool,
}

impl PageText {
    /// True when the page carries no usable text at all.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// The structurer's result for one page.
///
/// Always produced — a failed page carries an error and no records rather
/// than aborting the exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRows {
    /// 1-indexed page number.
    pub page: usize,
    /// Records parsed from the model response, in response order.
    pub records: Vec<QuestionRecord>,
    /// Response lines that could not be parsed into a record.
    pub dropped_rows: usize,
    /// Prompt tokens consumed by the call (0 on failure or skip).
    pub input_tokens: u64,
    /// Completion tokens consumed by the call (0 on failure or skip).
    pub output_tokens: u64,
    /// Wall-clock duration of the call including retries, in ms.
    pub duration_ms: u64,
    /// Retries performed before success or giving up.
    pub retries: u8,
    /// Set when the page was skipped after exhausting retries.
    pub error: Option<PageError>,
}

impl PageRows {
    /// A result for a page that was never sent to the model
    /// (blank text, extract-only mode).
    pub fn skipped(page: usize) -> Self {
        Self {
            page,
            records: Vec::new(),
            dropped_rows: 0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: 0,
            error: None,
        }
    }
}

/// Per-exam counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamStats {
    /// Pages in the source PDF.
    pub total_pages: usize,
    /// Pages whose text came from the OCR path.
    pub ocr_pages: usize,
    /// Pages skipped because extraction produced no usable text.
    pub blank_pages: usize,
    /// Pages skipped after the LLM call exhausted its retries.
    pub failed_pages: usize,
    /// Question rows written to the per-exam CSV.
    pub rows: usize,
    /// Response lines dropped as unparseable.
    pub dropped_rows: usize,
    /// Prompt tokens across all pages.
    pub input_tokens: u64,
    /// Completion tokens across all pages.
    pub output_tokens: u64,
    /// Wall-clock time for the whole exam, in ms.
    pub duration_ms: u64,
}

/// Everything produced for one input PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamResult {
    /// File name of the source PDF, e.g. `surgery_1990.pdf`.
    pub filename: String,
    /// File stem used for intermediate and output file names.
    pub stem: String,
    /// Per-page structurer results, in page order.
    pub pages: Vec<PageRows>,
    /// Path of the per-exam CSV, when one was written.
    pub csv_path: Option<PathBuf>,
    pub stats: ExamStats,
    /// Set when the whole PDF was skipped (unreadable file).
    pub error: Option<ExamError>,
}

impl ExamResult {
    /// A result for a PDF that could not be opened at all.
    pub fn skipped(filename: String, stem: String, error: ExamError) -> Self {
        Self {
            filename,
            stem,
            pages: Vec::new(),
            csv_path: None,
            stats: ExamStats::default(),
            error: Some(error),
        }
    }

    /// All records of this exam in page order.
    pub fn records(&self) -> impl Iterator<Item = &QuestionRecord> {
        self.pages.iter().flat_map(|p| p.records.iter())
    }
}

/// Batch-level counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// PDFs discovered in the input directory.
    pub total_exams: usize,
    /// Exams that produced at least a per-exam CSV.
    pub processed_exams: usize,
    /// Exams skipped because the PDF was unreadable.
    pub failed_exams: usize,
    /// Rows across all per-exam CSVs (equals the combined CSV row count).
    pub total_rows: usize,
    /// Response lines dropped as unparseable, across the batch.
    pub dropped_rows: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Wall-clock time for the whole batch, in ms.
    pub total_duration_ms: u64,
}

/// The complete result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    /// Per-exam results in discovery order.
    pub exams: Vec<ExamResult>,
    /// Path of the combined CSV. `None` in extract-only mode.
    pub combined_csv: Option<PathBuf>,
    pub stats: BatchStats,
}
