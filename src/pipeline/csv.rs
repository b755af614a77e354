//! CSV writers: one file per exam, plus the combined dataset.
//!
//! The schema is a flat six-column CSV with a single header row per file.
//! Quoting follows RFC-4180 conventions: a field is quoted only when it
//! contains a comma, a quote, or a newline, and inner quotes are doubled.
//! Optional `marks`/`year` serialise as empty fields so downstream tools
//! see a consistent column count on every row.

use crate::error::PipelineError;
use crate::output::{ExamResult, QuestionRecord};
use std::path::Path;
use tracing::{debug, info};

/// Header row shared by per-exam and combined CSVs.
pub const CSV_HEADER: &str = "question,marks,paper_title,filename,page,year";

/// File name of the combined dataset.
pub const COMBINED_CSV_NAME: &str = "all_exams_combined.csv";

/// Quote a field when needed, doubling inner quotes.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render one record as a CSV row (no trailing newline).
pub fn format_record(record: &QuestionRecord) -> String {
    format!(
        "{},{},{},{},{},{}",
        escape_field(&record.question),
        record.marks.map(|m| m.to_string()).unwrap_or_default(),
        escape_field(&record.paper_title),
        escape_field(&record.filename),
        record.page,
        record.year.map(|y| y.to_string()).unwrap_or_default(),
    )
}

/// Write one exam's records to `path`, overwriting any previous run.
pub async fn write_exam_csv(
    path: &Path,
    records: &[QuestionRecord],
) -> Result<(), PipelineError> {
    let mut body = String::with_capacity(64 + records.len() * 96);
    body.push_str(CSV_HEADER);
    body.push('\n');
    for record in records {
        body.push_str(&format_record(record));
        body.push('\n');
    }

    tokio::fs::write(path, body)
        .await
        .map_err(|e| PipelineError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    debug!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

/// Write the combined CSV: all exams' rows in the given (discovery) order,
/// one header row total.
///
/// Returns the number of rows written.
pub async fn write_combined_csv(
    path: &Path,
    exams: &[ExamResult],
) -> Result<usize, PipelineError> {
    let mut body = String::from(CSV_HEADER);
    body.push('\n');

    let mut rows = 0usize;
    for exam in exams {
        for record in exam.records() {
            body.push_str(&format_record(record));
            body.push('\n');
            rows += 1;
        }
    }

    tokio::fs::write(path, body)
        .await
        .map_err(|e| PipelineError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!("Combined CSV: {} rows -> {}", rows, path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ExamStats, PageRows};

    fn record(question: &str, page: usize) -> QuestionRecord {
        QuestionRecord {
            question: question.into(),
            marks: Some(5),
            paper_title: "M.S. DEGREE EXAMINATION, March 1990".into(),
            filename: "surgery.pdf".into(),
            page,
            year: Some(1990),
        }
    }

    fn exam(stem: &str, questions: &[&str]) -> ExamResult {
        let mut page = PageRows::skipped(1);
        page.records = questions.iter().map(|q| record(q, 1)).collect();
        ExamResult {
            filename: format!("{stem}.pdf"),
            stem: stem.into(),
            pages: vec![page],
            csv_path: None,
            stats: ExamStats::default(),
            error: None,
        }
    }

    #[test]
    fn plain_fields_are_not_quoted() {
        let row = format_record(&QuestionRecord {
            question: "Pain pathway".into(),
            marks: Some(5),
            paper_title: "Physiology".into(),
            filename: "phys.pdf".into(),
            page: 2,
            year: Some(1991),
        });
        assert_eq!(row, "Pain pathway,5,Physiology,phys.pdf,2,1991");
    }

    #[test]
    fn commas_and_quotes_trigger_quoting() {
        let row = format_record(&record("Write notes on: shock, sepsis", 1));
        assert!(row.starts_with("\"Write notes on: shock, sepsis\","));

        let quoted = format_record(&QuestionRecord {
            question: "Define \"shock\"".into(),
            marks: None,
            paper_title: "Surgery".into(),
            filename: "s.pdf".into(),
            page: 1,
            year: None,
        });
        assert_eq!(quoted, "\"Define \"\"shock\"\"\",,Surgery,s.pdf,1,");
    }

    #[test]
    fn optional_fields_serialise_empty() {
        let row = format_record(&QuestionRecord {
            question: "Cardiac cycle".into(),
            marks: None,
            paper_title: "Physiology".into(),
            filename: "phys.pdf".into(),
            page: 2,
            year: None,
        });
        assert_eq!(row, "Cardiac cycle,,Physiology,phys.pdf,2,");
    }

    #[tokio::test]
    async fn exam_csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surgery.csv");
        let records = vec![record("Describe X", 1), record("Describe Y", 2)];

        write_exam_csv(&path, &records).await.unwrap();

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
    }

    #[tokio::test]
    async fn combined_row_count_equals_sum_of_exams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COMBINED_CSV_NAME);
        let exams = vec![
            exam("a", &["q1", "q2", "q3"]),
            exam("b", &[]),
            exam("c", &["q4", "q5"]),
        ];
        let per_exam_total: usize = exams.iter().map(|e| e.records().count()).sum();

        let rows = write_combined_csv(&path, &exams).await.unwrap();
        assert_eq!(rows, per_exam_total);

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        // one header + one line per row, no header duplication
        assert_eq!(body.lines().count(), 1 + per_exam_total);
        assert_eq!(body.matches(CSV_HEADER).count(), 1);
    }

    #[tokio::test]
    async fn combined_preserves_exam_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COMBINED_CSV_NAME);
        let exams = vec![exam("b", &["from b"]), exam("a", &["from a"])];

        write_combined_csv(&path, &exams).await.unwrap();

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        let b_pos = body.find("from b").unwrap();
        let a_pos = body.find("from a").unwrap();
        assert!(b_pos < a_pos, "rows must stay in the given exam order");
    }
}
