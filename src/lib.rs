//! # exam2csv
//!
//! Convert a folder of exam-paper PDFs into structured question CSVs.
//!
//! ## Why this crate?
//!
//! Historical exam papers arrive as a mix of born-digital PDFs and flat
//! scans. Embedded text is used when a page has it; otherwise the page is
//! rasterised and read with Tesseract. An LLM then turns each page's raw
//! text into `question,marks,paper_title,filename,page,year` rows, which
//! beats hand-written regexes on the wildly inconsistent numbering and
//! layout conventions these papers use.
//!
//! ## Pipeline Overview
//!
//! ```text
//! pdfs/
//!  │
//!  ├─ 1. Discover   list *.pdf in stable (sorted) order
//!  ├─ 2. Extract    embedded text per page via pdfium; OCR fallback
//!  │                (CPU-bound, spawn_blocking) → txt_outputs/*.txt
//!  ├─ 3. Structure  per-page LLM calls with retry/backoff
//!  ├─ 4. Parse      model reply → QuestionRecord rows
//!  └─ 5. Aggregate  per-exam CSVs + all_exams_combined.csv
//! ```
//!
//! Exams fan out over a bounded worker pool; pages within an exam run
//! sequentially so the first page's heading can feed later pages' prompts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exam2csv::{process_batch, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::default();
//!     let output = process_batch("pdfs", &config).await?;
//!     println!(
//!         "{} rows across {} exams → {:?}",
//!         output.stats.total_rows,
//!         output.stats.processed_exams,
//!         output.combined_csv,
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `exam2csv` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! exam2csv = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{ExamError, PageError, PipelineError};
pub use output::{
    BatchOutput, BatchStats, ExamResult, ExamStats, PageRows, PageText, QuestionRecord,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use run::{extract_batch, process_batch, DEFAULT_MODEL};
