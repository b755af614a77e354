//! Batch entry points: discover, fan out, aggregate.
//!
//! [`process_batch`] is the primary entry point: it runs the full
//! extract-structure-aggregate pipeline over every PDF in a directory.
//! [`extract_batch`] runs only the extraction stage — no LLM provider or
//! API key needed — which is useful for checking OCR quality before
//! spending tokens.
//!
//! Exams are independent, so they fan out across a bounded worker pool
//! (`buffer_unordered`). Inside one exam, pages are structured
//! sequentially: the first page's heading feeds the prompts of the later
//! pages, and sequential calls per worker keep the number of in-flight
//! API requests equal to the worker count.

use crate::config::PipelineConfig;
use crate::error::{ExamError, PipelineError};
use crate::output::{BatchOutput, BatchStats, ExamResult, ExamStats, PageRows, QuestionRecord};
use crate::pipeline::{csv, discover, extract, structure};
use crate::prompts;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Run the full pipeline over every PDF in `input_dir`.
///
/// # Returns
/// `Ok(BatchOutput)` on completion, even when some exams or pages were
/// skipped (check `output.stats.failed_exams` and the per-exam results).
///
/// # Errors
/// Returns `Err(PipelineError)` only for setup failures:
/// - Input directory missing or unreadable
/// - No LLM provider configured (missing API key)
/// - Output directories not writable
pub async fn process_batch(
    input_dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchOutput, PipelineError> {
    let total_start = Instant::now();
    let input_dir = input_dir.as_ref();
    info!("Starting batch: {}", input_dir.display());

    // ── Step 1: Discover input PDFs ──────────────────────────────────────
    let pdfs = discover::discover_pdfs(input_dir)?;
    info!("Found {} exam PDFs", pdfs.len());

    // ── Step 2: Resolve the provider (fails fast on missing credential) ──
    let provider = resolve_provider(config)?;

    // ── Step 3: Prepare output directories ───────────────────────────────
    prepare_dir(&config.txt_dir).await?;
    prepare_dir(&config.csv_dir).await?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(pdfs.len());
    }
    if pdfs.is_empty() {
        warn!("No PDF files in {}", input_dir.display());
    }

    // ── Step 4: Fan exams out across the worker pool ─────────────────────
    let total = pdfs.len();
    let mut indexed: Vec<(usize, ExamResult)> = stream::iter(pdfs.iter().enumerate().map(
        |(idx, path)| {
            let provider = Arc::clone(&provider);
            let config = config.clone();
            let path = path.clone();
            async move {
                let result = process_exam(&path, &provider, &config, total).await;
                (idx, result)
            }
        },
    ))
    .buffer_unordered(config.workers)
    .collect()
    .await;

    // Workers finish out of order; the combined CSV follows discovery order.
    indexed.sort_by_key(|(idx, _)| *idx);
    let exams: Vec<ExamResult> = indexed.into_iter().map(|(_, result)| result).collect();

    let processed = exams.iter().filter(|e| e.error.is_none()).count();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, processed);
    }

    // ── Step 5: Single-writer combined CSV ───────────────────────────────
    let combined_path = config.csv_dir.join(csv::COMBINED_CSV_NAME);
    let total_rows = csv::write_combined_csv(&combined_path, &exams).await?;

    let stats = batch_stats(&exams, total_rows, total_start);
    info!(
        "Batch complete: {}/{} exams, {} rows, {}ms",
        stats.processed_exams, stats.total_exams, stats.total_rows, stats.total_duration_ms
    );

    Ok(BatchOutput {
        exams,
        combined_csv: Some(combined_path),
        stats,
    })
}

/// Run only the extraction stage over every PDF in `input_dir`.
///
/// Writes the per-page text files but never touches the LLM or the CSV
/// directory, so no API credential is required.
pub async fn extract_batch(
    input_dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchOutput, PipelineError> {
    let total_start = Instant::now();
    let input_dir = input_dir.as_ref();
    info!("Starting extract-only batch: {}", input_dir.display());

    let pdfs = discover::discover_pdfs(input_dir)?;
    info!("Found {} exam PDFs", pdfs.len());

    prepare_dir(&config.txt_dir).await?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(pdfs.len());
    }

    let total = pdfs.len();
    let mut indexed: Vec<(usize, ExamResult)> = stream::iter(pdfs.iter().enumerate().map(
        |(idx, path)| {
            let config = config.clone();
            let path = path.clone();
            async move {
                let result = extract_exam(&path, &config, total).await;
                (idx, result)
            }
        },
    ))
    .buffer_unordered(config.workers)
    .collect()
    .await;

    indexed.sort_by_key(|(idx, _)| *idx);
    let exams: Vec<ExamResult> = indexed.into_iter().map(|(_, result)| result).collect();

    let processed = exams.iter().filter(|e| e.error.is_none()).count();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, processed);
    }

    let stats = batch_stats(&exams, 0, total_start);
    info!(
        "Extraction complete: {}/{} exams, {}ms",
        stats.processed_exams, stats.total_exams, stats.total_duration_ms
    );

    Ok(BatchOutput {
        exams,
        combined_csv: None,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Full pipeline for one exam: extract, persist text, structure pages
/// sequentially, write the per-exam CSV.
async fn process_exam(
    pdf_path: &Path,
    provider: &Arc<dyn LLMProvider>,
    config: &PipelineConfig,
    total_exams: usize,
) -> ExamResult {
    let start = Instant::now();
    let filename = discover::file_name(pdf_path);
    let stem = discover::file_stem(pdf_path);

    if let Some(ref cb) = config.progress_callback {
        cb.on_exam_start(filename.clone(), total_exams);
    }

    let pages = match extract::extract_document(pdf_path, config).await {
        Ok(pages) => pages,
        Err(e) => return skip_exam(filename, stem, e, config, total_exams),
    };

    if let Err(e) = extract::write_page_texts(&config.txt_dir, &stem, &pages).await {
        let err = ExamError::ArtifactWriteFailed {
            filename: filename.clone(),
            detail: e.to_string(),
        };
        return skip_exam(filename, stem, err, config, total_exams);
    }

    // Pages after the first don't repeat the exam heading; carry it over
    // so their rows still get the paper title and year.
    let header = pages
        .first()
        .and_then(|p| prompts::header_excerpt(&p.text, 6));

    let mut page_rows: Vec<PageRows> = Vec::with_capacity(pages.len());
    for page in &pages {
        if page.is_blank() {
            debug!("{} page {}: no text, skipping structurer", filename, page.page);
            page_rows.push(PageRows::skipped(page.page));
            continue;
        }
        let hint = if page.page == 1 { None } else { header.as_deref() };
        let rows = structure::structure_page(provider, page, &filename, hint, config).await;
        page_rows.push(rows);
    }

    let records: Vec<QuestionRecord> = page_rows
        .iter()
        .flat_map(|p| p.records.iter().cloned())
        .collect();

    let csv_path = config.csv_dir.join(format!("{}.csv", stem));
    if let Err(e) = csv::write_exam_csv(&csv_path, &records).await {
        let err = ExamError::ArtifactWriteFailed {
            filename: filename.clone(),
            detail: e.to_string(),
        };
        return skip_exam(filename, stem, err, config, total_exams);
    }

    let stats = exam_stats(&pages, &page_rows, records.len(), start);
    info!(
        "{}: {} rows from {} pages ({} OCR, {} blank, {} failed)",
        filename, stats.rows, stats.total_pages, stats.ocr_pages, stats.blank_pages,
        stats.failed_pages
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_exam_complete(filename.clone(), total_exams, records.len());
    }

    ExamResult {
        filename,
        stem,
        pages: page_rows,
        csv_path: Some(csv_path),
        stats,
        error: None,
    }
}

/// Extraction-only variant of [`process_exam`].
async fn extract_exam(pdf_path: &Path, config: &PipelineConfig, total_exams: usize) -> ExamResult {
    let start = Instant::now();
    let filename = discover::file_name(pdf_path);
    let stem = discover::file_stem(pdf_path);

    if let Some(ref cb) = config.progress_callback {
        cb.on_exam_start(filename.clone(), total_exams);
    }

    let pages = match extract::extract_document(pdf_path, config).await {
        Ok(pages) => pages,
        Err(e) => return skip_exam(filename, stem, e, config, total_exams),
    };

    if let Err(e) = extract::write_page_texts(&config.txt_dir, &stem, &pages).await {
        let err = ExamError::ArtifactWriteFailed {
            filename: filename.clone(),
            detail: e.to_string(),
        };
        return skip_exam(filename, stem, err, config, total_exams);
    }

    let page_rows: Vec<PageRows> = pages.iter().map(|p| PageRows::skipped(p.page)).collect();
    let stats = exam_stats(&pages, &page_rows, 0, start);

    if let Some(ref cb) = config.progress_callback {
        cb.on_exam_complete(filename.clone(), total_exams, 0);
    }

    ExamResult {
        filename,
        stem,
        pages: page_rows,
        csv_path: None,
        stats,
        error: None,
    }
}

/// Log, notify, and produce the skipped-exam result.
fn skip_exam(
    filename: String,
    stem: String,
    error: ExamError,
    config: &PipelineConfig,
    total_exams: usize,
) -> ExamResult {
    warn!("Skipping {}: {}", filename, error);
    if let Some(ref cb) = config.progress_callback {
        cb.on_exam_error(filename.clone(), total_exams, error.to_string());
    }
    ExamResult::skipped(filename, stem, error)
}

fn exam_stats(
    pages: &[crate::output::PageText],
    page_rows: &[PageRows],
    rows: usize,
    start: Instant,
) -> ExamStats {
    ExamStats {
        total_pages: pages.len(),
        ocr_pages: pages.iter().filter(|p| p.ocr).count(),
        blank_pages: pages.iter().filter(|p| p.is_blank()).count(),
        failed_pages: page_rows.iter().filter(|p| p.error.is_some()).count(),
        rows,
        dropped_rows: page_rows.iter().map(|p| p.dropped_rows).sum(),
        input_tokens: page_rows.iter().map(|p| p.input_tokens).sum(),
        output_tokens: page_rows.iter().map(|p| p.output_tokens).sum(),
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

fn batch_stats(exams: &[ExamResult], total_rows: usize, start: Instant) -> BatchStats {
    BatchStats {
        total_exams: exams.len(),
        processed_exams: exams.iter().filter(|e| e.error.is_none()).count(),
        failed_exams: exams.iter().filter(|e| e.error.is_some()).count(),
        total_rows,
        dropped_rows: exams.iter().map(|e| e.stats.dropped_rows).sum(),
        total_input_tokens: exams.iter().map(|e| e.stats.input_tokens).sum(),
        total_output_tokens: exams.iter().map(|e| e.stats.output_tokens).sum(),
        total_duration_ms: start.elapsed().as_millis() as u64,
    }
}

async fn prepare_dir(dir: &Path) -> Result<(), PipelineError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })
}

/// Instantiate a named provider with the given model.
fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. Pre-built provider (`config.provider`) — used as-is; useful in tests
///    or when the caller wraps the provider with custom middleware.
/// 2. Named provider + model (`config.provider_name`) — instantiated via
///    `ProviderFactory`, which reads the matching API key from the
///    environment.
/// 3. Environment pair (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`) —
///    honoured before auto-detection so an execution-environment choice
///    wins even when multiple API keys are present.
/// 4. Full auto-detection (`ProviderFactory::from_env`) — with an explicit
///    preference for OpenAI when `OPENAI_API_KEY` is set.
pub(crate) fn resolve_provider(
    config: &PipelineConfig,
) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
