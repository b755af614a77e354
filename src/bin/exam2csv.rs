//! CLI binary for exam2csv.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use exam2csv::{
    extract_batch, process_batch, BatchProgressCallback, PipelineConfig, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-exam
/// log lines using [indicatif]. Works correctly when exams complete
/// out-of-order (concurrent workers).
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Count of exams that were skipped.
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically by
    /// `on_batch_start` (called after discovery).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input directory…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} exams  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_exams: usize) {
        self.activate_bar(total_exams);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_exams} exam papers…"))
        ));
    }

    fn on_exam_start(&self, filename: String, _total: usize) {
        self.bar.set_message(filename);
    }

    fn on_exam_complete(&self, filename: String, _total: usize, rows: usize) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            filename,
            dim(&format!("{rows:>4} questions")),
        ));
        self.bar.inc(1);
    }

    fn on_exam_error(&self, filename: String, _total: usize, error: String) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error
        };

        self.bar.println(format!(
            "  {} {:<40}  {}",
            red("✗"),
            filename,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_exams: usize, processed: usize) {
        let failed = total_exams.saturating_sub(processed);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} exams processed",
                green("✔"),
                bold(&processed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} exams processed  ({} skipped)",
                if failed == total_exams {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&processed.to_string()),
                total_exams,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full pipeline: ./pdfs → txt_outputs/ + csv_outputs/
  exam2csv pdfs

  # Limit concurrent exams (one LLM call in flight per worker)
  exam2csv --workers 2 pdfs

  # Use a specific model
  exam2csv --model gpt-4.1-mini --provider openai pdfs

  # Extraction only — no API key needed, check OCR quality first
  exam2csv --extract-only pdfs

  # Machine-readable batch summary
  exam2csv --json pdfs > batch.json

OUTPUT LAYOUT:
  txt_outputs/<exam>_page_<n>.txt     one text file per page
  csv_outputs/<exam>.csv              per-exam question rows
  csv_outputs/all_exams_combined.csv  all exams, one header row

  CSV schema: question,marks,paper_title,filename,page,year

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium — skips auto-download

SETUP:
  1. Install Tesseract (for scanned papers):  apt install tesseract-ocr
  2. Set API key:                             export OPENAI_API_KEY=sk-...
  3. Run:                                     exam2csv pdfs

  PDFium (~30 MB) is downloaded automatically on first run and cached.
  No manual library setup is required.
"#;

/// Convert exam-paper PDFs into structured question CSVs.
#[derive(Parser, Debug)]
#[command(
    name = "exam2csv",
    version,
    about = "Convert exam-paper PDFs into structured question CSVs",
    long_about = "Convert a folder of exam-paper PDFs into structured CSVs. Embedded text is \
extracted per page (Tesseract OCR for scanned pages), an LLM structures each page into \
question rows, and the rows are aggregated into per-exam CSVs plus one combined dataset.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the exam PDFs.
    #[arg(env = "EXAM2CSV_INPUT_DIR", default_value = "pdfs")]
    input_dir: PathBuf,

    /// Directory for intermediate per-page text files.
    #[arg(long, env = "EXAM2CSV_TXT_DIR", default_value = "txt_outputs")]
    txt_dir: PathBuf,

    /// Directory for per-exam and combined CSVs.
    #[arg(long, env = "EXAM2CSV_CSV_DIR", default_value = "csv_outputs")]
    csv_dir: PathBuf,

    /// Number of exams processed concurrently.
    #[arg(short, long, env = "EXAM2CSV_WORKERS", default_value_t = 4)]
    workers: usize,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini).
    #[arg(long, env = "EXAM2CSV_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama.
    #[arg(
        long,
        env = "EXAM2CSV_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, ollama, or any OpenAI-compatible endpoint."
    )]
    provider: Option<String>,

    /// Minimum embedded-text length (chars) before a page goes to OCR.
    #[arg(long, env = "EXAM2CSV_OCR_THRESHOLD", default_value_t = 32)]
    ocr_threshold: usize,

    /// Tesseract language code (-l), e.g. eng or eng+fra.
    #[arg(long, env = "EXAM2CSV_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Maximum rendered page dimension in pixels for the OCR path.
    #[arg(long, env = "EXAM2CSV_MAX_PIXELS", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(100..=10000))]
    max_pixels: u32,

    /// Max LLM output tokens per page.
    #[arg(long, env = "EXAM2CSV_MAX_TOKENS", default_value_t = 3000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "EXAM2CSV_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on LLM failure.
    #[arg(long, env = "EXAM2CSV_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Initial retry backoff in milliseconds (doubles per attempt).
    #[arg(long, env = "EXAM2CSV_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "EXAM2CSV_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "EXAM2CSV_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Run text extraction only (no LLM, no API key needed).
    #[arg(long, env = "EXAM2CSV_EXTRACT_ONLY")]
    extract_only: bool,

    /// Output the batch summary as JSON instead of the text report.
    #[arg(long, env = "EXAM2CSV_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "EXAM2CSV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EXAM2CSV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EXAM2CSV_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure the PDFium engine is available ────────────────────────────
    // On the very first run the library (~30 MB) is downloaded and cached;
    // subsequent startups skip this block entirely (path check only).
    if !pdfium_auto::is_pdfium_cached() {
        if !cli.quiet {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            dl_bar.set_prefix("PDF engine");
            dl_bar.set_message("Connecting…");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            // block_in_place keeps the reference lifetime valid (no 'static
            // requirement) while still offloading the blocking download from
            // the async executor's hot path.
            tokio::task::block_in_place(|| {
                pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                            bar.set_prefix("PDF engine");
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to download PDFium engine")?;

            dl_bar.finish_with_message("ready ✓");
        } else {
            // Quiet mode — download silently; errors still propagate.
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
        }
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run the pipeline ─────────────────────────────────────────────────
    let output = if cli.extract_only {
        extract_batch(&cli.input_dir, &config)
            .await
            .context("Extraction failed")?
    } else {
        process_batch(&cli.input_dir, &config)
            .await
            .context("Batch failed")?
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        let stats = &output.stats;
        if let Some(ref combined) = output.combined_csv {
            eprintln!(
                "{}  {} questions from {}/{} exams  {}ms  →  {}",
                if stats.failed_exams == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                bold(&stats.total_rows.to_string()),
                stats.processed_exams,
                stats.total_exams,
                stats.total_duration_ms,
                bold(&combined.display().to_string()),
            );
            if stats.dropped_rows > 0 {
                eprintln!(
                    "   {} unparseable rows dropped",
                    red(&stats.dropped_rows.to_string())
                );
            }
            eprintln!(
                "   {} tokens in  /  {} tokens out",
                dim(&stats.total_input_tokens.to_string()),
                dim(&stats.total_output_tokens.to_string()),
            );
        } else {
            eprintln!(
                "{}  extracted {}/{} exams in {}ms  →  {}",
                if stats.failed_exams == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                stats.processed_exams,
                stats.total_exams,
                stats.total_duration_ms,
                bold(&config.txt_dir.display().to_string()),
            );
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = PipelineConfig::builder()
        .workers(cli.workers)
        .txt_dir(&cli.txt_dir)
        .csv_dir(&cli.csv_dir)
        .ocr_text_threshold(cli.ocr_threshold)
        .ocr_language(cli.ocr_lang.as_str())
        .max_rendered_pixels(cli.max_pixels)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .api_timeout_secs(cli.api_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;

    // Option-valued fields are applied directly rather than through the chain
    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    config.system_prompt = system_prompt;

    Ok(config)
}
