//! Configuration types for the exam-to-CSV pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across workers and to diff two runs to
//! understand why their outputs differ.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a batch run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use exam2csv::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .workers(4)
///     .model("gpt-4.1-nano")
///     .ocr_text_threshold(32)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Number of exams processed concurrently. Default: 4.
    ///
    /// Each worker makes sequential LLM calls for its exam, so `workers`
    /// is also the upper bound on in-flight API requests. Lower it when
    /// the provider returns 429s; raise it when the API and network have
    /// headroom.
    pub workers: usize,

    /// Minimum embedded-text length (in chars, after trimming) for a page
    /// to skip OCR. Default: 32.
    ///
    /// Scanned pages typically yield zero embedded characters but some
    /// carry a few stray glyphs from stamps or watermarks; the threshold
    /// keeps those on the OCR path.
    pub ocr_text_threshold: usize,

    /// Tesseract language code passed as `-l`. Default: `"eng"`.
    pub ocr_language: String,

    /// Maximum rendered page dimension (width or height) in pixels when
    /// rasterising for OCR. Default: 2000.
    ///
    /// Caps either dimension regardless of the physical page size so
    /// pdfium never allocates more than roughly `max_rendered_pixels²`
    /// bytes of pixels for an oversized page.
    pub max_rendered_pixels: u32,

    /// Directory for intermediate per-page text files. Default: `txt_outputs`.
    pub txt_dir: PathBuf,

    /// Directory for per-exam and combined CSVs. Default: `csv_outputs`.
    pub csv_dir: PathBuf,

    /// LLM model identifier, e.g. "gpt-4.1-nano".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the completion. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to what is on the page,
    /// which is exactly what a data extractor wants.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per page. Default: 3000.
    ///
    /// A dense exam page rarely exceeds 60 question rows; setting this too
    /// low truncates the response mid-row and the tail rows are lost.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient LLM failure. Default: 3.
    ///
    /// Most 429/5xx/timeout errors are transient. Permanent errors (bad
    /// API key) still burn the retries, but the page is then skipped
    /// rather than aborting the batch.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-LLM-call timeout in seconds. Default: 60.
    ///
    /// An expired call counts as a retryable failure.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Progress callback fired per exam. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            ocr_text_threshold: 32,
            ocr_language: "eng".to_string(),
            max_rendered_pixels: 2000,
            txt_dir: PathBuf::from("txt_outputs"),
            csv_dir: PathBuf::from("csv_outputs"),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 3000,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("workers", &self.workers)
            .field("ocr_text_threshold", &self.ocr_text_threshold)
            .field("ocr_language", &self.ocr_language)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("txt_dir", &self.txt_dir)
            .field("csv_dir", &self.csv_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn ocr_text_threshold(mut self, chars: usize) -> Self {
        self.config.ocr_text_threshold = chars;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn txt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.txt_dir = dir.into();
        self
    }

    pub fn csv_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.csv_dir = dir.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(PipelineError::InvalidConfig("workers must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.txt_dir == c.csv_dir {
            return Err(PipelineError::InvalidConfig(
                "txt_dir and csv_dir must differ".into(),
            ));
        }
        Ok(self.config)
    }
}
