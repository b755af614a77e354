//! LLM interaction: build the structuring request and call the provider.
//!
//! This module converts one extracted page into a chat-completion call
//! and returns parsed question records. It is intentionally thin — all
//! prompt content lives in [`crate::prompts`] and all reply parsing in
//! [`crate::pipeline::parse`], so either can change without touching the
//! retry or error-handling logic here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait
//! sequence is 500 ms → 1 s → 2 s. A call that exceeds
//! `api_timeout_secs` counts as a retryable failure.

use crate::config::PipelineConfig;
use crate::output::{PageRows, PageText};
use crate::pipeline::parse;
use crate::prompts::{structuring_prompt, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Structure a single extracted page into question records.
///
/// ## Message Layout
///
/// The request contains (in order):
/// 1. **System message** — the extractor persona (or user-supplied override)
/// 2. **User message** — the structuring prompt with the page text,
///    pinned filename/page metadata, and the exam heading from the first
///    page when structuring a later page
///
/// ## Return Value
///
/// Always returns a `PageRows` — never propagates the error upward so a
/// single bad page doesn't abort the exam. Callers check `result.error`
/// to decide whether the page contributed rows.
pub async fn structure_page(
    provider: &Arc<dyn LLMProvider>,
    page: &PageText,
    filename: &str,
    header: Option<&str>,
    config: &PipelineConfig,
) -> PageRows {
    let start = Instant::now();
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(structuring_prompt(
            &page.text, filename, page.page, header,
        )),
    ];

    let options = build_options(config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    let mut last_err: Option<String> = None;
    let mut timed_out = false;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "{} page {}: retry {}/{} after {}ms",
                filename, page.page, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_timeout, provider.chat(&messages, Some(&options))).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                let parsed = parse::parse_rows(&response.content);
                debug!(
                    "{} page {}: {} rows ({} dropped), {} in / {} out tokens, {:?}",
                    filename,
                    page.page,
                    parsed.records.len(),
                    parsed.dropped,
                    response.prompt_tokens,
                    response.completion_tokens,
                    duration
                );

                return PageRows {
                    page: page.page,
                    records: parsed.records,
                    dropped_rows: parsed.dropped,
                    input_tokens: response.prompt_tokens as u64,
                    output_tokens: response.completion_tokens as u64,
                    duration_ms: duration.as_millis() as u64,
                    retries: attempt as u8,
                    error: None,
                };
            }
            Ok(Err(e)) => {
                let err_msg = format!("{}", e);
                warn!(
                    "{} page {}: attempt {} failed — {}",
                    filename,
                    page.page,
                    attempt + 1,
                    err_msg
                );
                last_err = Some(err_msg);
                timed_out = false;
            }
            Err(_) => {
                warn!(
                    "{} page {}: attempt {} timed out after {}s",
                    filename,
                    page.page,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = Some(format!("timed out after {}s", config.api_timeout_secs));
                timed_out = true;
            }
        }
    }

    // All retries exhausted
    let duration = start.elapsed();
    let err_msg = last_err.unwrap_or_else(|| "Unknown error".to_string());
    let error = if timed_out {
        crate::error::PageError::Timeout {
            page: page.page,
            secs: config.api_timeout_secs,
        }
    } else {
        crate::error::PageError::LlmFailed {
            page: page.page,
            retries: config.max_retries as u8,
            detail: err_msg,
        }
    };

    PageRows {
        page: page.page,
        records: Vec::new(),
        dropped_rows: 0,
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: duration.as_millis() as u64,
        retries: config.max_retries as u8,
        error: Some(error),
    }
}

/// Build `CompletionOptions` from the pipeline config.
fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = PipelineConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(3000));
    }
}
