//! Text extraction: per-page embedded text via pdfium, with OCR fallback.
//!
//! pdfium wraps a C++ library with thread-local state that is not safe to
//! call from async contexts, so the whole per-document extraction runs
//! under `tokio::task::spawn_blocking`. The Tesseract subprocess for the
//! OCR path is also blocking, which is fine on the same thread.
//!
//! A page takes the OCR path when its trimmed embedded text is shorter
//! than the configured threshold: the page is rasterised with a pixel cap
//! on the longest edge (page sizes vary wildly; the cap keeps memory
//! bounded regardless of physical size), saved as a PNG in a temp
//! directory, and handed to Tesseract.

use crate::config::PipelineConfig;
use crate::error::{ExamError, PipelineError};
use crate::output::PageText;
use crate::pipeline::ocr;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Extract text for every page of a PDF.
///
/// Pages that fail to load or rasterise yield empty text rather than
/// failing the document; only a file that cannot be opened at all is an
/// error.
///
/// # Returns
/// One [`PageText`] per page, 1-indexed, in page order.
pub async fn extract_document(
    pdf_path: &Path,
    config: &PipelineConfig,
) -> Result<Vec<PageText>, ExamError> {
    let path = pdf_path.to_path_buf();
    let threshold = config.ocr_text_threshold;
    let max_pixels = config.max_rendered_pixels;
    let language = config.ocr_language.clone();

    tokio::task::spawn_blocking(move || {
        extract_document_blocking(&path, threshold, max_pixels, &language)
    })
    .await
    .map_err(|e| ExamError::Unreadable {
        path: pdf_path.to_path_buf(),
        detail: format!("extraction task panicked: {}", e),
    })?
}

/// Blocking implementation of document extraction.
fn extract_document_blocking(
    pdf_path: &Path,
    threshold: usize,
    max_pixels: u32,
    language: &str,
) -> Result<Vec<PageText>, ExamError> {
    check_pdf_magic(pdf_path)?;

    let pdfium = Pdfium::default();

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| ExamError::Unreadable {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("{}: {} pages", pdf_path.display(), total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    // One temp dir for all rendered page images of this document.
    let mut ocr_workspace: Option<TempDir> = None;
    let mut tesseract_missing_warned = false;

    let mut results = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page_num = idx + 1;

        let page = match pages.get(idx as u16) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    "{} page {}: failed to load ({:?}), treating as blank",
                    pdf_path.display(),
                    page_num,
                    e
                );
                results.push(PageText {
                    page: page_num,
                    text: String::new(),
                    ocr: false,
                });
                continue;
            }
        };

        let native = page
            .text()
            .map(|t| t.all())
            .unwrap_or_default()
            .trim()
            .to_string();

        if native.chars().count() >= threshold {
            debug!(
                "{} page {}: {} chars of embedded text",
                pdf_path.display(),
                page_num,
                native.len()
            );
            results.push(PageText {
                page: page_num,
                text: native,
                ocr: false,
            });
            continue;
        }

        // Below threshold: OCR path.
        if !ocr::tesseract_available() {
            if !tesseract_missing_warned {
                warn!(
                    "{}: embedded text below threshold but tesseract is not installed; \
                     scanned pages will stay empty",
                    pdf_path.display()
                );
                tesseract_missing_warned = true;
            }
            results.push(PageText {
                page: page_num,
                text: native,
                ocr: false,
            });
            continue;
        }

        match ocr_page(
            &page,
            &render_config,
            &mut ocr_workspace,
            page_num,
            language,
        ) {
            Ok(text) if !text.trim().is_empty() => {
                debug!(
                    "{} page {}: OCR produced {} chars",
                    pdf_path.display(),
                    page_num,
                    text.len()
                );
                results.push(PageText {
                    page: page_num,
                    text: text.trim().to_string(),
                    ocr: true,
                });
            }
            Ok(_) => {
                debug!(
                    "{} page {}: OCR produced no text, keeping embedded text",
                    pdf_path.display(),
                    page_num
                );
                results.push(PageText {
                    page: page_num,
                    text: native,
                    ocr: true,
                });
            }
            Err(detail) => {
                warn!(
                    "{} page {}: OCR path failed ({}), keeping embedded text",
                    pdf_path.display(),
                    page_num,
                    detail
                );
                results.push(PageText {
                    page: page_num,
                    text: native,
                    ocr: false,
                });
            }
        }
    }

    Ok(results)
}

/// Rasterise one page and run Tesseract over the rendered PNG.
fn ocr_page(
    page: &PdfPage<'_>,
    render_config: &PdfRenderConfig,
    workspace: &mut Option<TempDir>,
    page_num: usize,
    language: &str,
) -> Result<String, String> {
    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| format!("rasterisation failed: {:?}", e))?;
    let image = bitmap.as_image();

    if workspace.is_none() {
        *workspace = Some(TempDir::new().map_err(|e| format!("temp dir: {}", e))?);
    }
    let dir = workspace.as_ref().unwrap();

    let image_path = dir.path().join(format!("page_{}.png", page_num));
    image
        .save(&image_path)
        .map_err(|e| format!("PNG encode failed: {}", e))?;

    ocr::ocr_image(&image_path, language).map_err(|e| e.to_string())
}

/// Verify the `%PDF` magic bytes before handing the file to pdfium, so a
/// mislabelled file gets a meaningful error rather than a pdfium crash.
fn check_pdf_magic(path: &Path) -> Result<(), ExamError> {
    let mut file = std::fs::File::open(path).map_err(|e| ExamError::Unreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(ExamError::NotAPdf {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Intermediate text file name for one page: `<stem>_page_<n>.txt`.
pub fn page_file_name(stem: &str, page: usize) -> String {
    format!("{}_page_{}.txt", stem, page)
}

/// Persist the extracted pages as one text file each.
///
/// Existing files are overwritten; re-running the batch is idempotent.
pub async fn write_page_texts(
    txt_dir: &Path,
    stem: &str,
    pages: &[PageText],
) -> Result<Vec<PathBuf>, PipelineError> {
    tokio::fs::create_dir_all(txt_dir)
        .await
        .map_err(|e| PipelineError::OutputWriteFailed {
            path: txt_dir.to_path_buf(),
            source: e,
        })?;

    let mut paths = Vec::with_capacity(pages.len());
    for page in pages {
        let path = txt_dir.join(page_file_name(stem, page.page));
        tokio::fs::write(&path, &page.text)
            .await
            .map_err(|e| PipelineError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        paths.push(path);
    }
    Ok(paths)
}
