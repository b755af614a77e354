//! Tesseract OCR: text recovery for pages without usable embedded text.
//!
//! Uses the system `tesseract` binary via subprocess. The binary is the
//! most widely available OCR option and needs no model downloads; when it
//! is not installed the extractor degrades to empty text for scanned
//! pages instead of failing the batch.

use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Errors from the OCR subprocess.
#[derive(Debug, Error)]
pub enum OcrError {
    /// `tesseract` is not on PATH.
    #[error("tesseract not found (install tesseract-ocr)")]
    NotInstalled,

    /// The binary ran but exited non-zero.
    #[error("tesseract failed: {0}")]
    EngineFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// True when the `tesseract` binary is on PATH.
pub fn tesseract_available() -> bool {
    which::which("tesseract").is_ok()
}

/// Run Tesseract on an image file and return the recognised text.
///
/// `language` is passed through as `-l` (e.g. `"eng"`, `"eng+fra"`).
pub fn ocr_image(image_path: &Path, language: &str) -> Result<String, OcrError> {
    let output = Command::new("tesseract")
        .arg(image_path)
        .arg("stdout")
        .args(["-l", language])
        .output();

    match output {
        Ok(output) => {
            if output.status.success() {
                let text = String::from_utf8_lossy(&output.stdout).to_string();
                debug!(
                    "OCR on {} produced {} chars",
                    image_path.display(),
                    text.len()
                );
                Ok(text)
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(OcrError::EngineFailed(stderr.trim().to_string()))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::NotInstalled),
        Err(e) => Err(OcrError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_is_an_error() {
        if !tesseract_available() {
            // Without the binary the NotFound branch is what we can check.
            let err = ocr_image(Path::new("/no/such/image.png"), "eng").unwrap_err();
            assert!(matches!(err, OcrError::NotInstalled));
            return;
        }
        let err = ocr_image(Path::new("/no/such/image.png"), "eng").unwrap_err();
        assert!(matches!(err, OcrError::EngineFailed(_)));
    }

    #[test]
    fn not_installed_display() {
        let msg = OcrError::NotInstalled.to_string();
        assert!(msg.contains("tesseract-ocr"));
    }
}
