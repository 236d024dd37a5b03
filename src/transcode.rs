//! PDF → DOCX transcoder backed by pdfium.
//!
//! The input is opened with pdfium, the text layer of every page is
//! extracted in reading order, and each text line becomes one paragraph of
//! the output document. Pages are separated by hard page breaks so page
//! boundaries survive the round trip.
//!
//! Like the rest of the converters this runs on the blocking pool: pdfium
//! keeps thread-local state and must never be driven from an async worker.
//!
//! ## Library binding
//!
//! `PDFIUM_LIB_PATH`, when set, names the pdfium shared library to load.
//! Otherwise the platform library is looked up on the default search path.
//! A bind failure is reported as a transcode failure of the request rather
//! than a startup error, so the document-to-PDF endpoint keeps working on
//! hosts without pdfium.

use std::path::{Path, PathBuf};
use std::time::Instant;

use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::docx::DocxBuilder;
use crate::engine::Converter;
use crate::error::ConvertError;

/// Environment variable naming an explicit pdfium library.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// pdfium-backed PDF → DOCX adapter.
#[derive(Debug, Clone, Default)]
pub struct PdfTranscoder {
    library: Option<PathBuf>,
}

impl PdfTranscoder {
    /// Use `PDFIUM_LIB_PATH` if set, else the system library.
    pub fn from_env() -> Self {
        Self {
            library: std::env::var_os(PDFIUM_LIB_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Load pdfium from an explicit library path.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, ConvertError> {
        let bindings = match self.library {
            Some(ref path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ConvertError::TranscodeFailure {
            detail: format!(
                "cannot load the pdfium library ({}): {:?}",
                self.library
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "system search path".to_string()),
                e
            ),
        })?;
        Ok(Pdfium::new(bindings))
    }
}

impl Converter for PdfTranscoder {
    fn name(&self) -> &str {
        "pdf-transcoder"
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let start = Instant::now();
        let pdfium = self.bind()?;

        let document =
            pdfium
                .load_pdf_from_file(input, None)
                .map_err(|e| ConvertError::TranscodeFailure {
                    detail: format!("cannot open PDF: {:?}", e),
                })?;

        let mut docx = DocxBuilder::new();
        let pages = document.pages();
        let total = pages.len() as usize;

        for (idx, page) in pages.iter().enumerate() {
            if idx > 0 {
                docx.page_break();
            }
            let text = page.text().map_err(|e| ConvertError::TranscodeFailure {
                detail: format!("cannot read text of page {}: {:?}", idx + 1, e),
            })?;
            let content = text.all();
            for line in content.lines() {
                docx.paragraph(line.trim_end());
            }
            debug!("Page {}/{}: {} chars", idx + 1, total, content.len());
        }

        docx.save(output).map_err(|e| ConvertError::TranscodeFailure {
            detail: format!("cannot write document: {e}"),
        })?;

        info!(
            "Transcoded {} ({} pages, {} paragraphs) in {}ms",
            input.display(),
            total,
            docx.paragraph_count(),
            start.elapsed().as_millis()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_transcode_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, b"%PDF-1.4\n").unwrap();

        let transcoder = PdfTranscoder::with_library(dir.path().join("libpdfium-missing.so"));
        let err = transcoder
            .convert(&input, &dir.path().join("out.docx"))
            .unwrap_err();
        match err {
            ConvertError::TranscodeFailure { detail } => {
                assert!(detail.contains("pdfium"), "{detail}")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!dir.path().join("out.docx").exists());
    }

    #[test]
    fn default_uses_system_library() {
        assert!(PdfTranscoder::default().library.is_none());
        assert_eq!(PdfTranscoder::default().name(), "pdf-transcoder");
    }
}
