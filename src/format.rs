//! Conversion directions and the extension dispatch that goes with them.
//!
//! The gateway knows nothing about document formats beyond file extensions:
//! each [`Direction`] owns its accepted source extensions, its target
//! extension and the media type of the artifact it produces.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source extensions accepted by [`Direction::ToPdf`].
pub const OFFICE_EXTENSIONS: &[&str] = &[
    "doc", "docx", "odt", "rtf", "xls", "xlsx", "ods", "ppt", "pptx", "odp",
];

/// Source extensions accepted by [`Direction::ToDocument`].
pub const PDF_EXTENSIONS: &[&str] = &["pdf"];

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Which way a conversion runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Office document → PDF via the office engine.
    ToPdf,
    /// PDF → DOCX via the transcoder.
    ToDocument,
}

impl Direction {
    /// Lower-case source extensions (without dot) accepted for this direction.
    pub fn accepted_extensions(self) -> &'static [&'static str] {
        match self {
            Direction::ToPdf => OFFICE_EXTENSIONS,
            Direction::ToDocument => PDF_EXTENSIONS,
        }
    }

    /// Extension (without dot) of the produced artifact.
    pub fn target_extension(self) -> &'static str {
        match self {
            Direction::ToPdf => "pdf",
            Direction::ToDocument => "docx",
        }
    }

    /// Media type of the produced artifact.
    pub fn media_type(self) -> &'static str {
        match self {
            Direction::ToPdf => PDF_MEDIA_TYPE,
            Direction::ToDocument => DOCX_MEDIA_TYPE,
        }
    }

    /// Human-readable list of accepted extensions, e.g. `.doc, .docx`.
    pub fn accepted_list(self) -> String {
        self.accepted_extensions()
            .iter()
            .map(|e| format!(".{e}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Return the normalised (lower-case) source extension of `filename`
    /// if this direction accepts it.
    pub fn accepts(self, filename: &str) -> Option<String> {
        let ext = source_extension(filename)?;
        self.accepted_extensions()
            .contains(&ext.as_str())
            .then_some(ext)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToPdf => f.write_str("PDF conversion"),
            Direction::ToDocument => f.write_str("document conversion"),
        }
    }
}

/// Strip any client-side directory components from an upload filename.
///
/// Browsers on Windows have been known to send `C:\Users\me\report.docx`,
/// so both separators are honoured.
pub fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
}

/// Lower-cased extension of `filename`, without the dot.
///
/// Dotfiles with no further extension (`.docx`) and names ending in a dot
/// have no extension.
pub fn source_extension(filename: &str) -> Option<String> {
    let name = base_name(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Stem of the original filename (basename without its last extension).
pub fn file_stem(filename: &str) -> &str {
    let name = base_name(filename);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Display filename for an artifact: `{prefix}{stem}.{target}`.
///
/// Falls back to `document` when the upload had no usable stem.
pub fn display_name(prefix: &str, original: &str, direction: Direction) -> String {
    let stem = file_stem(original);
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{prefix}{stem}.{}", direction.target_extension())
}
