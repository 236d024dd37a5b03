//! Error types for the skyprint gateway.
//!
//! A single [`ConvertError`] covers every way a conversion request can end
//! without an artifact. Each variant knows its HTTP status and a stable
//! machine-readable code, so the HTTP layer never has to inspect messages.
//!
//! Cleanup failures have no variant: deleting scratch files is
//! best-effort and only ever logged (see [`crate::workspace`]).

use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

use crate::format::Direction;

/// All errors returned by the conversion gateway.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Admission errors ─────────────────────────────────────────────────
    /// The upload's extension is not accepted for the requested direction.
    #[error("Unsupported file '{filename}'. Accepted for {direction}: {}", .direction.accepted_list())]
    UnsupportedFormat {
        filename: String,
        direction: Direction,
    },

    /// The upload is larger than the configured maximum.
    #[error("Upload of {size} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// The multipart body had no `file` field.
    #[error("Missing multipart field 'file'")]
    MissingFile,

    /// Every waiting position behind the conversion slot is taken.
    #[error("Conversion queue is full ({waiting} waiting, limit {limit}); retry later")]
    Busy { waiting: usize, limit: usize },

    // ── Storage errors ───────────────────────────────────────────────────
    /// Writing the upload to, or reading the artifact from, the scratch area failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The scratch directory itself is unusable (missing, read-only, full).
    #[error("Scratch directory '{path}' is unusable: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Converter errors ─────────────────────────────────────────────────
    /// The office engine exited non-zero or produced no output.
    #[error("Conversion engine failed: {detail}")]
    EngineFailure { detail: String },

    /// The PDF-to-document transcoder raised a fault.
    #[error("PDF transcoding failed: {detail}")]
    TranscodeFailure { detail: String },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a worker thread panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Shorthand for an [`ConvertError::Io`] with a context string.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ConvertError::Io {
            context: context.into(),
            source,
        }
    }

    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConvertError::UnsupportedFormat { .. } | ConvertError::MissingFile => {
                StatusCode::BAD_REQUEST
            }
            ConvertError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ConvertError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ConvertError::Io { .. }
            | ConvertError::Storage { .. }
            | ConvertError::EngineFailure { .. }
            | ConvertError::TranscodeFailure { .. }
            | ConvertError::InvalidConfig(_)
            | ConvertError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ConvertError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            ConvertError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ConvertError::MissingFile => "MISSING_FILE",
            ConvertError::Busy { .. } => "BUSY",
            ConvertError::Io { .. } => "IO_ERROR",
            ConvertError::Storage { .. } => "STORAGE_ERROR",
            ConvertError::EngineFailure { .. } => "ENGINE_FAILURE",
            ConvertError::TranscodeFailure { .. } => "TRANSCODE_FAILURE",
            ConvertError::InvalidConfig(_) => "INVALID_CONFIG",
            ConvertError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_lists_accepted_extensions() {
        let e = ConvertError::UnsupportedFormat {
            filename: "report.txt".into(),
            direction: Direction::ToPdf,
        };
        let msg = e.to_string();
        assert!(msg.contains("report.txt"), "got: {msg}");
        assert!(msg.contains(".docx"), "got: {msg}");
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert!(e.is_client_error());
    }

    #[test]
    fn payload_too_large_maps_to_413() {
        let e = ConvertError::PayloadTooLarge {
            size: 11,
            limit: 10,
        };
        assert_eq!(e.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(e.code(), "PAYLOAD_TOO_LARGE");
        assert!(e.to_string().contains("11 bytes"));
    }

    #[test]
    fn engine_failure_carries_diagnostic() {
        let e = ConvertError::EngineFailure {
            detail: "source file could not be loaded".into(),
        };
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.to_string().contains("could not be loaded"));
        assert!(!e.is_client_error());
    }

    #[test]
    fn busy_maps_to_503() {
        let e = ConvertError::Busy {
            waiting: 4,
            limit: 4,
        };
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn io_keeps_source() {
        use std::error::Error as _;
        let e = ConvertError::io(
            "writing upload",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(e.source().is_some());
        assert_eq!(e.code(), "IO_ERROR");
    }
}
