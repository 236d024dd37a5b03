//! HTTP surface: routes, multipart parsing, and artifact streaming.
//!
//! | Route | Method | Purpose |
//! |---|---|---|
//! | `/` | GET | banner |
//! | `/health` | GET | liveness + slot occupancy |
//! | `/convert` | POST | office document → PDF |
//! | `/convert-to-document` | POST | PDF → DOCX |
//!
//! Both conversion routes take one multipart field named `file`.
//!
//! The artifact is streamed from its scratch file. The stream owns the
//! artifact's [`FileLease`], so the file is deleted when the body is dropped:
//! after the last chunk has been handed to the connection, or earlier if the
//! client goes away.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ConvertError;
use crate::format::Direction;
use crate::gateway::{ConvertedArtifact, Gateway, Upload};
use crate::workspace::FileLease;

/// RFC 5987 `attr-char`: everything else in `filename*` is percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

/// Room for multipart framing on top of the upload limit.
const MULTIPART_SLACK: u64 = 64 * 1024;

/// Read size when streaming an artifact.
const CHUNK_SIZE: usize = 64 * 1024;

/// Build the service router.
pub fn router(gateway: Arc<Gateway>) -> Router {
    let body_limit = gateway
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_SLACK);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/convert", post(handle_convert))
        .route("/convert-to-document", post(handle_convert_to_document))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(gateway)
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "SkyPrint API is running. POST a file to /convert or /convert-to-document."
    }))
}

async fn handle_health(State(gateway): State<Arc<Gateway>>) -> Json<serde_json::Value> {
    let stats = gateway.stats();
    Json(json!({
        "status": "healthy",
        "service": "skyprint",
        "version": env!("CARGO_PKG_VERSION"),
        "slots": stats.slots,
        "available_slots": stats.available_slots,
        "waiting": stats.waiting,
    }))
}

async fn handle_convert(
    State(gateway): State<Arc<Gateway>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    respond(&gateway, Direction::ToPdf, multipart?).await
}

async fn handle_convert_to_document(
    State(gateway): State<Arc<Gateway>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    respond(&gateway, Direction::ToDocument, multipart?).await
}

async fn respond(
    gateway: &Gateway,
    direction: Direction,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;
    let artifact = gateway.convert(direction, upload).await?;
    artifact_response(artifact).await
}

// ── Request / response plumbing ──────────────────────────────────────────

/// Pull the `file` field out of the multipart body. Other fields are ignored.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        return Ok(Upload { filename, data });
    }
    Err(ConvertError::MissingFile.into())
}

async fn artifact_response(artifact: ConvertedArtifact) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(artifact.path())
        .await
        .map_err(|e| ConvertError::io("opening converted artifact", e))?;

    let disposition = HeaderValue::from_str(&content_disposition(&artifact.display_name))
        .map_err(|e| ConvertError::Internal(format!("Invalid download filename: {e}")))?;
    let media_type = artifact.media_type;
    let size = artifact.size;
    info!("Sending '{}' ({} bytes)", artifact.display_name, size);

    let body = Body::from_stream(stream_file(file, artifact.into_lease()));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(media_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(size)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Chunked reader over `file` that deletes the file once the stream is
/// exhausted, fails, or is dropped.
fn stream_file(
    file: tokio::fs::File,
    lease: FileLease,
) -> impl futures::Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    futures::stream::try_unfold((file, lease), |(mut file, lease)| async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            // Close before unlinking; some platforms refuse to delete open files.
            drop(file);
            lease.release();
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), (file, lease))))
    })
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(name, ATTR_CHAR)
    )
}


// ── Errors ───────────────────────────────────────────────────────────────

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

/// Any failure of a request, already mapped to a status and machine code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<ConvertError> for ApiError {
    fn from(e: ConvertError) -> Self {
        if e.is_client_error() {
            info!("Rejected request: {}", e);
        } else {
            warn!("Request failed: {}", e);
        }
        Self {
            status: e.status_code(),
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        let status = e.status();
        warn!("Malformed upload ({}): {}", status, e.body_text());
        Self {
            code: multipart_code(status),
            message: e.body_text(),
            status,
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        let status = e.status();
        Self {
            code: multipart_code(status),
            message: e.body_text(),
            status,
        }
    }
}

fn multipart_code(status: StatusCode) -> &'static str {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        "PAYLOAD_TOO_LARGE"
    } else {
        "INVALID_MULTIPART"
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}
