//! # skyprint
//!
//! Document conversion gateway: office documents to PDF, and PDF back to an
//! editable document, behind a small HTTP API.
//!
//! ## Request flow
//!
//! ```text
//! client
//!  │  POST /convert | /convert-to-document   (multipart field `file`)
//!  ├─ 1. Admit     size and extension checks, nothing written yet
//!  ├─ 2. Persist   upload → scratch/{id}.{ext} (staged write, blocking pool)
//!  ├─ 3. Slot      wait for the conversion slot (semaphore, default 1 permit)
//!  ├─ 4. Convert   office engine or pdfium transcoder (blocking pool)
//!  └─ 5. Stream    artifact streamed back, deleted once the body is dropped
//! ```
//!
//! Every conversion, whatever its direction, goes through the same slot: the
//! office engine is a single headless process and only one job should run
//! against it at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skyprint::{router, Gateway, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::builder().scratch_dir("uploads").build()?;
//!     let gateway = Arc::new(Gateway::new(config)?);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, router(gateway)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `skyprint` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the gateway in another service:
//! ```toml
//! skyprint = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod docx;
pub mod engine;
pub mod error;
pub mod format;
pub mod gateway;
pub mod http;
pub mod transcode;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use docx::DocxBuilder;
pub use engine::{Converter, OfficeEngine, ProfilePool};
pub use error::ConvertError;
pub use format::Direction;
pub use gateway::{ConvertedArtifact, Gateway, SlotStats, Upload};
pub use http::{router, ApiError};
pub use transcode::PdfTranscoder;
pub use workspace::{FileLease, Release, Workspace, WorkspaceEntry};
