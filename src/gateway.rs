//! The conversion gateway: admission, the conversion slot, and dispatch.
//!
//! ```text
//! convert(direction, upload)
//!  ├─ 1. Admit      size ≤ limit, extension accepted   (no filesystem access)
//!  ├─ 2. Allocate   workspace entry + staged write of the upload
//!  ├─ 3. Slot       semaphore permit (optionally shed when the queue is full)
//!  ├─ 4. Convert    adapter on the blocking pool, input deleted afterwards
//!  └─ 5. Hand off   ConvertedArtifact owning the output lease
//! ```
//!
//! ## Cleanup ownership
//!
//! Both scratch paths are wrapped in [`FileLease`]s as soon as they are
//! allocated. The input lease and the slot permit move into the blocking
//! task, so they are released when the adapter returns even if the request
//! future has been dropped in the meantime. The output lease is only handed
//! out inside a successful [`ConvertedArtifact`]; on every failure path it is
//! dropped and the partial output deleted.
//!
//! ## Slot
//!
//! One `tokio::sync::Semaphore` with `slot_capacity` permits is shared by
//! both directions. Waiters are served in arrival order. With `max_waiting`
//! set, a request that would become waiter number `max_waiting + 1` fails
//! with [`ConvertError::Busy`] instead of queuing.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::engine::{Converter, OfficeEngine};
use crate::error::ConvertError;
use crate::format::{base_name, display_name, Direction};
use crate::transcode::PdfTranscoder;
use crate::workspace::{FileLease, Release, Workspace};

/// Directory inside the scratch dir holding the office engine's private
/// profiles, one `slot-{n}` subdirectory per concurrent run.
pub const ENGINE_PROFILE_DIR: &str = ".engine-profile";

/// One uploaded file as received by the transport layer.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Filename declared by the client (may carry directory components).
    pub filename: String,
    pub data: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// A produced artifact, ready to be sent to the client.
///
/// The artifact owns its scratch file: dropping it deletes the file. The
/// transport layer keeps it alive until the last byte has been sent.
#[derive(Debug)]
pub struct ConvertedArtifact {
    output: FileLease,
    pub direction: Direction,
    pub media_type: &'static str,
    /// Download filename, e.g. `SkyPrint_report.pdf`.
    pub display_name: String,
    /// Size of the artifact in bytes.
    pub size: u64,
}

impl ConvertedArtifact {
    pub fn path(&self) -> &Path {
        self.output.path()
    }

    /// Give up the artifact metadata and keep only the file lease.
    pub fn into_lease(self) -> FileLease {
        self.output
    }
}

/// Point-in-time view of slot occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub slots: usize,
    pub available_slots: usize,
    pub waiting: usize,
}

/// Admission and serialization core shared by all request handlers.
pub struct Gateway {
    config: GatewayConfig,
    workspace: Workspace,
    slot: Arc<Semaphore>,
    waiting: AtomicUsize,
    to_pdf: Arc<dyn Converter>,
    to_document: Arc<dyn Converter>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("workspace", &self.workspace.root())
            .field("to_pdf", &self.to_pdf.name())
            .field("to_document", &self.to_document.name())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Gateway {
    /// Gateway with the production adapters: the office engine for
    /// document → PDF and the pdfium transcoder for PDF → document.
    pub fn new(config: GatewayConfig) -> Result<Self, ConvertError> {
        let workspace = Workspace::open(&config.scratch_dir)?;
        let engine = OfficeEngine::new(&config.engine_binary)
            .with_timeout(config.engine_timeout)
            .with_profile_dir(workspace.root().join(ENGINE_PROFILE_DIR));
        Ok(Self::assemble(
            config,
            workspace,
            Arc::new(engine),
            Arc::new(PdfTranscoder::from_env()),
        ))
    }

    /// Gateway with caller-supplied adapters.
    pub fn with_converters(
        config: GatewayConfig,
        to_pdf: Arc<dyn Converter>,
        to_document: Arc<dyn Converter>,
    ) -> Result<Self, ConvertError> {
        let workspace = Workspace::open(&config.scratch_dir)?;
        Ok(Self::assemble(config, workspace, to_pdf, to_document))
    }

    fn assemble(
        config: GatewayConfig,
        workspace: Workspace,
        to_pdf: Arc<dyn Converter>,
        to_document: Arc<dyn Converter>,
    ) -> Self {
        info!(
            "Gateway ready: {} slot(s), queue limit {}, upload limit {} bytes",
            config.slot_capacity,
            config
                .max_waiting
                .map(|n| n.to_string())
                .unwrap_or_else(|| "none".to_string()),
            config.max_upload_bytes
        );
        Self {
            slot: Arc::new(Semaphore::new(config.slot_capacity)),
            waiting: AtomicUsize::new(0),
            config,
            workspace,
            to_pdf,
            to_document,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            slots: self.config.slot_capacity,
            available_slots: self.slot.available_permits(),
            waiting: self.waiting.load(Ordering::SeqCst),
        }
    }

    /// Office document → PDF.
    pub async fn to_pdf(&self, upload: Upload) -> Result<ConvertedArtifact, ConvertError> {
        self.convert(Direction::ToPdf, upload).await
    }

    /// PDF → DOCX.
    pub async fn to_document(&self, upload: Upload) -> Result<ConvertedArtifact, ConvertError> {
        self.convert(Direction::ToDocument, upload).await
    }

    /// Run one conversion request end to end.
    pub async fn convert(
        &self,
        direction: Direction,
        upload: Upload,
    ) -> Result<ConvertedArtifact, ConvertError> {
        let filename = base_name(&upload.filename).to_string();
        let size = upload.data.len() as u64;

        // ── 1. Admit ──
        if size > self.config.max_upload_bytes {
            return Err(ConvertError::PayloadTooLarge {
                size,
                limit: self.config.max_upload_bytes,
            });
        }
        let source_ext =
            direction
                .accepts(&filename)
                .ok_or_else(|| ConvertError::UnsupportedFormat {
                    filename: filename.clone(),
                    direction,
                })?;

        // ── 2. Allocate ──
        let entry = self
            .workspace
            .allocate(&source_ext, direction.target_extension())?;
        let id = entry.id.clone();
        info!("[{}] Admitted '{}' ({} bytes) for {}", id, filename, size, direction);

        let (input, output) = entry.clone().into_leases();
        let input = self.workspace.materialize(input, upload.data).await?;

        // ── 3. Slot ──
        let queued_at = Instant::now();
        let permit = self.acquire_slot(&id).await?;
        debug!(
            "[{}] Slot acquired after {}ms",
            id,
            queued_at.elapsed().as_millis()
        );

        // ── 4. Convert ──
        let converter = Arc::clone(self.converter(direction));
        let workspace = self.workspace.clone();
        let produced = tokio::task::spawn_blocking(move || -> Result<(FileLease, u64), ConvertError> {
            let _permit = permit;
            let job_id = &entry.id;
            let start = Instant::now();
            let result = converter.convert(input.path(), output.path());
            workspace.release(&entry, Release::Input);
            input.disarm();
            match result {
                Ok(()) => {
                    let size = std::fs::metadata(output.path())
                        .map_err(|e| ConvertError::io("reading converted artifact", e))?
                        .len();
                    debug!(
                        "[{}] {} finished in {}ms",
                        job_id,
                        converter.name(),
                        start.elapsed().as_millis()
                    );
                    Ok((output, size))
                }
                Err(e) => {
                    warn!("[{}] {} failed: {}", job_id, converter.name(), e);
                    workspace.release(&entry, Release::Output);
                    output.disarm();
                    Err(e)
                }
            }
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("Conversion worker panicked: {e}")))?;
        let (output, artifact_size) = produced?;

        // ── 5. Hand off ──
        let artifact = ConvertedArtifact {
            output,
            direction,
            media_type: direction.media_type(),
            display_name: display_name(&self.config.brand_prefix, &filename, direction),
            size: artifact_size,
        };
        info!(
            "[{}] Produced '{}' ({} bytes)",
            id, artifact.display_name, artifact.size
        );
        Ok(artifact)
    }

    fn converter(&self, direction: Direction) -> &Arc<dyn Converter> {
        match direction {
            Direction::ToPdf => &self.to_pdf,
            Direction::ToDocument => &self.to_document,
        }
    }

    async fn acquire_slot(&self, id: &str) -> Result<OwnedSemaphorePermit, ConvertError> {
        if let Ok(permit) = Arc::clone(&self.slot).try_acquire_owned() {
            return Ok(permit);
        }

        let ticket = WaitTicket::enter(&self.waiting);
        if let Some(limit) = self.config.max_waiting {
            if ticket.position > limit {
                warn!(
                    "[{}] Shed: {} already waiting (limit {})",
                    id,
                    ticket.position - 1,
                    limit
                );
                return Err(ConvertError::Busy {
                    waiting: ticket.position - 1,
                    limit,
                });
            }
        }
        debug!("[{}] Waiting for slot at position {}", id, ticket.position);

        Arc::clone(&self.slot)
            .acquire_owned()
            .await
            .map_err(|_| ConvertError::Internal("Conversion slot closed".into()))
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Counts a request as waiting for the slot until dropped.
struct WaitTicket<'a> {
    counter: &'a AtomicUsize,
    /// 1-based position at the time of entry, this request included.
    position: usize,
}

impl<'a> WaitTicket<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let position = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self { counter, position }
    }
}

impl Drop for WaitTicket<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
