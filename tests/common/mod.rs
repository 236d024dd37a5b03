//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use skyprint::{ConvertError, Converter, Gateway, GatewayConfig};
use tempfile::TempDir;

pub const BOUNDARY: &str = "skyprint-test-boundary";

/// `Content-Type` header value matching [`multipart_body`].
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// A multipart body with one file field.
pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Files currently in the scratch directory (subdirectories excluded).
pub fn scratch_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(root)
        .unwrap()
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

/// Writes a fixed header followed by the input bytes.
pub struct Stamp(pub &'static [u8]);

impl Converter for Stamp {
    fn name(&self) -> &str {
        "stamp"
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let mut out = self.0.to_vec();
        out.extend(std::fs::read(input).map_err(|e| ConvertError::io("reading input", e))?);
        std::fs::write(output, out).map_err(|e| ConvertError::io("writing output", e))
    }
}

/// Leaves a partial output behind and reports an engine failure.
pub struct Failing;

impl Converter for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn convert(&self, _input: &Path, output: &Path) -> Result<(), ConvertError> {
        let _ = std::fs::write(output, b"%PDF-partial");
        Err(ConvertError::EngineFailure {
            detail: "engine exited with status 1: source file could not be loaded".into(),
        })
    }
}

/// Route library logs to the test harness; `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(dir: &TempDir) -> skyprint::GatewayConfigBuilder {
    init_tracing();
    GatewayConfig::builder().scratch_dir(dir.path().join("scratch"))
}

/// Gateway whose adapters stamp PDF and ZIP signatures onto the input.
pub fn stamping_gateway(dir: &TempDir, max_upload_bytes: u64) -> Arc<Gateway> {
    let config = config(dir).max_upload_bytes(max_upload_bytes).build().unwrap();
    Arc::new(
        Gateway::with_converters(
            config,
            Arc::new(Stamp(b"%PDF-1.4\n")),
            Arc::new(Stamp(b"PK\x03\x04")),
        )
        .unwrap(),
    )
}

/// Gateway whose document → PDF adapter always fails.
pub fn failing_gateway(dir: &TempDir) -> Arc<Gateway> {
    let config = config(dir).build().unwrap();
    Arc::new(
        Gateway::with_converters(config, Arc::new(Failing), Arc::new(Failing)).unwrap(),
    )
}
