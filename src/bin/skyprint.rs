//! CLI binary for skyprint.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `GatewayConfig`, sets up logging and the runtime, and serves the router.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use skyprint::{router, Gateway, GatewayConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  skyprint
  skyprint --port 9000 --scratch-dir /var/tmp/skyprint
  skyprint --max-waiting 8 --engine-timeout 120 --log-format json

  curl -F file=@report.docx http://localhost:8000/convert -OJ
  curl -F file=@scan.pdf http://localhost:8000/convert-to-document -OJ

REQUIREMENTS:
  Document → PDF needs a headless office suite on PATH (`soffice`) or --engine.
  PDF → document needs the pdfium shared library on the system search path,
  or PDFIUM_LIB_PATH=/path/to/libpdfium.
"#;

/// Document conversion gateway.
#[derive(Parser, Debug)]
#[command(
    name = "skyprint",
    version,
    about = "HTTP gateway converting office documents to PDF and PDF to DOCX",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "SKYPRINT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "SKYPRINT_PORT", default_value_t = 8000)]
    port: u16,

    /// Directory for request-scoped scratch files.
    #[arg(long, env = "SKYPRINT_SCRATCH_DIR", default_value = "uploads")]
    scratch_dir: PathBuf,

    /// Largest accepted upload in MiB (inclusive).
    #[arg(long, env = "SKYPRINT_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: u64,

    /// Conversions allowed to run at once.
    #[arg(long, env = "SKYPRINT_SLOTS", default_value_t = 1)]
    slots: usize,

    /// Reject requests with 503 once this many are waiting for a slot.
    /// Unbounded when omitted.
    #[arg(long, env = "SKYPRINT_MAX_WAITING")]
    max_waiting: Option<usize>,

    /// Office engine executable.
    #[arg(long, env = "SKYPRINT_ENGINE", default_value = "soffice")]
    engine: PathBuf,

    /// Kill the office engine after this many seconds. No limit when omitted.
    #[arg(long, env = "SKYPRINT_ENGINE_TIMEOUT")]
    engine_timeout: Option<u64>,

    /// Prefix of produced download filenames.
    #[arg(long, env = "SKYPRINT_BRAND_PREFIX", default_value = skyprint::config::DEFAULT_BRAND_PREFIX)]
    brand_prefix: String,

    /// Threads in the blocking pool that writes uploads and runs converters.
    #[arg(long, env = "SKYPRINT_BLOCKING_THREADS", default_value_t = 16)]
    blocking_threads: usize,

    /// Log output format.
    #[arg(long, env = "SKYPRINT_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SKYPRINT_VERBOSE")]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn gateway_config(&self) -> Result<GatewayConfig> {
        GatewayConfig::builder()
            .scratch_dir(&self.scratch_dir)
            .max_upload_bytes(self.max_upload_mb.saturating_mul(1024 * 1024))
            .slot_capacity(self.slots)
            .max_waiting(self.max_waiting)
            .engine_binary(&self.engine)
            .engine_timeout(self.engine_timeout.map(Duration::from_secs))
            .brand_prefix(&self.brand_prefix)
            .blocking_threads(self.blocking_threads)
            .build()
            .context("Invalid configuration")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init(),
    }

    let config = cli.gateway_config()?;

    // ── Runtime ──────────────────────────────────────────────────────────
    // Uploads and converters run on the blocking pool; size it separately
    // from the async workers that accept connections.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.blocking_threads)
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(serve(cli, config))
}

async fn serve(cli: Cli, config: GatewayConfig) -> Result<()> {
    let gateway = Gateway::new(config).context("Failed to initialise the gateway")?;
    gateway.workspace().sweep();
    let gateway = Arc::new(gateway);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("SkyPrint listening on http://{}", addr);
    info!("Office engine: {}", cli.engine.display());

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("SkyPrint stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining in-flight requests");
}
