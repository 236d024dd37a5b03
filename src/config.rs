//! Gateway configuration.
//!
//! Every knob of the service lives in [`GatewayConfig`], built through
//! [`GatewayConfigBuilder`]. The CLI maps its flags (and their `SKYPRINT_*`
//! environment fallbacks) onto the builder; tests build configs directly.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::ConvertError;

/// Default upload limit: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Default display-name prefix for produced artifacts.
pub const DEFAULT_BRAND_PREFIX: &str = "SkyPrint_";

/// Configuration for the conversion gateway.
///
/// # Example
/// ```rust
/// use skyprint::GatewayConfig;
///
/// let config = GatewayConfig::builder()
///     .scratch_dir("/var/tmp/skyprint")
///     .max_upload_bytes(10 * 1024 * 1024)
///     .max_waiting(Some(32))
///     .build()
///     .unwrap();
/// assert_eq!(config.slot_capacity, 1);
/// ```
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Directory holding request-scoped input and output files. Default: `uploads`.
    pub scratch_dir: PathBuf,

    /// Largest accepted upload, inclusive. Default: 50 MiB.
    pub max_upload_bytes: u64,

    /// Number of conversions allowed to run at once. Default: 1.
    ///
    /// The office engine is a single headless process with unbounded internal
    /// queuing; running more than one job against it grows memory without
    /// improving throughput.
    pub slot_capacity: usize,

    /// Maximum number of requests allowed to wait for a slot. Default: unbounded.
    ///
    /// When set, a request arriving while this many are already waiting is
    /// rejected with [`ConvertError::Busy`] instead of queuing.
    pub max_waiting: Option<usize>,

    /// Office engine executable. Default: `soffice`.
    pub engine_binary: PathBuf,

    /// Wall-clock limit for one office-engine run. Default: none.
    ///
    /// On expiry the engine process is killed and the request fails with
    /// [`ConvertError::EngineFailure`].
    pub engine_timeout: Option<Duration>,

    /// Prefix prepended to the original stem in the download filename.
    pub brand_prefix: String,

    /// Size of the dedicated blocking worker pool. Default: 16.
    ///
    /// Uploads are persisted and converters run on this pool, never on the
    /// request-accepting async workers.
    pub blocking_threads: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            slot_capacity: 1,
            max_waiting: None,
            engine_binary: PathBuf::from("soffice"),
            engine_timeout: None,
            brand_prefix: DEFAULT_BRAND_PREFIX.to_string(),
            blocking_threads: 16,
        }
    }
}

impl GatewayConfig {
    /// Create a new builder for `GatewayConfig`.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GatewayConfig`].
#[derive(Debug)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: u64) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn slot_capacity(mut self, n: usize) -> Self {
        self.config.slot_capacity = n;
        self
    }

    pub fn max_waiting(mut self, n: Option<usize>) -> Self {
        self.config.max_waiting = n;
        self
    }

    pub fn engine_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.engine_binary = path.into();
        self
    }

    pub fn engine_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.engine_timeout = timeout;
        self
    }

    pub fn brand_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.brand_prefix = prefix.into();
        self
    }

    pub fn blocking_threads(mut self, n: usize) -> Self {
        self.config.blocking_threads = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GatewayConfig, ConvertError> {
        let c = &self.config;
        if c.slot_capacity == 0 {
            return Err(ConvertError::InvalidConfig(
                "Slot capacity must be ≥ 1".into(),
            ));
        }
        if c.slot_capacity > Semaphore::MAX_PERMITS {
            return Err(ConvertError::InvalidConfig(format!(
                "Slot capacity {} exceeds the maximum of {}",
                c.slot_capacity,
                Semaphore::MAX_PERMITS
            )));
        }
        if c.max_upload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "Maximum upload size must be ≥ 1 byte".into(),
            ));
        }
        if c.scratch_dir.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "Scratch directory must not be empty".into(),
            ));
        }
        if c.engine_timeout == Some(Duration::ZERO) {
            return Err(ConvertError::InvalidConfig(
                "Engine timeout must be positive".into(),
            ));
        }
        if c.brand_prefix.contains(['/', '\\', '"']) {
            return Err(ConvertError::InvalidConfig(format!(
                "Brand prefix '{}' must not contain path separators or quotes",
                c.brand_prefix
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_service() {
        let c = GatewayConfig::default();
        assert_eq!(c.slot_capacity, 1);
        assert_eq!(c.max_waiting, None);
        assert_eq!(c.engine_timeout, None);
        assert_eq!(c.brand_prefix, "SkyPrint_");
        assert_eq!(c.scratch_dir, PathBuf::from("uploads"));
    }

    #[test]
    fn zero_slots_rejected() {
        let err = GatewayConfig::builder().slot_capacity(0).build().unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn oversized_slot_capacity_rejected() {
        let err = GatewayConfig::builder()
            .slot_capacity(Semaphore::MAX_PERMITS + 1)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{err}");
        assert!(GatewayConfig::builder()
            .slot_capacity(Semaphore::MAX_PERMITS)
            .build()
            .is_ok());
    }

    #[test]
    fn zero_upload_limit_rejected() {
        assert!(GatewayConfig::builder().max_upload_bytes(0).build().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(GatewayConfig::builder()
            .engine_timeout(Some(Duration::ZERO))
            .build()
            .is_err());
    }

    #[test]
    fn prefix_with_separator_rejected() {
        assert!(GatewayConfig::builder().brand_prefix("a/b").build().is_err());
        assert!(GatewayConfig::builder().brand_prefix("Acme-").build().is_ok());
    }

    #[test]
    fn blocking_threads_clamped() {
        let c = GatewayConfig::builder().blocking_threads(0).build().unwrap();
        assert_eq!(c.blocking_threads, 1);
    }
}
