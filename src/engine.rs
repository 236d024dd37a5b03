//! Converter adapters and the office-engine (document → PDF) adapter.
//!
//! A [`Converter`] turns one file into another and reports failure in the
//! gateway's error taxonomy. Implementations are synchronous and blocking:
//! the gateway always calls them from the blocking pool, one call per
//! request, and never shares anything between calls except the paths it
//! hands in.
//!
//! [`OfficeEngine`] drives a headless office suite:
//!
//! ```text
//! soffice [-env:UserInstallation=file://…] --headless --convert-to pdf --outdir <dir> <input>
//! ```
//!
//! The engine names its output after the input stem, so success requires
//! both a zero exit status and `<dir>/<stem>.pdf` existing afterwards.
//!
//! The suite allows one running process per user profile; a second process
//! started on a busy profile hands its job to the first one and exits 0
//! without converting. Concurrent runs therefore each check out their own
//! profile directory from a [`ProfilePool`].

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::ConvertError;

/// How often a timed engine run is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Longest diagnostic text carried in an error message.
const MAX_DIAGNOSTIC_LEN: usize = 2000;

/// One external conversion tool behind a uniform interface.
pub trait Converter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Convert `input` into `output`.
    ///
    /// Must not return `Ok` unless `output` exists. May leave a partial
    /// `output` behind on failure; the caller owns its cleanup.
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError>;
}

/// Headless office-suite adapter (document → PDF).
#[derive(Debug, Clone)]
pub struct OfficeEngine {
    binary: PathBuf,
    timeout: Option<Duration>,
    profiles: Option<Arc<ProfilePool>>,
}

/// Engine user-profile directories under one base, `{base}/slot-{n}`.
///
/// A directory is held by at most one run at a time. Directories are created
/// lazily and reused, so the pool grows only to the peak number of
/// concurrent runs.
#[derive(Debug)]
pub struct ProfilePool {
    base: PathBuf,
    state: Mutex<PoolState>,
}

#[derive(Debug, Default)]
struct PoolState {
    free: Vec<PathBuf>,
    created: usize,
}

/// A checked-out profile directory; returned to the pool on drop.
#[derive(Debug)]
pub struct ProfileGuard<'a> {
    pool: &'a ProfilePool,
    dir: Option<PathBuf>,
}

impl ProfilePool {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Take a directory no other run is using.
    pub fn checkout(&self) -> ProfileGuard<'_> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let dir = match state.free.pop() {
            Some(dir) => dir,
            None => {
                let dir = self.base.join(format!("slot-{}", state.created));
                state.created += 1;
                debug!("New engine profile {}", dir.display());
                dir
            }
        };
        ProfileGuard {
            pool: self,
            dir: Some(dir),
        }
    }
}

impl ProfileGuard<'_> {
    pub fn path(&self) -> &Path {
        self.dir.as_deref().unwrap_or(&self.pool.base)
    }
}

impl Drop for ProfileGuard<'_> {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let mut state = self.pool.state.lock().unwrap_or_else(|e| e.into_inner());
            state.free.push(dir);
        }
    }
}

impl OfficeEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
            profiles: None,
        }
    }

    /// Kill the engine if a run takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the engine with private user profiles under `dir`, one per
    /// concurrent run.
    ///
    /// Without this a desktop session of the same suite can capture the job
    /// and the headless process exits immediately without converting.
    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profiles = Some(Arc::new(ProfilePool::new(dir)));
        self
    }

    fn command(&self, input: &Path, outdir: &Path, profile: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(profile) = profile {
            cmd.arg(format!("-env:UserInstallation=file://{}", profile.display()));
        }
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(outdir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Converter for OfficeEngine {
    fn name(&self) -> &str {
        "office-engine"
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let outdir = output.parent().ok_or_else(|| ConvertError::EngineFailure {
            detail: format!("output path {} has no parent directory", output.display()),
        })?;
        let stem = input.file_stem().ok_or_else(|| ConvertError::EngineFailure {
            detail: format!("input path {} has no file stem", input.display()),
        })?;
        let mut produced_name = stem.to_os_string();
        produced_name.push(".pdf");
        let produced = outdir.join(produced_name);

        let profile = self.profiles.as_deref().map(ProfilePool::checkout);
        let start = Instant::now();
        let mut child = self
            .command(input, outdir, profile.as_ref().map(ProfileGuard::path))
            .spawn()
            .map_err(|e| ConvertError::EngineFailure {
                detail: format!("failed to launch {}: {}", self.binary.display(), e),
            })?;
        debug!("Engine pid {} started for {}", child.id(), input.display());

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match wait(&mut child, self.timeout)? {
            Some(status) => status,
            None => {
                // Readers are not joined: a grandchild may still hold the pipes.
                let secs = self.timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
                warn!("Engine timed out after {:.1}s on {}", secs, input.display());
                return Err(ConvertError::EngineFailure {
                    detail: format!("engine timed out after {secs:.1}s and was terminated"),
                });
            }
        };

        let diag = diagnostic(collect(stderr), collect(stdout));

        if !status.success() {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(ConvertError::EngineFailure {
                detail: if diag.is_empty() {
                    format!("engine exited with status {code}")
                } else {
                    format!("engine exited with status {code}: {diag}")
                },
            });
        }

        if !produced.exists() {
            return Err(ConvertError::EngineFailure {
                detail: if diag.is_empty() {
                    "engine produced no PDF".to_string()
                } else {
                    format!("engine produced no PDF: {diag}")
                },
            });
        }

        if produced != output {
            std::fs::rename(&produced, output)
                .map_err(|e| ConvertError::io("moving engine output into place", e))?;
        }

        info!(
            "Engine converted {} in {}ms",
            input.display(),
            start.elapsed().as_millis()
        );
        Ok(())
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Wait for `child`, killing it once `timeout` elapses.
///
/// Returns `Ok(None)` if the child was killed.
fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<Option<ExitStatus>, ConvertError> {
    let waited = |e: std::io::Error| ConvertError::EngineFailure {
        detail: format!("failed waiting for engine: {e}"),
    };

    let Some(timeout) = timeout else {
        return child.wait().map(Some).map_err(waited);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(waited)? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                warn!("Failed to kill engine pid {}: {}", child.id(), e);
            }
            // Reap so the process does not linger as a zombie.
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Prefer stderr; fall back to stdout (some engine builds log errors there).
fn diagnostic(stderr: String, stdout: String) -> String {
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    let text = text.trim();
    if text.len() > MAX_DIAGNOSTIC_LEN {
        let mut cut = MAX_DIAGNOSTIC_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    } else {
        text.to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write an executable shell script standing in for the office engine.
    fn fake_engine(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-soffice");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    const WRITES_PDF: &str = r#"
outdir=""
while [ $# -gt 1 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    *) shift ;;
  esac
done
name=$(basename "$1")
printf '%%PDF-1.4\n' > "$outdir/${name%.*}.pdf"
"#;

    fn paths(dir: &TempDir) -> (PathBuf, PathBuf) {
        let input = dir.path().join("abc.docx");
        fs::write(&input, b"PK").unwrap();
        (input, dir.path().join("abc.pdf"))
    }

    #[test]
    fn success_requires_output_file() {
        let dir = TempDir::new().unwrap();
        let engine = OfficeEngine::new(fake_engine(dir.path(), WRITES_PDF));
        let (input, output) = paths(&dir);
        engine.convert(&input, &output).unwrap();
        assert!(fs::read(&output).unwrap().starts_with(b"%PDF-"));
    }

    #[test]
    fn nonzero_exit_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let engine = OfficeEngine::new(fake_engine(
            dir.path(),
            "echo 'Error: source file could not be loaded' >&2\nexit 1",
        ));
        let (input, output) = paths(&dir);
        let err = engine.convert(&input, &output).unwrap_err();
        match err {
            ConvertError::EngineFailure { detail } => {
                assert!(detail.contains("status 1"), "{detail}");
                assert!(detail.contains("could not be loaded"), "{detail}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_exit_without_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let engine = OfficeEngine::new(fake_engine(dir.path(), "exit 0"));
        let (input, output) = paths(&dir);
        let err = engine.convert(&input, &output).unwrap_err();
        assert!(err.to_string().contains("no PDF"), "{err}");
    }

    #[test]
    fn missing_binary_is_engine_failure() {
        let dir = TempDir::new().unwrap();
        let engine = OfficeEngine::new(dir.path().join("does-not-exist"));
        let (input, output) = paths(&dir);
        let err = engine.convert(&input, &output).unwrap_err();
        assert!(matches!(err, ConvertError::EngineFailure { .. }));
    }

    #[test]
    fn timeout_kills_engine() {
        let dir = TempDir::new().unwrap();
        let engine = OfficeEngine::new(fake_engine(dir.path(), "exec sleep 10"))
            .with_timeout(Some(Duration::from_millis(200)));
        let (input, output) = paths(&dir);
        let start = Instant::now();
        let err = engine.convert(&input, &output).unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[test]
    fn profile_dir_is_passed_first() {
        let engine = OfficeEngine::new("soffice");
        let cmd = engine.command(
            Path::new("/s/a.odt"),
            Path::new("/s"),
            Some(Path::new("/tmp/profile/slot-0")),
        );
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-env:UserInstallation=file:///tmp/profile/slot-0",
                "--headless",
                "--convert-to",
                "pdf",
                "--outdir",
                "/s",
                "/s/a.odt",
            ]
        );
    }

    #[test]
    fn no_profile_means_no_env_argument() {
        let engine = OfficeEngine::new("soffice");
        let cmd = engine.command(Path::new("/s/a.odt"), Path::new("/s"), None);
        assert_eq!(cmd.get_args().next().unwrap(), "--headless");
    }

    #[test]
    fn concurrent_checkouts_get_distinct_profiles() {
        let pool = ProfilePool::new("/tmp/profiles");
        let a = pool.checkout();
        let b = pool.checkout();
        assert_ne!(a.path(), b.path());
        assert_eq!(a.path(), Path::new("/tmp/profiles/slot-0"));
        assert_eq!(b.path(), Path::new("/tmp/profiles/slot-1"));

        drop(a);
        let c = pool.checkout();
        assert_eq!(c.path(), Path::new("/tmp/profiles/slot-0"));
        assert_ne!(c.path(), b.path());
    }

    #[test]
    fn overlapping_runs_use_separate_profiles() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("profiles.log");
        let script = format!(
            "echo \"$1\" >> '{}'\nsleep 0.3\n{}",
            log.display(),
            WRITES_PDF
        );
        let engine = Arc::new(
            OfficeEngine::new(fake_engine(dir.path(), &script))
                .with_profile_dir(dir.path().join(".engine-profile")),
        );

        let runs: Vec<_> = ["one", "two"]
            .into_iter()
            .map(|stem| {
                let engine = Arc::clone(&engine);
                let input = dir.path().join(format!("{stem}.docx"));
                let output = dir.path().join(format!("{stem}.pdf"));
                fs::write(&input, b"PK").unwrap();
                thread::spawn(move || engine.convert(&input, &output))
            })
            .collect();
        for run in runs {
            run.join().unwrap().unwrap();
        }

        let mut seen: Vec<String> = fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 2, "{seen:?}");
        assert!(seen.iter().all(|a| a.starts_with("-env:UserInstallation=file://")));
    }

    #[test]
    fn diagnostic_prefers_stderr_and_truncates() {
        assert_eq!(diagnostic("  err \n".into(), "out".into()), "err");
        assert_eq!(diagnostic("".into(), "out".into()), "out");
        let long = "x".repeat(MAX_DIAGNOSTIC_LEN + 10);
        assert!(diagnostic(long, String::new()).ends_with('…'));
    }
}
