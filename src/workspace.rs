//! Scratch-directory management: per-request file paths and their cleanup.
//!
//! Every admitted request gets a [`WorkspaceEntry`]: a random 128-bit
//! identifier and two sibling paths, `{id}.{source}` and `{id}.{target}`.
//! Identifiers are the only coordination between requests; the directory
//! itself is never locked.
//!
//! Deletion goes through [`remove_quietly`], which treats a missing file as
//! success and logs (never returns) any other failure. [`FileLease`] wraps
//! the same removal in `Drop`, so a path handed to a lease is deleted exactly
//! once on whichever exit path the owner takes: normal return, `?`, panic,
//! or the owning future being dropped mid-await.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ConvertError;

/// Suffix of an upload that is still being written.
const PARTIAL_SUFFIX: &str = "part";

/// Length of a workspace identifier (simple-format UUID, lower-case hex).
const ID_LEN: usize = 32;

/// Which files of an entry to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Input,
    Output,
    Both,
}

/// The scratch directory shared by all requests.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

/// Paths owned by one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceEntry {
    /// 32 lower-case hex digits.
    pub id: String,
    /// `{root}/{id}.{source_ext}`
    pub input: PathBuf,
    /// `{root}/{id}.{target_ext}`
    pub output: PathBuf,
}

impl WorkspaceEntry {
    /// Hand both paths to leases that delete them on drop.
    pub fn into_leases(self) -> (FileLease, FileLease) {
        (FileLease::new(self.input), FileLease::new(self.output))
    }
}

impl Workspace {
    /// Open (creating if needed) the scratch directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ConvertError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| ConvertError::Storage {
            path: root.clone(),
            source,
        })?;
        let root = root.canonicalize().map_err(|source| ConvertError::Storage {
            path: root.clone(),
            source,
        })?;
        info!("Scratch directory: {}", root.display());
        Ok(Self { root })
    }

    /// Absolute path of the scratch directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate fresh, collision-free paths for one request.
    ///
    /// Nothing is written; the only failure is a scratch directory that has
    /// disappeared or stopped being a directory since [`Workspace::open`].
    pub fn allocate(
        &self,
        source_ext: &str,
        target_ext: &str,
    ) -> Result<WorkspaceEntry, ConvertError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ConvertError::Storage {
                    path: self.root.clone(),
                    source: io::Error::from(io::ErrorKind::NotADirectory),
                })
            }
            Err(source) => {
                return Err(ConvertError::Storage {
                    path: self.root.clone(),
                    source,
                })
            }
        }

        let id = Uuid::new_v4().simple().to_string();
        let entry = WorkspaceEntry {
            input: self.root.join(format!("{id}.{source_ext}")),
            output: self.root.join(format!("{id}.{target_ext}")),
            id,
        };
        debug!("Allocated workspace entry {}", entry.id);
        Ok(entry)
    }

    /// Persist `data` to the path held by `input`.
    ///
    /// The bytes go to `{input}.part` first and are renamed into place only
    /// once fully written, so a failed write never leaves a truncated input
    /// where a converter could pick it up. Runs on the blocking pool.
    ///
    /// The lease travels with the writer and comes back on success. If the
    /// caller stops waiting, the writer still finishes and the lease is
    /// dropped with the task output, deleting the renamed file.
    pub async fn materialize(
        &self,
        input: FileLease,
        data: Bytes,
    ) -> Result<FileLease, ConvertError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> Result<FileLease, ConvertError> {
            write_staged(&root, input.path(), &data)?;
            Ok(input)
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("Upload writer panicked: {e}")))?
    }

    /// Delete the selected files of `entry`. Idempotent; never fails.
    pub fn release(&self, entry: &WorkspaceEntry, which: Release) {
        if matches!(which, Release::Input | Release::Both) {
            remove_quietly(&entry.input);
            remove_quietly(&staging_path(&entry.input));
        }
        if matches!(which, Release::Output | Release::Both) {
            remove_quietly(&entry.output);
        }
    }

    /// Delete request files left behind by a previous process.
    ///
    /// Only files whose names start with a workspace identifier are touched;
    /// anything else in the directory (including the engine's profile
    /// directory) is left alone. Returns the number of files removed.
    pub fn sweep(&self) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list scratch directory {}: {}", self.root.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name();
            if is_file && is_entry_file(&name.to_string_lossy()) && remove_quietly(&entry.path()) {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Swept {} stale file(s) from {}", removed, self.root.display());
        }
        removed
    }
}

/// A path that is deleted when the lease is dropped.
///
/// Call [`FileLease::release`] to delete early; dropping an already-released
/// lease does nothing.
#[derive(Debug)]
pub struct FileLease {
    path: PathBuf,
    armed: bool,
}

impl FileLease {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now.
    pub fn release(mut self) {
        self.armed = false;
        remove_quietly(&self.path);
    }

    /// Give up ownership without deleting; the caller has already removed
    /// the file through [`Workspace::release`].
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FileLease {
    fn drop(&mut self) {
        if self.armed {
            remove_quietly(&self.path);
        }
    }
}

/// Best-effort delete. Returns `true` if a file was actually removed.
pub fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn staging_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn write_staged(root: &Path, input: &Path, data: &[u8]) -> Result<(), ConvertError> {
    let staging = staging_path(input);

    let result = fs::File::create(&staging)
        .and_then(|mut f| f.write_all(data).and_then(|()| f.flush()))
        .and_then(|()| fs::rename(&staging, input));

    match result {
        Ok(()) => {
            debug!("Wrote {} bytes to {}", data.len(), input.display());
            Ok(())
        }
        Err(e) => {
            remove_quietly(&staging);
            Err(classify_write_error(root, e))
        }
    }
}

/// Out-of-space and vanished-directory failures are storage problems;
/// everything else is a plain I/O failure of this request.
fn classify_write_error(root: &Path, e: io::Error) -> ConvertError {
    match e.kind() {
        io::ErrorKind::StorageFull
        | io::ErrorKind::ReadOnlyFilesystem
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::NotFound => ConvertError::Storage {
            path: root.to_path_buf(),
            source: e,
        },
        _ => ConvertError::io("writing upload to scratch directory", e),
    }
}

fn is_entry_file(name: &str) -> bool {
    name.len() > ID_LEN
        && name.as_bytes()[ID_LEN] == b'.'
        && name[..ID_LEN]
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
