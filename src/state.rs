//! Index-state side file and the rebuild lock.
//!
//! The side file records which corpus digest produced which collection. It
//! is written as JSON through a temporary file and a rename, so readers see
//! either the previous state or the new one. Older deployments wrote a bare
//! digest as plain text; that form is still accepted on read.
//!
//! The rebuild lock is an exclusive advisory lock on a file next to the
//! side file. It is held across check-then-rebuild so two processes never
//! rebuild the same collection concurrently.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::models::IndexState;

/// Read the side file.
///
/// Returns `None` when the file is missing, unreadable or unparseable;
/// each of those means the collection cannot be vouched for. A legacy
/// plain-digest file is attributed to `collection`.
pub fn read_state(path: &Path, collection: &str) -> Option<IndexState> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "state file issue, rebuilding");
            return None;
        }
    };

    let trimmed = content.trim();
    if is_bare_digest(trimmed) {
        debug!(path = %path.display(), "read legacy plain-text state file");
        return Some(IndexState {
            digest: trimmed.to_string(),
            collection: collection.to_string(),
            document_count: 0,
            chunk_count: 0,
            built_at: None,
        });
    }

    match serde_json::from_str::<IndexState>(trimmed) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "state file issue, rebuilding");
            None
        }
    }
}

/// Atomically replace the side file with `state`.
pub fn write_state(path: &Path, state: &IndexState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let bytes = serde_json::to_vec_pretty(state)?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn is_bare_digest(s: &str) -> bool {
    !s.is_empty() && s.len() <= 128 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Path of the lock file guarding `state_file`.
pub fn lock_path_for(state_file: &Path) -> PathBuf {
    state_file.with_extension("lock")
}

/// Held exclusive lock; released on drop.
pub struct RebuildLock {
    file: File,
    path: PathBuf,
}

impl RebuildLock {
    /// Block until the lock next to `state_file` is acquired.
    pub async fn acquire(state_file: &Path) -> Result<Self> {
        if let Some(lock) = Self::try_acquire(state_file)? {
            return Ok(lock);
        }

        let path = lock_path_for(state_file);
        info!(path = %path.display(), "waiting for another rebuild to finish");
        tokio::task::spawn_blocking(move || -> Result<RebuildLock> {
            let file = open_lock_file(&path)?;
            let start = Instant::now();
            file.lock_exclusive()
                .with_context(|| format!("acquire rebuild lock {}", path.display()))?;
            debug!(
                path = %path.display(),
                wait_ms = start.elapsed().as_millis() as u64,
                "rebuild lock acquired"
            );

            Ok(RebuildLock { file, path })
        })
        .await
        .context("join rebuild lock task")?
    }

    /// Take the lock only if nobody else holds it. `Ok(None)` means the lock
    /// is contended; any other failure is an error.
    pub fn try_acquire(state_file: &Path) -> Result<Option<Self>> {
        let path = lock_path_for(state_file);
        let file = open_lock_file(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "rebuild lock acquired");
                Ok(Some(RebuildLock { file, path }))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("acquire rebuild lock {}", path.display()))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("open rebuild lock {}", path.display()))
}

fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error().is_some()
        && err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for RebuildLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
