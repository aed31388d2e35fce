//! Sidecar write lock for the embedded backend.
//!
//! One writer at a time across processes. The lock file holds the owner
//! PID; a file whose owner is no longer running is stale and is cleared
//! by the doctor's fix path, never silently on acquire. The guard
//! releases on Drop so every exit path, including panics, unlocks.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BeadsError, Result};

/// External lock file name inside `.beads/`.
pub const LOCK_FILE: &str = "dolt-access.lock";

/// Holds the sidecar lock for the lifetime of a writable store handle.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Best effort; a failed unlink leaves a stale lock the doctor
        // can clear.
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquire the write lock for a workspace.
///
/// # Errors
///
/// - `DatabaseLocked` when another live process holds the lock
/// - `StaleLock` when the lock file's owner is gone (cleared via
///   `bd doctor --fix`)
pub fn acquire(beads_dir: &Path) -> Result<LockGuard> {
    let path = beads_dir.join(LOCK_FILE);

    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(file) => {
            use std::io::Write as _;
            let mut file = file;
            write!(file, "{}", std::process::id())?;
            Ok(LockGuard { path })
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            let pid = read_owner(&path).unwrap_or(0);
            if pid != 0 && pid_alive(pid) {
                Err(BeadsError::DatabaseLocked { path, pid })
            } else {
                Err(BeadsError::StaleLock { path, pid })
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// PID recorded in the lock file, if readable.
#[must_use]
pub fn read_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Whether the lock file exists but its owner is no longer running.
#[must_use]
pub fn is_stale(beads_dir: &Path) -> bool {
    let path = beads_dir.join(LOCK_FILE);
    if !path.exists() {
        return false;
    }
    read_owner(&path).map_or(true, |pid| !pid_alive(pid))
}

/// Remove a stale lock. Refuses to touch a lock held by a live process.
///
/// Returns `true` if a lock file was removed.
///
/// # Errors
///
/// Returns `DatabaseLocked` when the owner is still running, or an I/O
/// error from the unlink.
pub fn clear_stale(beads_dir: &Path) -> Result<bool> {
    let path = beads_dir.join(LOCK_FILE);
    if !path.exists() {
        return Ok(false);
    }
    if let Some(pid) = read_owner(&path) {
        if pid_alive(pid) {
            return Err(BeadsError::DatabaseLocked { path, pid });
        }
    }
    fs::remove_file(&path)?;
    Ok(true)
}

/// Process-existence check; no timers involved.
#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Without procfs there is no cheap liveness probe; treat the owner as
/// alive so we never clear a lock that might still be held.
#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    true
}
