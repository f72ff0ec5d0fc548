//! # Workspace Lock
//!
//! Cross-process mutual exclusion for everything that mutates the wallet
//! directory or the status list. Two CI runs processing requests at the same
//! time would otherwise both read `next_index`, allocate the same status bit
//! and publish conflicting lists.
//!
//! The lock is a file created with `OpenOptions::create_new`, which fails
//! atomically if the file already exists. The holder writes a JSON record
//! with its pid and acquisition time; dropping the guard deletes the file.
//!
//! ## Stale Locks
//!
//! A writer killed before its guard drops leaves the file behind. A waiter
//! treats the lock as stale when the recorded pid is known to be dead, or,
//! when liveness cannot be checked, when the lock is older than
//! [`STALE_AFTER`]. A stale lock is broken by renaming it aside first, so
//! two waiters cannot both delete it and a fresh lock taken in between is
//! put back.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::temporal::Timestamp;

/// Interval between acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Age after which a lock whose holder cannot be checked is considered
/// abandoned.
pub const STALE_AFTER: Duration = Duration::from_secs(600);

/// Contents of the lock file.
#[derive(Debug, Serialize, Deserialize)]
struct Holder {
    pid: u32,
    acquired_at: Timestamp,
}

/// An acquired workspace lock. Released on drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
}

impl WorkspaceLock {
    /// Acquire the lock at `path`, retrying until `timeout` elapses. A stale
    /// lock left by a dead writer is broken instead of waited on.
    ///
    /// # Errors
    ///
    /// [`StorageError::LockTimeout`] if another holder keeps the lock for the
    /// whole timeout, [`StorageError::Io`] for any other filesystem failure.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let start = Instant::now();
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(mut f) => {
                    let holder = Holder {
                        pid: std::process::id(),
                        acquired_at: Timestamp::now(),
                    };
                    let record =
                        serde_json::to_vec(&holder).map_err(|e| StorageError::json(path, e))?;
                    f.write_all(&record)
                        .map_err(|e| StorageError::io(path, e))?;
                    tracing::debug!(lock = %path.display(), "workspace lock acquired");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if break_if_stale(path)? {
                        continue;
                    }
                    if start.elapsed() >= timeout {
                        let holder = fs::read_to_string(path)
                            .map(|s| s.trim().to_string())
                            .unwrap_or_else(|_| "unknown".to_string());
                        return Err(StorageError::LockTimeout {
                            path: path.to_path_buf(),
                            waited_ms: u64::try_from(start.elapsed().as_millis())
                                .unwrap_or(u64::MAX),
                            holder,
                        });
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(StorageError::io(path, e)),
            }
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release workspace lock");
        } else {
            tracing::debug!(lock = %self.path.display(), "workspace lock released");
        }
    }
}

// ---------------------------------------------------------------------------
// Stale lock recovery
// ---------------------------------------------------------------------------

/// Whether the pid is running. `None` where that cannot be checked.
#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> Option<bool> {
    Some(Path::new("/proc").join(pid.to_string()).exists())
}

#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> Option<bool> {
    None
}

fn is_stale(path: &Path, raw: &str) -> Result<bool, StorageError> {
    let age = match serde_json::from_str::<Holder>(raw) {
        Ok(holder) => {
            if let Some(alive) = pid_alive(holder.pid) {
                return Ok(!alive);
            }
            let secs = Timestamp::now().epoch_secs() - holder.acquired_at.epoch_secs();
            Duration::from_secs(u64::try_from(secs).unwrap_or(0))
        }
        // Empty or foreign contents: a writer died between creating the
        // file and recording itself. Fall back to the file's age.
        Err(_) => {
            let modified = fs::metadata(path)
                .and_then(|m| m.modified())
                .map_err(|e| StorageError::io(path, e))?;
            SystemTime::now().duration_since(modified).unwrap_or_default()
        }
    };
    Ok(age >= STALE_AFTER)
}

/// Break the lock at `path` if its holder is gone. Returns `true` when the
/// caller should retry immediately.
fn break_if_stale(path: &Path) -> Result<bool, StorageError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    match is_stale(path, &raw) {
        Ok(true) => {}
        Ok(false) => return Ok(false),
        Err(StorageError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            return Ok(true)
        }
        Err(e) => return Err(e),
    }

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".stale-{}-{nanos}", std::process::id()));
    let aside = PathBuf::from(aside);
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(StorageError::io(path, e)),
    }
    let taken = fs::read_to_string(&aside).unwrap_or_default();
    let broke = taken == raw;
    if !broke {
        // A live writer replaced the stale file between the read and the
        // rename. Hand its lock back; `hard_link` fails if the path is taken.
        if let Err(e) = fs::hard_link(&aside, path) {
            tracing::warn!(lock = %path.display(), error = %e, "could not restore a live workspace lock");
        }
    }
    if let Err(e) = fs::remove_file(&aside) {
        tracing::warn!(lock = %aside.display(), error = %e, "failed to remove broken lock");
    }
    if broke {
        tracing::warn!(lock = %path.display(), holder = %raw.trim(), "broke stale workspace lock");
    }
    Ok(broke)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".obadge.lock");
        {
            let lock = WorkspaceLock::acquire(&path, Duration::from_millis(100)).unwrap();
            assert!(lock.path().exists());
            let holder: Holder = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
            assert_eq!(holder.pid, std::process::id());
        }
        assert!(!path.exists());
    }

    #[test]
    fn second_acquire_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".obadge.lock");
        let _held = WorkspaceLock::acquire(&path, Duration::from_millis(100)).unwrap();
        match WorkspaceLock::acquire(&path, Duration::from_millis(120)) {
            Err(StorageError::LockTimeout { waited_ms, holder, .. }) => {
                assert!(waited_ms >= 120);
                assert!(holder.contains("pid"));
            }
            other => panic!("expected LockTimeout, got {other:?}"),
        }
    }

    #[test]
    fn waiter_gets_lock_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".obadge.lock");
        let held = WorkspaceLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let p2 = path.clone();
        let waiter = std::thread::spawn(move || {
            WorkspaceLock::acquire(&p2, Duration::from_secs(5)).map(|_| ())
        });
        std::thread::sleep(Duration::from_millis(150));
        drop(held);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn lock_of_dead_writer_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".obadge.lock");
        // No such pid, and old enough to count as stale where liveness
        // cannot be checked.
        fs::write(&path, r#"{"pid":4294967294,"acquired_at":"2020-01-01T00:00:00Z"}"#).unwrap();
        let lock = WorkspaceLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let holder: Holder = serde_json::from_str(&fs::read_to_string(lock.path()).unwrap()).unwrap();
        assert_eq!(holder.pid, std::process::id());
        drop(lock);
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn live_holder_is_not_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".obadge.lock");
        let record = serde_json::to_string(&Holder {
            pid: std::process::id(),
            acquired_at: Timestamp::now(),
        })
        .unwrap();
        fs::write(&path, &record).unwrap();
        assert!(!break_if_stale(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), record);
    }

    #[test]
    fn fresh_unreadable_lock_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".obadge.lock");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            WorkspaceLock::acquire(&path, Duration::from_millis(60)),
            Err(StorageError::LockTimeout { .. })
        ));
    }
}
