//! Cross-process mutual exclusion for the settings cache.
//!
//! Uses an advisory OS file lock on a dedicated lock file. The OS drops the
//! lock when the holder exits, so a crashed host never leaves the cache
//! locked. The lock is per open file handle: two handles in one process
//! exclude each other just as two processes do.

use crate::ConfigError;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Pause between attempts in [`InterProcessLock::acquire`].
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// A named lock shared by every process that opens the same path.
#[derive(Debug, Clone)]
pub struct InterProcessLock {
    path: PathBuf,
}

impl InterProcessLock {
    /// A lock on `path`. Nothing is touched until it is acquired.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One attempt, never blocks.
    ///
    /// # Errors
    ///
    /// [`ConfigError::LockUnavailable`] if someone else holds it,
    /// [`ConfigError::Lock`] if the lock file cannot be opened or locked.
    pub fn try_acquire(&self) -> Result<LockGuard, ConfigError> {
        if let Some(parent) = self.path.parent() {
            crate::paths::ensure_dir(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| ConfigError::Lock {
                path: self.path.clone(),
                source,
            })?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(ConfigError::LockUnavailable {
                    path: self.path.clone(),
                });
            }
            Err(TryLockError::Error(source)) => {
                return Err(ConfigError::Lock {
                    path: self.path.clone(),
                    source,
                });
            }
        }
        let mut guard = LockGuard {
            file,
            path: self.path.clone(),
        };
        guard.record_owner();
        Ok(guard)
    }

    /// Retries [`try_acquire`](Self::try_acquire) until `timeout` elapses.
    ///
    /// Control thread only: this sleeps between attempts.
    pub fn acquire(&self, timeout: Duration) -> Result<LockGuard, ConfigError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_acquire() {
                Err(ConfigError::LockUnavailable { .. }) if Instant::now() < deadline => {
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), error = %err, "settings lock not acquired");
                    return Err(err);
                }
                Ok(guard) => return Ok(guard),
            }
        }
    }
}

/// Holds the lock until dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Path of the held lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the holder's pid into the lock file for diagnostics.
    fn record_owner(&mut self) {
        let written = self
            .file
            .set_len(0)
            .and_then(|()| writeln!(self.file, "{}", std::process::id()));
        if let Err(err) = written {
            tracing::debug!(path = %self.path.display(), error = %err, "lock owner not recorded");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release settings lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let lock = InterProcessLock::new(tmp.path().join(".lock"));
        let guard = lock.try_acquire().unwrap();
        let err = InterProcessLock::new(lock.path()).try_acquire().unwrap_err();
        assert!(matches!(err, ConfigError::LockUnavailable { .. }));
        drop(guard);
        assert!(lock.try_acquire().is_ok());
    }

    #[test]
    fn acquire_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let lock = InterProcessLock::new(tmp.path().join(".lock"));
        let _guard = lock.try_acquire().unwrap();
        let start = Instant::now();
        let err = lock.acquire(Duration::from_millis(30)).unwrap_err();
        assert!(err.is_lock_failure());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn acquire_waits_for_release() {
        let tmp = tempfile::tempdir().unwrap();
        let lock = InterProcessLock::new(tmp.path().join(".lock"));
        let guard = lock.try_acquire().unwrap();
        let waiter = {
            let lock = lock.clone();
            std::thread::spawn(move || lock.acquire(Duration::from_secs(5)).is_ok())
        };
        std::thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn creates_missing_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join(".lock");
        let guard = InterProcessLock::new(&path).try_acquire().unwrap();
        assert_eq!(guard.path(), path);
        let pid = std::fs::read_to_string(&path).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }
}
