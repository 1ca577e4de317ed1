//! # Data Directory Lock
//!
//! Prevents two gateway processes from opening the same data directory.
//! Uses `fs2` (flock on Unix, LockFile on Windows).

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default time to wait for a competing process to release the lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from data directory locking.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to create lock file: {0}")]
    CreateFailed(#[source] io::Error),

    #[error("Data directory already in use ({}), holder pid {pid:?}", .path.display())]
    AlreadyLocked { pid: Option<u32>, path: PathBuf },

    #[error("Failed to write PID to lock file: {0}")]
    WriteFailed(#[source] io::Error),
}

/// Exclusive lock on a data directory, released on drop.
pub struct DatabaseLock {
    file: File,
    path: PathBuf,
    pid: u32,
}

impl DatabaseLock {
    const LOCK_FILE: &'static str = "LOCK";

    /// Acquire the lock, waiting up to [`DEFAULT_LOCK_TIMEOUT`].
    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        Self::acquire_with_timeout(data_dir, DEFAULT_LOCK_TIMEOUT)
    }

    /// Acquire the lock, retrying with exponential backoff until `timeout`.
    ///
    /// A lock file left by a process that no longer runs is reclaimed.
    pub fn acquire_with_timeout(data_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        std::fs::create_dir_all(data_dir).map_err(LockError::CreateFailed)?;
        let deadline = Instant::now() + timeout;
        let lock_path = data_dir.join(Self::LOCK_FILE);
        let mut retry_delay = Duration::from_millis(20);

        loop {
            // Not truncated before locking: the holder's PID must stay readable.
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)
                .map_err(LockError::CreateFailed)?;

            if file.try_lock_exclusive().is_ok() {
                let pid = std::process::id();
                let mut file = file;
                file.set_len(0).map_err(LockError::WriteFailed)?;
                writeln!(file, "{}", pid).map_err(LockError::WriteFailed)?;
                file.sync_all().map_err(LockError::WriteFailed)?;
                tracing::debug!("[msh-01] acquired data directory lock {}", lock_path.display());
                return Ok(Self {
                    file,
                    path: lock_path,
                    pid,
                });
            }
            drop(file);

            let holder = read_pid(&lock_path);
            if let Some(pid) = holder {
                if pid != std::process::id() && !is_process_running(pid) {
                    tracing::warn!("[msh-01] reclaiming lock left by dead process {}", pid);
                    let _ = std::fs::remove_file(&lock_path);
                    continue;
                }
            }

            if Instant::now() >= deadline {
                return Err(LockError::AlreadyLocked {
                    pid: holder,
                    path: lock_path,
                });
            }
            std::thread::sleep(retry_delay);
            retry_delay = (retry_delay * 2).min(Duration::from_millis(500));
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        #[allow(clippy::incompatible_msrv)]
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

fn is_process_running(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new(&format!("/proc/{}", pid)).exists()
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_writes_pid() {
        let dir = tempfile::tempdir().unwrap();

        let lock = DatabaseLock::acquire(dir.path()).expect("should acquire");
        let stored: u32 = std::fs::read_to_string(lock.path())
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(stored, std::process::id());
        assert_eq!(lock.pid(), stored);
    }

    #[test]
    fn test_second_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let _held = DatabaseLock::acquire(dir.path()).unwrap();

        let result = DatabaseLock::acquire_with_timeout(dir.path(), Duration::from_millis(100));
        assert!(matches!(result, Err(LockError::AlreadyLocked { pid: Some(_), .. })));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = DatabaseLock::acquire(dir.path()).unwrap();
        }
        assert!(DatabaseLock::acquire_with_timeout(dir.path(), Duration::from_millis(100)).is_ok());
    }
}
