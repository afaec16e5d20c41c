//! Single-instance guard.
//!
//! Two processes polling updates for the same bot would answer every
//! command twice, so startup takes an exclusive lock file next to the
//! session and refuses to run while the pid recorded in it is alive.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "Another instance is already running (lock file {path} held by pid {pid}). \
         Delete the file if that process is gone."
    )]
    AlreadyRunning { path: PathBuf, pid: String },

    #[error("Failed to create lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lock file removed again on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Lock file path used for a session file.
    #[must_use]
    pub fn path_for(session_path: &Path) -> PathBuf {
        let mut name = session_path.file_name().map(ToOwned::to_owned).unwrap_or_default();
        name.push(".lock");
        session_path.with_file_name(name)
    }

    /// Creates the lock file, failing if a live process holds it.
    ///
    /// A lock left behind by a process that no longer exists is taken over.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();

        match Self::create(&path) {
            Err(LockError::AlreadyRunning { pid, .. }) if !pid_alive(&pid) => {
                warn!("Removing stale lock {} left by pid {}", path.display(), pid);
                fs::remove_file(&path).map_err(|source| LockError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::create(&path)
            }
            other => other,
        }
    }

    fn create(path: &Path) -> Result<Self, LockError> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", std::process::id()) {
                    warn!("Could not write pid to {}: {}", path.display(), e);
                }
                debug!("Acquired instance lock {}", path.display());
                Ok(Self { path: path.to_owned() })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let pid = fs::read_to_string(path)
                    .map(|s| s.trim().to_owned())
                    .unwrap_or_else(|_| "unknown".to_owned());
                Err(LockError::AlreadyRunning {
                    path: path.to_owned(),
                    pid,
                })
            }
            Err(source) => Err(LockError::Io {
                path: path.to_owned(),
                source,
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether the recorded pid may still be running.
///
/// Unreadable pids count as alive; liveness is only checked on Linux.
fn pid_alive(pid: &str) -> bool {
    let Ok(pid) = pid.parse::<u32>() else {
        return true;
    };
    if pid == std::process::id() {
        return true;
    }
    if cfg!(target_os = "linux") {
        Path::new("/proc").join(pid.to_string()).exists()
    } else {
        true
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_lock(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("diagnosis_bot_{}_{name}.lock", std::process::id()));
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn test_second_acquire_fails() {
        let path = temp_lock("second");
        let first = InstanceLock::acquire(&path).unwrap();

        let err = InstanceLock::acquire(&path).unwrap_err();
        match err {
            LockError::AlreadyRunning { pid, .. } => assert_eq!(pid, std::process::id().to_string()),
            other => panic!("unexpected error: {other}"),
        }

        drop(first);
        assert!(!path.exists());
        assert!(InstanceLock::acquire(&path).is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_stale_lock_is_taken_over() {
        let path = temp_lock("stale");
        fs::write(&path, "4294967295\n").unwrap();

        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
        assert_eq!(
            fs::read_to_string(&path).unwrap().trim(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_unreadable_pid_is_respected() {
        let path = temp_lock("garbage");
        fs::write(&path, "not a pid").unwrap();

        assert!(matches!(
            InstanceLock::acquire(&path),
            Err(LockError::AlreadyRunning { .. })
        ));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_path_for_session() {
        assert_eq!(
            InstanceLock::path_for(Path::new("data/bot.session")),
            PathBuf::from("data/bot.session.lock")
        );
    }
}
