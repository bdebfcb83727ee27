//! Single-instance lock file shared by the daemon and one-shot commands.

use crate::error::{EvolutionError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Exclusivity marker. The file holds the owner's PID and is removed when
/// the guard is released or dropped.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    released: bool,
}

impl InstanceLock {
    /// `Ok(None)` when another live process holds the lock.
    pub fn try_acquire(path: impl AsRef<Path>) -> io::Result<Option<Self>> {
        Self::open_with(path.as_ref(), |file| write!(file, "{}", std::process::id()))
    }

    /// Like [`try_acquire`](Self::try_acquire), but a held lock is an error.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Self::try_acquire(path)? {
            Some(lock) => Ok(lock),
            None => Err(EvolutionError::PersistenceUnavailable(format!(
                "another instance holds {}",
                path.display()
            ))),
        }
    }

    fn open_with<W>(path: &Path, write_owner: W) -> io::Result<Option<Self>>
    where
        W: Fn(&mut File) -> io::Result<()>,
    {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // second pass only after a stale lock was removed
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    if let Err(e) = write_owner(&mut file) {
                        drop(file);
                        // an ownerless file would never be detected as stale
                        if let Err(remove_err) = fs::remove_file(path) {
                            error!(
                                path = %path.display(),
                                error = %remove_err,
                                "failed to remove half-written lock"
                            );
                        }
                        return Err(e);
                    }
                    return Ok(Some(Self {
                        path: path.to_path_buf(),
                        released: false,
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !is_stale(path) {
                        return Ok(None);
                    }
                    warn!(path = %path.display(), "removing stale lock");
                    fs::remove_file(path)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                error!(path = %self.path.display(), error = %e, "failed to release lock");
            }
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.remove();
    }
}

/// A lock whose recorded PID no longer exists. Only detectable where
/// `/proc` is available; elsewhere every lock is treated as live.
fn is_stale(path: &Path) -> bool {
    let Ok(contents) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(pid) = contents.trim().parse::<u32>() else {
        return false;
    };
    if pid == std::process::id() {
        return false;
    }
    cfg!(target_os = "linux") && !Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let first = InstanceLock::try_acquire(&path).unwrap().unwrap();
        assert!(path.exists());
        assert!(InstanceLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(!path.exists());
        let again = InstanceLock::try_acquire(&path).unwrap().unwrap();
        again.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_acquire_reports_held_lock_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let held = InstanceLock::acquire(&path).unwrap();
        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, EvolutionError::PersistenceUnavailable(_)));
        assert!(!err.is_fatal());

        held.release();
        InstanceLock::acquire(&path).unwrap().release();
    }

    #[test]
    fn test_failed_owner_write_leaves_no_lock_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let result = InstanceLock::open_with(&path, |_| {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });
        assert!(result.is_err());
        assert!(!path.exists());

        let lock = InstanceLock::try_acquire(&path).unwrap();
        assert!(lock.is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_stale_lock_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        // pid_max is at most 2^22 on Linux
        fs::write(&path, "4294967").unwrap();

        let lock = InstanceLock::try_acquire(&path).unwrap().unwrap();
        let owner = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(owner, std::process::id().to_string());
    }
}
