//! Per-record advisory locks.
//!
//! Each record directory carries a `.lock` file. Readers take a shared
//! `flock`, writers an exclusive one. Acquisition blocks without timeout.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::fcntl::{flock, FlockArg};

/// Lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many holders at once.
    Shared,
    /// A single holder excluding all others.
    Exclusive,
}

/// A held record lock, released on drop.
#[derive(Debug)]
pub struct RecordLock {
    file: File,
}

impl RecordLock {
    /// Block until the lock at `path` is held in `mode`.
    ///
    /// A record deleted while we waited leaves us holding an unlinked lock
    /// file; if the path was recreated in the meantime we retry on the new
    /// file so that we serialize with its other lockers.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error. `NotFound` means the record
    /// directory does not exist.
    pub fn acquire(path: &Path, mode: LockMode) -> io::Result<Self> {
        let arg = match mode {
            LockMode::Shared => FlockArg::LockShared,
            LockMode::Exclusive => FlockArg::LockExclusive,
        };

        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;
            flock(file.as_raw_fd(), arg).map_err(io::Error::from)?;

            let held = file.metadata()?;
            match fs::metadata(path) {
                Ok(current) if current.ino() == held.ino() && current.dev() == held.dev() => {
                    return Ok(Self { file });
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self { file }),
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        let _ = flock(self.file.as_raw_fd(), FlockArg::Unlock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn shared_locks_coexist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        let a = RecordLock::acquire(&path, LockMode::Shared).unwrap();
        let b = RecordLock::acquire(&path, LockMode::Shared).unwrap();
        drop((a, b));
    }

    #[test]
    fn exclusive_blocks_until_released() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        let held = RecordLock::acquire(&path, LockMode::Exclusive).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter_path = path.clone();
        let waiter = thread::spawn(move || {
            let _lock = RecordLock::acquire(&waiter_path, LockMode::Shared).unwrap();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
        drop(held);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = RecordLock::acquire(&dir.path().join("gone/.lock"), LockMode::Shared)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
