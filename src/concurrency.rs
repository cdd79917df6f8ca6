//! Cooperative, file-backed admission control across engine processes.
//!
//! There are `max_concurrent` numbered slot files. A run tries each in order
//! with a non-blocking exclusive advisory lock and keeps the first one it
//! gets. When every slot is held the run is simply not admitted; nothing
//! queues and nothing blocks.

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::ConcurrencyError;

/// Owner metadata written into a held slot file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotOwner {
    pub pid: u32,
    pub acquired_at: String,
    pub slot: usize,
}

struct HeldSlot {
    index: usize,
    path: PathBuf,
    file: File,
}

/// Limits how many pipeline runs execute at once.
pub struct ConcurrencyGate {
    lock_dir: PathBuf,
    max_concurrent: usize,
    held: Option<HeldSlot>,
}

impl ConcurrencyGate {
    pub fn new(lock_dir: impl Into<PathBuf>, max_concurrent: usize) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            max_concurrent,
            held: None,
        }
    }

    pub fn slot_path(&self, index: usize) -> PathBuf {
        self.lock_dir.join(format!("run_slot_{}.lock", index))
    }

    /// Index of the held slot, if any.
    pub fn held_slot(&self) -> Option<usize> {
        self.held.as_ref().map(|h| h.index)
    }

    /// Try to take a free slot. Returns `Ok(false)` when all slots are busy.
    ///
    /// Calling this while already holding a slot is a no-op that returns `true`.
    pub fn acquire(&mut self) -> Result<bool, ConcurrencyError> {
        if self.held.is_some() {
            return Ok(true);
        }
        std::fs::create_dir_all(&self.lock_dir).map_err(|source| ConcurrencyError::LockDir {
            path: self.lock_dir.clone(),
            source,
        })?;

        for index in 0..self.max_concurrent {
            let path = self.slot_path(index);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|source| ConcurrencyError::SlotOpen {
                    path: path.clone(),
                    source,
                })?;

            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    write_owner(&file, &path, index)?;
                    info!(slot = index, path = %path.display(), "Acquired run slot");
                    self.held = Some(HeldSlot { index, path, file });
                    return Ok(true);
                }
                Err(e) if is_contended(&e) => {
                    debug!(slot = index, "Run slot busy");
                }
                Err(e) => {
                    warn!(slot = index, error = %e, "Run slot lock failed, trying next");
                }
            }
        }

        warn!(
            max_concurrent = self.max_concurrent,
            "All run slots busy, run not admitted"
        );
        Ok(false)
    }

    /// Unlock and close the held slot. Safe to call repeatedly or without a slot.
    pub fn release(&mut self) {
        if let Some(held) = self.held.take() {
            if let Err(e) = FileExt::unlock(&held.file) {
                warn!(slot = held.index, error = %e, "Failed to unlock run slot");
            }
            info!(slot = held.index, path = %held.path.display(), "Released run slot");
        }
    }

    /// Read owner metadata from a slot file, if present and parseable.
    pub fn read_owner(path: &Path) -> Option<SlotOwner> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(content.trim()).ok()
    }
}

impl Drop for ConcurrencyGate {
    fn drop(&mut self) {
        self.release();
    }
}

/// A held slot. Released when dropped, on every exit path.
pub struct SlotGuard {
    gate: ConcurrencyGate,
}

impl SlotGuard {
    /// Take a slot from `gate`, or `None` when the run is not admitted.
    pub fn acquire(mut gate: ConcurrencyGate) -> Result<Option<Self>, ConcurrencyError> {
        if gate.acquire()? {
            Ok(Some(Self { gate }))
        } else {
            Ok(None)
        }
    }

    pub fn slot(&self) -> Option<usize> {
        self.gate.held_slot()
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn write_owner(mut file: &File, path: &Path, slot: usize) -> Result<(), ConcurrencyError> {
    let owner = SlotOwner {
        pid: std::process::id(),
        acquired_at: Utc::now().to_rfc3339(),
        slot,
    };
    let body = serde_json::to_string(&owner).unwrap_or_default();
    let to_err = |source| ConcurrencyError::OwnerWrite {
        path: path.to_path_buf(),
        source,
    };
    file.set_len(0).map_err(to_err)?;
    file.seek(SeekFrom::Start(0)).map_err(to_err)?;
    file.write_all(body.as_bytes()).map_err(to_err)?;
    file.flush().map_err(to_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_two_acquire_third_rejected() {
        let dir = tempdir().unwrap();
        let mut a = ConcurrencyGate::new(dir.path(), 2);
        let mut b = ConcurrencyGate::new(dir.path(), 2);
        let mut c = ConcurrencyGate::new(dir.path(), 2);

        assert!(a.acquire().unwrap());
        assert!(b.acquire().unwrap());
        assert!(!c.acquire().unwrap());
        assert_eq!(a.held_slot(), Some(0));
        assert_eq!(b.held_slot(), Some(1));
        assert_eq!(c.held_slot(), None);
    }

    #[test]
    fn test_release_frees_slot_for_next_acquire() {
        let dir = tempdir().unwrap();
        let mut a = ConcurrencyGate::new(dir.path(), 2);
        let mut b = ConcurrencyGate::new(dir.path(), 2);
        let mut c = ConcurrencyGate::new(dir.path(), 2);
        assert!(a.acquire().unwrap());
        assert!(b.acquire().unwrap());
        assert!(!c.acquire().unwrap());

        a.release();
        assert!(c.acquire().unwrap());
        assert_eq!(c.held_slot(), Some(0));
    }

    #[test]
    fn test_release_is_idempotent_and_safe_without_acquire() {
        let dir = tempdir().unwrap();
        let mut gate = ConcurrencyGate::new(dir.path(), 1);
        gate.release();
        assert!(gate.acquire().unwrap());
        gate.release();
        gate.release();
        assert_eq!(gate.held_slot(), None);
    }

    #[test]
    fn test_drop_releases_slot() {
        let dir = tempdir().unwrap();
        {
            let mut gate = ConcurrencyGate::new(dir.path(), 1);
            assert!(gate.acquire().unwrap());
        }
        let mut next = ConcurrencyGate::new(dir.path(), 1);
        assert!(next.acquire().unwrap());
    }

    #[test]
    fn test_acquire_twice_keeps_same_slot() {
        let dir = tempdir().unwrap();
        let mut gate = ConcurrencyGate::new(dir.path(), 2);
        assert!(gate.acquire().unwrap());
        assert!(gate.acquire().unwrap());
        assert_eq!(gate.held_slot(), Some(0));
        let mut other = ConcurrencyGate::new(dir.path(), 2);
        assert!(other.acquire().unwrap());
        assert_eq!(other.held_slot(), Some(1));
    }

    #[test]
    fn test_owner_metadata_written() {
        let dir = tempdir().unwrap();
        let mut gate = ConcurrencyGate::new(dir.path().join("locks"), 2);
        assert!(gate.acquire().unwrap());
        let owner = ConcurrencyGate::read_owner(&gate.slot_path(0)).unwrap();
        assert_eq!(owner.pid, std::process::id());
        assert_eq!(owner.slot, 0);
        assert!(!owner.acquired_at.is_empty());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let dir = tempdir().unwrap();
        let guard = SlotGuard::acquire(ConcurrencyGate::new(dir.path(), 1))
            .unwrap()
            .unwrap();
        assert_eq!(guard.slot(), Some(0));
        assert!(SlotGuard::acquire(ConcurrencyGate::new(dir.path(), 1)).unwrap().is_none());

        drop(guard);
        assert!(SlotGuard::acquire(ConcurrencyGate::new(dir.path(), 1)).unwrap().is_some());
    }

    #[test]
    fn test_zero_slots_never_admits() {
        let dir = tempdir().unwrap();
        let mut gate = ConcurrencyGate::new(dir.path(), 0);
        assert!(!gate.acquire().unwrap());
    }
}
