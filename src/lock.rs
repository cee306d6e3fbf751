//! Expansion lock collaborator.
//!
//! Growth and size discovery are serialized through an advisory lock that
//! lives outside this crate's control. The store only ever takes it in shared
//! mode, around its size resynchronization; callers that grow the store hold
//! it exclusively around [`Store::expand`](crate::Store::expand).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::Mutex;

/// Lock mode for the expansion lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Size discovery; many holders.
    Shared,
    /// Growth; one holder.
    Exclusive,
}

/// Acquire and release the expansion lock.
pub trait ExpansionLock: Send + Sync {
    /// Block until the lock is held in `mode`.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the lock implementation.
    fn lock_expand(&self, mode: LockMode) -> io::Result<()>;

    /// Release a lock previously taken in `mode`.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the lock implementation. The hold is
    /// considered released either way.
    fn unlock_expand(&self, mode: LockMode) -> io::Result<()>;
}

/// RAII holder for the expansion lock; releases on drop.
#[must_use = "the lock is released when the guard is dropped"]
pub struct ExpansionGuard<'a> {
    lock: &'a dyn ExpansionLock,
    mode: LockMode,
}

impl<'a> ExpansionGuard<'a> {
    /// Take `lock` in `mode`.
    ///
    /// # Errors
    ///
    /// Returns the error reported by `lock_expand`.
    pub fn acquire(lock: &'a dyn ExpansionLock, mode: LockMode) -> io::Result<Self> {
        lock.lock_expand(mode)?;
        Ok(Self { lock, mode })
    }

    /// Mode the lock is held in.
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for ExpansionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock_expand(self.mode) {
            log::debug!(target: "tdb_io", "expansion lock release ({:?}) failed: {e}", self.mode);
        }
    }
}

/// No-op lock for memory-only stores or single-process use without locking.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLock;

impl ExpansionLock for NoLock {
    fn lock_expand(&self, _mode: LockMode) -> io::Result<()> {
        Ok(())
    }

    fn unlock_expand(&self, _mode: LockMode) -> io::Result<()> {
        Ok(())
    }
}

/// Advisory lock on a side file, shared between processes.
///
/// The lock file is created if missing and is never written to. Holds taken
/// through one instance nest: a shared request while the instance already
/// holds the lock exclusively is satisfied without touching the file, and the
/// file lock is only dropped when the last hold goes.
#[derive(Debug)]
pub struct FileExpansionLock {
    file: File,
    path: PathBuf,
    holds: Mutex<Vec<LockMode>>,
}

fn strongest(holds: &[LockMode]) -> Option<LockMode> {
    if holds.contains(&LockMode::Exclusive) {
        Some(LockMode::Exclusive)
    } else if holds.is_empty() {
        None
    } else {
        Some(LockMode::Shared)
    }
}

impl FileExpansionLock {
    /// Open (creating if needed) the lock file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the error from opening the file.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            holds: Mutex::new(Vec::new()),
        })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode the file lock is currently held in by this instance.
    #[must_use]
    pub fn held(&self) -> Option<LockMode> {
        strongest(&self.holds.lock())
    }

    fn flock(&self, mode: LockMode) -> io::Result<()> {
        match mode {
            LockMode::Shared => FileExt::lock_shared(&self.file),
            LockMode::Exclusive => FileExt::lock_exclusive(&self.file),
        }
    }
}

impl ExpansionLock for FileExpansionLock {
    fn lock_expand(&self, mode: LockMode) -> io::Result<()> {
        let mut holds = self.holds.lock();
        let covered = matches!(
            (strongest(&holds), mode),
            (Some(LockMode::Exclusive), _) | (Some(LockMode::Shared), LockMode::Shared)
        );
        if !covered {
            // first hold, or an upgrade from shared
            self.flock(mode)?;
        }
        holds.push(mode);
        Ok(())
    }

    fn unlock_expand(&self, mode: LockMode) -> io::Result<()> {
        let mut holds = self.holds.lock();
        let before = strongest(&holds);
        if let Some(i) = holds.iter().rposition(|&m| m == mode) {
            holds.remove(i);
        }
        match (before, strongest(&holds)) {
            (Some(_), None) => FileExt::unlock(&self.file),
            (Some(LockMode::Exclusive), Some(LockMode::Shared)) => self.flock(LockMode::Shared),
            _ => Ok(()),
        }
    }
}
