use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("failed to persist counter to {path:?}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Durable running total of records committed, across process lifetimes.
/// The pipeline serializes batch commits, so implementations only need to
/// keep the read-modify-write of `increment` internally consistent.
pub trait CounterStore: Send + Sync {
    /// The last persisted total. Missing or unparseable state reads as zero.
    fn load(&self) -> u64;

    /// Add `by` to the persisted total and return the new value. A failure
    /// here means the total was not durably saved and the caller must treat
    /// the batch as uncommitted.
    fn increment(&self, by: u64) -> Result<u64, CounterError>;
}

/// A single integer persisted as plain text. Not atomic across a crash
/// mid-write; a torn file reads back as zero on the next load.
pub struct FileCounterStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reset the persisted total to zero. Destructive: this erases the
    /// cross-restart total, it is not a resume point.
    pub fn reset(&self) -> Result<(), CounterError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(0)
    }

    fn write(&self, total: u64) -> Result<(), CounterError> {
        fs::write(&self.path, total.to_string()).map_err(|source| CounterError::Persist {
            path: self.path.clone(),
            source,
        })
    }
}

impl CounterStore for FileCounterStore {
    fn load(&self) -> u64 {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|contents| contents.trim().parse().ok())
            .unwrap_or(0)
    }

    fn increment(&self, by: u64) -> Result<u64, CounterError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let total = self.load() + by;
        self.write(total)?;
        Ok(total)
    }
}

/// In-memory counter for tests and dry runs.
#[derive(Default)]
pub struct MemoryCounterStore {
    total: AtomicU64,
}

impl CounterStore for MemoryCounterStore {
    fn load(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    fn increment(&self, by: u64) -> Result<u64, CounterError> {
        Ok(self.total.fetch_add(by, Ordering::SeqCst) + by)
    }
}
