//! Snapshot files on disk.
//!
//! The store is persisted as one bincode-encoded [`Snapshot`] per file. Saves
//! never modify the target in place: the new content is written to a
//! temporary file in the same directory, synced, and then renamed over the
//! target, so a reader (or a restart after power loss) sees either the
//! previous complete snapshot or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::store::Snapshot;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read snapshot file '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode snapshot file '{}'", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to encode snapshot")]
    Encode(#[source] bincode::Error),
    #[error("failed to write snapshot file '{}'", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Count of snapshots that reached the disk.
///
/// Clones share the same counter, so a caller can keep one after the
/// manager has moved into the reactor.
#[derive(Debug, Clone, Default)]
pub struct DiskWrites(Arc<AtomicU64>);

impl DiskWrites {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Reads and writes the snapshot file at one fixed path.
#[derive(Debug)]
pub struct PersistenceManager {
    path: PathBuf,
    disk_writes: DiskWrites,
}

impl PersistenceManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            disk_writes: DiskWrites::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle on the number of completed saves.
    pub fn disk_writes(&self) -> DiskWrites {
        self.disk_writes.clone()
    }

    /// Reads and decodes the snapshot file.
    ///
    /// A missing file is reported as [`LoadError::Read`] like any other I/O
    /// failure; the caller decides whether that is fatal.
    pub fn load(&self) -> Result<Snapshot, LoadError> {
        let bytes = fs::read(&self.path).map_err(|source| LoadError::Read {
            path: self.path.clone(),
            source,
        })?;

        bincode::deserialize(&bytes).map_err(|source| LoadError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes `snapshot` to the configured path, atomically replacing any
    /// previous file.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SaveError> {
        let encoded = bincode::serialize(snapshot).map_err(SaveError::Encode)?;
        self.write_atomic(&encoded).map_err(|source| SaveError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.disk_writes.increment();
        debug!(
            path = %self.path.display(),
            bytes = encoded.len(),
            entries = snapshot.len(),
            "snapshot saved"
        );
        Ok(())
    }

    fn write_atomic(&self, contents: &[u8]) -> io::Result<()> {
        // The temporary file must live on the same filesystem as the target
        // for the final rename to be atomic.
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}
