//! Artifact cache for the build worker
//!
//! Finished artifacts live as flat files in one cache directory, named by
//! [`ArtifactKey::file_name`]. Entries are created once by atomic rename and
//! never rewritten; the only way they disappear is an eviction pass (or an
//! administrator).
//!
//! ## Concurrency
//!
//! No locking is done here. Every write (publish, evict) happens on the
//! admission queue's single consumer thread, and lookups for a job happen
//! before that job's own publish.
//!
//! ## Eviction
//!
//! When the directory grows past the byte budget, entries are removed in
//! `(modified, name)` order until the total is back under budget.

mod disk;
mod evict;

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lane_protocol::ArtifactKey;
use thiserror::Error;

pub use disk::DiskCache;
pub use evict::EvictionReport;

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("could not move output file to {}: {source}", path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// A file in the cache directory, as seen by eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

/// Storage behind the admission queue.
///
/// [`DiskCache`] is the filesystem implementation; other backends only need
/// to honor the same contract (no partial entry is ever visible under its
/// final name, and entries are never overwritten).
pub trait ArtifactCache: Send {
    /// Path of the finished artifact for `key`, if present.
    fn lookup(&self, key: &ArtifactKey) -> Option<PathBuf>;

    /// Fresh, collision-free location for the toolchain to write into.
    fn temp_output_path(&self, key: &ArtifactKey) -> PathBuf;

    /// Move a fully written temporary file under the final name for `key`.
    fn publish(&self, key: &ArtifactKey, temp: &Path) -> CacheResult<PathBuf>;

    /// Enumerate cache entries.
    fn list_entries(&self) -> CacheResult<Vec<CacheEntry>>;

    /// Delete oldest entries until the cache fits its budget.
    fn evict(&self) -> CacheResult<EvictionReport>;
}
