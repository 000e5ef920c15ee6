//! Filesystem-backed artifact cache.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lane_protocol::{ArtifactKey, ARTIFACT_PREFIX};
use rand::Rng;
use walkdir::WalkDir;

use super::evict::run_eviction;
use super::{ArtifactCache, CacheEntry, CacheError, CacheResult, EvictionReport};

const RANDOM_SUFFIX_LEN: usize = 16;
const RANDOM_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Artifact cache rooted at a local directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    budget_bytes: u64,
}

impl DiskCache {
    /// Open the cache at `dir`, creating the directory if needed.
    ///
    /// The directory is stored as an absolute path: the toolchain runs in a
    /// different working directory and receives output paths inside it.
    pub fn open(dir: impl AsRef<Path>, budget_bytes: u64) -> CacheResult<Self> {
        fs::create_dir_all(dir.as_ref())?;
        let dir = fs::canonicalize(dir.as_ref())?;
        Ok(Self { dir, budget_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Final location of the artifact for `key`.
    pub fn entry_path(&self, key: &ArtifactKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Total size of all entries.
    pub fn total_size(&self) -> CacheResult<u64> {
        Ok(self.list_entries()?.iter().map(|e| e.size_bytes).sum())
    }
}

/// Remove a temp output that will not be published.
fn discard_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp) {
        tracing::warn!(path = %temp.display(), error = %e, "failed to remove temporary output");
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..RANDOM_SUFFIX_LEN)
        .map(|_| RANDOM_CHARSET[rng.gen_range(0..RANDOM_CHARSET.len())] as char)
        .collect()
}

impl ArtifactCache for DiskCache {
    fn lookup(&self, key: &ArtifactKey) -> Option<PathBuf> {
        let path = self.entry_path(key);
        path.is_file().then_some(path)
    }

    fn temp_output_path(&self, key: &ArtifactKey) -> PathBuf {
        self.dir.join(key.temp_file_name(&random_suffix()))
    }

    fn publish(&self, key: &ArtifactKey, temp: &Path) -> CacheResult<PathBuf> {
        let final_path = self.entry_path(key);

        // First writer wins; entries are never replaced. Linking fails if the
        // name exists, so the check and the publication are one step.
        match fs::hard_link(temp, &final_path) {
            Ok(()) => {
                discard_temp(temp);
                tracing::info!(artifact = %final_path.display(), "published artifact");
                Ok(final_path)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                discard_temp(temp);
                tracing::debug!(artifact = %final_path.display(), "artifact already cached, discarding new output");
                Ok(final_path)
            }
            Err(source) => Err(CacheError::Publish {
                path: final_path,
                source,
            }),
        }
    }

    fn list_entries(&self) -> CacheResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(ARTIFACT_PREFIX) {
                continue;
            }
            let meta = entry.metadata().map_err(io::Error::from)?;
            entries.push(CacheEntry {
                name,
                path: entry.into_path(),
                size_bytes: meta.len(),
                modified: meta.modified()?,
            });
        }

        Ok(entries)
    }

    fn evict(&self) -> CacheResult<EvictionReport> {
        let entries = self.list_entries()?;
        let report = run_eviction(entries, self.budget_bytes, |entry| fs::remove_file(&entry.path));

        if !report.deleted.is_empty() || !report.errors.is_empty() {
            tracing::info!(
                scanned = report.scanned,
                deleted = report.deleted.len(),
                bytes_reclaimed = report.bytes_reclaimed,
                total_after = report.total_after,
                errors = report.errors.len(),
                "cache eviction pass finished"
            );
        }
        Ok(report)
    }
}
