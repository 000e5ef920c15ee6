//! Eviction cadence for the admission queue.
//!
//! Not a thread of its own: the queue's consumer calls into it after every
//! job, and every Nth job (the 1st, N+1th, 2N+1th, ...) runs a cache trim
//! pass synchronously before the next job starts.

use crate::cache::{ArtifactCache, EvictionReport};

/// Counter-driven trigger for cache eviction passes.
#[derive(Debug, Clone)]
pub struct EvictionScheduler {
    every: u64,
    jobs_seen: u64,
}

impl EvictionScheduler {
    /// Trigger a pass every `every` jobs; 0 is treated as 1.
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            jobs_seen: 0,
        }
    }

    pub fn every(&self) -> u64 {
        self.every
    }

    pub fn jobs_seen(&self) -> u64 {
        self.jobs_seen
    }

    /// Count a finished job; returns true if an eviction pass is due.
    pub fn record_job(&mut self) -> bool {
        self.jobs_seen += 1;
        (self.jobs_seen - 1) % self.every == 0
    }

    /// Run one eviction pass. Failures are logged and swallowed.
    pub fn run_pass(&self, cache: &dyn ArtifactCache) -> Option<EvictionReport> {
        match cache.evict() {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, jobs_seen = self.jobs_seen, "cache eviction pass aborted");
                None
            }
        }
    }
}

impl Default for EvictionScheduler {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVICT_EVERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DiskCache;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_cadence_is_every_hundredth_job() {
        let mut scheduler = EvictionScheduler::default();
        let due: Vec<u64> = (1..=250)
            .filter(|_| scheduler.record_job())
            .collect();
        assert_eq!(due, vec![1, 101, 201]);
    }

    #[test]
    fn test_every_one_runs_each_job() {
        let mut scheduler = EvictionScheduler::new(1);
        assert!((0..5).all(|_| scheduler.record_job()));
    }

    #[test]
    fn test_zero_treated_as_one() {
        let scheduler = EvictionScheduler::new(0);
        assert_eq!(scheduler.every(), 1);
    }

    #[test]
    fn test_run_pass_trims_cache() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::open(temp_dir.path(), 10).unwrap();
        fs::write(temp_dir.path().join("build-a-1.hex"), vec![0u8; 20]).unwrap();

        let report = EvictionScheduler::default().run_pass(&cache).unwrap();
        assert_eq!(report.deleted.len(), 1);
    }

    #[test]
    fn test_run_pass_fails_soft() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("cache");
        let cache = DiskCache::open(&dir, 10).unwrap();
        fs::remove_dir(&dir).unwrap();

        assert!(EvictionScheduler::default().run_pass(&cache).is_none());
    }
}
