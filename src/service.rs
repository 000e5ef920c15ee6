//! Compile service assembly.
//!
//! Wires the disk cache, the toolchain invoker and the admission queue
//! together from a [`LaneConfig`]. This is what a request handler holds on
//! to: it submits normalized jobs and waits on the returned handles.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use lane_protocol::JobRequest;
use lane_worker::{
    ArtifactCache, BuildWorker, CacheError, DiskCache, EvictionReport, JobHandle, JobQueue,
    ToolchainInvoker, WorkerStats,
};
use thiserror::Error;

use crate::config::LaneConfig;

/// Errors starting or stopping the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("cannot open artifact cache: {0}")]
    Cache(#[from] CacheError),

    #[error("cannot start build worker: {0}")]
    Spawn(#[from] io::Error),

    #[error("build worker panicked")]
    WorkerPanicked,
}

/// A running compile service.
pub struct CompileService {
    queue: JobQueue,
    worker: JoinHandle<()>,
    cache_dir: PathBuf,
}

impl CompileService {
    /// Open the cache and start the build worker.
    pub fn start(config: &LaneConfig) -> Result<Self, ServiceError> {
        let cache = DiskCache::open(&config.cache_dir, config.cache_budget_bytes)?;
        let cache_dir = cache.dir().to_path_buf();
        let toolchain = ToolchainInvoker::new(config.toolchain_config());
        let (queue, worker) = BuildWorker::new(cache, toolchain, &config.worker_config()).spawn()?;

        tracing::info!(
            cache_dir = %cache_dir.display(),
            budget = config.cache_budget_bytes,
            program = %config.toolchain.program,
            "compile service started"
        );

        Ok(Self {
            queue,
            worker,
            cache_dir,
        })
    }

    pub fn submit(&self, request: JobRequest) -> JobHandle {
        self.queue.submit(request)
    }

    /// Cloneable submission handle for request handlers on other threads.
    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.queue.stats()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Stop accepting jobs from this handle and wait for the worker to drain.
    ///
    /// Other [`JobQueue`] clones keep the worker alive until they are dropped.
    pub fn shutdown(self) -> Result<(), ServiceError> {
        drop(self.queue);
        self.worker.join().map_err(|_| ServiceError::WorkerPanicked)
    }
}

/// Run a one-off eviction pass outside the worker, e.g. from an admin command.
///
/// Must not run while a service is using the same directory.
pub fn evict_now(config: &LaneConfig) -> Result<EvictionReport, CacheError> {
    DiskCache::open(&config.cache_dir, config.cache_budget_bytes)?.evict()
}
