//! Compile Lane Build Worker
//!
//! The worker owns the compile pipeline behind the request boundary:
//! - **Artifact cache**: disk-backed, keyed by `(target, digest, format)`,
//!   atomic publication, size-bounded oldest-first eviction
//! - **Toolchain invoker**: runs the external compiler for one job, racing
//!   process exit against cancellation
//! - **Admission queue**: a single background consumer, so at most one
//!   toolchain process runs on the host at a time
//! - **Eviction scheduler**: trims the cache every Nth job
//!
//! Producers talk to the worker only through [`JobQueue::submit`] and the
//! returned [`JobHandle`].

pub mod cache;
pub mod cancel;
pub mod config;
pub mod invoker;
pub mod queue;
pub mod scheduler;

pub use cache::{ArtifactCache, CacheEntry, CacheError, CacheResult, DiskCache, EvictionReport};
pub use cancel::CancelToken;
pub use config::{ToolchainConfig, WorkerConfig, DEFAULT_CACHE_BUDGET_BYTES, DEFAULT_EVICT_EVERY};
pub use invoker::{Toolchain, ToolchainInvoker, LINE_DIRECTIVE};
pub use queue::{BuildWorker, Completion, JobHandle, JobQueue, WorkerStats};
pub use scheduler::EvictionScheduler;
