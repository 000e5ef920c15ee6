//! Worker configuration.

use std::time::Duration;

/// Cache budget of the reference deployment, in bytes.
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 10_000_000;

/// Run an eviction pass every this many jobs.
pub const DEFAULT_EVICT_EVERY: u64 = 100;

/// Worker configuration settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum bytes retained by the cache after an eviction pass.
    pub cache_budget_bytes: u64,
    /// Eviction cadence in jobs.
    pub evict_every: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            evict_every: DEFAULT_EVICT_EVERY,
        }
    }
}

/// How the external toolchain is launched.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Executable to run.
    pub program: String,
    /// Arguments placed before the mode-specific ones (e.g. `build`).
    pub base_args: Vec<String>,
    /// Time between SIGTERM and SIGKILL when a job is cancelled.
    pub termination_grace: Duration,
    /// How often a running process is checked for exit or cancellation.
    pub poll_interval: Duration,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: "tinygo".to_string(),
            base_args: vec!["build".to_string()],
            termination_grace: Duration::from_secs(2),
            poll_interval: Duration::from_millis(50),
        }
    }
}
