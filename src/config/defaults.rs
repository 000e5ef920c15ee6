//! Built-in lane defaults (layer 1)
//!
//! Values used when neither the config file nor the command line sets them.

use std::path::PathBuf;

use lane_worker::{ToolchainConfig, DEFAULT_CACHE_BUDGET_BYTES, DEFAULT_EVICT_EVERY};
use serde_json::{json, Value};

/// Built-in default configuration values
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    /// Artifact cache directory (default: `<tmp>/compile-lane-cache`)
    pub cache_dir: PathBuf,

    /// Cache budget in bytes (default: 10,000,000)
    pub cache_budget_bytes: u64,

    /// Eviction cadence in jobs (default: 100)
    pub evict_every: u64,

    /// Toolchain executable (default: "tinygo")
    pub toolchain_program: String,

    /// Leading toolchain arguments (default: ["build"])
    pub toolchain_base_args: Vec<String>,

    pub termination_grace_ms: u64,

    pub poll_interval_ms: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        let toolchain = ToolchainConfig::default();
        Self {
            cache_dir: std::env::temp_dir().join("compile-lane-cache"),
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            evict_every: DEFAULT_EVICT_EVERY,
            toolchain_program: toolchain.program,
            toolchain_base_args: toolchain.base_args,
            termination_grace_ms: toolchain.termination_grace.as_millis() as u64,
            poll_interval_ms: toolchain.poll_interval.as_millis() as u64,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> Value {
        json!({
            "cache_dir": self.cache_dir.to_string_lossy(),
            "cache_budget_bytes": self.cache_budget_bytes,
            "evict_every": self.evict_every,
            "toolchain": {
                "program": self.toolchain_program,
                "base_args": self.toolchain_base_args,
                "termination_grace_ms": self.termination_grace_ms,
                "poll_interval_ms": self.poll_interval_ms
            }
        })
    }
}
