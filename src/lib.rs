//! Compile Lane - cached, single-lane compilation service core
//!
//! Accepts source code, builds it with an external toolchain into a wasm
//! module or firmware image, and returns the artifact path or diagnostics.
//! Artifacts are cached on disk by `(target, digest, format)` and toolchain
//! runs are serialized through one admission queue.

pub mod config;
pub mod service;

pub use config::{EffectiveConfig, LaneConfig};
pub use lane_protocol::{JobOutcome, JobRequest, OutputFormat, SourceDigest, Target};
pub use lane_worker::{CancelToken, JobHandle, JobQueue};
pub use service::{evict_now, CompileService, ServiceError};
