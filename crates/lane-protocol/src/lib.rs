//! Compile Lane Job Model
//!
//! Defines the normalized job descriptor consumed by the build worker and
//! the on-disk naming convention for cached artifacts.

pub mod error;
pub mod digest;
pub mod format;
pub mod job;
pub mod key;

pub use digest::SourceDigest;
pub use error::{ProtocolError, ProtocolResult};
pub use format::{InvocationMode, OutputFormat, Target};
pub use job::{JobOutcome, JobRequest, ABORTED};
pub use key::{ArtifactKey, ARTIFACT_PREFIX, TEMP_MARKER};

/// Target sentinel meaning "build for the in-browser simulator".
pub const SIMULATOR_TARGET: &str = "wasm";
