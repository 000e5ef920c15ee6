//! Cache keys and artifact file naming.
//!
//! Finished artifacts are stored as `build-<target>-<digest>.<format>`.
//! In-flight outputs use `build-<target>-<random16>.tmp.<format>` so they can
//! never collide with a finished entry. External fast paths that serve the
//! cache directory directly depend on this convention.

use crate::digest::SourceDigest;
use crate::format::{OutputFormat, Target};

/// Prefix shared by every file the cache owns.
pub const ARTIFACT_PREFIX: &str = "build-";

/// Marker separating the random suffix from the extension in temp outputs.
pub const TEMP_MARKER: &str = ".tmp.";

/// Identity of a cache entry: `(target, digest, format)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub target: Target,
    pub digest: SourceDigest,
    pub format: OutputFormat,
}

impl ArtifactKey {
    pub fn new(target: Target, digest: SourceDigest, format: OutputFormat) -> Self {
        Self { target, digest, format }
    }

    /// File name of the finished artifact.
    pub fn file_name(&self) -> String {
        format!(
            "{}{}-{}.{}",
            ARTIFACT_PREFIX,
            self.target,
            self.digest,
            self.format.extension()
        )
    }

    /// File name of an in-flight output for this key.
    pub fn temp_file_name(&self, random: &str) -> String {
        format!(
            "{}{}-{}{}{}",
            ARTIFACT_PREFIX,
            self.target,
            random,
            TEMP_MARKER,
            self.format.extension()
        )
    }
}
