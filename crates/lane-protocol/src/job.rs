//! Job descriptors and terminal outcomes.

use std::path::PathBuf;

use crate::digest::SourceDigest;
use crate::error::ProtocolResult;
use crate::format::{OutputFormat, Target};
use crate::key::ArtifactKey;

/// Diagnostic delivered when a job is cancelled before it produced anything.
pub const ABORTED: &[u8] = b"aborted";

/// A normalized compile request.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Raw program text
    pub source: Vec<u8>,
    /// Digest of `source`, computed before submission
    pub digest: SourceDigest,
    pub target: Target,
    pub format: OutputFormat,
}

impl JobRequest {
    /// Build a request, computing the digest of `source`.
    pub fn new(source: impl Into<Vec<u8>>, target: Target, format: OutputFormat) -> Self {
        let source = source.into();
        let digest = SourceDigest::of(&source);
        Self {
            source,
            digest,
            target,
            format,
        }
    }

    /// Build a request from unvalidated strings, as received at the request boundary.
    pub fn parse(source: impl Into<Vec<u8>>, target: &str, format: &str) -> ProtocolResult<Self> {
        Ok(Self::new(source, target.parse()?, format.parse()?))
    }

    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::new(self.target.clone(), self.digest.clone(), self.format)
    }
}

/// Terminal result of a job: an artifact path or diagnostics, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Path of the cached artifact
    Built(PathBuf),
    /// Human-readable diagnostics
    Failed(Vec<u8>),
}

impl JobOutcome {
    pub fn aborted() -> Self {
        JobOutcome::Failed(ABORTED.to_vec())
    }

    pub fn failed(message: impl Into<Vec<u8>>) -> Self {
        JobOutcome::Failed(message.into())
    }

    pub fn is_built(&self) -> bool {
        matches!(self, JobOutcome::Built(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, JobOutcome::Failed(bytes) if bytes.as_slice() == ABORTED)
    }

    pub fn artifact(&self) -> Option<&PathBuf> {
        match self {
            JobOutcome::Built(path) => Some(path),
            JobOutcome::Failed(_) => None,
        }
    }

    pub fn diagnostics(&self) -> Option<&[u8]> {
        match self {
            JobOutcome::Built(_) => None,
            JobOutcome::Failed(bytes) => Some(bytes),
        }
    }
}
