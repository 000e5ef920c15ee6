//! Validation errors for job descriptors.

use thiserror::Error;

/// Errors raised while normalizing a job descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown output format: {0}")]
    UnknownFormat(String),

    #[error("invalid target name: {0:?}")]
    InvalidTarget(String),

    #[error("invalid source digest: {0:?} (expected 64 lowercase hex characters)")]
    InvalidDigest(String),
}

/// Result type for job model operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
