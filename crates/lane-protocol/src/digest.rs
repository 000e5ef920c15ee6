//! Content digest of submitted source.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ProtocolError, ProtocolResult};

/// Hex-encoded SHA-256 digest of a job's source bytes.
///
/// Identical source always maps to the same digest, which makes it usable as
/// a cache key component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceDigest(String);

impl SourceDigest {
    /// Length of the hex encoding.
    pub const HEX_LEN: usize = 64;

    /// Compute the digest of `source`.
    pub fn of(source: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source);
        Self(hex::encode(hasher.finalize()))
    }

    /// Accept a digest computed elsewhere, validating its shape.
    pub fn from_hex(hex: &str) -> ProtocolResult<Self> {
        let well_formed = hex.len() == Self::HEX_LEN
            && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(ProtocolError::InvalidDigest(hex.to_string()));
        }
        Ok(Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SourceDigest {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<SourceDigest> for String {
    fn from(digest: SourceDigest) -> Self {
        digest.0
    }
}
