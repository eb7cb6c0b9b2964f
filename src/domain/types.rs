//! Identifier newtypes shared across the storage engine and RPC surface.

use std::fmt;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length in bytes of a content digest (SHA-256).
pub const CAS_ID_LEN: usize = 32;

/// Content digest identifying stored artifact bytes.
///
/// Always derived from the payload with [`CasId::compute`]; a
/// caller-declared digest is never used for placement.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CasId([u8; CAS_ID_LEN]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CasIdParseError {
    #[error("cas id must be {CAS_ID_LEN} bytes, got {0}")]
    BadLength(usize),
    #[error("cas id is not valid hex: {0}")]
    BadHex(String),
}

impl CasId {
    /// Compute the canonical digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; CAS_ID_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Interpret raw wire bytes as a digest. Length is validated; the
    /// value itself is only a claim until verified against payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CasIdParseError> {
        let array: [u8; CAS_ID_LEN] = bytes
            .try_into()
            .map_err(|_| CasIdParseError::BadLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// Parse the hex rendering used on the admin surface.
    pub fn from_hex(text: &str) -> Result<Self, CasIdParseError> {
        let bytes = hex::decode(text).map_err(|err| CasIdParseError::BadHex(err.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CAS_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Shard selector: the first digest byte, uniformly distributed
    /// for a cryptographic hash.
    pub fn shard_byte(&self) -> u8 {
        self.0[0]
    }
}

impl fmt::Display for CasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CasId({}..)", &self.to_hex()[..12])
    }
}

/// Opaque client-derived cache key.
///
/// The server attaches no structure to it beyond byte-exact equality.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Bytes);

impl CacheKey {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for CacheKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for CacheKey {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview = hex::encode(&self.0[..self.0.len().min(8)]);
        write!(f, "CacheKey({preview}.., {} bytes)", self.0.len())
    }
}

/// Type tag carried alongside artifact payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Precompiled Clang/Swift module.
    Pcm,
    /// Object file.
    Object,
    /// Auxiliary build metadata.
    Metadata,
    /// Any tag this server has no special knowledge of.
    Other(String),
}

impl ArtifactKind {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "pcm" => Self::Pcm,
            "o" => Self::Object,
            "metadata" => Self::Metadata,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pcm => "pcm",
            Self::Object => "o",
            Self::Metadata => "metadata",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
