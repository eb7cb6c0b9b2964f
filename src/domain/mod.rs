//! Domain model: digests, cache keys, and artifacts.

mod artifact;
mod types;

pub use artifact::Artifact;
pub use types::{ArtifactKind, CacheKey, CasId, CasIdParseError};
