//! Immutable artifact payloads.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::types::{ArtifactKind, CasId};

/// An immutable compiled output identified by its content digest.
///
/// Cloning is cheap: the payload is a reference-counted [`Bytes`].
#[derive(Debug, Clone)]
pub struct Artifact {
    data: Bytes,
    kind: ArtifactKind,
    metadata: BTreeMap<String, String>,
}

impl Artifact {
    pub fn new(
        data: impl Into<Bytes>,
        kind: ArtifactKind,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            data: data.into(),
            kind,
            metadata,
        }
    }

    /// Digest of the payload; the artifact's identity.
    pub fn cas_id(&self) -> CasId {
        CasId::compute(&self.data)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn kind(&self) -> &ArtifactKind {
        &self.kind
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_tracks_payload_content() {
        let a = Artifact::new(
            Bytes::from_static(b"same bytes"),
            ArtifactKind::Object,
            BTreeMap::new(),
        );
        let b = Artifact::new(
            Bytes::from_static(b"same bytes"),
            ArtifactKind::Pcm,
            BTreeMap::from([("flag".to_string(), "-O2".to_string())]),
        );
        // Kind and metadata do not participate in identity.
        assert_eq!(a.cas_id(), b.cas_id());

        let c = Artifact::new(
            Bytes::from_static(b"other bytes"),
            ArtifactKind::Object,
            BTreeMap::new(),
        );
        assert_ne!(a.cas_id(), c.cas_id());
    }
}
