//! Content-addressed artifact storage.
//!
//! Artifacts are keyed by the SHA-256 of their payload and stored in
//! digest-prefix shards, each behind its own lock so unrelated writes
//! never contend. Eviction is least-recently-used per shard against a
//! byte budget, with a grace window that protects entries stored or
//! associated moments ago from being thrashed out before their first
//! lookup.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tracing::debug;

use crate::domain::{Artifact, ArtifactKind, CasId};

use super::config::StoreConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "store::content";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact of {size} bytes exceeds the per-artifact limit of {limit} bytes")]
    ArtifactTooLarge { size: u64, limit: u64 },
}

/// Result of a [`ContentStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    /// Server-computed digest of the stored payload.
    pub cas_id: CasId,
    /// True when an artifact with this digest was already resident and
    /// no physical write took place.
    pub deduplicated: bool,
}

/// Snapshot of store occupancy for the admin surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentStats {
    pub artifact_count: u64,
    pub artifact_bytes: u64,
    pub evictions: u64,
}

struct StoredEntry {
    artifact: Artifact,
    touched: Instant,
}

struct Shard {
    entries: LruCache<CasId, StoredEntry>,
    bytes: u64,
}

impl Shard {
    fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            bytes: 0,
        }
    }
}

/// Sharded content-addressed blob store.
pub struct ContentStore {
    shards: Vec<RwLock<Shard>>,
    shard_budget: u64,
    max_artifact_bytes: u64,
    grace: Duration,
    evictions: AtomicU64,
}

impl ContentStore {
    pub fn new(config: &StoreConfig) -> Self {
        let shard_count = config.shard_count_normalized();
        let shards = (0..shard_count).map(|_| RwLock::new(Shard::new())).collect();
        Self {
            shards,
            shard_budget: config.shard_budget(),
            max_artifact_bytes: config.max_artifact_bytes,
            grace: config.eviction_grace,
            evictions: AtomicU64::new(0),
        }
    }

    fn shard_for(&self, id: &CasId) -> &RwLock<Shard> {
        // shards.len() is a power of two.
        let index = id.shard_byte() as usize & (self.shards.len() - 1);
        &self.shards[index]
    }

    /// Store `data` under its computed digest.
    ///
    /// Idempotent: a payload already resident is a dedup hit and the
    /// stored artifact (including its original kind and metadata) is
    /// left untouched. The digest is computed before the shard lock is
    /// taken so hashing never serializes unrelated writes.
    pub fn put(
        &self,
        data: Bytes,
        kind: ArtifactKind,
        metadata: BTreeMap<String, String>,
    ) -> Result<PutOutcome, StoreError> {
        let cas_id = CasId::compute(&data);
        self.put_computed(cas_id, data, kind, metadata)
    }

    /// Insert under a digest the caller has just derived from `data`
    /// with [`CasId::compute`]. Exists so the service layer can hash a
    /// payload exactly once (it needs the digest before the write, for
    /// single-flight coordination); the RPC-declared identifier never
    /// reaches this path.
    pub(crate) fn put_computed(
        &self,
        cas_id: CasId,
        data: Bytes,
        kind: ArtifactKind,
        metadata: BTreeMap<String, String>,
    ) -> Result<PutOutcome, StoreError> {
        debug_assert_eq!(cas_id, CasId::compute(&data));

        let size = data.len() as u64;
        if size > self.max_artifact_bytes {
            return Err(StoreError::ArtifactTooLarge {
                size,
                limit: self.max_artifact_bytes,
            });
        }

        let mut shard = rw_write(self.shard_for(&cas_id), SOURCE, "put");

        if let Some(entry) = shard.entries.get_mut(&cas_id) {
            entry.touched = Instant::now();
            counter!("dispensa_store_dedup_total").increment(1);
            return Ok(PutOutcome {
                cas_id,
                deduplicated: true,
            });
        }

        shard.entries.put(
            cas_id,
            StoredEntry {
                artifact: Artifact::new(data, kind, metadata),
                touched: Instant::now(),
            },
        );
        shard.bytes += size;
        counter!("dispensa_store_put_total").increment(1);

        self.evict_over_budget(&mut shard, &cas_id);

        Ok(PutOutcome {
            cas_id,
            deduplicated: false,
        })
    }

    /// Full payload read; refreshes the entry's recency.
    pub fn get(&self, id: &CasId) -> Option<Artifact> {
        let mut shard = rw_write(self.shard_for(id), SOURCE, "get");
        let entry = shard.entries.get_mut(id)?;
        entry.touched = Instant::now();
        Some(entry.artifact.clone())
    }

    /// Existence check without a payload read or recency refresh.
    pub fn exists(&self, id: &CasId) -> bool {
        rw_read(self.shard_for(id), SOURCE, "exists")
            .entries
            .contains(id)
    }

    /// Refresh recency without reading the payload. Used when a key
    /// association is created for an already-stored artifact, so the
    /// grace window covers it. Returns false when the digest is absent.
    pub fn touch(&self, id: &CasId) -> bool {
        let mut shard = rw_write(self.shard_for(id), SOURCE, "touch");
        match shard.entries.get_mut(id) {
            Some(entry) => {
                entry.touched = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Occupancy snapshot; takes each shard read lock in turn.
    pub fn stats(&self) -> ContentStats {
        let mut stats = ContentStats {
            evictions: self.evictions.load(Ordering::Relaxed),
            ..Default::default()
        };
        for shard in &self.shards {
            let shard = rw_read(shard, SOURCE, "stats");
            stats.artifact_count += shard.entries.len() as u64;
            stats.artifact_bytes += shard.bytes;
        }
        stats
    }

    /// Evict LRU entries while the shard is over budget, never touching
    /// `just_inserted` and never an entry inside the grace window. When
    /// the LRU tail is still fresh the shard tolerates overshoot rather
    /// than thrashing out artifacts that have not had their first
    /// lookup yet.
    fn evict_over_budget(&self, shard: &mut Shard, just_inserted: &CasId) {
        while shard.bytes > self.shard_budget {
            let candidate = match shard.entries.peek_lru() {
                Some((id, entry))
                    if id != just_inserted && entry.touched.elapsed() >= self.grace =>
                {
                    *id
                }
                _ => break,
            };
            if let Some(evicted) = shard.entries.pop(&candidate) {
                shard.bytes = shard.bytes.saturating_sub(evicted.artifact.size_bytes());
                self.evictions.fetch_add(1, Ordering::Relaxed);
                counter!("dispensa_store_evict_total").increment(1);
                debug!(
                    target: "dispensa::store",
                    cas_id = %candidate,
                    size_bytes = evicted.artifact.size_bytes(),
                    "Evicted least-recently-used artifact"
                );
            }
        }
    }
}
