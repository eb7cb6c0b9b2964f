//! The artifact cache service: the protocol-facing core composing the
//! content store and lookup index behind the RPC operations.
//!
//! The traffic shape this service is built for is asymmetric: the
//! reference client fires all its lookups in parallel (and under the
//! documented write-only pattern most of them miss), then uploads every
//! artifact it compiled without ever reading one back. Store is the hot
//! path; lookup correctness matters for the *next* invocation of the
//! client and for administrative readers.

mod error;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, warn};

use crate::domain::{Artifact, ArtifactKind, CacheKey, CasId};
use crate::store::{
    ContentStats, ContentStore, FlightOutcome, LookupIndex, PutOutcome, WriteFlight, WriteFlights,
};

pub use error::ServiceError;

/// A validated store request, after the wire layer has decoded bytes
/// fields and parsed the declared digest claim.
#[derive(Debug)]
pub struct StoreCommand {
    /// Caller-declared digest, already length-validated; `None` when
    /// the claim was absent or malformed (both are treated as
    /// integrity mismatches: logged, never honored).
    pub declared_id: Option<CasId>,
    pub data: Bytes,
    pub kind: ArtifactKind,
    pub metadata: BTreeMap<String, String>,
    /// Deployment-specific extension; the base protocol's Save carries
    /// no cache key.
    pub cache_key: Option<CacheKey>,
}

/// Confirmation returned from a successful store.
#[derive(Debug, Clone)]
pub struct StoreReceipt {
    /// Server-computed digest, authoritative over any declared value.
    pub cas_id: CasId,
    pub deduplicated: bool,
    /// Human-readable diagnostic (mismatch notice, ignored-extension
    /// notice); empty on a plain success.
    pub message: String,
}

/// Cache-wide statistics for the admin surface.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub content: ContentStats,
    pub index_entries: u64,
    pub lookup_hits: u64,
    pub lookup_misses: u64,
    pub dedup_hits: u64,
}

#[derive(Default)]
struct Counters {
    lookup_hits: AtomicU64,
    lookup_misses: AtomicU64,
    dedup_hits: AtomicU64,
}

/// Stateless-per-request service over the shared storage structures.
pub struct CacheService {
    content: Arc<ContentStore>,
    index: Arc<LookupIndex>,
    flights: WriteFlights,
    inline_association: bool,
    counters: Counters,
}

impl CacheService {
    pub fn new(
        content: Arc<ContentStore>,
        index: Arc<LookupIndex>,
        inline_association: bool,
    ) -> Self {
        Self {
            content,
            index,
            flights: WriteFlights::new(),
            inline_association,
            counters: Counters::default(),
        }
    }

    /// Resolve a cache key and return the full artifact inline.
    ///
    /// A key that resolves to an evicted digest is a miss, never an
    /// error; the stale index entry is dropped lazily when observed. A
    /// racing upload of the same key simply "just missed" this lookup.
    pub fn lookup(&self, key: &CacheKey) -> Option<Artifact> {
        let Some(id) = self.index.resolve(key) else {
            self.record_miss();
            return None;
        };

        match self.content.get(&id) {
            Some(artifact) => {
                self.counters.lookup_hits.fetch_add(1, Ordering::Relaxed);
                counter!("dispensa_lookup_hit_total").increment(1);
                Some(artifact)
            }
            None => {
                debug!(
                    target: "dispensa::service",
                    key = ?key,
                    cas_id = %id,
                    "Resolved digest no longer resident; dropping stale association"
                );
                self.index.remove_if_stale(key, &id);
                self.record_miss();
                None
            }
        }
    }

    /// Store an artifact payload, dedup-aware and single-flight per
    /// digest: concurrent stores of identical bytes collapse into one
    /// physical write and every caller receives the same confirmed
    /// digest.
    pub async fn store(&self, command: StoreCommand) -> Result<StoreReceipt, ServiceError> {
        let StoreCommand {
            declared_id,
            data,
            kind,
            metadata,
            cache_key,
        } = command;

        let computed = CasId::compute(&data);
        let mut message = String::new();

        match declared_id {
            Some(declared) if declared != computed => {
                warn!(
                    target: "dispensa::service",
                    declared = %declared,
                    computed = %computed,
                    size_bytes = data.len(),
                    "Declared cas_id disagrees with computed digest; storing under computed value"
                );
                counter!("dispensa_integrity_mismatch_total").increment(1);
                message = "declared cas_id did not match the computed digest; \
                           the artifact was stored under the computed value"
                    .to_string();
            }
            Some(_) => {}
            None => {
                warn!(
                    target: "dispensa::service",
                    computed = %computed,
                    "Store request carried no usable cas_id claim"
                );
                counter!("dispensa_integrity_mismatch_total").increment(1);
            }
        }

        let outcome = self.put_single_flight(computed, data, kind, metadata).await?;
        if outcome.deduplicated {
            self.counters.dedup_hits.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(key) = cache_key {
            if self.inline_association {
                self.index.associate(key, outcome.cas_id);
                // Freshly associated entries fall under the eviction
                // grace window even if the payload was stored earlier.
                self.content.touch(&outcome.cas_id);
            } else if message.is_empty() {
                message =
                    "cache_key ignored: inline association is disabled on this server".to_string();
            }
        }

        Ok(StoreReceipt {
            cas_id: outcome.cas_id,
            deduplicated: outcome.deduplicated,
            message,
        })
    }

    /// Record a key → digest association (the `PutValue` stub surface,
    /// and the out-of-band mechanism deployments use to connect saved
    /// artifacts to the keys their clients will query).
    pub fn associate(&self, key: CacheKey, id: CasId) {
        self.index.associate(key, id);
        self.content.touch(&id);
    }

    /// Read an artifact by digest (the `Load` stub surface and the
    /// admin inspection path).
    pub fn load(&self, id: &CasId) -> Option<Artifact> {
        self.content.get(id)
    }

    pub fn exists(&self, id: &CasId) -> bool {
        self.content.exists(id)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            content: self.content.stats(),
            index_entries: self.index.len() as u64,
            lookup_hits: self.counters.lookup_hits.load(Ordering::Relaxed),
            lookup_misses: self.counters.lookup_misses.load(Ordering::Relaxed),
            dedup_hits: self.counters.dedup_hits.load(Ordering::Relaxed),
        }
    }

    fn record_miss(&self) {
        self.counters.lookup_misses.fetch_add(1, Ordering::Relaxed);
        counter!("dispensa_lookup_miss_total").increment(1);
    }

    async fn put_single_flight(
        &self,
        computed: CasId,
        data: Bytes,
        kind: ArtifactKind,
        metadata: BTreeMap<String, String>,
    ) -> Result<PutOutcome, ServiceError> {
        match self.flights.join(computed) {
            WriteFlight::Leader(guard) => {
                match self.content.put_computed(computed, data, kind, metadata) {
                    Ok(outcome) => {
                        guard.complete(outcome);
                        Ok(outcome)
                    }
                    // Dropping the guard notifies followers the flight
                    // was abandoned; they retry on their own.
                    Err(err) => Err(err.into()),
                }
            }
            WriteFlight::Follower(receiver) => {
                match receiver.await {
                    Ok(FlightOutcome::Stored(outcome)) => Ok(PutOutcome {
                        cas_id: outcome.cas_id,
                        // From this caller's perspective the payload
                        // was already written.
                        deduplicated: true,
                    }),
                    Ok(FlightOutcome::Abandoned) | Err(_) => self
                        .content
                        .put_computed(computed, data, kind, metadata)
                        .map_err(ServiceError::from),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;
    use std::time::Duration;

    fn service() -> CacheService {
        service_with(StoreConfig::default(), false)
    }

    fn service_with(config: StoreConfig, inline_association: bool) -> CacheService {
        CacheService::new(
            Arc::new(ContentStore::new(&config)),
            Arc::new(LookupIndex::new()),
            inline_association,
        )
    }

    fn command(data: &[u8]) -> StoreCommand {
        StoreCommand {
            declared_id: Some(CasId::compute(data)),
            data: Bytes::copy_from_slice(data),
            kind: ArtifactKind::Object,
            metadata: BTreeMap::new(),
            cache_key: None,
        }
    }

    #[tokio::test]
    async fn lookup_before_any_store_misses() {
        let service = service();
        assert!(service.lookup(&CacheKey::from(b"buildkey-A".as_slice())).is_none());
        assert_eq!(service.stats().lookup_misses, 1);
    }

    #[tokio::test]
    async fn store_then_associate_then_lookup_round_trips() {
        let service = service();
        let receipt = service.store(command(b"object bytes")).await.expect("store");
        assert!(!receipt.deduplicated);

        let key = CacheKey::from(b"buildkey-A".as_slice());
        service.associate(key.clone(), receipt.cas_id);

        let artifact = service.lookup(&key).expect("hit after association");
        assert_eq!(artifact.data().as_ref(), b"object bytes");
        assert_eq!(service.stats().lookup_hits, 1);
    }

    #[tokio::test]
    async fn save_without_association_leaves_lookups_missing() {
        // The documented write-only asymmetry: Save populates only the
        // content store, so the same key still misses afterwards.
        let service = service();
        let key = CacheKey::from(b"buildkey-A".as_slice());
        assert!(service.lookup(&key).is_none());

        let receipt = service.store(command(b"compiled locally")).await.expect("store");
        assert!(service.exists(&receipt.cas_id));
        assert!(service.lookup(&key).is_none());
    }

    #[tokio::test]
    async fn repeated_store_reports_dedup_with_same_digest() {
        let service = service();
        let first = service.store(command(b"identical")).await.expect("store");
        let second = service.store(command(b"identical")).await.expect("store");

        assert_eq!(first.cas_id, second.cas_id);
        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(service.stats().content.artifact_count, 1);
    }

    #[tokio::test]
    async fn mismatched_declared_id_is_overridden_not_honored() {
        let service = service();
        let receipt = service
            .store(StoreCommand {
                declared_id: Some(CasId::compute(b"something else")),
                data: Bytes::from_static(b"actual payload"),
                kind: ArtifactKind::Object,
                metadata: BTreeMap::new(),
                cache_key: None,
            })
            .await
            .expect("store succeeds despite the bad claim");

        assert_eq!(receipt.cas_id, CasId::compute(b"actual payload"));
        assert!(!receipt.message.is_empty());
        assert!(service.exists(&receipt.cas_id));
        assert!(!service.exists(&CasId::compute(b"something else")));
    }

    #[tokio::test]
    async fn inline_association_disabled_ignores_cache_key() {
        let service = service();
        let key = CacheKey::from(b"k".as_slice());
        let receipt = service
            .store(StoreCommand {
                cache_key: Some(key.clone()),
                ..command(b"payload")
            })
            .await
            .expect("store");

        assert!(receipt.message.contains("inline association is disabled"));
        assert!(service.lookup(&key).is_none());
    }

    #[tokio::test]
    async fn inline_association_enabled_links_key_after_store() {
        let service = service_with(StoreConfig::default(), true);
        let key = CacheKey::from(b"k".as_slice());
        service
            .store(StoreCommand {
                cache_key: Some(key.clone()),
                ..command(b"payload")
            })
            .await
            .expect("store");

        let artifact = service.lookup(&key).expect("associated");
        assert_eq!(artifact.data().as_ref(), b"payload");
    }

    #[tokio::test]
    async fn lookup_of_evicted_digest_is_a_miss_and_drops_the_association() {
        let config = StoreConfig {
            capacity_bytes: 8,
            max_artifact_bytes: 1024,
            shard_count: 1,
            eviction_grace: Duration::ZERO,
        };
        let service = service_with(config, false);

        let victim = service.store(command(b"aaaa")).await.expect("store");
        let key = CacheKey::from(b"victim-key".as_slice());
        service.associate(key.clone(), victim.cas_id);

        // Fill past the single shard's budget so the victim is evicted.
        service.store(command(b"bbbb")).await.expect("store");
        service.store(command(b"cccc")).await.expect("store");
        service.store(command(b"dddd")).await.expect("store");

        assert!(!service.exists(&victim.cas_id));
        assert!(service.lookup(&key).is_none(), "evicted digest is a miss, not an error");
        // Lazy invalidation removed the stale entry.
        assert_eq!(service.stats().index_entries, 0);
    }

    #[tokio::test]
    async fn oversized_store_is_a_capacity_error_and_retains_nothing() {
        let config = StoreConfig {
            max_artifact_bytes: 16,
            ..Default::default()
        };
        let service = service_with(config, false);
        let data = vec![7u8; 64];
        let id = CasId::compute(&data);

        let err = service
            .store(StoreCommand {
                declared_id: Some(id),
                data: Bytes::from(data),
                kind: ArtifactKind::Object,
                metadata: BTreeMap::new(),
                cache_key: None,
            })
            .await
            .expect_err("oversized payload must be rejected");

        assert!(matches!(err, ServiceError::Capacity { .. }));
        assert!(!service.exists(&id));
        assert_eq!(service.stats().content.artifact_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_stores_collapse_to_one_write() {
        let service = Arc::new(service());
        let payload = b"shared artifact".to_vec();
        let expected = CasId::compute(&payload);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = Arc::clone(&service);
            let payload = payload.clone();
            handles.push(tokio::spawn(async move {
                service
                    .store(StoreCommand {
                        declared_id: Some(CasId::compute(&payload)),
                        data: Bytes::from(payload),
                        kind: ArtifactKind::Object,
                        metadata: BTreeMap::new(),
                        cache_key: None,
                    })
                    .await
            }));
        }

        for handle in handles {
            let receipt = handle.await.expect("join").expect("store succeeds");
            assert_eq!(receipt.cas_id, expected);
        }

        let stats = service.stats();
        assert_eq!(stats.content.artifact_count, 1);
        assert_eq!(
            stats.content.artifact_bytes,
            payload.len() as u64,
            "exactly one physical write"
        );
    }
}
