//! Storage engine configuration.

use std::time::Duration;

// Defaults sized for a single shared build-cache host.
const DEFAULT_CAPACITY_BYTES: u64 = 4 * 1024 * 1024 * 1024;
const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 256 * 1024 * 1024;
const DEFAULT_SHARD_COUNT: usize = 16;
const DEFAULT_EVICTION_GRACE_SECS: u64 = 120;

/// Configuration for the content store and eviction policy.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Total byte budget across all shards.
    pub capacity_bytes: u64,
    /// Per-artifact size ceiling; oversized puts are rejected.
    pub max_artifact_bytes: u64,
    /// Number of independently locked shards. Rounded up to a power of
    /// two so the digest byte maps uniformly.
    pub shard_count: usize,
    /// Entries touched within this window are never evicted, so an
    /// artifact that was just stored or associated cannot be thrashed
    /// out before its first lookup.
    pub eviction_grace: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
            shard_count: DEFAULT_SHARD_COUNT,
            eviction_grace: Duration::from_secs(DEFAULT_EVICTION_GRACE_SECS),
        }
    }
}

impl StoreConfig {
    /// Shard count normalized to a power of two, at least one.
    pub fn shard_count_normalized(&self) -> usize {
        self.shard_count.clamp(1, 256).next_power_of_two()
    }

    /// Byte budget per shard.
    pub fn shard_budget(&self) -> u64 {
        let shards = self.shard_count_normalized() as u64;
        (self.capacity_bytes / shards).max(1)
    }
}

impl From<&crate::config::StorageSettings> for StoreConfig {
    fn from(settings: &crate::config::StorageSettings) -> Self {
        Self {
            capacity_bytes: settings.capacity_bytes.get(),
            max_artifact_bytes: settings.max_artifact_bytes.get(),
            shard_count: settings.shard_count.get() as usize,
            eviction_grace: settings.eviction_grace,
        }
    }
}
