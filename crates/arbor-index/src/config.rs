use serde::{Deserialize, Serialize};

/// Configuration for the sharded index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Number of shards documents are partitioned across. At least one.
    pub shard_count: u16,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { shard_count: 8 }
    }
}

impl IndexConfig {
    /// A configuration with `shard_count` shards.
    pub fn with_shards(shard_count: u16) -> Self {
        Self { shard_count }
    }

    /// The configured shard count, clamped to at least one.
    pub fn effective_shard_count(&self) -> u16 {
        self.shard_count.max(1)
    }
}
