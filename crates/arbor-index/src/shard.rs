//! Shard identifiers, routing, and per-shard state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use arbor_types::NodeId;

use crate::document::{DocKey, IndexDocument, IndexOp};

/// Position of a shard. Locks are always taken in ascending `ShardId` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId(pub u16);

impl ShardId {
    /// Route a logical node to one of `shard_count` shards.
    ///
    /// Uses the first eight bytes of the BLAKE3 hash of the node id, so
    /// placement is stable across processes and independent of uuid layout.
    pub fn route(origin: &NodeId, shard_count: u16) -> ShardId {
        let hash = blake3::hash(origin.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        let count = u64::from(shard_count.max(1));
        ShardId((u64::from_le_bytes(prefix) % count) as u16)
    }

    pub fn index(&self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

/// Published contents of one shard.
pub type ShardData = BTreeMap<DocKey, IndexDocument>;

/// Apply `ops` to a copy of `base`.
pub(crate) fn apply_ops(base: &ShardData, ops: &[IndexOp]) -> ShardData {
    let mut data = base.clone();
    for op in ops {
        match op {
            IndexOp::Upsert(doc) => {
                data.insert(doc.key(), doc.clone());
            }
            IndexOp::Delete { .. } => {
                data.remove(&op.key());
            }
        }
    }
    data
}

/// Runtime health of a shard.
#[derive(Debug)]
pub(crate) struct ShardHealth {
    online: AtomicBool,
}

impl ShardHealth {
    pub(crate) fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}
