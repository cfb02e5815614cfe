//! Error types for the index crate.

use crate::coordinator::TxnState;
use crate::shard::ShardId;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A batch operation failed schema validation. Nothing was applied.
    #[error("index validation failed for {path}: {reason}")]
    Validation { path: String, reason: String },

    /// The transaction is not in a state that allows the operation.
    #[error("index transaction {txn} is {state}, cannot {operation}")]
    InvalidState {
        txn: u64,
        state: TxnState,
        operation: &'static str,
    },

    /// Some shards failed while applying a batch. Nothing was published and
    /// the coordinator is now degraded until rebuilt.
    #[error("partial index commit: failed shards {failed:?} ({reason})")]
    PartialCommit {
        applied: Vec<ShardId>,
        failed: Vec<ShardId>,
        reason: String,
    },

    /// The index is degraded and refuses commits until rebuilt.
    #[error("index degraded, shards out of sync: {0:?}")]
    Degraded(Vec<ShardId>),

    /// A shard id outside the configured range.
    #[error("unknown shard: {0}")]
    UnknownShard(ShardId),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
