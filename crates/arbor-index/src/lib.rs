//! Sharded secondary index for Arbor.
//!
//! The index holds one [`IndexDocument`] per node per branch, partitioned
//! across shards by a hash of the node's logical id. It is derived data: the
//! node graph is the source of truth and the index can always be rebuilt
//! from it.
//!
//! # Consistency protocol
//!
//! Each store commit produces an [`IndexBatch`] which goes through
//! [`IndexCoordinator::prepare`] (validation only) and
//! [`IndexCoordinator::commit`] (apply and publish), or
//! [`IndexCoordinator::rollback`]. Readers query the last published view and
//! never wait for a commit in progress.
//!
//! If a shard fails mid-commit the batch is not published and the affected
//! shards are marked degraded; the coordinator refuses further commits until
//! [`IndexCoordinator::rebuild`] or [`IndexCoordinator::rebuild_branch`]
//! re-synchronizes them.

pub mod config;
pub mod coordinator;
pub mod document;
pub mod error;
mod lock;
pub mod query;
pub mod shard;

pub use config::IndexConfig;
pub use coordinator::{IndexCoordinator, IndexTransaction, TxnState};
pub use document::{DocKey, IndexBatch, IndexDocument, IndexOp};
pub use error::{IndexError, IndexResult};
pub use query::{IndexQuery, IndexStats};
pub use shard::{ShardData, ShardId};
