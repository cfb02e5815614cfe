//! Transactional repository API for Arbor.
//!
//! [`Repository`] ties the versioned node graph, permission evaluation, and
//! the sharded index together behind one transaction model:
//!
//! 1. [`Repository::begin`] opens a [`Transaction`] on a branch head.
//! 2. The transaction records edits privately and reads its own writes.
//! 3. [`Repository::commit`] replays the edits onto the latest head, projects
//!    the touched regions into index documents, and publishes the store
//!    version and the index view together.
//!
//! [`Repository::run_transaction`] wraps these steps and re-runs the work
//! when another commit got there first.

pub mod config;
pub mod error;
mod projection;
pub mod repository;
pub mod transaction;

pub use config::{RepositoryConfig, TransactionConfig};
pub use error::{RepoError, RepoResult};
pub use repository::Repository;
pub use transaction::{CommitInfo, NodeStat, SnapshotReader, Transaction};

// Re-export the vocabulary callers need to drive a repository.
pub use arbor_acl::EffectivePermissions;
pub use arbor_graph::{EntryMutation, GcReport, Snapshot};
pub use arbor_index::{IndexConfig, IndexDocument, IndexQuery, IndexStats, ShardId};
pub use arbor_store::{Acl, DirectoryEntry, Grant, NodeType};
pub use arbor_types::{Authority, BranchName, NodeId, NodePath, PermissionLevel, VersionId};
