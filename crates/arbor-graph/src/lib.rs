//! Versioned node graph for Arbor.
//!
//! A [`VersionedGraph`] keeps any number of named branches over one shared
//! node arena. Each branch head points at an immutable [`Snapshot`]; editing
//! goes through a [`WorkingTree`] that copies only the path from the root to
//! the edited node, so versions and branches share every untouched subtree.
//!
//! # Commit protocol
//!
//! A working tree records a log of [`Change`]s, each carrying the
//! [`Expectation`]s observed when it was made. Committing replays the log
//! onto the branch head under the branch commit lock:
//!
//! 1. Every expectation is re-checked against the state the replay has
//!    reached. A mismatch is an [`GraphError::OptimisticLockConflict`], which
//!    callers retry with a fresh working tree.
//! 2. The replayed tree becomes a staged [`Snapshot`] with a new version.
//! 3. A commit hook may inspect the staged snapshot and publish or abort.
//! 4. Publication records the version and swaps the branch head.
//!
//! Readers never block writers: a head is an `Arc<Snapshot>` that is
//! swapped, never mutated.
//!
//! # Reclamation
//!
//! Nodes are never freed by commits. [`VersionedGraph::prune_history`] drops
//! old versions and [`VersionedGraph::collect_garbage`] removes whatever no
//! retained version can reach.

pub mod change;
mod editor;
pub mod error;
pub mod gc;
pub mod graph;
pub mod snapshot;
pub mod tree;
pub mod working;

pub use change::{Change, EntryMutation, Expectation, NewNode, NewNodeKind, Op, Touch};
pub use error::{GraphError, GraphResult};
pub use gc::GcReport;
pub use graph::{Committed, HookOutcome, StagedCommit, VersionedGraph};
pub use snapshot::Snapshot;
pub use working::WorkingTree;
