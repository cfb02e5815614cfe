//! Error types for the versioned node graph.

use arbor_store::StoreError;
use arbor_types::{BranchName, NodePath, TypeError, VersionId};

/// Errors that can occur during graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// An entry with this name already exists under the parent.
    #[error("duplicate name {name:?} under {parent}")]
    DuplicateName { parent: NodePath, name: String },

    /// No node exists at the path.
    #[error("not found: {0}")]
    NotFound(NodePath),

    /// A path component resolved to a file where a directory was required.
    #[error("not a directory: {0}")]
    NotADirectory(NodePath),

    /// A content operation targeted a directory.
    #[error("not a file: {0}")]
    NotAFile(NodePath),

    /// A counter or binding observed by the transaction changed underneath it.
    #[error("optimistic lock conflict: {0}")]
    OptimisticLockConflict(String),

    /// A directory would be moved into its own subtree.
    #[error("invalid move from {from} to {to}")]
    InvalidMove { from: NodePath, to: NodePath },

    /// The branch root has no entry, so it cannot be deleted, renamed or moved.
    #[error("cannot {0} the root directory")]
    RootNode(&'static str),

    /// An entry rebind pointed at a node with a different logical identity,
    /// or at a version whose subtree holds nodes now linked elsewhere.
    #[error("cannot rebind {path}: {reason}")]
    InvalidRebind { path: NodePath, reason: String },

    #[error("branch not found: {0}")]
    BranchNotFound(BranchName),

    #[error("branch already exists: {0}")]
    BranchExists(BranchName),

    /// The default branch is the anchor of the repository and cannot be deleted.
    #[error("cannot delete protected branch: {0}")]
    ProtectedBranch(BranchName),

    /// The version was never created or has been pruned.
    #[error("version not found: {0}")]
    VersionNotFound(VersionId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid argument: {0}")]
    Type(#[from] TypeError),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl GraphError {
    /// `true` if re-running the transaction from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GraphError::OptimisticLockConflict(_) => true,
            GraphError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Convenience alias for graph results.
pub type GraphResult<T> = Result<T, GraphError>;
