use arbor_types::NodeId;

/// Errors from node arena operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A referenced node is not in the arena (reclaimed or never written).
    #[error("node missing from arena: {0}")]
    NodeMissing(NodeId),

    /// A node with this id was already written.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// A directory operation was applied to a file node.
    #[error("node {0} is not a directory")]
    NotADirectory(NodeId),

    /// A content operation was applied to a directory node.
    #[error("node {0} is not a file")]
    NotAFile(NodeId),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding the arena was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// `true` for failures that a fresh attempt on a newer snapshot may not hit.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::NodeMissing(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
