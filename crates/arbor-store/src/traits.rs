use std::sync::Arc;

use arbor_types::NodeId;

use crate::error::{StoreError, StoreResult};
use crate::node::Node;

/// Arena of immutable nodes.
///
/// All implementations must satisfy these invariants:
/// - Nodes are immutable once written; `put` never replaces an existing id.
/// - Concurrent reads are always safe.
/// - Deletion is only for reclamation of unreachable nodes.
/// - All lock failures are propagated, never silently ignored.
pub trait NodeStore: Send + Sync {
    /// Read a node by id. Returns `Ok(None)` if absent.
    fn get(&self, id: &NodeId) -> StoreResult<Option<Arc<Node>>>;

    /// Write a new node and return the shared handle.
    ///
    /// Fails with [`StoreError::DuplicateNode`] if the id is already present.
    fn put(&self, node: Node) -> StoreResult<Arc<Node>>;

    /// Check whether a node exists.
    fn contains(&self, id: &NodeId) -> StoreResult<bool>;

    /// Remove a node. Returns `true` if it existed.
    fn remove(&self, id: &NodeId) -> StoreResult<bool>;

    /// All node ids currently held.
    fn ids(&self) -> StoreResult<Vec<NodeId>>;

    /// Read a node that must exist.
    fn require(&self, id: &NodeId) -> StoreResult<Arc<Node>> {
        self.get(id)?.ok_or(StoreError::NodeMissing(*id))
    }
}
