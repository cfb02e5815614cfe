use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arbor_types::NodeId;

use crate::error::{StoreError, StoreResult};
use crate::node::Node;
use crate::traits::NodeStore;

/// In-memory, HashMap-based node arena.
///
/// Nodes are held as `Arc<Node>` behind a `RwLock`; reads clone the `Arc`,
/// never the node.
pub struct InMemoryNodeStore {
    nodes: RwLock<HashMap<NodeId, Arc<Node>>>,
}

impl InMemoryNodeStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Number of nodes currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read_map()?.len())
    }

    /// `true` if no node is stored.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read_map()?.is_empty())
    }

    fn read_map(
        &self,
    ) -> StoreResult<std::sync::RwLockReadGuard<'_, HashMap<NodeId, Arc<Node>>>> {
        self.nodes
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_map(
        &self,
    ) -> StoreResult<std::sync::RwLockWriteGuard<'_, HashMap<NodeId, Arc<Node>>>> {
        self.nodes
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for InMemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for InMemoryNodeStore {
    fn get(&self, id: &NodeId) -> StoreResult<Option<Arc<Node>>> {
        Ok(self.read_map()?.get(id).cloned())
    }

    fn put(&self, node: Node) -> StoreResult<Arc<Node>> {
        let mut map = self.write_map()?;
        if map.contains_key(&node.id) {
            return Err(StoreError::DuplicateNode(node.id));
        }
        let node = Arc::new(node);
        map.insert(node.id, Arc::clone(&node));
        Ok(node)
    }

    fn contains(&self, id: &NodeId) -> StoreResult<bool> {
        Ok(self.read_map()?.contains_key(id))
    }

    fn remove(&self, id: &NodeId) -> StoreResult<bool> {
        Ok(self.write_map()?.remove(id).is_some())
    }

    fn ids(&self) -> StoreResult<Vec<NodeId>> {
        let mut ids: Vec<NodeId> = self.read_map()?.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for InMemoryNodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.nodes.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemoryNodeStore")
            .field("node_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::VersionId;

    fn file(content: &[u8]) -> Node {
        Node::new_file(content.to_vec(), VersionId::new(1))
    }

    #[test]
    fn put_and_get() {
        let store = InMemoryNodeStore::new();
        let node = file(b"hello");
        let id = node.id;
        store.put(node).unwrap();
        let read = store.get(&id).unwrap().expect("should exist");
        assert_eq!(read.content().unwrap(), b"hello");
    }

    #[test]
    fn put_rejects_duplicate_id() {
        let store = InMemoryNodeStore::new();
        let node = file(b"a");
        store.put(node.clone()).unwrap();
        assert!(matches!(store.put(node), Err(StoreError::DuplicateNode(_))));
    }

    #[test]
    fn require_reports_missing() {
        let store = InMemoryNodeStore::new();
        let id = NodeId::new();
        assert!(matches!(store.require(&id), Err(StoreError::NodeMissing(m)) if m == id));
    }

    #[test]
    fn remove_present_and_missing() {
        let store = InMemoryNodeStore::new();
        let node = store.put(file(b"gone")).unwrap();
        assert!(store.remove(&node.id).unwrap());
        assert!(!store.contains(&node.id).unwrap());
        assert!(!store.remove(&node.id).unwrap());
    }

    #[test]
    fn ids_are_sorted() {
        let store = InMemoryNodeStore::new();
        for i in 0..5u8 {
            store.put(file(&[i])).unwrap();
        }
        let ids = store.ids().unwrap();
        assert_eq!(ids.len(), 5);
        for w in ids.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn len_counts_every_node() {
        let store = InMemoryNodeStore::new();
        assert!(store.is_empty().unwrap());
        store.put(file(b"12345")).unwrap();
        store.put(Node::new_directory(VersionId::new(1))).unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::thread;

        let store = Arc::new(InMemoryNodeStore::new());
        let id = store.put(file(b"shared")).unwrap().id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let node = store.require(&id).unwrap();
                    assert_eq!(node.content().unwrap(), b"shared");
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }

    #[test]
    fn debug_format() {
        let store = InMemoryNodeStore::new();
        store.put(file(b"x")).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryNodeStore"));
        assert!(debug.contains("node_count"));
    }
}
