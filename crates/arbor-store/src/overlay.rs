//! Private write layer over a shared arena.
//!
//! A transaction edits its working snapshot through an [`OverlayStore`]:
//! reads fall through to the shared arena, writes stay local. Dropping the
//! overlay discards every node the transaction produced, and the garbage
//! collector never sees nodes that were never published.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arbor_types::NodeId;

use crate::error::{StoreError, StoreResult};
use crate::node::Node;
use crate::traits::NodeStore;

pub struct OverlayStore {
    base: Arc<dyn NodeStore>,
    local: RwLock<HashMap<NodeId, Arc<Node>>>,
}

impl OverlayStore {
    /// Create an empty overlay on top of `base`.
    pub fn new(base: Arc<dyn NodeStore>) -> Self {
        Self {
            base,
            local: RwLock::new(HashMap::new()),
        }
    }
}

impl NodeStore for OverlayStore {
    fn get(&self, id: &NodeId) -> StoreResult<Option<Arc<Node>>> {
        let local = self
            .local
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        if let Some(node) = local.get(id) {
            return Ok(Some(Arc::clone(node)));
        }
        drop(local);
        self.base.get(id)
    }

    fn put(&self, node: Node) -> StoreResult<Arc<Node>> {
        let mut local = self
            .local
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        if local.contains_key(&node.id) || self.base.contains(&node.id)? {
            return Err(StoreError::DuplicateNode(node.id));
        }
        let node = Arc::new(node);
        local.insert(node.id, Arc::clone(&node));
        Ok(node)
    }

    fn contains(&self, id: &NodeId) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Only local nodes can be removed; the shared arena is never touched.
    fn remove(&self, id: &NodeId) -> StoreResult<bool> {
        Ok(self
            .local
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?
            .remove(id)
            .is_some())
    }

    fn ids(&self) -> StoreResult<Vec<NodeId>> {
        let mut ids = self.base.ids()?;
        ids.extend(
            self.local
                .read()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?
                .keys()
                .copied(),
        );
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

impl std::fmt::Debug for OverlayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let local = self.local.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("OverlayStore")
            .field("local_nodes", &local)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNodeStore;
    use arbor_types::VersionId;

    #[test]
    fn writes_stay_local() {
        let base = Arc::new(InMemoryNodeStore::new());
        let overlay = OverlayStore::new(base.clone());
        let node = overlay
            .put(Node::new_file(b"draft".to_vec(), VersionId::new(1)))
            .unwrap();
        assert!(overlay.contains(&node.id).unwrap());
        assert!(!base.contains(&node.id).unwrap());
        assert_eq!(overlay.ids().unwrap(), vec![node.id]);
    }

    #[test]
    fn reads_fall_through() {
        let base = Arc::new(InMemoryNodeStore::new());
        let shared = base
            .put(Node::new_file(b"shared".to_vec(), VersionId::new(1)))
            .unwrap();
        let overlay = OverlayStore::new(base.clone());
        assert_eq!(overlay.require(&shared.id).unwrap().content().unwrap(), b"shared");
    }

    #[test]
    fn remove_never_touches_base() {
        let base = Arc::new(InMemoryNodeStore::new());
        let shared = base
            .put(Node::new_file(b"shared".to_vec(), VersionId::new(1)))
            .unwrap();
        let overlay = OverlayStore::new(base.clone());
        assert!(!overlay.remove(&shared.id).unwrap());
        assert!(base.contains(&shared.id).unwrap());
    }

    #[test]
    fn local_nodes_can_be_replaced() {
        let base = Arc::new(InMemoryNodeStore::new());
        let overlay = OverlayStore::new(base);
        let node = overlay
            .put(Node::new_directory(VersionId::new(1)))
            .unwrap();
        assert!(matches!(
            overlay.put((*node).clone()),
            Err(StoreError::DuplicateNode(_))
        ));
        assert!(overlay.remove(&node.id).unwrap());
        overlay.put((*node).clone()).unwrap();
    }
}
