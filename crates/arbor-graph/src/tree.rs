//! Read-only traversal of a snapshot tree.
//!
//! Every function takes the arena and a root node id, so the same code reads
//! committed snapshots and in-flight working trees alike.

use std::collections::HashSet;
use std::sync::Arc;

use arbor_store::{DirectoryEntry, Node, NodeStore};
use arbor_types::{NodeId, NodePath};

use crate::error::{GraphError, GraphResult};

/// Resolve every node from the root down to `path`, inclusive.
///
/// The returned chain has `path.depth() + 1` elements; the first is the root.
pub fn resolve_chain(
    store: &dyn NodeStore,
    root: NodeId,
    path: &NodePath,
) -> GraphResult<Vec<Arc<Node>>> {
    let mut chain = Vec::with_capacity(path.depth() + 1);
    let mut current = store.require(&root)?;
    let mut walked = NodePath::root();
    for name in path.components() {
        let entries = current
            .entries()
            .map_err(|_| GraphError::NotADirectory(walked.clone()))?;
        let child = entries
            .get(name)
            .map(|e| e.child)
            .ok_or_else(|| GraphError::NotFound(path.clone()))?;
        walked = walked.join(name)?;
        chain.push(current);
        current = store.require(&child)?;
    }
    chain.push(current);
    Ok(chain)
}

/// Resolve the node at `path`.
pub fn resolve(store: &dyn NodeStore, root: NodeId, path: &NodePath) -> GraphResult<Arc<Node>> {
    let mut chain = resolve_chain(store, root, path)?;
    chain.pop().ok_or_else(|| GraphError::NotFound(path.clone()))
}

/// Resolve `path` and require it to be a directory.
pub fn resolve_directory(
    store: &dyn NodeStore,
    root: NodeId,
    path: &NodePath,
) -> GraphResult<Arc<Node>> {
    let node = resolve(store, root, path)?;
    if !node.is_directory() {
        return Err(GraphError::NotADirectory(path.clone()));
    }
    Ok(node)
}

/// Look up the entry `name` under the directory at `parent`.
pub fn lookup(
    store: &dyn NodeStore,
    root: NodeId,
    parent: &NodePath,
    name: &str,
) -> GraphResult<Option<DirectoryEntry>> {
    let dir = resolve_directory(store, root, parent)?;
    Ok(dir.entry(name)?.cloned())
}

/// Entries of the directory at `path`, in name order.
pub fn list(store: &dyn NodeStore, root: NodeId, path: &NodePath) -> GraphResult<Vec<DirectoryEntry>> {
    let dir = resolve_directory(store, root, path)?;
    Ok(dir.entries()?.values().cloned().collect())
}

/// Content of the file at `path`.
pub fn read_content(store: &dyn NodeStore, root: NodeId, path: &NodePath) -> GraphResult<Vec<u8>> {
    let node = resolve(store, root, path)?;
    let content = node
        .content()
        .map_err(|_| GraphError::NotAFile(path.clone()))?;
    Ok(content.to_vec())
}

/// Pre-order walk of the subtree at `path`, including `path` itself.
pub fn walk(
    store: &dyn NodeStore,
    root: NodeId,
    path: &NodePath,
) -> GraphResult<Vec<(NodePath, Arc<Node>)>> {
    let start = resolve(store, root, path)?;
    walk_from(store, path.clone(), start)
}

/// Pre-order walk starting at an already resolved node, labelled `path`.
pub fn walk_from(
    store: &dyn NodeStore,
    path: NodePath,
    start: Arc<Node>,
) -> GraphResult<Vec<(NodePath, Arc<Node>)>> {
    let mut out = Vec::new();
    let mut stack = vec![(path, start)];
    while let Some((at, node)) = stack.pop() {
        if let Ok(entries) = node.entries() {
            // Reverse so children pop in name order.
            for entry in entries.values().rev() {
                let child = store.require(&entry.child)?;
                stack.push((at.join(&entry.name)?, child));
            }
        }
        out.push((at, node));
    }
    Ok(out)
}

/// Add every node reachable from `root` to `seen`.
///
/// Subtrees already in `seen` are not descended into again, so marking
/// many snapshots that share structure stays proportional to what differs.
pub fn mark_reachable(
    store: &dyn NodeStore,
    root: NodeId,
    seen: &mut HashSet<NodeId>,
) -> GraphResult<()> {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let node = store.require(&id)?;
        if let Ok(entries) = node.entries() {
            stack.extend(entries.values().map(|e| e.child));
        }
    }
    Ok(())
}
