//! Lazy effective-permission evaluation.
//!
//! Nothing is ever stored per descendant. A node's effective grants are
//! computed on read by walking from the root down to the node:
//!
//! ```text
//! effective(root) = local(root)
//! effective(n)    = local(n) ∪ effective(parent(n))   if n.inherit
//!                 = local(n)                          otherwise
//! ```
//!
//! Because every read goes through the snapshot being evaluated, a node sees
//! exactly the ancestor records that were committed together with it.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use arbor_graph::{tree, GraphError, Snapshot};
use arbor_store::{Acl, Grant, Node, NodeStore};
use arbor_types::{Authority, NodeId, NodePath, PermissionLevel};

use crate::error::{AclError, AclResult};

/// One inheritance step: combine a parent's effective grants with a child's
/// local record.
pub fn inherit_step(parent: &BTreeSet<Grant>, acl: &Acl) -> BTreeSet<Grant> {
    if acl.inherit {
        parent.union(&acl.grants).cloned().collect()
    } else {
        acl.grants.clone()
    }
}

/// The permissions in force at one path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions {
    pub path: NodePath,
    pub grants: BTreeSet<Grant>,
    /// Deepest ancestor-or-self where inheritance stops (the root if none).
    pub boundary: NodePath,
}

impl EffectivePermissions {
    /// `true` if `authority` holds `required` or a stronger level.
    pub fn allows(&self, authority: &Authority, required: PermissionLevel) -> bool {
        self.grants
            .iter()
            .any(|g| &g.authority == authority && g.level.satisfies(required))
    }

    /// Highest level held by `authority`, if any.
    pub fn level_of(&self, authority: &Authority) -> Option<PermissionLevel> {
        self.grants
            .iter()
            .filter(|g| &g.authority == authority)
            .map(|g| g.level)
            .max()
    }
}

/// A node in a subtree evaluation.
#[derive(Clone, Debug)]
pub struct EvaluatedNode {
    pub path: NodePath,
    pub node: Arc<Node>,
    pub grants: BTreeSet<Grant>,
}

/// Evaluates permissions against one tree (a committed snapshot or a
/// transaction's working root).
pub struct AclEvaluator<'a> {
    store: &'a dyn NodeStore,
    root: NodeId,
}

impl<'a> AclEvaluator<'a> {
    /// Evaluate against the tree rooted at the physical node `root`.
    pub fn new(store: &'a dyn NodeStore, root: NodeId) -> Self {
        Self { store, root }
    }

    /// Evaluate against a committed snapshot.
    pub fn for_snapshot(store: &'a dyn NodeStore, snapshot: &Snapshot) -> Self {
        Self::new(store, snapshot.root)
    }

    fn chain(&self, path: &NodePath) -> AclResult<Vec<Arc<Node>>> {
        tree::resolve_chain(self.store, self.root, path).map_err(|source| AclError::Resolve {
            path: path.clone(),
            source,
        })
    }

    /// The local permission record of the node at `path`.
    pub fn local(&self, path: &NodePath) -> AclResult<Acl> {
        let node = tree::resolve(self.store, self.root, path).map_err(|source| {
            AclError::Resolve {
                path: path.clone(),
                source,
            }
        })?;
        Ok(node.acl.clone())
    }

    /// Effective grants at `path`.
    pub fn effective(&self, path: &NodePath) -> AclResult<EffectivePermissions> {
        let chain = self.chain(path)?;
        let mut grants = BTreeSet::new();
        let mut boundary = NodePath::root();
        for (depth, node) in chain.iter().enumerate() {
            if depth > 0 && !node.acl.inherit {
                boundary = prefix(path, depth);
            }
            grants = if depth == 0 {
                node.acl.grants.clone()
            } else {
                inherit_step(&grants, &node.acl)
            };
        }
        tracing::trace!(path = %path, grants = grants.len(), boundary = %boundary, "evaluated permissions");
        Ok(EffectivePermissions {
            path: path.clone(),
            grants,
            boundary,
        })
    }

    /// `true` if `authority` holds `level` (or stronger) at `path`.
    pub fn has_permission(
        &self,
        path: &NodePath,
        authority: &Authority,
        level: PermissionLevel,
    ) -> AclResult<bool> {
        Ok(self.effective(path)?.allows(authority, level))
    }

    /// Effective grants for every node of the subtree at `path`, pre-order.
    ///
    /// Computed in one pass, carrying each directory's grants down to its
    /// children instead of re-walking from the root per node.
    pub fn subtree(&self, path: &NodePath) -> AclResult<Vec<EvaluatedNode>> {
        let top = self.effective(path)?;
        let start = tree::resolve(self.store, self.root, path)?;
        let mut out = Vec::new();
        let mut stack = vec![(path.clone(), start, top.grants)];
        while let Some((at, node, grants)) = stack.pop() {
            if let Ok(entries) = node.entries() {
                for entry in entries.values().rev() {
                    let child = self.store.require(&entry.child)?;
                    let child_grants = inherit_step(&grants, &child.acl);
                    let child_path = at.join(&entry.name).map_err(GraphError::from)?;
                    stack.push((child_path, child, child_grants));
                }
            }
            out.push(EvaluatedNode {
                path: at,
                node,
                grants,
            });
        }
        Ok(out)
    }
}

fn prefix(path: &NodePath, depth: usize) -> NodePath {
    path.ancestors_inclusive()
        .into_iter()
        .nth(depth)
        .unwrap_or_else(|| path.clone())
}
