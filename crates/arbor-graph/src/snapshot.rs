//! Immutable published versions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arbor_store::{DirectoryEntry, Node, NodeStore};
use arbor_types::{BranchName, NodeId, NodePath, VersionId};

use crate::change::Change;
use crate::error::GraphResult;
use crate::tree;

/// One published version of a branch.
///
/// A snapshot never changes after publication. Reading through it always
/// returns the tree exactly as it was when the version was committed, even
/// while later versions share or supersede its nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: VersionId,
    pub branch: BranchName,
    /// Physical id of the root directory.
    pub root: NodeId,
    /// The version this one was derived from. `None` for an initial version.
    pub parent: Option<VersionId>,
    pub created_at: DateTime<Utc>,
    /// The change log that produced this version from `parent`.
    pub changes: Vec<Change>,
}

impl Snapshot {
    pub(crate) fn new(
        version: VersionId,
        branch: BranchName,
        root: NodeId,
        parent: Option<VersionId>,
        changes: Vec<Change>,
    ) -> Self {
        Self {
            version,
            branch,
            root,
            parent,
            created_at: Utc::now(),
            changes,
        }
    }

    /// The node at `path` in this version.
    pub fn resolve(&self, store: &dyn NodeStore, path: &NodePath) -> GraphResult<Arc<Node>> {
        tree::resolve(store, self.root, path)
    }

    pub fn lookup(
        &self,
        store: &dyn NodeStore,
        parent: &NodePath,
        name: &str,
    ) -> GraphResult<Option<DirectoryEntry>> {
        tree::lookup(store, self.root, parent, name)
    }

    /// Entries of the directory at `path`, sorted by name.
    pub fn list(&self, store: &dyn NodeStore, path: &NodePath) -> GraphResult<Vec<DirectoryEntry>> {
        tree::list(store, self.root, path)
    }

    /// Content of the file at `path`.
    pub fn read_content(&self, store: &dyn NodeStore, path: &NodePath) -> GraphResult<Vec<u8>> {
        tree::read_content(store, self.root, path)
    }

    /// Pre-order walk of the subtree at `path`.
    pub fn walk(
        &self,
        store: &dyn NodeStore,
        path: &NodePath,
    ) -> GraphResult<Vec<(NodePath, Arc<Node>)>> {
        tree::walk(store, self.root, path)
    }

    /// `true` if a node exists at `path`.
    pub fn exists(&self, store: &dyn NodeStore, path: &NodePath) -> GraphResult<bool> {
        match tree::resolve(store, self.root, path) {
            Ok(_) => Ok(true),
            Err(crate::GraphError::NotFound(_)) | Err(crate::GraphError::NotADirectory(_)) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
