//! Private, mutable view of a branch for the duration of a transaction.

use std::sync::Arc;

use arbor_store::{DirectoryEntry, Grant, Node, NodeStore, OverlayStore};
use arbor_types::{Authority, NodeId, NodePath, PermissionLevel};

use crate::change::{Change, EntryMutation, NewNode, Op};
use crate::editor::TreeEditor;
use crate::error::{GraphError, GraphResult};
use crate::snapshot::Snapshot;
use crate::tree;

/// A working snapshot derived from a branch head.
///
/// Edits are applied immediately to a private copy-on-write tree held in an
/// [`OverlayStore`], so reads inside the transaction observe its own writes.
/// Each edit is also recorded as a [`Change`] with the expectations it was
/// made under; committing replays that log onto whatever the branch head is
/// at commit time.
pub struct WorkingTree {
    base: Arc<Snapshot>,
    store: OverlayStore,
    editor: TreeEditor,
    changes: Vec<Change>,
}

impl WorkingTree {
    pub(crate) fn new(base: Arc<Snapshot>, arena: Arc<dyn NodeStore>) -> Self {
        let editor = TreeEditor::new(base.root, base.version.next());
        Self {
            store: OverlayStore::new(arena),
            editor,
            base,
            changes: Vec::new(),
        }
    }

    /// The snapshot this working tree started from.
    pub fn base(&self) -> &Arc<Snapshot> {
        &self.base
    }

    /// The change log recorded so far, in order.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Consume the working tree, keeping only its change log for replay.
    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    /// `true` once any edit has been recorded.
    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Physical id of the working root.
    pub fn root(&self) -> NodeId {
        self.editor.root()
    }

    /// The store that reads resolve against (overlay over the shared arena).
    pub fn store(&self) -> &dyn NodeStore {
        &self.store
    }

    // -- reads ---------------------------------------------------------------

    /// The node at `path`, including uncommitted edits.
    pub fn resolve(&self, path: &NodePath) -> GraphResult<Arc<Node>> {
        tree::resolve(&self.store, self.root(), path)
    }

    /// The entry `name` under `parent`, or `None` if there is none.
    pub fn lookup(&self, parent: &NodePath, name: &str) -> GraphResult<Option<DirectoryEntry>> {
        tree::lookup(&self.store, self.root(), parent, name)
    }

    /// Entries of the directory at `path`, sorted by name.
    pub fn list(&self, path: &NodePath) -> GraphResult<Vec<DirectoryEntry>> {
        tree::list(&self.store, self.root(), path)
    }

    /// Content of the file at `path`.
    pub fn read_content(&self, path: &NodePath) -> GraphResult<Vec<u8>> {
        tree::read_content(&self.store, self.root(), path)
    }

    /// Pre-order walk of the subtree at `path`.
    pub fn walk(&self, path: &NodePath) -> GraphResult<Vec<(NodePath, Arc<Node>)>> {
        tree::walk(&self.store, self.root(), path)
    }

    // -- structural edits ----------------------------------------------------

    /// Create `node` under `parent` as `name`.
    pub fn attach(
        &mut self,
        parent: &NodePath,
        name: &str,
        node: NewNode,
    ) -> GraphResult<DirectoryEntry> {
        let entry = self.record(Op::Attach {
            parent: parent.clone(),
            name: name.to_string(),
            node,
        })?;
        entry.ok_or_else(|| GraphError::NotFound(parent.clone()))
    }

    /// Unlink the entry `name` under `parent` together with its subtree.
    pub fn detach(&mut self, parent: &NodePath, name: &str) -> GraphResult<()> {
        self.record(Op::Detach {
            parent: parent.clone(),
            name: name.to_string(),
        })
        .map(|_| ())
    }

    /// Apply `mutator` to the entry `entry.name` under `parent`.
    ///
    /// `entry` is the caller's copy; if its counter no longer matches the
    /// working entry, or the entry now points at a different logical node,
    /// the update fails with a conflict. A mutator that leaves the entry
    /// unchanged records nothing.
    pub fn update(
        &mut self,
        parent: &NodePath,
        entry: &DirectoryEntry,
        mutator: impl FnOnce(&mut EntryMutation),
    ) -> GraphResult<DirectoryEntry> {
        let current = self
            .lookup(parent, &entry.name)?
            .ok_or_else(|| GraphError::NotFound(parent.join(&entry.name).unwrap_or_else(|_| parent.clone())))?;
        if current.version != entry.version {
            return Err(GraphError::OptimisticLockConflict(format!(
                "entry {:?} under {parent} is at version {}, caller holds {}",
                entry.name, current.version, entry.version
            )));
        }
        let held = self.store.get(&entry.child)?.map(|node| node.origin);
        if held != Some(self.store.require(&current.child)?.origin) {
            return Err(GraphError::OptimisticLockConflict(format!(
                "entry {:?} under {parent} now points at a different node",
                entry.name
            )));
        }
        let mut mutation = EntryMutation {
            name: current.name.clone(),
            rebind: None,
        };
        mutator(&mut mutation);
        if mutation.rebind == Some(current.child) {
            mutation.rebind = None;
        }
        if mutation.name == current.name && mutation.rebind.is_none() {
            return Ok(current);
        }
        let updated = self.record(Op::UpdateEntry {
            parent: parent.clone(),
            name: current.name.clone(),
            mutation,
        })?;
        updated.ok_or_else(|| GraphError::NotFound(parent.clone()))
    }

    /// Rename the node at `path` within its parent.
    pub fn rename(&mut self, path: &NodePath, new_name: &str) -> GraphResult<DirectoryEntry> {
        let (parent, name) = path.split_last().ok_or(GraphError::RootNode("rename"))?;
        let entry = self
            .lookup(&parent, name)?
            .ok_or_else(|| GraphError::NotFound(path.clone()))?;
        self.update(&parent, &entry, |m| m.name = new_name.to_string())
    }

    /// Move the node at `from` under `to_parent` as `name`, keeping its
    /// logical identity.
    pub fn move_node(
        &mut self,
        from: &NodePath,
        to_parent: &NodePath,
        name: &str,
    ) -> GraphResult<DirectoryEntry> {
        let entry = self.record(Op::Move {
            from: from.clone(),
            to_parent: to_parent.clone(),
            name: name.to_string(),
        })?;
        entry.ok_or_else(|| GraphError::NotFound(from.clone()))
    }

    // -- record edits --------------------------------------------------------

    /// Replace the content of the file at `path`.
    pub fn write_content(&mut self, path: &NodePath, content: Vec<u8>) -> GraphResult<()> {
        self.record(Op::WriteContent {
            path: path.clone(),
            content,
        })
        .map(|_| ())
    }

    /// Add a local grant on the node at `path`.
    pub fn grant(
        &mut self,
        path: &NodePath,
        authority: Authority,
        level: PermissionLevel,
    ) -> GraphResult<()> {
        self.record(Op::Grant {
            path: path.clone(),
            grant: Grant::new(authority, level),
        })
        .map(|_| ())
    }

    /// Remove one level held by `authority`, or all of them when `level` is
    /// `None`.
    pub fn revoke(
        &mut self,
        path: &NodePath,
        authority: Authority,
        level: Option<PermissionLevel>,
    ) -> GraphResult<()> {
        self.record(Op::Revoke {
            path: path.clone(),
            authority,
            level,
        })
        .map(|_| ())
    }

    /// Turn permission inheritance on or off for the node at `path`.
    pub fn set_inheritance(&mut self, path: &NodePath, inherit: bool) -> GraphResult<()> {
        self.record(Op::SetInheritance {
            path: path.clone(),
            inherit,
        })
        .map(|_| ())
    }

    fn record(&mut self, op: Op) -> GraphResult<Option<DirectoryEntry>> {
        let expect = self.editor.expectations_for(&self.store, &op)?;
        let change = Change { op, expect };
        let result = self.editor.apply(&self.store, &change)?;
        tracing::trace!(
            branch = %self.base.branch,
            changes = self.changes.len() + 1,
            written = self.editor.written(),
            "recorded change"
        );
        self.changes.push(change);
        Ok(result)
    }
}

impl std::fmt::Debug for WorkingTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingTree")
            .field("base", &self.base.version)
            .field("branch", &self.base.branch)
            .field("changes", &self.changes.len())
            .finish()
    }
}
