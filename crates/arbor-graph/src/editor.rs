//! Copy-on-write tree editing.
//!
//! [`TreeEditor`] applies [`Change`]s to a tree rooted at a physical node id.
//! Editing a node creates a successor (new id, same origin) and rewrites every
//! ancestor's entry pointer up to a new root. Nodes the editor itself created
//! are not yet visible to anyone else, so they are replaced in place and the
//! ancestor walk stops at them.

use std::collections::HashSet;
use std::sync::Arc;

use arbor_store::{DirectoryEntry, Node, NodeKind, NodeStore};
use arbor_types::{validate_name, NodeId, NodePath, VersionId};

use crate::change::{Change, Expectation, NewNode, NewNodeKind, Op};
use crate::error::{GraphError, GraphResult};
use crate::tree;

pub(crate) struct TreeEditor {
    root: NodeId,
    version: VersionId,
    fresh: HashSet<NodeId>,
    /// Logical ids of every node unlinked from the tree, in removal order.
    detached: Vec<NodeId>,
}

fn conflict(msg: String) -> GraphError {
    GraphError::OptimisticLockConflict(msg)
}

impl TreeEditor {
    pub(crate) fn new(root: NodeId, version: VersionId) -> Self {
        Self {
            root,
            version,
            fresh: HashSet::new(),
            detached: Vec::new(),
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes written by this editor.
    pub(crate) fn written(&self) -> usize {
        self.fresh.len()
    }

    /// Logical ids removed from the tree by detaches and rebinds. A node
    /// listed here may have been attached again later (a rebind target
    /// shares the origin of what it replaced).
    pub(crate) fn detached(&self) -> &[NodeId] {
        &self.detached
    }

    fn record_detached(
        &mut self,
        store: &dyn NodeStore,
        path: &NodePath,
        node: Arc<Node>,
    ) -> GraphResult<()> {
        let removed = tree::walk_from(store, path.clone(), node)?;
        self.detached.extend(removed.iter().map(|(_, n)| n.origin));
        Ok(())
    }

    /// Expectations that hold right now for `op`.
    ///
    /// Fails if the op's target does not exist in the current tree.
    pub(crate) fn expectations_for(
        &self,
        store: &dyn NodeStore,
        op: &Op,
    ) -> GraphResult<Vec<Expectation>> {
        let out = match op {
            Op::Attach { parent, .. } => vec![self.observe_node(store, parent, false)?],
            Op::Detach { parent, name } => vec![
                self.observe_node(store, parent, false)?,
                self.observe_entry(store, parent, name)?,
            ],
            Op::UpdateEntry {
                parent,
                name,
                mutation,
            } => {
                let mut out = vec![
                    self.observe_node(store, parent, false)?,
                    self.observe_entry(store, parent, name)?,
                ];
                // A rebind replaces the child wholesale, so any edit made to
                // the node since must abort it.
                if mutation.rebind.is_some() {
                    out.push(self.observe_node(store, &parent.join(name)?, true)?);
                }
                out
            }
            Op::Move {
                from, to_parent, ..
            } => {
                let (from_parent, from_name) =
                    from.split_last().ok_or(GraphError::RootNode("move"))?;
                vec![
                    self.observe_entry(store, &from_parent, from_name)?,
                    self.observe_node(store, to_parent, false)?,
                ]
            }
            Op::WriteContent { path, .. }
            | Op::Grant { path, .. }
            | Op::Revoke { path, .. }
            | Op::SetInheritance { path, .. } => vec![self.observe_node(store, path, true)?],
        };
        Ok(out)
    }

    fn observe_node(
        &self,
        store: &dyn NodeStore,
        path: &NodePath,
        with_version: bool,
    ) -> GraphResult<Expectation> {
        let node = tree::resolve(store, self.root, path)?;
        Ok(Expectation::Node {
            path: path.clone(),
            origin: node.origin,
            version: with_version.then_some(node.version),
        })
    }

    fn observe_entry(
        &self,
        store: &dyn NodeStore,
        parent: &NodePath,
        name: &str,
    ) -> GraphResult<Expectation> {
        let entry = tree::lookup(store, self.root, parent, name)?
            .ok_or_else(|| GraphError::NotFound(join_lossy(parent, name)))?;
        Ok(Expectation::Entry {
            parent: parent.clone(),
            name: name.to_string(),
            origin: store.require(&entry.child)?.origin,
            version: entry.version,
        })
    }

    /// Re-check one expectation against the current tree.
    pub(crate) fn check(&self, store: &dyn NodeStore, expectation: &Expectation) -> GraphResult<()> {
        match expectation {
            Expectation::Node {
                path,
                origin,
                version,
            } => {
                let node = match tree::resolve(store, self.root, path) {
                    Ok(node) => node,
                    Err(GraphError::NotFound(_)) | Err(GraphError::NotADirectory(_)) => {
                        return Err(conflict(format!("{path} no longer exists")));
                    }
                    Err(e) => return Err(e),
                };
                if node.origin != *origin {
                    return Err(conflict(format!("{path} now refers to a different node")));
                }
                match version {
                    Some(expected) if node.version != *expected => Err(conflict(format!(
                        "{path} changed concurrently (expected record version {expected}, found {})",
                        node.version
                    ))),
                    _ => Ok(()),
                }
            }
            Expectation::Entry {
                parent,
                name,
                origin,
                version,
            } => {
                let entry = match tree::lookup(store, self.root, parent, name) {
                    Ok(entry) => entry,
                    Err(GraphError::NotFound(_)) | Err(GraphError::NotADirectory(_)) => None,
                    Err(e) => return Err(e),
                };
                match entry {
                    None => Err(conflict(format!(
                        "entry {name:?} under {parent} no longer exists"
                    ))),
                    Some(entry) if entry.version != *version => Err(conflict(format!(
                        "entry {name:?} under {parent} changed concurrently (expected {version}, found {})",
                        entry.version
                    ))),
                    Some(entry) if store.require(&entry.child)?.origin != *origin => Err(conflict(
                        format!("entry {name:?} under {parent} now points at a different node"),
                    )),
                    Some(_) => Ok(()),
                }
            }
        }
    }

    /// Check the change's expectations, then apply its op.
    ///
    /// Returns the directory entry created or updated, if the op produced one.
    pub(crate) fn apply(
        &mut self,
        store: &dyn NodeStore,
        change: &Change,
    ) -> GraphResult<Option<DirectoryEntry>> {
        for expectation in &change.expect {
            self.check(store, expectation)?;
        }
        match &change.op {
            Op::Attach { parent, name, node } => self.attach(store, parent, name, node).map(Some),
            Op::Detach { parent, name } => {
                let path = parent.join(name)?;
                let doomed = tree::resolve(store, self.root, &path)?;
                self.record_detached(store, &path, doomed)?;
                self.rewrite(store, parent, |dir| {
                    dir.entries_mut()?
                        .remove(name)
                        .map(|_| None)
                        .ok_or(GraphError::NotFound(path))
                })
            }
            Op::UpdateEntry {
                parent,
                name,
                mutation,
            } => {
                let path = parent.join(name)?;
                let current = tree::lookup(store, self.root, parent, name)?
                    .ok_or_else(|| GraphError::NotFound(path.clone()))?;
                if mutation.name != *name {
                    validate_name(&mutation.name)?;
                }
                // A plain rename keeps whatever child the entry holds now,
                // including edits committed after the change was recorded.
                let child = match mutation.rebind {
                    Some(target) if target != current.child => {
                        self.check_rebind(store, &path, current.child, target)?;
                        let replaced = store.require(&current.child)?;
                        self.record_detached(store, &path, replaced)?;
                        target
                    }
                    _ => current.child,
                };
                self.rewrite(store, parent, |dir| {
                    let entries = dir.entries_mut()?;
                    if mutation.name != *name && entries.contains_key(&mutation.name) {
                        return Err(GraphError::DuplicateName {
                            parent: parent.clone(),
                            name: mutation.name.clone(),
                        });
                    }
                    let old = entries.remove(name).ok_or(GraphError::NotFound(path))?;
                    let updated = old.updated(mutation.name.clone(), child);
                    entries.insert(updated.name.clone(), updated.clone());
                    Ok(Some(updated))
                })
            }
            Op::Move {
                from,
                to_parent,
                name,
            } => self.move_node(store, from, to_parent, name).map(Some),
            Op::WriteContent { path, content } => self.rewrite(store, path, |node| {
                match &mut node.kind {
                    NodeKind::File { content: current } => *current = content.clone(),
                    NodeKind::Directory { .. } => return Err(GraphError::NotAFile(path.clone())),
                }
                node.version += 1;
                Ok(None)
            }),
            Op::Grant { path, grant } => self.rewrite(store, path, |node| {
                node.acl.grant(grant.authority.clone(), grant.level);
                node.version += 1;
                Ok(None)
            }),
            Op::Revoke {
                path,
                authority,
                level,
            } => self.rewrite(store, path, |node| {
                match level {
                    Some(level) => {
                        node.acl.revoke(authority, *level);
                    }
                    None => {
                        node.acl.revoke_all(authority);
                    }
                }
                node.version += 1;
                Ok(None)
            }),
            Op::SetInheritance { path, inherit } => self.rewrite(store, path, |node| {
                node.acl.inherit = *inherit;
                node.version += 1;
                Ok(None)
            }),
        }
    }

    fn attach(
        &mut self,
        store: &dyn NodeStore,
        parent: &NodePath,
        name: &str,
        new: &NewNode,
    ) -> GraphResult<DirectoryEntry> {
        validate_name(name)?;
        let dir = tree::resolve_directory(store, self.root, parent)?;
        if dir.entry(name)?.is_some() {
            return Err(GraphError::DuplicateName {
                parent: parent.clone(),
                name: name.to_string(),
            });
        }
        let kind = match &new.kind {
            NewNodeKind::Folder => NodeKind::Directory {
                entries: Default::default(),
            },
            NewNodeKind::File { content } => NodeKind::File {
                content: content.clone(),
            },
        };
        let child = self.install(
            store,
            Node {
                id: NodeId::new(),
                origin: new.origin,
                kind,
                created_in: self.version,
                version: 0,
                acl: new.acl.clone(),
            },
        )?;
        self.rewrite(store, parent, |dir| {
            let entry = DirectoryEntry::new(name, dir.origin, child);
            dir.entries_mut()?.insert(name.to_string(), entry.clone());
            Ok(entry)
        })
    }

    fn move_node(
        &mut self,
        store: &dyn NodeStore,
        from: &NodePath,
        to_parent: &NodePath,
        name: &str,
    ) -> GraphResult<DirectoryEntry> {
        let to = to_parent.join(name)?;
        let (from_parent, from_name) = from.split_last().ok_or(GraphError::RootNode("move"))?;
        if to_parent.starts_with(from) {
            return Err(GraphError::InvalidMove {
                from: from.clone(),
                to,
            });
        }
        let entry = tree::lookup(store, self.root, &from_parent, from_name)?
            .ok_or_else(|| GraphError::NotFound(from.clone()))?;
        let dest = tree::resolve_directory(store, self.root, to_parent)?;
        if dest.entry(name)?.is_some() {
            if to == *from {
                return Ok(entry);
            }
            return Err(GraphError::DuplicateName {
                parent: to_parent.clone(),
                name: name.to_string(),
            });
        }
        self.rewrite(store, &from_parent, |dir| {
            dir.entries_mut()?.remove(from_name);
            Ok(())
        })?;
        self.rewrite(store, to_parent, |dir| {
            let moved = DirectoryEntry::new(name, dir.origin, entry.child);
            dir.entries_mut()?.insert(name.to_string(), moved.clone());
            Ok(moved)
        })
    }

    fn check_rebind(
        &self,
        store: &dyn NodeStore,
        path: &NodePath,
        current: NodeId,
        target: NodeId,
    ) -> GraphResult<()> {
        let invalid = |reason: &str| GraphError::InvalidRebind {
            path: path.clone(),
            reason: reason.to_string(),
        };
        // Nodes written by this editor are private to it and may not survive
        // a replay, so only published versions are valid rebind targets.
        if self.fresh.contains(&target) {
            return Err(invalid("target is not a published version"));
        }
        let current = store.require(&current)?;
        let target = match store.get(&target)? {
            Some(node) if node.origin == current.origin => node,
            _ => return Err(invalid("target is not a version of the same node")),
        };
        // A logical node may be linked at one path only.
        let incoming: HashSet<NodeId> = tree::walk_from(store, path.clone(), target)?
            .into_iter()
            .map(|(_, node)| node.origin)
            .collect();
        let linked_elsewhere = tree::walk(store, self.root, &NodePath::root())?
            .into_iter()
            .any(|(at, node)| !at.starts_with(path) && incoming.contains(&node.origin));
        if linked_elsewhere {
            return Err(invalid("target subtree holds nodes now linked elsewhere"));
        }
        Ok(())
    }

    /// Apply `edit` to a copy of the node at `path` and re-link its ancestors.
    fn rewrite<R>(
        &mut self,
        store: &dyn NodeStore,
        path: &NodePath,
        edit: impl FnOnce(&mut Node) -> GraphResult<R>,
    ) -> GraphResult<R> {
        let mut chain = tree::resolve_chain(store, self.root, path)?;
        let target = chain
            .pop()
            .ok_or_else(|| GraphError::NotFound(path.clone()))?;
        let mut replacement = self.copy_of(&target);
        let result = edit(&mut replacement)?;

        let mut old_id = target.id;
        let mut new_id = self.install(store, replacement)?;
        for (depth, dir) in chain.iter().enumerate().rev() {
            if new_id == old_id {
                return Ok(result);
            }
            let name = &path.components()[depth];
            let mut copy = self.copy_of(dir);
            let entry = copy
                .entries_mut()?
                .get_mut(name)
                .ok_or_else(|| GraphError::NotFound(path.clone()))?;
            entry.child = new_id;
            old_id = dir.id;
            new_id = self.install(store, copy)?;
        }
        self.root = new_id;
        Ok(result)
    }

    fn copy_of(&self, node: &Node) -> Node {
        if self.fresh.contains(&node.id) {
            node.clone()
        } else {
            node.successor(self.version)
        }
    }

    fn install(&mut self, store: &dyn NodeStore, node: Node) -> GraphResult<NodeId> {
        let id = node.id;
        if self.fresh.contains(&id) {
            store.remove(&id)?;
        }
        store.put(node)?;
        self.fresh.insert(id);
        Ok(id)
    }
}

fn join_lossy(parent: &NodePath, name: &str) -> NodePath {
    parent.join(name).unwrap_or_else(|_| parent.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::{Grant, InMemoryNodeStore};
    use arbor_types::{Authority, PermissionLevel};

    use crate::change::EntryMutation;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn setup() -> (InMemoryNodeStore, TreeEditor) {
        let store = InMemoryNodeStore::new();
        let root = Node::new_directory(VersionId::new(1));
        let id = root.id;
        store.put(root).unwrap();
        (store, TreeEditor::new(id, VersionId::new(2)))
    }

    fn attach(parent: &str, name: &str, node: NewNode) -> Change {
        Change::unchecked(Op::Attach {
            parent: p(parent),
            name: name.into(),
            node,
        })
    }

    #[test]
    fn first_edit_copies_root_then_reuses_it() {
        let (store, mut editor) = setup();
        let original = editor.root();
        editor.apply(&store, &attach("/", "a", NewNode::folder())).unwrap();
        let after_first = editor.root();
        assert_ne!(after_first, original);
        editor.apply(&store, &attach("/", "b", NewNode::folder())).unwrap();
        assert_eq!(editor.root(), after_first);
        // original root, new root, a, b
        assert_eq!(store.len().unwrap(), 4);
    }

    #[test]
    fn original_tree_is_untouched() {
        let (store, mut editor) = setup();
        let original = editor.root();
        editor.apply(&store, &attach("/", "a", NewNode::folder())).unwrap();
        assert!(tree::list(&store, original, &NodePath::root()).unwrap().is_empty());
        assert_eq!(tree::list(&store, editor.root(), &NodePath::root()).unwrap().len(), 1);
    }

    #[test]
    fn attach_duplicate_name_fails() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "a", NewNode::folder())).unwrap();
        let err = editor
            .apply(&store, &attach("/", "a", NewNode::file(b"x".to_vec())))
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateName { name, .. } if name == "a"));
    }

    #[test]
    fn update_entry_bumps_counter_and_renames() {
        let (store, mut editor) = setup();
        let entry = editor
            .apply(&store, &attach("/", "a", NewNode::folder()))
            .unwrap()
            .unwrap();
        assert_eq!(entry.version, 0);
        let updated = editor
            .apply(
                &store,
                &Change::unchecked(Op::UpdateEntry {
                    parent: NodePath::root(),
                    name: "a".into(),
                    mutation: EntryMutation {
                        name: "b".into(),
                        rebind: None,
                    },
                }),
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.name, "b");
        assert_eq!(updated.child, entry.child);
        assert!(tree::lookup(&store, editor.root(), &NodePath::root(), "a")
            .unwrap()
            .is_none());
    }

    #[test]
    fn rebind_to_foreign_origin_is_rejected() {
        let (store, mut editor) = setup();
        let entry = editor
            .apply(&store, &attach("/", "a", NewNode::folder()))
            .unwrap()
            .unwrap();
        let stranger = Node::new_directory(VersionId::new(1));
        let stranger_id = stranger.id;
        store.put(stranger).unwrap();
        let err = editor
            .apply(
                &store,
                &Change::unchecked(Op::UpdateEntry {
                    parent: NodePath::root(),
                    name: "a".into(),
                    mutation: EntryMutation {
                        name: entry.name.clone(),
                        rebind: Some(stranger_id),
                    },
                }),
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidRebind { .. }));
    }

    #[test]
    fn move_into_own_subtree_is_rejected() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "a", NewNode::folder())).unwrap();
        editor.apply(&store, &attach("/a", "b", NewNode::folder())).unwrap();
        let err = editor
            .apply(
                &store,
                &Change::unchecked(Op::Move {
                    from: p("/a"),
                    to_parent: p("/a/b"),
                    name: "a".into(),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidMove { .. }));
    }

    #[test]
    fn root_cannot_be_moved() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "a", NewNode::folder())).unwrap();
        let op = Op::Move {
            from: NodePath::root(),
            to_parent: p("/a"),
            name: "root".into(),
        };
        assert!(matches!(
            editor.expectations_for(&store, &op),
            Err(GraphError::RootNode("move"))
        ));
        assert!(matches!(
            editor.apply(&store, &Change::unchecked(op)),
            Err(GraphError::RootNode("move"))
        ));
    }

    fn rename(parent: &str, name: &str, to: &str) -> Op {
        Op::UpdateEntry {
            parent: p(parent),
            name: name.into(),
            mutation: EntryMutation {
                name: to.into(),
                rebind: None,
            },
        }
    }

    #[test]
    fn rename_keeps_children_added_after_it_was_recorded() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "docs", NewNode::folder())).unwrap();
        let op = rename("/", "docs", "papers");
        let expect = editor.expectations_for(&store, &op).unwrap();

        editor.apply(&store, &attach("/docs", "new.txt", NewNode::file(b"x".to_vec()))).unwrap();
        editor
            .apply(
                &store,
                &Change::unchecked(Op::Grant {
                    path: p("/docs"),
                    grant: Grant::new(Authority::group("Y").unwrap(), PermissionLevel::Coordinator),
                }),
            )
            .unwrap();
        editor.apply(&store, &Change { op, expect }).unwrap();

        let papers = tree::resolve(&store, editor.root(), &p("/papers")).unwrap();
        assert_eq!(papers.acl.grants.len(), 1);
        assert!(tree::lookup(&store, editor.root(), &p("/papers"), "new.txt")
            .unwrap()
            .is_some());
    }

    #[test]
    fn entry_expectation_notices_recreated_node() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "f", NewNode::file(b"1".to_vec()))).unwrap();
        let op = rename("/", "f", "g");
        let expect = editor.expectations_for(&store, &op).unwrap();

        editor
            .apply(
                &store,
                &Change::unchecked(Op::Detach {
                    parent: NodePath::root(),
                    name: "f".into(),
                }),
            )
            .unwrap();
        editor.apply(&store, &attach("/", "f", NewNode::file(b"2".to_vec()))).unwrap();

        let err = editor.apply(&store, &Change { op, expect }).unwrap_err();
        assert!(matches!(err, GraphError::OptimisticLockConflict(_)));
    }

    #[test]
    fn rebind_cannot_link_a_node_twice() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "x", NewNode::folder())).unwrap();
        editor.apply(&store, &attach("/", "w", NewNode::folder())).unwrap();
        editor.apply(&store, &attach("/x", "z", NewNode::folder())).unwrap();
        let published = tree::lookup(&store, editor.root(), &NodePath::root(), "x")
            .unwrap()
            .unwrap();

        // Later version: /x/z moves to /w/z.
        let mut later = TreeEditor::new(editor.root(), VersionId::new(3));
        later
            .apply(
                &store,
                &Change::unchecked(Op::Move {
                    from: p("/x/z"),
                    to_parent: p("/w"),
                    name: "z".into(),
                }),
            )
            .unwrap();

        let mut rebinder = TreeEditor::new(later.root(), VersionId::new(4));
        let err = rebinder
            .apply(
                &store,
                &Change::unchecked(Op::UpdateEntry {
                    parent: NodePath::root(),
                    name: "x".into(),
                    mutation: EntryMutation {
                        name: "x".into(),
                        rebind: Some(published.child),
                    },
                }),
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidRebind { .. }));
    }

    #[test]
    fn rebind_expects_unchanged_record() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "f", NewNode::file(b"1".to_vec()))).unwrap();
        let op = Op::UpdateEntry {
            parent: NodePath::root(),
            name: "f".into(),
            mutation: EntryMutation {
                name: "f".into(),
                rebind: Some(NodeId::new()),
            },
        };
        let expect = editor.expectations_for(&store, &op).unwrap();
        assert!(expect.iter().any(|e| matches!(
            e,
            Expectation::Node { path, version: Some(0), .. } if *path == p("/f")
        )));
    }

    #[test]
    fn move_keeps_logical_identity() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "a", NewNode::folder())).unwrap();
        editor.apply(&store, &attach("/", "b", NewNode::folder())).unwrap();
        let file = NewNode::file(b"x".to_vec());
        let origin = file.origin;
        editor.apply(&store, &attach("/a", "f", file)).unwrap();
        editor
            .apply(
                &store,
                &Change::unchecked(Op::Move {
                    from: p("/a/f"),
                    to_parent: p("/b"),
                    name: "g".into(),
                }),
            )
            .unwrap();
        let moved = tree::resolve(&store, editor.root(), &p("/b/g")).unwrap();
        assert_eq!(moved.origin, origin);
        assert!(tree::lookup(&store, editor.root(), &p("/a"), "f").unwrap().is_none());
    }

    #[test]
    fn record_version_guards_acl_writes() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "a", NewNode::folder())).unwrap();
        let grant = Op::Grant {
            path: p("/a"),
            grant: Grant::new(Authority::group("X").unwrap(), PermissionLevel::Editor),
        };
        let expect = editor.expectations_for(&store, &grant).unwrap();
        let stale = Change { op: grant, expect };
        editor.apply(&store, &stale).unwrap();
        // Same expectations again: the record version has moved on.
        let err = editor.apply(&store, &stale).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn attach_expectation_ignores_record_version() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "a", NewNode::folder())).unwrap();
        let op = Op::Attach {
            parent: p("/a"),
            name: "doc".into(),
            node: NewNode::file(b"".to_vec()),
        };
        let expect = editor.expectations_for(&store, &op).unwrap();
        editor
            .apply(
                &store,
                &Change::unchecked(Op::SetInheritance {
                    path: p("/a"),
                    inherit: false,
                }),
            )
            .unwrap();
        editor.apply(&store, &Change { op, expect }).unwrap();
    }

    #[test]
    fn detach_reports_whole_subtree() {
        let (store, mut editor) = setup();
        let dir = NewNode::folder();
        let file = NewNode::file(b"x".to_vec());
        let expected = vec![dir.origin, file.origin];
        editor.apply(&store, &attach("/", "a", dir)).unwrap();
        editor.apply(&store, &attach("/a", "f", file)).unwrap();
        editor
            .apply(
                &store,
                &Change::unchecked(Op::Detach {
                    parent: NodePath::root(),
                    name: "a".into(),
                }),
            )
            .unwrap();
        assert_eq!(editor.detached(), expected.as_slice());
    }

    #[test]
    fn write_content_to_directory_fails() {
        let (store, mut editor) = setup();
        editor.apply(&store, &attach("/", "a", NewNode::folder())).unwrap();
        let err = editor
            .apply(
                &store,
                &Change::unchecked(Op::WriteContent {
                    path: p("/a"),
                    content: b"x".to_vec(),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::NotAFile(_)));
    }
}
