//! Branches, published versions, and the commit protocol.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use arbor_store::{Node, NodeStore};
use arbor_types::{BranchName, NodeId, VersionId};

use crate::change::Change;
use crate::editor::TreeEditor;
use crate::error::{GraphError, GraphResult};
use crate::snapshot::Snapshot;
use crate::working::WorkingTree;

pub(crate) fn poisoned<E: std::fmt::Display>(e: E) -> GraphError {
    GraphError::LockPoisoned(e.to_string())
}

/// Mutable state of one branch.
struct BranchHead {
    head: RwLock<Arc<Snapshot>>,
    /// Serializes commits on this branch. Held from replay to publication.
    commit_lock: Mutex<()>,
}

impl BranchHead {
    fn new(snapshot: Arc<Snapshot>) -> Self {
        Self {
            head: RwLock::new(snapshot),
            commit_lock: Mutex::new(()),
        }
    }

    fn current(&self) -> GraphResult<Arc<Snapshot>> {
        Ok(self.head.read().map_err(poisoned)?.clone())
    }
}

/// A replayed, not yet published commit, handed to the commit hook.
pub struct StagedCommit<'a> {
    /// The branch head the log was replayed onto.
    pub base: &'a Arc<Snapshot>,
    /// The version that will become the head if the hook publishes.
    pub snapshot: &'a Arc<Snapshot>,
    store: &'a dyn NodeStore,
    detached: &'a [NodeId],
}

impl<'a> StagedCommit<'a> {
    /// The arena holding both `base` and `snapshot`.
    pub fn store(&self) -> &'a dyn NodeStore {
        self.store
    }

    /// Logical ids of nodes unlinked during the replay (deleted subtrees and
    /// the previous targets of rebinds). Some may be reachable again in
    /// `snapshot`.
    pub fn detached(&self) -> &'a [NodeId] {
        self.detached
    }
}

/// What the commit hook decided.
#[derive(Debug)]
pub enum HookOutcome<T, E> {
    /// Publish the staged version and return `T`.
    Publish(T),
    /// Discard the staged version.
    Abort(E),
    /// Publish the staged version, then report `E` to the caller.
    PublishThenFail(E),
}

/// A published commit plus whatever the hook returned.
#[derive(Debug)]
pub struct Committed<T> {
    pub snapshot: Arc<Snapshot>,
    pub value: T,
}

/// Multi-branch versioned tree over a shared node arena.
///
/// Each branch has a head pointing at its latest published [`Snapshot`].
/// Every published snapshot stays readable until its history is pruned; the
/// arena is only reclaimed by [`collect_garbage`](Self::collect_garbage).
pub struct VersionedGraph {
    pub(crate) store: Arc<dyn NodeStore>,
    branches: RwLock<BTreeMap<BranchName, Arc<BranchHead>>>,
    pub(crate) versions: RwLock<BTreeMap<VersionId, Arc<Snapshot>>>,
    next_version: AtomicU64,
    /// Commits hold this shared; reclamation holds it exclusively.
    pub(crate) collector: RwLock<()>,
}

impl VersionedGraph {
    /// Create a graph with no branches over `store`.
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self {
            store,
            branches: RwLock::new(BTreeMap::new()),
            versions: RwLock::new(BTreeMap::new()),
            next_version: AtomicU64::new(1),
            collector: RwLock::new(()),
        }
    }

    /// The shared node arena.
    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    fn allocate_version(&self) -> VersionId {
        VersionId::new(self.next_version.fetch_add(1, Ordering::SeqCst))
    }

    fn branch(&self, name: &BranchName) -> GraphResult<Arc<BranchHead>> {
        self.branches
            .read()
            .map_err(poisoned)?
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::BranchNotFound(name.clone()))
    }

    fn record_version(&self, snapshot: &Arc<Snapshot>) -> GraphResult<()> {
        self.versions
            .write()
            .map_err(poisoned)?
            .insert(snapshot.version, snapshot.clone());
        Ok(())
    }

    // -- branches ------------------------------------------------------------

    /// Create a branch with an empty root directory.
    pub fn init_branch(&self, name: BranchName) -> GraphResult<Arc<Snapshot>> {
        let _shared = self.collector.read().map_err(poisoned)?;
        let mut branches = self.branches.write().map_err(poisoned)?;
        if branches.contains_key(&name) {
            return Err(GraphError::BranchExists(name));
        }
        let version = self.allocate_version();
        let root = self.store.put(Node::new_directory(version))?;
        let snapshot = Arc::new(Snapshot::new(version, name.clone(), root.id, None, Vec::new()));
        self.record_version(&snapshot)?;
        branches.insert(name.clone(), Arc::new(BranchHead::new(snapshot.clone())));
        tracing::info!(branch = %name, %version, "initialized branch");
        Ok(snapshot)
    }

    /// Create `name` pointing at the current head of `from`.
    ///
    /// The new branch shares the source root; nothing is copied until one
    /// side edits.
    pub fn create_branch(&self, name: BranchName, from: &BranchName) -> GraphResult<Arc<Snapshot>> {
        let source = self.head(from)?;
        let mut branches = self.branches.write().map_err(poisoned)?;
        if branches.contains_key(&name) {
            return Err(GraphError::BranchExists(name));
        }
        let version = self.allocate_version();
        let snapshot = Arc::new(Snapshot::new(
            version,
            name.clone(),
            source.root,
            Some(source.version),
            Vec::new(),
        ));
        self.record_version(&snapshot)?;
        branches.insert(name.clone(), Arc::new(BranchHead::new(snapshot.clone())));
        tracing::info!(branch = %name, from = %from, %version, "created branch");
        Ok(snapshot)
    }

    /// Remove a branch head. Its snapshots stay readable until pruned.
    ///
    /// Waits for an in-flight commit on the branch to finish; commits that
    /// start afterwards fail with [`GraphError::BranchNotFound`].
    pub fn delete_branch(&self, name: &BranchName) -> GraphResult<()> {
        let head = self.branch(name)?;
        let _serial = head.commit_lock.lock().map_err(poisoned)?;
        let removed = self.branches.write().map_err(poisoned)?.remove(name);
        match removed {
            Some(_) => {
                tracing::info!(branch = %name, "deleted branch");
                Ok(())
            }
            None => Err(GraphError::BranchNotFound(name.clone())),
        }
    }

    /// Names of all branches, sorted.
    pub fn branches(&self) -> GraphResult<Vec<BranchName>> {
        Ok(self.branches.read().map_err(poisoned)?.keys().cloned().collect())
    }

    /// `true` if `name` is a live branch.
    pub fn has_branch(&self, name: &BranchName) -> GraphResult<bool> {
        Ok(self.branches.read().map_err(poisoned)?.contains_key(name))
    }

    // -- versions ------------------------------------------------------------

    /// The latest published snapshot of a branch.
    pub fn head(&self, branch: &BranchName) -> GraphResult<Arc<Snapshot>> {
        self.branch(branch)?.current()
    }

    /// A specific published version.
    pub fn snapshot_at(&self, version: VersionId) -> GraphResult<Arc<Snapshot>> {
        self.versions
            .read()
            .map_err(poisoned)?
            .get(&version)
            .cloned()
            .ok_or(GraphError::VersionNotFound(version))
    }

    /// Retained versions of a branch, newest first, following parent links.
    pub fn history(&self, branch: &BranchName) -> GraphResult<Vec<Arc<Snapshot>>> {
        let head = self.head(branch)?;
        let versions = self.versions.read().map_err(poisoned)?;
        let mut out = vec![head.clone()];
        let mut cursor = head.parent;
        while let Some(version) = cursor {
            match versions.get(&version) {
                Some(snapshot) => {
                    cursor = snapshot.parent;
                    out.push(snapshot.clone());
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Run `work` on the heads of `names` while none of them can commit.
    ///
    /// Commit locks are taken in branch-name order, so concurrent callers
    /// cannot deadlock. The snapshots are passed in that order too.
    pub fn with_heads_locked<R>(
        &self,
        names: &[BranchName],
        work: impl FnOnce(&[Arc<Snapshot>]) -> R,
    ) -> GraphResult<R> {
        let mut names = names.to_vec();
        names.sort();
        names.dedup();
        let heads = names
            .iter()
            .map(|name| self.branch(name))
            .collect::<GraphResult<Vec<_>>>()?;
        let _serial = heads
            .iter()
            .map(|head| head.commit_lock.lock().map_err(poisoned))
            .collect::<GraphResult<Vec<_>>>()?;
        let snapshots = heads
            .iter()
            .map(|head| head.current())
            .collect::<GraphResult<Vec<_>>>()?;
        Ok(work(&snapshots))
    }

    // -- transactions --------------------------------------------------------

    /// Start a working tree on the current head of `branch`.
    pub fn begin(&self, branch: &BranchName) -> GraphResult<WorkingTree> {
        let base = self.head(branch)?;
        Ok(WorkingTree::new(base, self.store.clone()))
    }

    /// Replay `changes` onto the head of `branch` and publish the result.
    pub fn commit_version(&self, branch: &BranchName, changes: Vec<Change>) -> GraphResult<Arc<Snapshot>> {
        let committed = self.commit_with(branch, changes, |_| {
            HookOutcome::<(), GraphError>::Publish(())
        })?;
        Ok(committed.snapshot)
    }

    /// Replay `changes` onto the head of `branch`, let `hook` inspect the
    /// staged version, and publish or discard it as the hook decides.
    ///
    /// Commits on one branch are serialized; the hook runs while the branch
    /// commit lock is held, so anything it does is ordered with the head
    /// swap. A replay failure (for example an optimistic lock conflict)
    /// returns before the hook runs.
    pub fn commit_with<T, E, F>(
        &self,
        branch: &BranchName,
        changes: Vec<Change>,
        hook: F,
    ) -> Result<Committed<T>, E>
    where
        E: From<GraphError>,
        F: FnOnce(&StagedCommit<'_>) -> HookOutcome<T, E>,
    {
        let _shared = self.collector.read().map_err(poisoned)?;
        let head = self.branch(branch)?;
        let _serial = head.commit_lock.lock().map_err(poisoned)?;
        if !Arc::ptr_eq(&self.branch(branch)?, &head) {
            return Err(GraphError::BranchNotFound(branch.clone()).into());
        }
        let base = head.current()?;

        let version = self.allocate_version();
        let mut editor = TreeEditor::new(base.root, version);
        for change in &changes {
            if let Err(e) = editor.apply(self.store.as_ref(), change) {
                tracing::debug!(branch = %branch, %version, error = %e, "replay failed");
                return Err(e.into());
            }
        }
        let snapshot = Arc::new(Snapshot::new(
            version,
            branch.clone(),
            editor.root(),
            Some(base.version),
            changes,
        ));

        let staged = StagedCommit {
            base: &base,
            snapshot: &snapshot,
            store: self.store.as_ref(),
            detached: editor.detached(),
        };
        let outcome = match hook(&staged) {
            HookOutcome::Publish(value) => Ok(value),
            HookOutcome::Abort(e) => {
                tracing::debug!(branch = %branch, %version, "commit aborted by hook");
                return Err(e);
            }
            HookOutcome::PublishThenFail(e) => Err(e),
        };

        self.record_version(&snapshot)?;
        *head.head.write().map_err(poisoned)? = snapshot.clone();
        tracing::info!(
            branch = %branch,
            %version,
            parent = %base.version,
            changes = snapshot.changes.len(),
            nodes_written = editor.written(),
            "published version"
        );
        outcome.map(|value| Committed { snapshot, value })
    }
}

impl std::fmt::Debug for VersionedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedGraph")
            .field("next_version", &self.next_version.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::InMemoryNodeStore;
    use arbor_types::{Authority, NodePath, PermissionLevel};

    use crate::change::{NewNode, Op};

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn trunk() -> BranchName {
        BranchName::new("main").unwrap()
    }

    fn graph() -> VersionedGraph {
        let g = VersionedGraph::new(Arc::new(InMemoryNodeStore::new()));
        g.init_branch(trunk()).unwrap();
        g
    }

    fn commit(g: &VersionedGraph, wt: WorkingTree) -> GraphResult<Arc<Snapshot>> {
        let branch = wt.base().branch.clone();
        g.commit_version(&branch, wt.into_changes())
    }

    #[test]
    fn init_branch_twice_fails() {
        let g = graph();
        assert!(matches!(g.init_branch(trunk()), Err(GraphError::BranchExists(_))));
    }

    #[test]
    fn committed_writes_are_visible_at_head() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "docs", NewNode::folder()).unwrap();
        wt.attach(&p("/docs"), "a.txt", NewNode::file(b"alpha".to_vec()))
            .unwrap();
        let snap = commit(&g, wt).unwrap();
        assert_eq!(g.head(&trunk()).unwrap().version, snap.version);
        assert_eq!(
            snap.read_content(g.store().as_ref(), &p("/docs/a.txt")).unwrap(),
            b"alpha"
        );
    }

    #[test]
    fn old_versions_are_unchanged() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "f", NewNode::file(b"one".to_vec()))
            .unwrap();
        let v1 = commit(&g, wt).unwrap();

        let mut wt = g.begin(&trunk()).unwrap();
        wt.write_content(&p("/f"), b"two".to_vec()).unwrap();
        let v2 = commit(&g, wt).unwrap();

        let store = g.store().as_ref();
        let old = g.snapshot_at(v1.version).unwrap();
        assert_eq!(old.read_content(store, &p("/f")).unwrap(), b"one");
        assert_eq!(v2.read_content(store, &p("/f")).unwrap(), b"two");
        assert_eq!(v2.changes.len(), 1);
    }

    #[test]
    fn working_tree_reads_its_own_writes_but_head_does_not() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "x", NewNode::folder()).unwrap();
        assert!(wt.lookup(&NodePath::root(), "x").unwrap().is_some());
        let head = g.head(&trunk()).unwrap();
        assert!(head
            .lookup(g.store().as_ref(), &NodePath::root(), "x")
            .unwrap()
            .is_none());
    }

    #[test]
    fn branches_are_isolated() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "shared", NewNode::folder()).unwrap();
        commit(&g, wt).unwrap();

        let feature = BranchName::new("feature").unwrap();
        let forked = g.create_branch(feature.clone(), &trunk()).unwrap();
        assert_eq!(forked.root, g.head(&trunk()).unwrap().root);

        let mut wt = g.begin(&feature).unwrap();
        wt.attach(&p("/shared"), "only-on-feature", NewNode::folder())
            .unwrap();
        commit(&g, wt).unwrap();

        let store = g.store().as_ref();
        assert!(g
            .head(&trunk())
            .unwrap()
            .lookup(store, &p("/shared"), "only-on-feature")
            .unwrap()
            .is_none());
        assert!(g
            .head(&feature)
            .unwrap()
            .lookup(store, &p("/shared"), "only-on-feature")
            .unwrap()
            .is_some());
    }

    #[test]
    fn concurrent_duplicate_attach_conflicts_at_replay() {
        let g = graph();
        let mut first = g.begin(&trunk()).unwrap();
        let mut second = g.begin(&trunk()).unwrap();
        first
            .attach(&NodePath::root(), "same", NewNode::folder())
            .unwrap();
        second
            .attach(&NodePath::root(), "same", NewNode::folder())
            .unwrap();
        commit(&g, first).unwrap();
        let err = commit(&g, second).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateName { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn creates_replay_onto_newer_acl_state() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "a", NewNode::folder()).unwrap();
        commit(&g, wt).unwrap();

        let mut creator = g.begin(&trunk()).unwrap();
        creator
            .attach(&p("/a"), "doc", NewNode::file(Vec::new()))
            .unwrap();

        let mut admin = g.begin(&trunk()).unwrap();
        admin.set_inheritance(&p("/a"), false).unwrap();
        admin
            .grant(&p("/a"), Authority::group("Y").unwrap(), PermissionLevel::Coordinator)
            .unwrap();
        commit(&g, admin).unwrap();

        let snap = commit(&g, creator).unwrap();
        let store = g.store().as_ref();
        let folder = snap.resolve(store, &p("/a")).unwrap();
        assert!(!folder.acl.inherit);
        assert_eq!(folder.acl.grants.len(), 1);
        assert!(snap.resolve(store, &p("/a/doc")).is_ok());
    }

    #[test]
    fn concurrent_record_writes_conflict() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "f", NewNode::file(b"0".to_vec()))
            .unwrap();
        commit(&g, wt).unwrap();

        let mut left = g.begin(&trunk()).unwrap();
        let mut right = g.begin(&trunk()).unwrap();
        left.write_content(&p("/f"), b"left".to_vec()).unwrap();
        right.write_content(&p("/f"), b"right".to_vec()).unwrap();
        commit(&g, left).unwrap();
        let err = commit(&g, right).unwrap_err();
        assert!(matches!(err, GraphError::OptimisticLockConflict(_)));
    }

    #[test]
    fn stale_entry_update_fails_eagerly() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        let entry = wt
            .attach(&NodePath::root(), "a", NewNode::folder())
            .unwrap();
        wt.update(&NodePath::root(), &entry, |m| m.name = "b".into())
            .unwrap();
        let entry_b = wt.lookup(&NodePath::root(), "b").unwrap().unwrap();
        let mut stale = entry_b.clone();
        stale.version = 0;
        let err = wt
            .update(&NodePath::root(), &stale, |m| m.name = "c".into())
            .unwrap_err();
        assert!(matches!(err, GraphError::OptimisticLockConflict(_)));
    }

    #[test]
    fn update_through_entry_of_replaced_node_fails_eagerly() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        let old = wt
            .attach(&NodePath::root(), "f", NewNode::file(b"1".to_vec()))
            .unwrap();
        wt.detach(&NodePath::root(), "f").unwrap();
        wt.attach(&NodePath::root(), "f", NewNode::file(b"2".to_vec()))
            .unwrap();
        let err = wt
            .update(&NodePath::root(), &old, |m| m.name = "g".into())
            .unwrap_err();
        assert!(matches!(err, GraphError::OptimisticLockConflict(_)));
    }

    #[test]
    fn rename_replays_onto_concurrent_create() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "docs", NewNode::folder()).unwrap();
        commit(&g, wt).unwrap();

        let mut renamer = g.begin(&trunk()).unwrap();
        renamer.rename(&p("/docs"), "papers").unwrap();

        let mut writer = g.begin(&trunk()).unwrap();
        writer
            .attach(&p("/docs"), "new.txt", NewNode::file(b"x".to_vec()))
            .unwrap();
        commit(&g, writer).unwrap();

        let snap = commit(&g, renamer).unwrap();
        let store = g.store().as_ref();
        assert!(snap.lookup(store, &NodePath::root(), "docs").unwrap().is_none());
        assert_eq!(snap.read_content(store, &p("/papers/new.txt")).unwrap(), b"x");
    }

    #[test]
    fn rename_replays_onto_concurrent_grant() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "A", NewNode::folder()).unwrap();
        commit(&g, wt).unwrap();

        let mut renamer = g.begin(&trunk()).unwrap();
        renamer.rename(&p("/A"), "B").unwrap();

        let mut admin = g.begin(&trunk()).unwrap();
        admin
            .grant(&p("/A"), Authority::group("Y").unwrap(), PermissionLevel::Coordinator)
            .unwrap();
        commit(&g, admin).unwrap();

        let snap = commit(&g, renamer).unwrap();
        let moved = snap.resolve(g.store().as_ref(), &p("/B")).unwrap();
        assert_eq!(moved.acl.grants.len(), 1);
    }

    #[test]
    fn rename_of_recreated_node_conflicts() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "f", NewNode::file(b"1".to_vec()))
            .unwrap();
        commit(&g, wt).unwrap();

        let mut renamer = g.begin(&trunk()).unwrap();
        renamer.rename(&p("/f"), "g").unwrap();

        let mut replacer = g.begin(&trunk()).unwrap();
        replacer.detach(&NodePath::root(), "f").unwrap();
        replacer
            .attach(&NodePath::root(), "f", NewNode::file(b"2".to_vec()))
            .unwrap();
        commit(&g, replacer).unwrap();

        let err = commit(&g, renamer).unwrap_err();
        assert!(matches!(err, GraphError::OptimisticLockConflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn rebind_after_concurrent_edit_conflicts() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "f", NewNode::file(b"one".to_vec()))
            .unwrap();
        let v1 = commit(&g, wt).unwrap();
        let store = g.store().clone();
        let first = v1.lookup(store.as_ref(), &NodePath::root(), "f").unwrap().unwrap();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.write_content(&p("/f"), b"two".to_vec()).unwrap();
        commit(&g, wt).unwrap();

        let mut reverter = g.begin(&trunk()).unwrap();
        let current = reverter.lookup(&NodePath::root(), "f").unwrap().unwrap();
        reverter
            .update(&NodePath::root(), &current, |m| m.rebind = Some(first.child))
            .unwrap();

        let mut writer = g.begin(&trunk()).unwrap();
        writer.write_content(&p("/f"), b"three".to_vec()).unwrap();
        commit(&g, writer).unwrap();

        let err = commit(&g, reverter).unwrap_err();
        assert!(matches!(err, GraphError::OptimisticLockConflict(_)));
    }

    #[test]
    fn hook_abort_discards_version() {
        let g = graph();
        let before = g.head(&trunk()).unwrap().version;
        let changes = vec![Change::unchecked(Op::Attach {
            parent: NodePath::root(),
            name: "x".into(),
            node: NewNode::folder(),
        })];
        let result: Result<Committed<()>, GraphError> = g.commit_with(&trunk(), changes, |_| {
            HookOutcome::Abort(GraphError::OptimisticLockConflict("no".into()))
        });
        assert!(result.is_err());
        assert_eq!(g.head(&trunk()).unwrap().version, before);
    }

    #[test]
    fn hook_publish_then_fail_still_publishes() {
        let g = graph();
        let before = g.head(&trunk()).unwrap().version;
        let changes = vec![Change::unchecked(Op::Attach {
            parent: NodePath::root(),
            name: "x".into(),
            node: NewNode::folder(),
        })];
        let result: Result<Committed<()>, GraphError> = g.commit_with(&trunk(), changes, |staged| {
            assert_eq!(staged.base.version, before);
            HookOutcome::PublishThenFail(GraphError::LockPoisoned("downstream".into()))
        });
        assert!(result.is_err());
        assert_ne!(g.head(&trunk()).unwrap().version, before);
    }

    #[test]
    fn history_follows_parents() {
        let g = graph();
        for name in ["a", "b", "c"] {
            let mut wt = g.begin(&trunk()).unwrap();
            wt.attach(&NodePath::root(), name, NewNode::folder()).unwrap();
            commit(&g, wt).unwrap();
        }
        let history = g.history(&trunk()).unwrap();
        assert_eq!(history.len(), 4);
        assert!(history.windows(2).all(|w| w[0].parent == Some(w[1].version)));
    }

    #[test]
    fn rebind_reverts_to_earlier_version() {
        let g = graph();
        let mut wt = g.begin(&trunk()).unwrap();
        wt.attach(&NodePath::root(), "f", NewNode::file(b"one".to_vec()))
            .unwrap();
        let v1 = commit(&g, wt).unwrap();
        let store = g.store().clone();
        let first = v1.lookup(store.as_ref(), &NodePath::root(), "f").unwrap().unwrap();

        let mut wt = g.begin(&trunk()).unwrap();
        wt.write_content(&p("/f"), b"two".to_vec()).unwrap();
        commit(&g, wt).unwrap();

        let mut wt = g.begin(&trunk()).unwrap();
        let current = wt.lookup(&NodePath::root(), "f").unwrap().unwrap();
        wt.update(&NodePath::root(), &current, |m| m.rebind = Some(first.child))
            .unwrap();
        let v3 = commit(&g, wt).unwrap();
        assert_eq!(v3.read_content(store.as_ref(), &p("/f")).unwrap(), b"one");
    }

    #[test]
    fn unknown_branch_is_reported() {
        let g = graph();
        let ghost = BranchName::new("ghost").unwrap();
        assert!(matches!(g.begin(&ghost), Err(GraphError::BranchNotFound(_))));
    }

    #[test]
    fn commits_on_deleted_branch_fail() {
        let g = graph();
        let feature = BranchName::new("feature").unwrap();
        g.create_branch(feature.clone(), &trunk()).unwrap();
        let mut wt = g.begin(&feature).unwrap();
        wt.attach(&NodePath::root(), "late", NewNode::folder()).unwrap();

        g.delete_branch(&feature).unwrap();
        assert!(matches!(commit(&g, wt), Err(GraphError::BranchNotFound(_))));
        assert!(!g.has_branch(&feature).unwrap());
    }

    #[test]
    fn heads_locked_are_sorted_and_deduplicated() {
        let g = graph();
        let feature = BranchName::new("feature").unwrap();
        g.create_branch(feature.clone(), &trunk()).unwrap();
        let names = g
            .with_heads_locked(&[trunk(), feature.clone(), trunk()], |heads| {
                heads.iter().map(|h| h.branch.clone()).collect::<Vec<_>>()
            })
            .unwrap();
        assert_eq!(names, vec![feature, trunk()]);
    }
}
