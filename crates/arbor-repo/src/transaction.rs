//! Unit of work against one branch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use arbor_acl::{AclEvaluator, EffectivePermissions};
use arbor_graph::{EntryMutation, GraphError, NewNode, WorkingTree};
use arbor_store::{Acl, DirectoryEntry, Node, NodeStore, NodeType};
use arbor_types::{Authority, BranchName, NodeId, NodePath, PermissionLevel, VersionId};

use crate::error::{RepoError, RepoResult};

/// Metadata of one node as seen by a reader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStat {
    pub path: NodePath,
    pub id: NodeId,
    pub origin: NodeId,
    pub kind: NodeType,
    pub content_len: u64,
    pub content_digest: Option<String>,
    pub created_in: VersionId,
    /// Record counter (content and permission writes).
    pub version: u64,
    pub children: usize,
    pub acl: Acl,
}

impl NodeStat {
    pub(crate) fn new(path: NodePath, node: &Node) -> Self {
        Self {
            path,
            id: node.id,
            origin: node.origin,
            kind: node.node_type(),
            content_len: node.content_len(),
            content_digest: node.content_digest(),
            created_in: node.created_in,
            version: node.version,
            children: node.entries().map(|e| e.len()).unwrap_or(0),
            acl: node.acl.clone(),
        }
    }
}

/// Outcome of a published commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub branch: BranchName,
    pub version: VersionId,
    pub parent: VersionId,
    pub changes: usize,
    pub index_upserts: usize,
    pub index_deletes: usize,
}

type AfterCommit = Box<dyn FnOnce(&CommitInfo) + Send>;

/// A private working view of a branch.
///
/// Reads observe the transaction's own writes. Nothing is visible to other
/// readers until [`Repository::commit`](crate::Repository::commit)
/// publishes it; dropping the transaction discards everything.
pub struct Transaction {
    working: WorkingTree,
    read_only: bool,
    after_commit: Vec<AfterCommit>,
}

impl Transaction {
    pub(crate) fn new(working: WorkingTree, read_only: bool) -> Self {
        Self {
            working,
            read_only,
            after_commit: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (WorkingTree, bool, Vec<AfterCommit>) {
        (self.working, self.read_only, self.after_commit)
    }

    /// Branch the transaction will commit to.
    pub fn branch(&self) -> &BranchName {
        &self.working.base().branch
    }

    /// The version this transaction started from.
    pub fn base_version(&self) -> VersionId {
        self.working.base().version
    }

    /// `true` if every mutation is rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// `true` once any edit has been recorded.
    pub fn is_dirty(&self) -> bool {
        self.working.is_dirty()
    }

    /// Run `callback` once this transaction's version is published.
    ///
    /// Callbacks of attempts that conflict and are retried never run.
    pub fn after_commit(&mut self, callback: impl FnOnce(&CommitInfo) + Send + 'static) {
        self.after_commit.push(Box::new(callback));
    }

    fn writable(&mut self) -> RepoResult<&mut WorkingTree> {
        if self.read_only {
            return Err(RepoError::ReadOnlyTransaction);
        }
        Ok(&mut self.working)
    }

    fn evaluator(&self) -> AclEvaluator<'_> {
        AclEvaluator::new(self.working.store(), self.working.root())
    }

    // -- reads ---------------------------------------------------------------

    /// The entry `name` under `parent`, including uncommitted edits.
    pub fn lookup(&self, parent: &NodePath, name: &str) -> RepoResult<Option<DirectoryEntry>> {
        Ok(self.working.lookup(parent, name)?)
    }

    pub fn exists(&self, path: &NodePath) -> RepoResult<bool> {
        match path.split_last() {
            None => Ok(true),
            Some((parent, name)) => match self.working.lookup(&parent, name) {
                Ok(entry) => Ok(entry.is_some()),
                Err(GraphError::NotFound(_))
                | Err(GraphError::NotADirectory(_)) => Ok(false),
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Entries of the directory at `path`, sorted by name.
    pub fn list_children(&self, path: &NodePath) -> RepoResult<Vec<DirectoryEntry>> {
        Ok(self.working.list(path)?)
    }

    pub fn read_content(&self, path: &NodePath) -> RepoResult<Vec<u8>> {
        Ok(self.working.read_content(path)?)
    }

    /// Metadata of the node at `path`.
    pub fn stat(&self, path: &NodePath) -> RepoResult<NodeStat> {
        let node = self.working.resolve(path)?;
        Ok(NodeStat::new(path.clone(), &node))
    }

    /// The local permission record of the node at `path`.
    pub fn get_permissions(&self, path: &NodePath) -> RepoResult<Acl> {
        Ok(self.evaluator().local(path)?)
    }

    /// Permissions in force at `path`, inherited grants included.
    pub fn effective_permissions(&self, path: &NodePath) -> RepoResult<EffectivePermissions> {
        Ok(self.evaluator().effective(path)?)
    }

    pub fn has_permission(
        &self,
        path: &NodePath,
        authority: &Authority,
        level: PermissionLevel,
    ) -> RepoResult<bool> {
        Ok(self.evaluator().has_permission(path, authority, level)?)
    }

    // -- structure -----------------------------------------------------------

    /// Create `node` under `parent` as `name`.
    pub fn attach(
        &mut self,
        parent: &NodePath,
        name: &str,
        node: NewNode,
    ) -> RepoResult<DirectoryEntry> {
        Ok(self.writable()?.attach(parent, name, node)?)
    }

    pub fn create_folder(&mut self, parent: &NodePath, name: &str) -> RepoResult<DirectoryEntry> {
        self.attach(parent, name, NewNode::folder())
    }

    pub fn create_file(
        &mut self,
        parent: &NodePath,
        name: &str,
        content: impl Into<Vec<u8>>,
    ) -> RepoResult<DirectoryEntry> {
        self.attach(parent, name, NewNode::file(content))
    }

    /// Unlink the entry `name` under `parent` together with its subtree.
    pub fn detach(&mut self, parent: &NodePath, name: &str) -> RepoResult<()> {
        Ok(self.writable()?.detach(parent, name)?)
    }

    /// Remove the node at `path` and its whole subtree.
    pub fn delete(&mut self, path: &NodePath) -> RepoResult<()> {
        let (parent, name) = path
            .split_last()
            .ok_or(GraphError::RootNode("delete"))?;
        self.detach(&parent, name)
    }

    /// Mutate an entry the caller previously looked up.
    ///
    /// Fails with an optimistic lock conflict if the entry changed since.
    pub fn update(
        &mut self,
        parent: &NodePath,
        entry: &DirectoryEntry,
        mutator: impl FnOnce(&mut EntryMutation),
    ) -> RepoResult<DirectoryEntry> {
        Ok(self.writable()?.update(parent, entry, mutator)?)
    }

    /// Rename the node at `path` within its parent.
    pub fn rename(&mut self, path: &NodePath, new_name: &str) -> RepoResult<DirectoryEntry> {
        Ok(self.writable()?.rename(path, new_name)?)
    }

    /// Move the node at `from` under `to_parent` as `name`.
    pub fn move_node(
        &mut self,
        from: &NodePath,
        to_parent: &NodePath,
        name: &str,
    ) -> RepoResult<DirectoryEntry> {
        Ok(self.writable()?.move_node(from, to_parent, name)?)
    }

    // -- records -------------------------------------------------------------

    /// Replace the content of the file at `path`.
    pub fn write_content(&mut self, path: &NodePath, content: impl Into<Vec<u8>>) -> RepoResult<()> {
        Ok(self.writable()?.write_content(path, content.into())?)
    }

    /// Add a local grant. Descendants are not touched.
    pub fn set_permission(
        &mut self,
        path: &NodePath,
        authority: Authority,
        level: PermissionLevel,
    ) -> RepoResult<()> {
        Ok(self.writable()?.grant(path, authority, level)?)
    }

    /// Remove every local grant held by `authority`.
    pub fn remove_permission(&mut self, path: &NodePath, authority: Authority) -> RepoResult<()> {
        Ok(self.writable()?.revoke(path, authority, None)?)
    }

    /// Remove one local grant.
    pub fn revoke_permission(
        &mut self,
        path: &NodePath,
        authority: Authority,
        level: PermissionLevel,
    ) -> RepoResult<()> {
        Ok(self.writable()?.revoke(path, authority, Some(level))?)
    }

    /// Turn permission inheritance on or off for the node at `path`.
    pub fn set_inheritance(&mut self, path: &NodePath, inherit: bool) -> RepoResult<()> {
        Ok(self.writable()?.set_inheritance(path, inherit)?)
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("working", &self.working)
            .field("read_only", &self.read_only)
            .field("after_commit", &self.after_commit.len())
            .finish()
    }
}

/// Read-only view of one published version.
#[derive(Clone)]
pub struct SnapshotReader {
    store: Arc<dyn NodeStore>,
    snapshot: Arc<arbor_graph::Snapshot>,
}

impl SnapshotReader {
    pub(crate) fn new(store: Arc<dyn NodeStore>, snapshot: Arc<arbor_graph::Snapshot>) -> Self {
        Self { store, snapshot }
    }

    pub fn snapshot(&self) -> &Arc<arbor_graph::Snapshot> {
        &self.snapshot
    }

    /// Version the reader is pinned to.
    pub fn version(&self) -> VersionId {
        self.snapshot.version
    }

    fn evaluator(&self) -> AclEvaluator<'_> {
        AclEvaluator::for_snapshot(self.store.as_ref(), &self.snapshot)
    }

    pub fn lookup(&self, parent: &NodePath, name: &str) -> RepoResult<Option<DirectoryEntry>> {
        Ok(self.snapshot.lookup(self.store.as_ref(), parent, name)?)
    }

    pub fn exists(&self, path: &NodePath) -> RepoResult<bool> {
        Ok(self.snapshot.exists(self.store.as_ref(), path)?)
    }

    pub fn list_children(&self, path: &NodePath) -> RepoResult<Vec<DirectoryEntry>> {
        Ok(self.snapshot.list(self.store.as_ref(), path)?)
    }

    pub fn read_content(&self, path: &NodePath) -> RepoResult<Vec<u8>> {
        Ok(self.snapshot.read_content(self.store.as_ref(), path)?)
    }

    /// Metadata of the node at `path`.
    pub fn stat(&self, path: &NodePath) -> RepoResult<NodeStat> {
        let node = self.snapshot.resolve(self.store.as_ref(), path)?;
        Ok(NodeStat::new(path.clone(), &node))
    }

    /// Every path in the subtree at `path`, pre-order.
    pub fn walk(&self, path: &NodePath) -> RepoResult<Vec<NodeStat>> {
        Ok(self
            .snapshot
            .walk(self.store.as_ref(), path)?
            .into_iter()
            .map(|(p, node)| NodeStat::new(p, &node))
            .collect())
    }

    /// The local permission record of the node at `path`.
    pub fn get_permissions(&self, path: &NodePath) -> RepoResult<Acl> {
        Ok(self.evaluator().local(path)?)
    }

    /// Permissions in force at `path`, inherited grants included.
    pub fn effective_permissions(&self, path: &NodePath) -> RepoResult<EffectivePermissions> {
        Ok(self.evaluator().effective(path)?)
    }

    pub fn has_permission(
        &self,
        path: &NodePath,
        authority: &Authority,
        level: PermissionLevel,
    ) -> RepoResult<bool> {
        Ok(self.evaluator().has_permission(path, authority, level)?)
    }
}

impl std::fmt::Debug for SnapshotReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotReader")
            .field("version", &self.snapshot.version)
            .field("branch", &self.snapshot.branch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Repository;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn root_cannot_be_deleted() {
        let repo = Repository::in_memory().unwrap();
        let mut txn = repo.begin(repo.default_branch()).unwrap();
        let err = txn.delete(&NodePath::root()).unwrap_err();
        assert!(matches!(err, RepoError::Graph(GraphError::RootNode("delete"))));
        assert!(matches!(
            txn.rename(&NodePath::root(), "top"),
            Err(RepoError::Graph(GraphError::RootNode("rename")))
        ));
        assert!(!txn.is_dirty());
    }

    #[test]
    fn update_renames_through_looked_up_entry() {
        let repo = Repository::in_memory().unwrap();
        let main = repo.default_branch().clone();
        repo.create_folder(&main, &NodePath::root(), "a").unwrap();

        let mut txn = repo.begin(&main).unwrap();
        let entry = txn.lookup(&NodePath::root(), "a").unwrap().unwrap();
        let renamed = txn
            .update(&NodePath::root(), &entry, |m| m.name = "b".into())
            .unwrap();
        assert_eq!(renamed.name, "b");
        assert_eq!(renamed.child, entry.child);
        assert!(txn.lookup(&NodePath::root(), "a").unwrap().is_none());
        repo.commit(txn).unwrap();
        assert!(repo.lookup(&main, &NodePath::root(), "b").unwrap().is_some());
    }

    #[test]
    fn revoke_removes_one_level_only() {
        let repo = Repository::in_memory().unwrap();
        let main = repo.default_branch().clone();
        let bob = Authority::new("bob").unwrap();
        let mut txn = repo.begin(&main).unwrap();
        txn.create_folder(&NodePath::root(), "a").unwrap();
        txn.set_permission(&p("/a"), bob.clone(), PermissionLevel::Editor).unwrap();
        txn.set_permission(&p("/a"), bob.clone(), PermissionLevel::Coordinator).unwrap();
        txn.revoke_permission(&p("/a"), bob.clone(), PermissionLevel::Coordinator)
            .unwrap();

        let acl = txn.get_permissions(&p("/a")).unwrap();
        assert_eq!(acl.grants.len(), 1);
        assert_eq!(
            txn.effective_permissions(&p("/a")).unwrap().level_of(&bob),
            Some(PermissionLevel::Editor)
        );
        assert!(!txn.has_permission(&p("/a"), &bob, PermissionLevel::Coordinator).unwrap());
    }

    #[test]
    fn stat_serializes_for_display() {
        let repo = Repository::in_memory().unwrap();
        let main = repo.default_branch().clone();
        repo.create_file(&main, &NodePath::root(), "note", b"hello").unwrap();
        let stat = repo.reader(&main).unwrap().stat(&p("/note")).unwrap();
        let json = serde_json::to_value(&stat).unwrap();
        assert_eq!(json["content_len"], 5);
        assert_eq!(json["children"], 0);
        assert_eq!(stat.id, stat.origin);
    }

    #[test]
    fn reader_walks_subtree_in_order() {
        let repo = Repository::in_memory().unwrap();
        let main = repo.default_branch().clone();
        repo.run_transaction(&main, false, |txn| {
            txn.create_folder(&NodePath::root(), "a")?;
            txn.create_file(&p("/a"), "x", b"1")?;
            txn.create_folder(&p("/a"), "b")?;
            Ok(())
        })
        .unwrap();
        let paths: Vec<_> = repo
            .reader(&main)
            .unwrap()
            .walk(&p("/a"))
            .unwrap()
            .into_iter()
            .map(|s| s.path.to_string())
            .collect();
        assert_eq!(paths, vec!["/a", "/a/b", "/a/x"]);
    }
}
