use std::sync::Arc;

use arbor_acl::EffectivePermissions;
use arbor_graph::{GcReport, HookOutcome, Snapshot, StagedCommit, VersionedGraph};
use arbor_index::{IndexCoordinator, IndexDocument, IndexError, IndexOp, IndexQuery, IndexStats};
use arbor_store::{Acl, DirectoryEntry, InMemoryNodeStore, NodeStore};
use arbor_types::{Authority, BranchName, NodePath, PermissionLevel, VersionId};

use crate::config::RepositoryConfig;
use crate::error::{RepoError, RepoResult};
use crate::projection;
use crate::transaction::{CommitInfo, NodeStat, SnapshotReader, Transaction};

/// A versioned, permission-aware tree store with a sharded index.
///
/// All mutation goes through [`Transaction`]s. [`run_transaction`] is the
/// usual entry point: it re-runs the caller's work on a fresh transaction
/// whenever the commit hits an optimistic lock conflict.
///
/// [`run_transaction`]: Repository::run_transaction
pub struct Repository {
    config: RepositoryConfig,
    graph: VersionedGraph,
    index: IndexCoordinator,
}

impl Repository {
    /// Open an in-memory repository with `config`.
    pub fn new(config: RepositoryConfig) -> RepoResult<Self> {
        Self::with_store(config, Arc::new(InMemoryNodeStore::new()))
    }

    /// Open a repository with the default configuration.
    pub fn in_memory() -> RepoResult<Self> {
        Self::new(RepositoryConfig::default())
    }

    /// Open a repository over an empty arena.
    pub fn with_store(config: RepositoryConfig, store: Arc<dyn NodeStore>) -> RepoResult<Self> {
        let graph = VersionedGraph::new(store);
        graph.init_branch(config.default_branch.clone())?;
        let index = IndexCoordinator::new(&config.index);
        tracing::info!(
            default_branch = %config.default_branch,
            shards = index.shard_count(),
            max_retries = config.transaction.max_retries,
            "repository opened"
        );
        Ok(Self {
            config,
            graph,
            index,
        })
    }

    /// The configuration the repository was opened with.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The branch created when the repository was opened.
    pub fn default_branch(&self) -> &BranchName {
        &self.config.default_branch
    }

    /// The underlying versioned graph.
    pub fn graph(&self) -> &VersionedGraph {
        &self.graph
    }

    /// The index coordinator kept in step with every commit.
    pub fn index(&self) -> &IndexCoordinator {
        &self.index
    }

    // ---- Transactions ----

    /// Start a read-write transaction on the head of `branch`.
    pub fn begin(&self, branch: &BranchName) -> RepoResult<Transaction> {
        Ok(Transaction::new(self.graph.begin(branch)?, false))
    }

    /// Start a transaction that rejects every mutation.
    pub fn begin_read_only(&self, branch: &BranchName) -> RepoResult<Transaction> {
        Ok(Transaction::new(self.graph.begin(branch)?, true))
    }

    /// Publish `txn` and bring the index up to date with it.
    ///
    /// Returns `None` for read-only or unmodified transactions, which have
    /// nothing to publish. Deferred callbacks run only after a version has
    /// been published and indexed.
    pub fn commit(&self, txn: Transaction) -> RepoResult<Option<CommitInfo>> {
        let (working, read_only, callbacks) = txn.into_parts();
        if read_only || !working.is_dirty() {
            return Ok(None);
        }
        let branch = working.base().branch.clone();
        let changes = working.into_changes();
        let committed = self
            .graph
            .commit_with(&branch, changes, |staged| self.index_staged(staged))?;

        let snapshot = &committed.snapshot;
        let (index_upserts, index_deletes) = committed.value;
        let info = CommitInfo {
            branch,
            version: snapshot.version,
            parent: snapshot.parent.unwrap_or(VersionId::ZERO),
            changes: snapshot.changes.len(),
            index_upserts,
            index_deletes,
        };
        for callback in callbacks {
            callback(&info);
        }
        Ok(Some(info))
    }

    /// Commit hook: project the staged version and push it through the
    /// index protocol. The store version is published only if the index
    /// accepted it, or if the index failed part-way and must be rebuilt.
    fn index_staged(&self, staged: &StagedCommit<'_>) -> HookOutcome<(usize, usize), RepoError> {
        let batch = match projection::incremental(staged) {
            Ok(batch) => batch,
            Err(e) => return HookOutcome::Abort(e),
        };
        let deletes = batch
            .ops()
            .iter()
            .filter(|op| matches!(op, IndexOp::Delete { .. }))
            .count();
        let counts = (batch.len() - deletes, deletes);

        let mut txn = match self.index.prepare(batch) {
            Ok(txn) => txn,
            Err(e) => return HookOutcome::Abort(e.into()),
        };
        match self.index.commit(&mut txn) {
            Ok(()) => HookOutcome::Publish(counts),
            Err(e @ IndexError::PartialCommit { .. }) => {
                tracing::warn!(
                    branch = %staged.snapshot.branch,
                    version = %staged.snapshot.version,
                    error = %e,
                    "store committed with incomplete index; reindex required"
                );
                HookOutcome::PublishThenFail(e.into())
            }
            Err(e) => {
                if let Err(rollback) = self.index.rollback(&mut txn) {
                    tracing::warn!(txn = txn.id(), error = %rollback, "index rollback failed");
                }
                HookOutcome::Abort(e.into())
            }
        }
    }

    /// Run `work` in a fresh transaction on `branch` and commit it, retrying
    /// on conflicts up to the configured limit.
    pub fn run_transaction<T, F>(&self, branch: &BranchName, read_only: bool, work: F) -> RepoResult<T>
    where
        F: FnMut(&mut Transaction) -> RepoResult<T>,
    {
        self.run_transaction_with(branch, self.config.transaction.max_retries, read_only, work)
    }

    /// Like [`run_transaction`](Self::run_transaction) with an explicit
    /// retry limit.
    ///
    /// `work` must be safe to run more than once: each attempt starts over
    /// from the latest head and earlier attempts leave no trace. Effects
    /// outside the repository belong in [`Transaction::after_commit`].
    pub fn run_transaction_with<T, F>(
        &self,
        branch: &BranchName,
        max_retries: u32,
        read_only: bool,
        mut work: F,
    ) -> RepoResult<T>
    where
        F: FnMut(&mut Transaction) -> RepoResult<T>,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let err = match self.attempt(branch, read_only, &mut work) {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::debug!(branch = %branch, attempts, "transaction committed after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempts > max_retries {
                tracing::warn!(branch = %branch, attempts, error = %err, "retries exhausted");
                return Err(RepoError::RetryExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }
            let delay = self.config.transaction.backoff(attempts);
            tracing::debug!(
                branch = %branch,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transaction conflict, retrying"
            );
            std::thread::sleep(delay);
        }
    }

    fn attempt<T, F>(&self, branch: &BranchName, read_only: bool, work: &mut F) -> RepoResult<T>
    where
        F: FnMut(&mut Transaction) -> RepoResult<T>,
    {
        let mut txn = if read_only {
            self.begin_read_only(branch)?
        } else {
            self.begin(branch)?
        };
        let value = work(&mut txn)?;
        self.commit(txn)?;
        Ok(value)
    }

    // ---- Single-operation writes ----

    /// Create an empty folder `name` under `parent`.
    pub fn create_folder(
        &self,
        branch: &BranchName,
        parent: &NodePath,
        name: &str,
    ) -> RepoResult<DirectoryEntry> {
        self.run_transaction(branch, false, |txn| txn.create_folder(parent, name))
    }

    /// Create a file `name` under `parent` holding `content`.
    pub fn create_file(
        &self,
        branch: &BranchName,
        parent: &NodePath,
        name: &str,
        content: &[u8],
    ) -> RepoResult<DirectoryEntry> {
        self.run_transaction(branch, false, |txn| txn.create_file(parent, name, content))
    }

    /// Rename the node at `path`.
    pub fn rename(
        &self,
        branch: &BranchName,
        path: &NodePath,
        new_name: &str,
    ) -> RepoResult<DirectoryEntry> {
        self.run_transaction(branch, false, |txn| txn.rename(path, new_name))
    }

    /// Move the node at `from` under `to_parent` as `name`.
    pub fn move_node(
        &self,
        branch: &BranchName,
        from: &NodePath,
        to_parent: &NodePath,
        name: &str,
    ) -> RepoResult<DirectoryEntry> {
        self.run_transaction(branch, false, |txn| txn.move_node(from, to_parent, name))
    }

    /// Delete the node at `path` and its subtree.
    pub fn delete(&self, branch: &BranchName, path: &NodePath) -> RepoResult<()> {
        self.run_transaction(branch, false, |txn| txn.delete(path))
    }

    /// Replace the content of the file at `path`.
    pub fn write_content(&self, branch: &BranchName, path: &NodePath, content: &[u8]) -> RepoResult<()> {
        self.run_transaction(branch, false, |txn| txn.write_content(path, content))
    }

    /// Grant `level` to `authority` on the node at `path`.
    pub fn set_permission(
        &self,
        branch: &BranchName,
        path: &NodePath,
        authority: &Authority,
        level: PermissionLevel,
    ) -> RepoResult<()> {
        self.run_transaction(branch, false, |txn| {
            txn.set_permission(path, authority.clone(), level)
        })
    }

    /// Remove every grant `authority` holds on the node at `path`.
    pub fn remove_permission(
        &self,
        branch: &BranchName,
        path: &NodePath,
        authority: &Authority,
    ) -> RepoResult<()> {
        self.run_transaction(branch, false, |txn| txn.remove_permission(path, authority.clone()))
    }

    /// Turn permission inheritance on or off for the node at `path`.
    pub fn set_inheritance(&self, branch: &BranchName, path: &NodePath, inherit: bool) -> RepoResult<()> {
        self.run_transaction(branch, false, |txn| txn.set_inheritance(path, inherit))
    }

    // ---- Reads at head ----

    /// A reader pinned to the current head of `branch`.
    pub fn reader(&self, branch: &BranchName) -> RepoResult<SnapshotReader> {
        Ok(SnapshotReader::new(self.graph.store().clone(), self.graph.head(branch)?))
    }

    /// A reader pinned to a retained version.
    pub fn reader_at(&self, version: VersionId) -> RepoResult<SnapshotReader> {
        Ok(SnapshotReader::new(self.graph.store().clone(), self.graph.snapshot_at(version)?))
    }

    pub fn read_content(&self, branch: &BranchName, path: &NodePath) -> RepoResult<Vec<u8>> {
        self.reader(branch)?.read_content(path)
    }

    pub fn list_children(&self, branch: &BranchName, path: &NodePath) -> RepoResult<Vec<DirectoryEntry>> {
        self.reader(branch)?.list_children(path)
    }

    pub fn lookup(
        &self,
        branch: &BranchName,
        parent: &NodePath,
        name: &str,
    ) -> RepoResult<Option<DirectoryEntry>> {
        self.reader(branch)?.lookup(parent, name)
    }

    pub fn stat(&self, branch: &BranchName, path: &NodePath) -> RepoResult<NodeStat> {
        self.reader(branch)?.stat(path)
    }

    pub fn get_permissions(&self, branch: &BranchName, path: &NodePath) -> RepoResult<Acl> {
        self.reader(branch)?.get_permissions(path)
    }

    pub fn effective_permissions(
        &self,
        branch: &BranchName,
        path: &NodePath,
    ) -> RepoResult<EffectivePermissions> {
        self.reader(branch)?.effective_permissions(path)
    }

    pub fn has_permission(
        &self,
        branch: &BranchName,
        path: &NodePath,
        authority: &Authority,
        level: PermissionLevel,
    ) -> RepoResult<bool> {
        self.reader(branch)?.has_permission(path, authority, level)
    }

    // ---- Branches and history ----

    /// Fork `name` from the head of `from` and index its documents.
    pub fn create_branch(&self, name: &BranchName, from: &BranchName) -> RepoResult<Arc<Snapshot>> {
        let snapshot = self.graph.create_branch(name.clone(), from)?;
        self.reindex(name)?;
        Ok(snapshot)
    }

    /// Delete a branch and its index documents. The default branch is
    /// protected.
    pub fn delete_branch(&self, name: &BranchName) -> RepoResult<()> {
        if name == &self.config.default_branch {
            return Err(arbor_graph::GraphError::ProtectedBranch(name.clone()).into());
        }
        self.graph.delete_branch(name)?;
        self.index.rebuild_branch(name, Vec::new())?;
        Ok(())
    }

    /// Names of all branches, sorted.
    pub fn branches(&self) -> RepoResult<Vec<BranchName>> {
        Ok(self.graph.branches()?)
    }

    /// Current head snapshot of `branch`.
    pub fn head(&self, branch: &BranchName) -> RepoResult<Arc<Snapshot>> {
        Ok(self.graph.head(branch)?)
    }

    /// A retained version on any branch.
    pub fn snapshot_at(&self, version: VersionId) -> RepoResult<Arc<Snapshot>> {
        Ok(self.graph.snapshot_at(version)?)
    }

    /// Retained versions of `branch`, newest first.
    pub fn history(&self, branch: &BranchName) -> RepoResult<Vec<Arc<Snapshot>>> {
        Ok(self.graph.history(branch)?)
    }

    // ---- Index ----

    /// Documents matching `query` in the last published index view.
    pub fn query(&self, query: &IndexQuery) -> RepoResult<Vec<IndexDocument>> {
        Ok(self.index.query(query)?)
    }

    /// Document counts per shard and degraded shards.
    pub fn index_stats(&self) -> RepoResult<IndexStats> {
        Ok(self.index.stats()?)
    }

    /// Rebuild the documents of `branch` from its head.
    ///
    /// Commits on the branch wait until the rebuilt view is published.
    pub fn reindex(&self, branch: &BranchName) -> RepoResult<IndexStats> {
        let store = self.graph.store().clone();
        self.graph
            .with_heads_locked(std::slice::from_ref(branch), |heads| -> RepoResult<IndexStats> {
                let mut documents = Vec::new();
                for head in heads {
                    documents.extend(projection::full(store.as_ref(), head)?);
                }
                Ok(self.index.rebuild_branch(branch, documents)?)
            })?
    }

    /// Rebuild the whole index from the heads of every branch and clear
    /// any degraded state.
    pub fn reindex_all(&self) -> RepoResult<IndexStats> {
        let store = self.graph.store().clone();
        let branches = self.graph.branches()?;
        self.graph
            .with_heads_locked(&branches, |heads| -> RepoResult<IndexStats> {
                let mut documents = Vec::new();
                for head in heads {
                    documents.extend(projection::full(store.as_ref(), head)?);
                }
                Ok(self.index.rebuild(documents)?)
            })?
    }

    // ---- Maintenance ----

    /// Forget all but the newest `keep` versions of `branch`.
    pub fn prune_history(&self, branch: &BranchName, keep: usize) -> RepoResult<usize> {
        Ok(self.graph.prune_history(branch, keep)?)
    }

    /// Reclaim arena nodes that no retained version reaches.
    pub fn collect_garbage(&self) -> RepoResult<GcReport> {
        Ok(self.graph.collect_garbage()?)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("default_branch", &self.config.default_branch)
            .field("graph", &self.graph)
            .field("index", &self.index)
            .finish()
    }
}
