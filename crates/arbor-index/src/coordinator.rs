//! Two-phase commit across index shards.
//!
//! The coordinator owns `shard_count` shards and one published, immutable
//! view of all of them. A store commit drives one [`IndexTransaction`]
//! through:
//!
//! ```text
//! Preparing -> Prepared -> Committing -> Committed
//!                      \-> RollingBack -> RolledBack
//! ```
//!
//! `prepare` validates without touching shards. `commit` takes the write
//! locks of the touched shards in ascending [`ShardId`] order, applies the
//! batch to private copies, and publishes every touched shard with a single
//! view swap. Readers only ever see whole commits.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use arbor_types::{BranchName, NodeId};

use crate::config::IndexConfig;
use crate::document::{IndexBatch, IndexDocument, IndexOp};
use crate::error::{IndexError, IndexResult};
use crate::lock::{ShardLock, ShardLockGuard};
use crate::query::{IndexQuery, IndexStats};
use crate::shard::{apply_ops, ShardData, ShardHealth, ShardId};

/// Lifecycle of an index transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnState {
    Preparing,
    Prepared,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
    /// A shard failed during commit; nothing was published.
    Failed,
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Preparing => "preparing",
            Self::Prepared => "prepared",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RollingBack => "rolling back",
            Self::RolledBack => "rolled back",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A validated batch bound for specific shards.
#[derive(Debug)]
pub struct IndexTransaction {
    id: u64,
    state: TxnState,
    ops: BTreeMap<ShardId, Vec<IndexOp>>,
    op_count: usize,
}

impl IndexTransaction {
    /// Identifier used in logs.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Shards this transaction writes, ascending.
    pub fn shards(&self) -> Vec<ShardId> {
        self.ops.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.op_count
    }

    pub fn is_empty(&self) -> bool {
        self.op_count == 0
    }

    fn invalid(&self, operation: &'static str) -> IndexError {
        IndexError::InvalidState {
            txn: self.id,
            state: self.state,
            operation,
        }
    }
}

#[derive(Debug)]
struct IndexView {
    generation: u64,
    shards: Vec<Arc<ShardData>>,
}

/// Shard set plus the protocol that keeps it consistent with the store.
pub struct IndexCoordinator {
    shard_count: u16,
    locks: Vec<ShardLock>,
    health: Vec<ShardHealth>,
    view: RwLock<Arc<IndexView>>,
    /// Out-of-sync shards and the branches whose writes they missed.
    degraded: RwLock<BTreeMap<ShardId, BTreeSet<BranchName>>>,
    next_txn: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    partial_commits: AtomicU64,
}

fn poisoned<E: fmt::Display>(e: E) -> IndexError {
    IndexError::LockPoisoned(e.to_string())
}

impl IndexCoordinator {
    /// Create an empty index with the configured number of shards.
    pub fn new(config: &IndexConfig) -> Self {
        let shard_count = config.effective_shard_count();
        let n = usize::from(shard_count);
        Self {
            shard_count,
            locks: (0..n).map(|_| ShardLock::new()).collect(),
            health: (0..n).map(|_| ShardHealth::new()).collect(),
            view: RwLock::new(Arc::new(IndexView {
                generation: 0,
                shards: (0..n).map(|_| Arc::new(ShardData::new())).collect(),
            })),
            degraded: RwLock::new(BTreeMap::new()),
            next_txn: AtomicU64::new(1),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            partial_commits: AtomicU64::new(0),
        }
    }

    pub fn shard_count(&self) -> u16 {
        self.shard_count
    }

    /// Shard that owns documents of the logical node `origin`.
    pub fn route(&self, origin: &NodeId) -> ShardId {
        ShardId::route(origin, self.shard_count)
    }

    fn current_view(&self) -> IndexResult<Arc<IndexView>> {
        Ok(self.view.read().map_err(poisoned)?.clone())
    }

    fn lock(&self, shard: ShardId) -> IndexResult<&ShardLock> {
        self.locks
            .get(shard.index())
            .ok_or(IndexError::UnknownShard(shard))
    }

    fn health(&self, shard: ShardId) -> IndexResult<&ShardHealth> {
        self.health
            .get(shard.index())
            .ok_or(IndexError::UnknownShard(shard))
    }

    // -- protocol ------------------------------------------------------------

    /// Validate `batch` and bind it to its shards. No shard is touched.
    pub fn prepare(&self, batch: IndexBatch) -> IndexResult<IndexTransaction> {
        let id = self.next_txn.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(txn = id, ops = batch.len(), state = %TxnState::Preparing, "index prepare");
        if let Err(e) = batch.validate() {
            tracing::debug!(txn = id, error = %e, "index batch rejected");
            return Err(e);
        }
        let op_count = batch.len();
        let mut ops: BTreeMap<ShardId, Vec<IndexOp>> = BTreeMap::new();
        for op in batch.into_ops() {
            ops.entry(self.route(&op.origin())).or_default().push(op);
        }
        Ok(IndexTransaction {
            id,
            state: TxnState::Prepared,
            ops,
            op_count,
        })
    }

    /// Apply a prepared transaction and publish it atomically.
    ///
    /// Fails with [`IndexError::Degraded`] while any shard is out of sync,
    /// and with [`IndexError::PartialCommit`] if a shard fails mid-apply, in
    /// which case nothing is published and the failed shards are marked
    /// degraded.
    pub fn commit(&self, txn: &mut IndexTransaction) -> IndexResult<()> {
        if txn.state != TxnState::Prepared {
            return Err(txn.invalid("commit"));
        }
        let degraded = self.degraded_shards()?;
        if !degraded.is_empty() {
            return Err(IndexError::Degraded(degraded));
        }
        txn.state = TxnState::Committing;

        let shards = txn.shards();
        let _guards = shards
            .iter()
            .map(|shard| self.lock(*shard)?.acquire())
            .collect::<IndexResult<Vec<ShardLockGuard<'_>>>>()?;

        let base = self.current_view()?;
        let mut applied = Vec::new();
        let mut failed = Vec::new();
        let mut updates = Vec::new();
        for (shard, ops) in &txn.ops {
            let data = base
                .shards
                .get(shard.index())
                .ok_or(IndexError::UnknownShard(*shard))?;
            if !self.health(*shard)?.is_online() {
                failed.push(*shard);
                continue;
            }
            updates.push((*shard, Arc::new(apply_ops(data, ops))));
            applied.push(*shard);
        }

        if !failed.is_empty() {
            let mut degraded = self.degraded.write().map_err(poisoned)?;
            for shard in &failed {
                let branches = txn.ops.get(shard).into_iter().flatten().map(|op| op.key().0);
                degraded.entry(*shard).or_default().extend(branches);
            }
            txn.state = TxnState::Failed;
            self.partial_commits.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(txn = txn.id, ?applied, ?failed, "partial index commit, index degraded");
            return Err(IndexError::PartialCommit {
                applied,
                failed,
                reason: "shard offline".into(),
            });
        }

        let generation = self.publish(updates)?;
        txn.state = TxnState::Committed;
        self.commits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(txn = txn.id, generation, shards = ?shards, ops = txn.op_count, "index committed");
        Ok(())
    }

    /// Discard a transaction. Rolling back twice is a no-op.
    pub fn rollback(&self, txn: &mut IndexTransaction) -> IndexResult<()> {
        match txn.state {
            TxnState::RolledBack => Ok(()),
            TxnState::Committed => Err(txn.invalid("roll back")),
            _ => {
                txn.state = TxnState::RollingBack;
                txn.ops.clear();
                txn.state = TxnState::RolledBack;
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(txn = txn.id, "index rolled back");
                Ok(())
            }
        }
    }

    fn publish(&self, updates: Vec<(ShardId, Arc<ShardData>)>) -> IndexResult<u64> {
        let mut view = self.view.write().map_err(poisoned)?;
        let mut shards = view.shards.clone();
        for (shard, data) in updates {
            let slot = shards
                .get_mut(shard.index())
                .ok_or(IndexError::UnknownShard(shard))?;
            *slot = data;
        }
        let generation = view.generation + 1;
        *view = Arc::new(IndexView { generation, shards });
        Ok(generation)
    }

    // -- maintenance ---------------------------------------------------------

    /// Run `work` while holding every shard write lock.
    ///
    /// Locks are taken in ascending shard order and released when this
    /// returns or unwinds. Nested calls on the same thread are allowed.
    pub fn with_all_write_locks<R>(&self, work: impl FnOnce() -> R) -> IndexResult<R> {
        let nested = self.locks.iter().any(ShardLock::held_by_current_thread);
        tracing::trace!(shards = self.locks.len(), nested, "acquiring all shard write locks");
        let guards = self
            .locks
            .iter()
            .map(ShardLock::acquire)
            .collect::<IndexResult<Vec<_>>>()?;
        let out = work();
        drop(guards);
        Ok(out)
    }

    /// Replace the whole index with `documents` and clear degraded state.
    pub fn rebuild(
        &self,
        documents: impl IntoIterator<Item = IndexDocument>,
    ) -> IndexResult<IndexStats> {
        self.with_all_write_locks(|| -> IndexResult<()> {
            self.require_online()?;
            let mut shards = vec![ShardData::new(); usize::from(self.shard_count)];
            for doc in documents {
                doc.validate()?;
                let shard = self.route(&doc.origin);
                if let Some(data) = shards.get_mut(shard.index()) {
                    data.insert(doc.key(), doc);
                }
            }
            self.publish(
                shards
                    .into_iter()
                    .enumerate()
                    .map(|(i, data)| (ShardId(i as u16), Arc::new(data)))
                    .collect(),
            )?;
            self.degraded.write().map_err(poisoned)?.clear();
            Ok(())
        })??;
        let stats = self.stats()?;
        tracing::info!(documents = stats.documents, generation = stats.generation, "index rebuilt");
        Ok(stats)
    }

    /// Replace every document of `branch` with `documents`.
    ///
    /// Shards that were degraded only because of writes to `branch` are
    /// back in sync afterwards.
    pub fn rebuild_branch(
        &self,
        branch: &BranchName,
        documents: impl IntoIterator<Item = IndexDocument>,
    ) -> IndexResult<IndexStats> {
        self.with_all_write_locks(|| -> IndexResult<()> {
            self.require_online()?;
            let base = self.current_view()?;
            let mut shards: Vec<ShardData> = base
                .shards
                .iter()
                .map(|data| {
                    data.iter()
                        .filter(|((b, _), _)| b != branch)
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .collect();
            for doc in documents {
                doc.validate()?;
                if &doc.branch != branch {
                    return Err(IndexError::Validation {
                        path: doc.path.to_string(),
                        reason: format!("document belongs to {}, not {branch}", doc.branch),
                    });
                }
                let shard = self.route(&doc.origin);
                if let Some(data) = shards.get_mut(shard.index()) {
                    data.insert(doc.key(), doc);
                }
            }
            self.publish(
                shards
                    .into_iter()
                    .enumerate()
                    .map(|(i, data)| (ShardId(i as u16), Arc::new(data)))
                    .collect(),
            )?;
            let mut degraded = self.degraded.write().map_err(poisoned)?;
            for branches in degraded.values_mut() {
                branches.remove(branch);
            }
            degraded.retain(|_, branches| !branches.is_empty());
            Ok(())
        })??;
        let stats = self.stats()?;
        tracing::info!(branch = %branch, documents = stats.documents, "branch reindexed");
        Ok(stats)
    }

    fn require_online(&self) -> IndexResult<()> {
        let offline: Vec<ShardId> = (0..self.shard_count)
            .map(ShardId)
            .filter(|s| self.health.get(s.index()).map_or(true, |h| !h.is_online()))
            .collect();
        if offline.is_empty() {
            Ok(())
        } else {
            Err(IndexError::Degraded(offline))
        }
    }

    /// Take a shard offline or bring it back. An offline shard fails every
    /// commit that touches it.
    pub fn set_shard_online(&self, shard: ShardId, online: bool) -> IndexResult<()> {
        self.health(shard)?.set_online(online);
        tracing::info!(%shard, online, "shard availability changed");
        Ok(())
    }

    /// Shards left out of sync by a partial commit, in order.
    pub fn degraded_shards(&self) -> IndexResult<Vec<ShardId>> {
        Ok(self.degraded.read().map_err(poisoned)?.keys().copied().collect())
    }

    pub fn is_degraded(&self) -> IndexResult<bool> {
        Ok(!self.degraded.read().map_err(poisoned)?.is_empty())
    }

    // -- reads ---------------------------------------------------------------

    /// Documents matching `query` in the last published view, ordered by
    /// branch then path.
    pub fn query(&self, query: &IndexQuery) -> IndexResult<Vec<IndexDocument>> {
        let view = self.current_view()?;
        let mut out: Vec<IndexDocument> = view
            .shards
            .iter()
            .flat_map(|data| data.values())
            .filter(|doc| query.matches(doc))
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.branch, &a.path).cmp(&(&b.branch, &b.path)));
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    /// The published document for a node on a branch.
    pub fn get(&self, branch: &BranchName, origin: &NodeId) -> IndexResult<Option<IndexDocument>> {
        let view = self.current_view()?;
        let shard = self.route(origin);
        Ok(view
            .shards
            .get(shard.index())
            .and_then(|data| data.get(&(branch.clone(), *origin)))
            .cloned())
    }

    /// Publication counter; increases by one per successful commit or rebuild.
    pub fn generation(&self) -> IndexResult<u64> {
        Ok(self.current_view()?.generation)
    }

    /// Current document counts and commit counters.
    pub fn stats(&self) -> IndexResult<IndexStats> {
        let view = self.current_view()?;
        let per_shard: Vec<usize> = view.shards.iter().map(|d| d.len()).collect();
        Ok(IndexStats {
            generation: view.generation,
            documents: per_shard.iter().sum(),
            per_shard,
            degraded: self.degraded_shards()?,
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            partial_commits: self.partial_commits.load(Ordering::Relaxed),
        })
    }
}

impl fmt::Debug for IndexCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexCoordinator")
            .field("shard_count", &self.shard_count)
            .field("commits", &self.commits.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
