//! Reclamation of unreachable nodes and pruning of old versions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use arbor_types::BranchName;

use crate::error::GraphResult;
use crate::graph::{poisoned, VersionedGraph};
use crate::tree;

/// Result of a reclamation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    /// Snapshots whose trees were marked.
    pub snapshots: usize,
    /// Nodes present in the arena when the pass started.
    pub scanned: usize,
    pub reachable: usize,
    pub reclaimed: usize,
    /// Encoded size of the reclaimed nodes.
    pub bytes_reclaimed: u64,
}

impl VersionedGraph {
    /// Remove every arena node not reachable from a retained snapshot.
    ///
    /// Runs exclusively with respect to commits. Transactions still working
    /// on a pruned base may afterwards fail with a missing-node error, which
    /// is retryable.
    pub fn collect_garbage(&self) -> GraphResult<GcReport> {
        let _exclusive = self.collector.write().map_err(poisoned)?;
        let roots: Vec<_> = self
            .versions
            .read()
            .map_err(poisoned)?
            .values()
            .map(|s| s.root)
            .collect();

        let mut seen = HashSet::new();
        for root in &roots {
            tree::mark_reachable(self.store.as_ref(), *root, &mut seen)?;
        }

        let ids = self.store.ids()?;
        let (mut reclaimed, mut bytes_reclaimed) = (0, 0);
        for id in ids.iter().filter(|id| !seen.contains(*id)) {
            let Some(node) = self.store.get(id)? else {
                continue;
            };
            if self.store.remove(id)? {
                reclaimed += 1;
                bytes_reclaimed += node.encoded_len()?;
            }
        }
        let report = GcReport {
            snapshots: roots.len(),
            scanned: ids.len(),
            reachable: seen.len(),
            reclaimed,
            bytes_reclaimed,
        };
        tracing::info!(
            snapshots = report.snapshots,
            scanned = report.scanned,
            reclaimed = report.reclaimed,
            bytes = report.bytes_reclaimed,
            "collected garbage"
        );
        Ok(report)
    }

    /// Forget all but the newest `keep` versions of `branch`.
    ///
    /// The head is always kept. Versions created on other branches are left
    /// alone even if they appear in this branch's ancestry. Returns the
    /// number of versions removed; their nodes become reclaimable.
    pub fn prune_history(&self, branch: &BranchName, keep: usize) -> GraphResult<usize> {
        let history = self.history(branch)?;
        let keep = keep.max(1);
        let mut versions = self.versions.write().map_err(poisoned)?;
        let mut pruned = 0;
        for snapshot in history.iter().skip(keep) {
            if &snapshot.branch == branch && versions.remove(&snapshot.version).is_some() {
                pruned += 1;
            }
        }
        tracing::info!(branch = %branch, keep, pruned, "pruned history");
        Ok(pruned)
    }
}
