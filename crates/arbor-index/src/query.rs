//! Read-side query types.

use serde::{Deserialize, Serialize};

use arbor_store::NodeType;
use arbor_types::{Authority, BranchName, NodePath};

use crate::document::IndexDocument;
use crate::shard::ShardId;

/// Filter over published index documents. Empty filters match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexQuery {
    pub branch: Option<BranchName>,
    /// Match the path itself and everything below it.
    pub path_prefix: Option<NodePath>,
    pub name: Option<String>,
    pub kind: Option<NodeType>,
    /// Only documents on which this authority holds some grant.
    pub readable_by: Option<Authority>,
    pub limit: Option<usize>,
}

impl IndexQuery {
    /// Match every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn branch(mut self, branch: BranchName) -> Self {
        self.branch = Some(branch);
        self
    }

    pub fn under(mut self, prefix: NodePath) -> Self {
        self.path_prefix = Some(prefix);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(mut self, kind: NodeType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn readable_by(mut self, authority: Authority) -> Self {
        self.readable_by = Some(authority);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `true` if `doc` satisfies every filter.
    pub fn matches(&self, doc: &IndexDocument) -> bool {
        self.branch.as_ref().map_or(true, |b| &doc.branch == b)
            && self
                .path_prefix
                .as_ref()
                .map_or(true, |p| doc.path.starts_with(p))
            && self.name.as_ref().map_or(true, |n| &doc.name == n)
            && self.kind.map_or(true, |k| doc.kind == k)
            && self
                .readable_by
                .as_ref()
                .map_or(true, |a| doc.readable_by(a))
    }
}

/// Point-in-time statistics of the published index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of publications since the coordinator was created.
    pub generation: u64,
    pub documents: usize,
    /// Document count per shard, in shard order.
    pub per_shard: Vec<usize>,
    pub degraded: Vec<ShardId>,
    pub commits: u64,
    pub rollbacks: u64,
    pub partial_commits: u64,
}

impl IndexStats {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}
