//! Index documents and write batches.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use arbor_store::{Grant, NodeType};
use arbor_types::{Authority, BranchName, NodeId, NodePath, VersionId};

use crate::error::{IndexError, IndexResult};

/// Documents are keyed by branch and logical node identity.
pub type DocKey = (BranchName, NodeId);

/// Searchable projection of one node on one branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Logical identity of the node (stable across versions and moves).
    pub origin: NodeId,
    pub branch: BranchName,
    pub path: NodePath,
    pub name: String,
    pub kind: NodeType,
    pub content_len: u64,
    /// Effective grants at the time the document was projected.
    pub readers: BTreeSet<Grant>,
    /// Version that produced this projection.
    pub version: VersionId,
}

impl IndexDocument {
    pub fn key(&self) -> DocKey {
        (self.branch.clone(), self.origin)
    }

    /// `true` if `authority` holds any grant on the node.
    pub fn readable_by(&self, authority: &Authority) -> bool {
        self.readers.iter().any(|g| &g.authority == authority)
    }

    /// Schema check applied to every upsert before anything is written.
    pub fn validate(&self) -> IndexResult<()> {
        let fail = |reason: &str| {
            Err(IndexError::Validation {
                path: self.path.to_string(),
                reason: reason.to_string(),
            })
        };
        match self.path.name() {
            None => return fail("the root is not indexed"),
            Some(last) if last != self.name => return fail("name does not match path"),
            Some(_) => {}
        }
        if self.kind == NodeType::Directory && self.content_len != 0 {
            return fail("directories carry no content");
        }
        Ok(())
    }
}

/// One index write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexOp {
    Upsert(IndexDocument),
    Delete { branch: BranchName, origin: NodeId },
}

impl IndexOp {
    pub fn key(&self) -> DocKey {
        match self {
            IndexOp::Upsert(doc) => doc.key(),
            IndexOp::Delete { branch, origin } => (branch.clone(), *origin),
        }
    }

    pub fn origin(&self) -> NodeId {
        match self {
            IndexOp::Upsert(doc) => doc.origin,
            IndexOp::Delete { origin, .. } => *origin,
        }
    }
}

/// An ordered set of index writes produced by one store commit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBatch {
    ops: Vec<IndexOp>,
}

impl IndexBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, doc: IndexDocument) -> &mut Self {
        self.ops.push(IndexOp::Upsert(doc));
        self
    }

    pub fn delete(&mut self, branch: BranchName, origin: NodeId) -> &mut Self {
        self.ops.push(IndexOp::Delete { branch, origin });
        self
    }

    pub fn ops(&self) -> &[IndexOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<IndexOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Validate every operation. A key may appear at most once per batch.
    pub fn validate(&self) -> IndexResult<()> {
        let mut seen = HashSet::new();
        for op in &self.ops {
            if let IndexOp::Upsert(doc) = op {
                doc.validate()?;
            }
            let key = op.key();
            if !seen.insert(key.clone()) {
                return Err(IndexError::Validation {
                    path: format!("{}:{}", key.0, key.1),
                    reason: "conflicting operations for the same document".into(),
                });
            }
        }
        Ok(())
    }
}
