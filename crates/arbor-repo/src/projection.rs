//! Projection of committed trees into index documents.

use std::collections::{BTreeMap, BTreeSet};

use arbor_acl::{AclEvaluator, EvaluatedNode};
use arbor_graph::{Snapshot, StagedCommit, Touch};
use arbor_index::{IndexBatch, IndexDocument};
use arbor_store::NodeStore;
use arbor_types::{NodeId, NodePath};

use crate::error::RepoResult;

fn document(snapshot: &Snapshot, evaluated: EvaluatedNode) -> Option<IndexDocument> {
    let name = evaluated.path.name()?.to_string();
    Some(IndexDocument {
        origin: evaluated.node.origin,
        branch: snapshot.branch.clone(),
        name,
        path: evaluated.path,
        kind: evaluated.node.node_type(),
        content_len: evaluated.node.content_len(),
        readers: evaluated.grants,
        version: snapshot.version,
    })
}

/// Documents for every node of `snapshot` except the root.
pub(crate) fn full(store: &dyn NodeStore, snapshot: &Snapshot) -> RepoResult<Vec<IndexDocument>> {
    let evaluator = AclEvaluator::for_snapshot(store, snapshot);
    Ok(evaluator
        .subtree(&NodePath::root())?
        .into_iter()
        .filter_map(|n| document(snapshot, n))
        .collect())
}

/// Drop paths that lie under another path in the set.
fn outermost(paths: BTreeSet<NodePath>) -> Vec<NodePath> {
    let mut kept: Vec<NodePath> = Vec::new();
    // Ancestors sort before their descendants.
    for path in paths {
        if !kept.iter().any(|k| path.starts_with(k)) {
            kept.push(path);
        }
    }
    kept
}

/// The index batch that brings a branch's documents from `staged.base` to
/// `staged.snapshot`.
///
/// Only regions touched by the commit's changes are re-projected. Nodes
/// detached during the replay and not re-projected are deleted.
pub(crate) fn incremental(staged: &StagedCommit<'_>) -> RepoResult<IndexBatch> {
    let store = staged.store();
    let next = staged.snapshot.as_ref();

    let mut subtrees = BTreeSet::new();
    let mut nodes = BTreeSet::new();
    for change in &next.changes {
        for touch in change.op.touches() {
            match touch {
                Touch::Subtree(path) => subtrees.insert(path),
                Touch::Node(path) => nodes.insert(path),
            };
        }
    }
    let subtrees = outermost(subtrees);

    let evaluator = AclEvaluator::for_snapshot(store, next);
    let mut upserts: BTreeMap<NodeId, IndexDocument> = BTreeMap::new();
    for path in &subtrees {
        if !next.exists(store, path)? {
            continue;
        }
        for evaluated in evaluator.subtree(path)? {
            if let Some(doc) = document(next, evaluated) {
                upserts.insert(doc.origin, doc);
            }
        }
    }
    for path in nodes {
        if subtrees.iter().any(|s| path.starts_with(s)) || !next.exists(store, &path)? {
            continue;
        }
        let node = next.resolve(store, &path)?;
        let grants = evaluator.effective(&path)?.grants;
        if let Some(doc) = document(next, EvaluatedNode { path, node, grants }) {
            upserts.insert(doc.origin, doc);
        }
    }

    let deletes: BTreeSet<NodeId> = staged
        .detached()
        .iter()
        .filter(|origin| !upserts.contains_key(origin))
        .copied()
        .collect();

    let mut batch = IndexBatch::new();
    for doc in upserts.into_values() {
        batch.upsert(doc);
    }
    for origin in deletes {
        batch.delete(next.branch.clone(), origin);
    }
    tracing::debug!(
        branch = %next.branch,
        version = %next.version,
        regions = subtrees.len(),
        ops = batch.len(),
        "projected index batch"
    );
    Ok(batch)
}
