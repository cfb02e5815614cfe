//! The replayable change log.
//!
//! A transaction never ships pre-built nodes to the committed graph. It ships
//! [`Change`]s: an [`Op`] plus the [`Expectation`]s that held in the working
//! snapshot when the op was recorded. At commit the log is replayed onto the
//! current branch head, and every expectation is re-checked against the state
//! the replay has reached at that step. This is what makes a node created
//! under a directory see the directory's permission record as of commit,
//! not as of transaction start.

use serde::{Deserialize, Serialize};

use arbor_store::{Acl, Grant};
use arbor_types::{Authority, NodeId, NodePath, PermissionLevel};

/// Payload of a node created by [`Op::Attach`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewNodeKind {
    Folder,
    File { content: Vec<u8> },
}

/// Description of a node to be created.
///
/// The logical identity (`origin`) is assigned up front so the working
/// snapshot and the committed snapshot agree on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    pub origin: NodeId,
    pub kind: NewNodeKind,
    pub acl: Acl,
}

impl NewNode {
    /// An empty folder with a fresh logical id.
    pub fn folder() -> Self {
        Self {
            origin: NodeId::new(),
            kind: NewNodeKind::Folder,
            acl: Acl::default(),
        }
    }

    /// A file holding `content`, with a fresh logical id.
    pub fn file(content: impl Into<Vec<u8>>) -> Self {
        Self {
            origin: NodeId::new(),
            kind: NewNodeKind::File {
                content: content.into(),
            },
            acl: Acl::default(),
        }
    }
}

/// The mutable part of a directory entry, handed to `update` mutators.
///
/// A mutation that only renames is replayed against whatever child the
/// entry points at when the commit lands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMutation {
    pub name: String,
    /// Physical id of another published version of the same logical node to
    /// point the entry at. `None` keeps the current child.
    pub rebind: Option<NodeId>,
}

/// A single structural or record-level operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Attach {
        parent: NodePath,
        name: String,
        node: NewNode,
    },
    Detach {
        parent: NodePath,
        name: String,
    },
    UpdateEntry {
        parent: NodePath,
        name: String,
        mutation: EntryMutation,
    },
    Move {
        from: NodePath,
        to_parent: NodePath,
        name: String,
    },
    WriteContent {
        path: NodePath,
        content: Vec<u8>,
    },
    Grant {
        path: NodePath,
        grant: Grant,
    },
    /// Remove one level, or every level when `level` is `None`.
    Revoke {
        path: NodePath,
        authority: Authority,
        level: Option<PermissionLevel>,
    },
    SetInheritance {
        path: NodePath,
        inherit: bool,
    },
}

/// A precondition re-checked when the op is replayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expectation {
    /// `path` resolves to a node with logical id `origin`, and, when
    /// `version` is set, that node's record counter equals it.
    Node {
        path: NodePath,
        origin: NodeId,
        version: Option<u64>,
    },
    /// The entry `name` under `parent` exists with counter `version` and
    /// points at a version of the logical node `origin`.
    Entry {
        parent: NodePath,
        name: String,
        origin: NodeId,
        version: u64,
    },
}

/// An op together with the expectations observed when it was recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub op: Op,
    pub expect: Vec<Expectation>,
}

impl Change {
    /// A change with no preconditions (used for direct graph commits).
    pub fn unchecked(op: Op) -> Self {
        Self {
            op,
            expect: Vec::new(),
        }
    }
}

/// Part of the committed tree whose derived state a change may have altered.
///
/// Removals are not listed here; the replay reports the logical ids it
/// detached (see `StagedCommit::detached`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Touch {
    /// The node at the path and everything below it.
    Subtree(NodePath),
    /// Only the node at the path.
    Node(NodePath),
}

impl Op {
    /// Regions whose derived state (index documents, effective
    /// permissions) must be recomputed after this op.
    pub fn touches(&self) -> Vec<Touch> {
        let joined = |parent: &NodePath, name: &str| parent.join(name).ok();
        match self {
            Op::Attach { parent, name, .. } => {
                joined(parent, name).map(Touch::Subtree).into_iter().collect()
            }
            Op::Detach { .. } => Vec::new(),
            Op::UpdateEntry {
                parent, mutation, ..
            } => joined(parent, &mutation.name)
                .map(Touch::Subtree)
                .into_iter()
                .collect(),
            Op::Move {
                to_parent, name, ..
            } => joined(to_parent, name).map(Touch::Subtree).into_iter().collect(),
            Op::WriteContent { path, .. } => vec![Touch::Node(path.clone())],
            Op::Grant { path, .. } | Op::Revoke { path, .. } | Op::SetInheritance { path, .. } => {
                vec![Touch::Subtree(path.clone())]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn attach_touches_new_subtree() {
        let op = Op::Attach {
            parent: p("/a"),
            name: "b".into(),
            node: NewNode::folder(),
        };
        assert_eq!(op.touches(), vec![Touch::Subtree(p("/a/b"))]);
    }

    #[test]
    fn move_touches_destination() {
        let op = Op::Move {
            from: p("/a/x"),
            to_parent: p("/b"),
            name: "y".into(),
        };
        assert_eq!(op.touches(), vec![Touch::Subtree(p("/b/y"))]);
    }

    #[test]
    fn detach_touches_nothing() {
        let op = Op::Detach {
            parent: p("/a"),
            name: "x".into(),
        };
        assert!(op.touches().is_empty());
    }

    #[test]
    fn permission_ops_touch_subtree() {
        let op = Op::SetInheritance {
            path: p("/a"),
            inherit: false,
        };
        assert_eq!(op.touches(), vec![Touch::Subtree(p("/a"))]);
    }

    #[test]
    fn content_write_touches_only_node() {
        let op = Op::WriteContent {
            path: p("/a/f"),
            content: b"x".to_vec(),
        };
        assert_eq!(op.touches(), vec![Touch::Node(p("/a/f"))]);
    }

    #[test]
    fn change_serde_roundtrip() {
        let change = Change::unchecked(Op::Attach {
            parent: p("/"),
            name: "docs".into(),
            node: NewNode::file(b"hi".to_vec()),
        });
        let json = serde_json::to_string(&change).unwrap();
        let back: Change = serde_json::from_str(&json).unwrap();
        assert_eq!(back, change);
    }
}
