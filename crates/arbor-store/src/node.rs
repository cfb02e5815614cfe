use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use arbor_types::{Authority, NodeId, PermissionLevel, VersionId};

use crate::error::{StoreError, StoreResult};

// ---------------------------------------------------------------------------
// Permission record
// ---------------------------------------------------------------------------

/// A single `(authority, level)` grant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grant {
    pub authority: Authority,
    pub level: PermissionLevel,
}

impl Grant {
    /// A grant of `level` to `authority`.
    pub fn new(authority: Authority, level: PermissionLevel) -> Self {
        Self { authority, level }
    }
}

impl std::fmt::Display for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.authority, self.level)
    }
}

/// Per-node permission record: local grants plus the inherit flag.
///
/// An authority may hold several levels on the same node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub grants: BTreeSet<Grant>,
    pub inherit: bool,
}

impl Default for Acl {
    fn default() -> Self {
        Self {
            grants: BTreeSet::new(),
            inherit: true,
        }
    }
}

impl Acl {
    /// Add a grant. Returns `false` if it was already present.
    pub fn grant(&mut self, authority: Authority, level: PermissionLevel) -> bool {
        self.grants.insert(Grant::new(authority, level))
    }

    /// Remove one grant. Returns `false` if it was not present.
    pub fn revoke(&mut self, authority: &Authority, level: PermissionLevel) -> bool {
        self.grants.remove(&Grant::new(authority.clone(), level))
    }

    /// Remove every grant held by `authority`, returning how many were removed.
    pub fn revoke_all(&mut self, authority: &Authority) -> usize {
        let before = self.grants.len();
        self.grants.retain(|g| &g.authority != authority);
        before - self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Directory entry
// ---------------------------------------------------------------------------

/// One named edge from a directory to a child node.
///
/// `parent` is the logical identity (`origin`) of the owning directory, so an
/// entry keeps its identity when the directory is copied on write. Equality
/// and hashing use `(name, parent)` only; two entries with the same name under
/// the same parent are the same logical edge regardless of child or counter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub parent: NodeId,
    pub child: NodeId,
    /// Optimistic-lock counter; incremented on every update of this edge.
    pub version: u64,
}

impl DirectoryEntry {
    /// A fresh edge with its counter at zero.
    pub fn new(name: impl Into<String>, parent: NodeId, child: NodeId) -> Self {
        Self {
            name: name.into(),
            parent,
            child,
            version: 0,
        }
    }

    /// The same edge under a possibly new name and child, with the counter
    /// bumped.
    pub fn updated(&self, name: impl Into<String>, child: NodeId) -> Self {
        Self {
            name: name.into(),
            parent: self.parent,
            child,
            version: self.version + 1,
        }
    }
}

impl PartialEq for DirectoryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.parent == other.parent
    }
}

impl Eq for DirectoryEntry {}

impl Hash for DirectoryEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.parent.hash(state);
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Content/type discriminator without the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    File,
    Directory,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Directory => write!(f, "directory"),
        }
    }
}

/// Payload of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File { content: Vec<u8> },
    Directory { entries: BTreeMap<String, DirectoryEntry> },
}

/// An immutable file or directory snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Physical id of this immutable copy.
    pub id: NodeId,
    /// Logical identity, shared by every copy-on-write successor.
    pub origin: NodeId,
    pub kind: NodeKind,
    /// Version in which this physical copy was written.
    pub created_in: VersionId,
    /// Optimistic-lock counter for the node record (content and ACL).
    pub version: u64,
    pub acl: Acl,
}

impl Node {
    /// A new file node with a fresh logical id.
    pub fn new_file(content: Vec<u8>, created_in: VersionId) -> Self {
        let id = NodeId::new();
        Self {
            id,
            origin: id,
            kind: NodeKind::File { content },
            created_in,
            version: 0,
            acl: Acl::default(),
        }
    }

    /// A new empty directory node with a fresh logical id.
    pub fn new_directory(created_in: VersionId) -> Self {
        let id = NodeId::new();
        Self {
            id,
            origin: id,
            kind: NodeKind::Directory {
                entries: BTreeMap::new(),
            },
            created_in,
            version: 0,
            acl: Acl::default(),
        }
    }

    /// A copy-on-write successor: fresh physical id, same logical identity.
    pub fn successor(&self, created_in: VersionId) -> Self {
        Self {
            id: NodeId::new(),
            created_in,
            ..self.clone()
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::File { .. } => NodeType::File,
            NodeKind::Directory { .. } => NodeType::Directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    /// Entries of a directory, sorted by name. Fails for files.
    pub fn entries(&self) -> StoreResult<&BTreeMap<String, DirectoryEntry>> {
        match &self.kind {
            NodeKind::Directory { entries } => Ok(entries),
            NodeKind::File { .. } => Err(StoreError::NotADirectory(self.id)),
        }
    }

    /// Mutable entries of a directory. Fails for files.
    pub fn entries_mut(&mut self) -> StoreResult<&mut BTreeMap<String, DirectoryEntry>> {
        match &mut self.kind {
            NodeKind::Directory { entries } => Ok(entries),
            NodeKind::File { .. } => Err(StoreError::NotADirectory(self.id)),
        }
    }

    pub fn entry(&self, name: &str) -> StoreResult<Option<&DirectoryEntry>> {
        Ok(self.entries()?.get(name))
    }

    /// Content of a file. Fails for directories.
    pub fn content(&self) -> StoreResult<&[u8]> {
        match &self.kind {
            NodeKind::File { content } => Ok(content),
            NodeKind::Directory { .. } => Err(StoreError::NotAFile(self.id)),
        }
    }

    /// Content length in bytes; zero for directories.
    pub fn content_len(&self) -> u64 {
        match &self.kind {
            NodeKind::File { content } => content.len() as u64,
            NodeKind::Directory { .. } => 0,
        }
    }

    /// BLAKE3 digest of the file content, hex encoded. `None` for directories.
    pub fn content_digest(&self) -> Option<String> {
        match &self.kind {
            NodeKind::File { content } => Some(hex::encode(blake3::hash(content).as_bytes())),
            NodeKind::Directory { .. } => None,
        }
    }

    /// Size of the bincode encoding of this node.
    pub fn encoded_len(&self) -> StoreResult<u64> {
        bincode::serialized_size(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str) -> Authority {
        Authority::group(name).unwrap()
    }

    #[test]
    fn entry_equality_ignores_child_and_version() {
        let parent = NodeId::new();
        let a = DirectoryEntry::new("doc", parent, NodeId::new());
        let b = a.updated("doc", NodeId::new());
        assert_eq!(a, b);
        assert_eq!(b.version, 1);

        let other_parent = DirectoryEntry::new("doc", NodeId::new(), a.child);
        assert_ne!(a, other_parent);
    }

    #[test]
    fn entry_hash_follows_equality() {
        use std::collections::HashSet;
        let parent = NodeId::new();
        let a = DirectoryEntry::new("doc", parent, NodeId::new());
        let b = a.updated("doc", NodeId::new());
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn successor_keeps_origin() {
        let node = Node::new_file(b"x".to_vec(), VersionId::new(1));
        let next = node.successor(VersionId::new(2));
        assert_ne!(node.id, next.id);
        assert_eq!(node.origin, next.origin);
        assert_eq!(next.created_in, VersionId::new(2));
    }

    #[test]
    fn file_has_no_entries() {
        let node = Node::new_file(b"x".to_vec(), VersionId::new(1));
        assert!(matches!(node.entries(), Err(StoreError::NotADirectory(_))));
        assert_eq!(node.content().unwrap(), b"x");
        assert_eq!(node.content_len(), 1);
    }

    #[test]
    fn directory_has_no_content() {
        let node = Node::new_directory(VersionId::new(1));
        assert!(matches!(node.content(), Err(StoreError::NotAFile(_))));
        assert_eq!(node.content_len(), 0);
        assert!(node.content_digest().is_none());
    }

    #[test]
    fn acl_grant_and_revoke() {
        let mut acl = Acl::default();
        assert!(acl.inherit);
        assert!(acl.grant(group("X"), PermissionLevel::Contributor));
        assert!(!acl.grant(group("X"), PermissionLevel::Contributor));
        assert!(acl.grant(group("X"), PermissionLevel::Consumer));
        assert!(acl.revoke(&group("X"), PermissionLevel::Consumer));
        assert!(!acl.revoke(&group("X"), PermissionLevel::Consumer));
        acl.grant(group("Y"), PermissionLevel::Coordinator);
        assert_eq!(acl.revoke_all(&group("X")), 1);
        assert_eq!(acl.grants.len(), 1);
    }

    #[test]
    fn encoded_len_grows_with_content() {
        let mut node = Node::new_file(b"payload".to_vec(), VersionId::new(3));
        node.acl.grant(group("X"), PermissionLevel::Editor);
        let bytes = bincode::serialize(&node).unwrap();
        assert_eq!(bytes.len() as u64, node.encoded_len().unwrap());
        let empty = Node::new_file(Vec::new(), VersionId::new(3));
        let bigger = Node::new_file(vec![0u8; 64], VersionId::new(3));
        assert_eq!(bigger.encoded_len().unwrap(), empty.encoded_len().unwrap() + 64);
    }

    #[test]
    fn content_digest_is_stable() {
        let a = Node::new_file(b"same".to_vec(), VersionId::new(1));
        let b = Node::new_file(b"same".to_vec(), VersionId::new(2));
        assert_eq!(a.content_digest(), b.content_digest());
        assert_eq!(a.content_digest().unwrap().len(), 64);
    }
}
