//! Node arena for Arbor.
//!
//! Every file and directory in every branch and version is an immutable
//! [`Node`] stored in an arena and addressed by a generated [`NodeId`].
//! Directories own their children through [`DirectoryEntry`] edges that hold
//! child ids, never embedded nodes, so subtrees can be shared by any number of
//! snapshots without ownership cycles.
//!
//! # Storage Backends
//!
//! All backends implement the [`NodeStore`] trait:
//!
//! - [`InMemoryNodeStore`] -- `HashMap`-based arena shared by all branches
//! - [`OverlayStore`] -- private write layer over a shared arena, used by
//!   in-flight transactions so uncommitted nodes never enter the arena
//!
//! # Design Rules
//!
//! 1. Nodes are immutable once written; a change produces a new node with a
//!    new id and the same `origin`.
//! 2. Concurrent reads are always safe (nodes are shared via `Arc`).
//! 3. The arena never decides reachability; reclamation is driven by the
//!    versioned graph.
//!
//! [`NodeId`]: arbor_types::NodeId

pub mod error;
pub mod memory;
pub mod node;
pub mod overlay;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryNodeStore;
pub use node::{Acl, DirectoryEntry, Grant, Node, NodeKind, NodeType};
pub use overlay::OverlayStore;
pub use traits::NodeStore;
