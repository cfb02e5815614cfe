//! Foundation types for Arbor.
//!
//! This crate provides the identity, addressing, and permission vocabulary
//! shared by every other Arbor crate.
//!
//! # Key Types
//!
//! - [`NodeId`] — Generated identifier (UUID v7) for an immutable node
//! - [`VersionId`] — Monotonically increasing snapshot version number
//! - [`NodePath`] — Normalized absolute path inside a branch
//! - [`BranchName`] — Validated branch (store) name
//! - [`Authority`] — A user or group that permissions are granted to
//! - [`PermissionLevel`] — Ordered permission roles

pub mod branch;
pub mod error;
pub mod id;
pub mod path;
pub mod permission;

pub use branch::BranchName;
pub use error::TypeError;
pub use id::{NodeId, VersionId};
pub use path::{validate_name, NodePath};
pub use permission::{Authority, PermissionLevel};
