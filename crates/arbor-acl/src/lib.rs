//! Permission inheritance for Arbor.
//!
//! Each node carries a local [`Acl`](arbor_store::Acl): a set of
//! `(authority, level)` grants plus an `inherit` flag. Setting a permission
//! writes only that record; descendants are never touched. What an authority
//! may do at a path is decided by [`AclEvaluator`], which walks the ancestor
//! chain of a snapshot at read time.

pub mod error;
pub mod evaluate;

pub use error::{AclError, AclResult};
pub use evaluate::{inherit_step, AclEvaluator, EffectivePermissions, EvaluatedNode};
