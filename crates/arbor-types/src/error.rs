use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid branch name {name:?}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    #[error("invalid authority: {0:?}")]
    InvalidAuthority(String),

    #[error("unknown permission level: {0:?}")]
    UnknownPermission(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
