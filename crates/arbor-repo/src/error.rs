//! Error types for the repository layer.

use arbor_acl::AclError;
use arbor_graph::GraphError;
use arbor_index::IndexError;
use arbor_store::StoreError;
use arbor_types::TypeError;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Acl(#[from] AclError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),

    /// A mutation was attempted inside a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnlyTransaction,

    /// The work kept conflicting. Safe to retry at a higher level.
    #[error("transaction failed after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<RepoError> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// `true` if the failed attempt should be discarded and re-run.
    pub fn is_retryable(&self) -> bool {
        match self {
            RepoError::Graph(e) => e.is_retryable(),
            RepoError::Acl(e) => e.is_retryable(),
            RepoError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// The underlying graph error, looking through retry exhaustion.
    pub fn graph_error(&self) -> Option<&GraphError> {
        match self {
            RepoError::Graph(e) => Some(e),
            RepoError::RetryExhausted { last, .. } => last.graph_error(),
            _ => None,
        }
    }

    /// `true` if the failure was a name clash under the parent.
    pub fn is_duplicate_name(&self) -> bool {
        matches!(self.graph_error(), Some(GraphError::DuplicateName { .. }))
    }

    /// `true` if a path did not resolve.
    pub fn is_not_found(&self) -> bool {
        match self {
            RepoError::Acl(AclError::Resolve { source, .. }) => {
                matches!(source, GraphError::NotFound(_))
            }
            _ => matches!(self.graph_error(), Some(GraphError::NotFound(_))),
        }
    }
}

/// Convenience alias for repository results.
pub type RepoResult<T> = Result<T, RepoError>;
