//! Error types for permission evaluation.

use arbor_graph::GraphError;
use arbor_store::StoreError;
use arbor_types::NodePath;

#[derive(Debug, thiserror::Error)]
pub enum AclError {
    /// The path could not be resolved in the snapshot being evaluated.
    #[error("cannot evaluate permissions for {path}: {source}")]
    Resolve {
        path: NodePath,
        #[source]
        source: GraphError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

impl AclError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AclError::Resolve { source, .. } | AclError::Graph(source) => source.is_retryable(),
            AclError::Store(e) => e.is_transient(),
        }
    }
}

pub type AclResult<T> = Result<T, AclError>;
