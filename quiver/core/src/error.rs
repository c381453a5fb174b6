use quiver_cluster::ClusterError;
use quiver_common::config::ConfigError;
use quiver_execution::ExecutionError;
use quiver_planner::PlanError;
use quiver_storage::StorageError;
use thiserror::Error;

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Top-level error surfaced to clients: a typed code plus a message. No
/// partial side effects remain behind any of these; the failing
/// transaction was aborted before the error propagated.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("query error: {0}")]
    Query(#[from] PlanError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    /// Stable machine-readable code for the wire protocol.
    pub fn code(&self) -> &'static str {
        fn storage_code(error: &StorageError) -> &'static str {
            match error {
                StorageError::Serialization(_) => "SerializationError",
                StorageError::LockTimeout(_) => "LockTimeout",
                StorageError::RecordDeleted(_) => "RecordDeleted",
                StorageError::NotFound(_) => "NotFound",
                StorageError::UnableToDeleteVertex(_) => "UnableToDeleteVertex",
                StorageError::WalWriteFailure | StorageError::Wal(_) => "WalWriteFailure",
                StorageError::Remote(_) => "RpcFailure",
            }
        }
        match self {
            DatabaseError::Storage(e) => storage_code(e),
            DatabaseError::Execution(ExecutionError::Storage(e)) => storage_code(e),
            DatabaseError::Execution(ExecutionError::Timeout) => "QueryTimeout",
            DatabaseError::Execution(_) => "QueryError",
            DatabaseError::Query(_) => "QueryError",
            DatabaseError::Cluster(_) => "RpcFailure",
            DatabaseError::Config(_) | DatabaseError::Io(_) => "InternalError",
        }
    }
}
