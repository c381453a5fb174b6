use quiver_common::types::{Address, EdgeTypeId, Gid, LabelId, PropertyId, TxnId, WorkerId};
use quiver_common::value::PropertyValue;
use quiver_storage::{StateDelta, StorageError};
use serde::{Deserialize, Serialize};

/// Requests between workers. All fields are value types; nothing crosses
/// the wire by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Buffer one delta on the worker owning the delta's target record.
    Update { delta: StateDelta },
    CreateVertex {
        tx: TxnId,
        labels: Vec<LabelId>,
        properties: Vec<(PropertyId, PropertyValue)>,
    },
    CreateEdge {
        tx: TxnId,
        from: Address,
        to: Address,
        edge_type: EdgeTypeId,
    },
    RemoveVertex {
        tx: TxnId,
        gid: Gid,
        check_empty: bool,
    },
    RemoveEdge {
        tx: TxnId,
        gid: Gid,
        from: Address,
        to: Address,
    },
    /// Apply every delta buffered for the transaction, in per-record
    /// arrival order.
    Apply { tx: TxnId },
    ClearTransactionalCache { oldest_active: TxnId },
    RegisterWorker { desired_id: WorkerId, endpoint: String },
    ClusterDiscovery { worker_id: WorkerId, endpoint: String },
    StopWorker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Done,
    Created { gid: Gid },
    Registered {
        registration_successful: bool,
        assigned_id: WorkerId,
        workers: Vec<(WorkerId, String)>,
    },
    Error { code: ErrorCode, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Serialization,
    LockTimeout,
    RecordDeleted,
    NotFound,
    UnableToDeleteVertex,
    WalWrite,
    Remote,
    Internal,
}

impl Response {
    pub fn from_storage_error(error: &StorageError) -> Response {
        let code = match error {
            StorageError::Serialization(_) => ErrorCode::Serialization,
            StorageError::LockTimeout(_) => ErrorCode::LockTimeout,
            StorageError::RecordDeleted(_) => ErrorCode::RecordDeleted,
            StorageError::NotFound(_) => ErrorCode::NotFound,
            StorageError::UnableToDeleteVertex(_) => ErrorCode::UnableToDeleteVertex,
            StorageError::WalWriteFailure | StorageError::Wal(_) => ErrorCode::WalWrite,
            StorageError::Remote(_) => ErrorCode::Remote,
        };
        Response::Error {
            code,
            message: error.to_string(),
        }
    }

    /// Back-conversion on the calling side: a remote error becomes the
    /// matching local storage error so the executor's abort paths apply.
    pub fn into_storage_result(self) -> Result<Response, StorageError> {
        match self {
            Response::Error { code, message } => Err(match code {
                ErrorCode::Serialization => StorageError::Serialization(message),
                ErrorCode::LockTimeout => {
                    StorageError::LockTimeout(std::time::Duration::default())
                }
                ErrorCode::RecordDeleted => StorageError::RecordDeleted(Gid::default()),
                ErrorCode::NotFound => StorageError::NotFound(Gid::default()),
                ErrorCode::UnableToDeleteVertex => {
                    StorageError::UnableToDeleteVertex(Gid::default())
                }
                ErrorCode::WalWrite => StorageError::WalWriteFailure,
                ErrorCode::Remote | ErrorCode::Internal => StorageError::Remote(message),
            }),
            other => Ok(other),
        }
    }
}
