use std::io;
use std::time::Duration;

use quiver_common::types::Gid;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// MVCC write-write conflict; the transaction must abort and may retry.
    #[error("serialization conflict: {0}")]
    Serialization(String),
    /// A record-lock wait exceeded the deadline.
    #[error("record lock wait timed out after {0:?}")]
    LockTimeout(Duration),
    /// An update targeted a version expired by a committed transaction.
    #[error("record {0} was deleted")]
    RecordDeleted(Gid),
    /// No version of the record is visible to the calling transaction.
    #[error("record {0} not found")]
    NotFound(Gid),
    #[error("vertex {0} still has incident edges")]
    UnableToDeleteVertex(Gid),
    /// The WAL is poisoned; the database refuses further commits.
    #[error("write-ahead log failure, refusing further commits")]
    WalWriteFailure,
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    /// Routing a delta to a remote worker failed; escalates to abort.
    #[error("remote update failed: {0}")]
    Remote(String),
}

#[derive(Error, Debug)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("data corruption: record checksum mismatch")]
    ChecksumMismatch,
    #[error("data corruption: file hash trailer mismatch")]
    TrailerMismatch,
    #[error("record serialization failed: {0}")]
    SerializationFailed(String),
    #[error("record deserialization failed: {0}")]
    DeserializationFailed(String),
}
