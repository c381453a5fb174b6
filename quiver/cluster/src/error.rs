use std::io;

use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("frame corruption: checksum mismatch")]
    ChecksumMismatch,
    #[error("frame of {0} bytes exceeds the maximum")]
    FrameTooLarge(u32),
    #[error("message encoding failed: {0}")]
    EncodeFailed(String),
    #[error("message decoding failed: {0}")]
    DecodeFailed(String),
    /// A worker call failed or timed out; the transaction must abort.
    #[error("RPC to worker {worker} failed: {message}")]
    RpcFailure { worker: i32, message: String },
    #[error("worker {0} is not registered")]
    UnknownWorker(i32),
}
