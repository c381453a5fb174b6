use quiver_storage::StorageError;
use thiserror::Error;

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("evaluation error: {0}")]
    Evaluation(String),
    #[error("query aborted")]
    Aborted,
    #[error("query execution timed out")]
    Timeout,
}

impl ExecutionError {
    pub fn evaluation(message: impl Into<String>) -> Self {
        ExecutionError::Evaluation(message.into())
    }
}
