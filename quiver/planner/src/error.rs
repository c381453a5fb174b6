use thiserror::Error;

pub type PlanResult<T> = Result<T, PlanError>;

/// Semantic errors surfaced by the planner. Clients see these as query
/// errors; no transaction state is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("`{name}` is a {actual}, expected a {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("variable `{0}` is already bound")]
    Redeclaration(String),
    #[error("aggregation is not allowed here")]
    InvalidAggregation,
    #[error("union arms return different columns")]
    UnionColumnMismatch,
    #[error("{0}")]
    Unsupported(String),
}
