//! Pull-based query execution: each physical operator exposes
//! `open`/`pull`/`reset` and rows flow through a fixed-slot frame indexed
//! by the planner's symbols.

pub mod context;
pub mod error;
pub mod eval;
pub mod executor;
pub mod frame;
pub mod operator;
pub mod value;

pub use context::ExecutionContext;
pub use error::{ExecutionError, ExecutionResult};
pub use executor::{QueryResults, execute};
pub use frame::Frame;
pub use value::Value;
