//! Transaction engine: id issuance, active-set tracking and snapshots.
//!
//! The engine is the authority on transaction state. Everything else in the
//! database asks it two questions: "was this id committed?" (version
//! visibility) and "what is the oldest id anyone can still see?" (garbage
//! collection).

mod engine;
mod snapshot;

pub use engine::{Transaction, TransactionEngine};
pub use snapshot::Snapshot;
