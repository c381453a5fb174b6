//! The quiver database: a distributed, transactional property-graph store
//! with a declarative query layer.
//!
//! This crate wires the pieces together: configuration → storage (with WAL
//! recovery on open) → planner → executor → cluster, plus the background
//! flusher and garbage-collection threads.

mod database;
mod error;
mod names_store;
mod session;
mod stats;

pub use database::Database;
pub use error::{DatabaseError, DatabaseResult};
pub use quiver_common::config::DatabaseConfig;
pub use quiver_execution::{QueryResults, Value};
pub use quiver_planner::ast;
pub use session::Session;

/// Installs a default `tracing` subscriber honoring `RUST_LOG`. Embedders
/// with their own subscriber skip this.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
