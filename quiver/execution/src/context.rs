use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use quiver_common::names::NameTables;
use quiver_common::value::PropertyValue;
use quiver_storage::GraphAccessor;

use crate::error::{ExecutionError, ExecutionResult};

/// Everything expression evaluation and the operators need besides the
/// frame: the transaction-bound graph view, bound parameters, the name
/// tables and the cancellation state.
pub struct ExecutionContext {
    pub graph: GraphAccessor,
    pub names: Arc<NameTables>,
    pub parameters: HashMap<String, PropertyValue>,
    /// Wall-clock timestamp captured when the query started, for
    /// timestamp-dependent functions.
    pub timestamp_ms: i64,
    abort: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ExecutionContext {
    pub fn new(graph: GraphAccessor, names: Arc<NameTables>) -> Self {
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self {
            graph,
            names,
            parameters: HashMap::new(),
            timestamp_ms,
            abort: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, PropertyValue>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Handle other threads (a timeout watchdog, a client disconnect) use
    /// to stop the query at its next pull.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Cooperative cancellation point, polled between pulls: the abort
    /// flag, the query deadline and the transaction's wound flag all end
    /// the query here.
    pub fn check_cancellation(&self) -> ExecutionResult<()> {
        if self.abort.load(Ordering::Acquire) {
            return Err(ExecutionError::Aborted);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ExecutionError::Timeout);
        }
        let engine = &self.graph.storage().engine;
        if engine.is_wounded(self.graph.txn().id()) {
            return Err(ExecutionError::Aborted);
        }
        Ok(())
    }
}
