use quiver_planner::PlannedQuery;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::ExecutionResult;
use crate::frame::Frame;
use crate::operator::compile;
use crate::value::Value;

/// A fully drained query result: column names plus materialized rows.
#[derive(Debug, Default)]
pub struct QueryResults {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Compiles and drains a planned query. Cancellation (abort flag, query
/// deadline, wound-wait victims) is checked between pulls; on any error
/// the caller aborts the transaction, so no partial effects survive.
pub fn execute(plan: &PlannedQuery, ctx: &mut ExecutionContext) -> ExecutionResult<QueryResults> {
    let mut root = compile(&plan.plan);
    let mut frame = Frame::new(plan.symbol_table.len());
    let mut results = QueryResults {
        columns: plan.columns.clone(),
        ..Default::default()
    };
    root.open(ctx)?;
    loop {
        ctx.check_cancellation()?;
        if !root.pull(&mut frame, ctx)? {
            break;
        }
        if !plan.output_symbols.is_empty() {
            results
                .rows
                .push(frame.save(&plan.output_symbols));
        }
    }
    debug!(rows = results.rows.len(), "query drained");
    Ok(results)
}
