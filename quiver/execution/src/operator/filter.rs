use quiver_planner::SymbolId;
use quiver_planner::operator::Expr;

use super::{BoxedOperator, PhysicalOperator};
use crate::context::ExecutionContext;
use crate::error::ExecutionResult;
use crate::eval::{evaluate, is_true};
use crate::frame::Frame;
use crate::value::Value;

pub struct Filter {
    input: BoxedOperator,
    expression: Expr,
}

impl Filter {
    pub fn new(input: BoxedOperator, expression: Expr) -> Self {
        Self { input, expression }
    }
}

impl PhysicalOperator for Filter {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        while self.input.pull(frame, ctx)? {
            let value = evaluate(&self.expression, frame, ctx)?;
            if is_true(&value)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

/// Cypher's edge-isomorphism rule: within one pattern, the newly expanded
/// edge must differ from every previously bound one.
pub struct EdgeUniquenessFilter {
    input: BoxedOperator,
    expand_symbol: SymbolId,
    previous_symbols: Vec<SymbolId>,
}

impl EdgeUniquenessFilter {
    pub fn new(
        input: BoxedOperator,
        expand_symbol: SymbolId,
        previous_symbols: Vec<SymbolId>,
    ) -> Self {
        Self {
            input,
            expand_symbol,
            previous_symbols,
        }
    }

    fn edges_of(value: &Value) -> Vec<quiver_common::types::Gid> {
        match value {
            Value::Edge(gid) => vec![*gid],
            Value::List(items) => items.iter().filter_map(|v| v.as_edge()).collect(),
            _ => Vec::new(),
        }
    }
}

impl PhysicalOperator for EdgeUniquenessFilter {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        'rows: while self.input.pull(frame, ctx)? {
            let current = Self::edges_of(frame.get(self.expand_symbol));
            for previous in &self.previous_symbols {
                let seen = Self::edges_of(frame.get(*previous));
                if current.iter().any(|edge| seen.contains(edge)) {
                    continue 'rows;
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}
