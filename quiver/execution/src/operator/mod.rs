//! Physical operators: one per logical operator kind, compiled by a fold
//! over the logical plan.

mod branch;
mod expand;
mod filter;
mod mutate;
mod project;
mod scan;

use quiver_planner::LogicalOperator;

use crate::context::ExecutionContext;
use crate::error::ExecutionResult;
use crate::frame::Frame;

/// A pull-based operator. `open` runs once before the first pull, `pull`
/// writes the next row's slots into the frame and reports whether it
/// produced one, and `reset` rewinds the operator (and its input) for
/// re-execution under a new outer row.
pub trait PhysicalOperator: Send {
    /// One-time initialization. The built-in operators allocate lazily on
    /// their first pull instead, so the default is a no-op.
    fn open(&mut self, _ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        Ok(())
    }

    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool>;

    fn reset(&mut self);
}

pub type BoxedOperator = Box<dyn PhysicalOperator>;

/// The second fold over the logical plan (the first being cost
/// estimation): produces the executable operator tree.
pub fn compile(plan: &LogicalOperator) -> BoxedOperator {
    match plan {
        LogicalOperator::Once => Box::new(Once::new()),
        LogicalOperator::ScanAll { input, symbol } => {
            Box::new(scan::ScanAll::new(compile(input), *symbol))
        }
        LogicalOperator::ScanAllByLabel {
            input,
            symbol,
            label,
        } => Box::new(scan::ScanAllByLabel::new(compile(input), *symbol, *label)),
        LogicalOperator::ScanAllByLabelPropertyValue {
            input,
            symbol,
            label,
            property,
            expression,
        } => Box::new(scan::ScanAllByLabelPropertyValue::new(
            compile(input),
            *symbol,
            *label,
            *property,
            expression.clone(),
        )),
        LogicalOperator::ScanAllByLabelPropertyRange {
            input,
            symbol,
            label,
            property,
            lower,
            upper,
        } => Box::new(scan::ScanAllByLabelPropertyRange::new(
            compile(input),
            *symbol,
            *label,
            *property,
            lower.clone(),
            upper.clone(),
        )),
        LogicalOperator::Expand {
            input,
            input_symbol,
            node_symbol,
            edge_symbol,
            direction,
            edge_types,
            existing_node,
        } => Box::new(expand::Expand::new(
            compile(input),
            *input_symbol,
            *node_symbol,
            *edge_symbol,
            *direction,
            edge_types.clone(),
            *existing_node,
        )),
        LogicalOperator::ExpandVariable {
            input,
            input_symbol,
            node_symbol,
            edge_list_symbol,
            direction,
            edge_types,
            lower,
            upper,
            breadth_first,
            existing_node,
        } => Box::new(expand::ExpandVariable::new(
            compile(input),
            *input_symbol,
            *node_symbol,
            *edge_list_symbol,
            *direction,
            edge_types.clone(),
            *lower,
            *upper,
            *breadth_first,
            *existing_node,
        )),
        LogicalOperator::ConstructNamedPath {
            input,
            path_symbol,
            symbols,
        } => Box::new(expand::ConstructNamedPath::new(
            compile(input),
            *path_symbol,
            symbols.clone(),
        )),
        LogicalOperator::Filter { input, expression } => {
            Box::new(filter::Filter::new(compile(input), expression.clone()))
        }
        LogicalOperator::EdgeUniquenessFilter {
            input,
            expand_symbol,
            previous_symbols,
        } => Box::new(filter::EdgeUniquenessFilter::new(
            compile(input),
            *expand_symbol,
            previous_symbols.clone(),
        )),
        LogicalOperator::Produce {
            input,
            named_expressions,
        } => Box::new(project::Produce::new(
            compile(input),
            named_expressions.clone(),
        )),
        LogicalOperator::Aggregate {
            input,
            aggregations,
            group_by,
            group_symbols,
        } => Box::new(project::Aggregate::new(
            compile(input),
            aggregations.clone(),
            group_by.clone(),
            group_symbols.clone(),
        )),
        LogicalOperator::OrderBy {
            input,
            order,
            symbols,
        } => Box::new(project::OrderBy::new(
            compile(input),
            order.clone(),
            symbols.clone(),
        )),
        LogicalOperator::Skip { input, expression } => {
            Box::new(project::Skip::new(compile(input), expression.clone()))
        }
        LogicalOperator::Limit { input, expression } => {
            Box::new(project::Limit::new(compile(input), expression.clone()))
        }
        LogicalOperator::Distinct { input, symbols } => {
            Box::new(project::Distinct::new(compile(input), symbols.clone()))
        }
        LogicalOperator::Unwind {
            input,
            expression,
            symbol,
        } => Box::new(project::Unwind::new(
            compile(input),
            expression.clone(),
            *symbol,
        )),
        LogicalOperator::CreateNode { input, node } => {
            Box::new(mutate::CreateNode::new(compile(input), node.clone()))
        }
        LogicalOperator::CreateExpand {
            input,
            input_symbol,
            node,
            edge,
        } => Box::new(mutate::CreateExpand::new(
            compile(input),
            *input_symbol,
            node.clone(),
            edge.clone(),
        )),
        LogicalOperator::SetProperty {
            input,
            symbol,
            property,
            value,
        } => Box::new(mutate::SetProperty::new(
            compile(input),
            *symbol,
            *property,
            value.clone(),
        )),
        LogicalOperator::SetLabels {
            input,
            symbol,
            labels,
        } => Box::new(mutate::SetLabels::new(compile(input), *symbol, labels.clone())),
        LogicalOperator::RemoveProperty {
            input,
            symbol,
            property,
        } => Box::new(mutate::RemoveProperty::new(compile(input), *symbol, *property)),
        LogicalOperator::RemoveLabels {
            input,
            symbol,
            labels,
        } => Box::new(mutate::RemoveLabels::new(
            compile(input),
            *symbol,
            labels.clone(),
        )),
        LogicalOperator::Delete {
            input,
            expressions,
            detach,
        } => Box::new(mutate::Delete::new(
            compile(input),
            expressions.clone(),
            *detach,
        )),
        LogicalOperator::Merge {
            input,
            on_match,
            on_create,
        } => Box::new(branch::Merge::new(
            compile(input),
            compile(on_match),
            compile(on_create),
        )),
        LogicalOperator::Optional {
            input,
            branch: optional_branch,
            optional_symbols,
        } => Box::new(branch::Optional::new(
            compile(input),
            compile(optional_branch),
            optional_symbols.clone(),
        )),
        LogicalOperator::Accumulate { input, symbols } => {
            Box::new(branch::Accumulate::new(compile(input), symbols.clone()))
        }
        LogicalOperator::Cartesian {
            left,
            right,
            left_symbols,
        } => Box::new(branch::Cartesian::new(
            compile(left),
            compile(right),
            left_symbols.clone(),
        )),
        LogicalOperator::Union {
            left,
            right,
            left_symbols,
            right_symbols,
        } => Box::new(branch::Union::new(
            compile(left),
            compile(right),
            left_symbols.clone(),
            right_symbols.clone(),
        )),
    }
}

/// Emits a single empty row; the leaf of every plan.
pub struct Once {
    pulled: bool,
}

impl Once {
    pub fn new() -> Self {
        Self { pulled: false }
    }
}

impl Default for Once {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalOperator for Once {
    fn pull(&mut self, _frame: &mut Frame, _ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if self.pulled {
            return Ok(false);
        }
        self.pulled = true;
        Ok(true)
    }

    fn reset(&mut self) {
        self.pulled = false;
    }
}
