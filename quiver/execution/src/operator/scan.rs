use quiver_common::types::{LabelId, PropertyId};
use quiver_common::value::PropertyValue;
use quiver_planner::SymbolId;
use quiver_planner::operator::{Expr, RangeBound};
use quiver_storage::index::PropertyBound;

use super::{BoxedOperator, PhysicalOperator};
use crate::context::ExecutionContext;
use crate::error::{ExecutionError, ExecutionResult};
use crate::eval::evaluate;
use crate::frame::Frame;
use crate::value::Value;

/// Shared pull loop of the four scans: per input row, fetch the matching
/// vertex set once, then stream it into the scan's symbol.
macro_rules! scan_pull {
    ($self:expr, $frame:expr, $ctx:expr, $fetch:expr) => {{
        loop {
            if let Some(gids) = &$self.gids {
                if $self.next < gids.len() {
                    let gid = gids[$self.next];
                    $self.next += 1;
                    $frame.set($self.symbol, Value::Vertex(gid));
                    return Ok(true);
                }
                $self.gids = None;
            }
            if !$self.input.pull($frame, $ctx)? {
                return Ok(false);
            }
            $self.gids = Some($fetch?);
            $self.next = 0;
        }
    }};
}

pub struct ScanAll {
    input: BoxedOperator,
    symbol: SymbolId,
    gids: Option<Vec<quiver_common::types::Gid>>,
    next: usize,
}

impl ScanAll {
    pub fn new(input: BoxedOperator, symbol: SymbolId) -> Self {
        Self {
            input,
            symbol,
            gids: None,
            next: 0,
        }
    }
}

impl PhysicalOperator for ScanAll {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        scan_pull!(self, frame, ctx, {
            Ok::<_, ExecutionError>(
                ctx.graph.vertices().into_iter().map(|v| v.gid).collect::<Vec<_>>(),
            )
        })
    }

    fn reset(&mut self) {
        self.input.reset();
        self.gids = None;
        self.next = 0;
    }
}

pub struct ScanAllByLabel {
    input: BoxedOperator,
    symbol: SymbolId,
    label: LabelId,
    gids: Option<Vec<quiver_common::types::Gid>>,
    next: usize,
}

impl ScanAllByLabel {
    pub fn new(input: BoxedOperator, symbol: SymbolId, label: LabelId) -> Self {
        Self {
            input,
            symbol,
            label,
            gids: None,
            next: 0,
        }
    }
}

impl PhysicalOperator for ScanAllByLabel {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        scan_pull!(self, frame, ctx, {
            Ok::<_, ExecutionError>(
                ctx.graph
                    .vertices_by_label(self.label)
                    .into_iter()
                    .map(|v| v.gid)
                    .collect::<Vec<_>>(),
            )
        })
    }

    fn reset(&mut self) {
        self.input.reset();
        self.gids = None;
        self.next = 0;
    }
}

pub struct ScanAllByLabelPropertyValue {
    input: BoxedOperator,
    symbol: SymbolId,
    label: LabelId,
    property: PropertyId,
    expression: Expr,
    gids: Option<Vec<quiver_common::types::Gid>>,
    next: usize,
}

impl ScanAllByLabelPropertyValue {
    pub fn new(
        input: BoxedOperator,
        symbol: SymbolId,
        label: LabelId,
        property: PropertyId,
        expression: Expr,
    ) -> Self {
        Self {
            input,
            symbol,
            label,
            property,
            expression,
            gids: None,
            next: 0,
        }
    }
}

impl PhysicalOperator for ScanAllByLabelPropertyValue {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        scan_pull!(self, frame, ctx, {
            let value = property_operand(evaluate(&self.expression, frame, ctx)?)?;
            // Equality with null never matches anything.
            let gids = if value.is_null() {
                Vec::new()
            } else {
                ctx.graph
                    .vertices_by_label_property_value(self.label, self.property, &value)
                    .into_iter()
                    .map(|v| v.gid)
                    .collect()
            };
            Ok::<_, ExecutionError>(gids)
        })
    }

    fn reset(&mut self) {
        self.input.reset();
        self.gids = None;
        self.next = 0;
    }
}

pub struct ScanAllByLabelPropertyRange {
    input: BoxedOperator,
    symbol: SymbolId,
    label: LabelId,
    property: PropertyId,
    lower: Option<RangeBound>,
    upper: Option<RangeBound>,
    gids: Option<Vec<quiver_common::types::Gid>>,
    next: usize,
}

impl ScanAllByLabelPropertyRange {
    pub fn new(
        input: BoxedOperator,
        symbol: SymbolId,
        label: LabelId,
        property: PropertyId,
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    ) -> Self {
        Self {
            input,
            symbol,
            label,
            property,
            lower,
            upper,
            gids: None,
            next: 0,
        }
    }

    fn bound(
        bound: &Option<RangeBound>,
        frame: &Frame,
        ctx: &ExecutionContext,
    ) -> ExecutionResult<Option<PropertyBound>> {
        match bound {
            None => Ok(None),
            Some(range_bound) => {
                let value = property_operand(evaluate(&range_bound.expression, frame, ctx)?)?;
                Ok(Some(PropertyBound {
                    value,
                    inclusive: range_bound.inclusive,
                }))
            }
        }
    }
}

impl PhysicalOperator for ScanAllByLabelPropertyRange {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        scan_pull!(self, frame, ctx, {
            let lower = Self::bound(&self.lower, frame, ctx)?;
            let upper = Self::bound(&self.upper, frame, ctx)?;
            // A null bound makes the comparison null, i.e. an empty scan.
            let gids = if lower.as_ref().is_some_and(|b| b.value.is_null())
                || upper.as_ref().is_some_and(|b| b.value.is_null())
            {
                Vec::new()
            } else {
                ctx.graph
                    .vertices_by_label_property_range(
                        self.label,
                        self.property,
                        lower.as_ref(),
                        upper.as_ref(),
                    )
                    .into_iter()
                    .map(|v| v.gid)
                    .collect()
            };
            Ok::<_, ExecutionError>(gids)
        })
    }

    fn reset(&mut self) {
        self.input.reset();
        self.gids = None;
        self.next = 0;
    }
}

fn property_operand(value: Value) -> ExecutionResult<PropertyValue> {
    match value {
        Value::Property(value) => Ok(value),
        other => Err(ExecutionError::evaluation(format!(
            "index lookups need a property value, got a {}",
            other.type_name()
        ))),
    }
}
