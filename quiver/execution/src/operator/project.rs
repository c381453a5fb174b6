use std::collections::{HashMap, HashSet};

use quiver_common::value::PropertyValue;
use quiver_planner::SymbolId;
use quiver_planner::ast::AggregateOp;
use quiver_planner::operator::{AggregateSpec, Expr, SortSpec};

use super::{BoxedOperator, PhysicalOperator};
use crate::context::ExecutionContext;
use crate::error::{ExecutionError, ExecutionResult};
use crate::eval::evaluate;
use crate::frame::Frame;
use crate::value::{Value, compare, sort_cmp};

/// Evaluates the projection expressions into their output slots.
pub struct Produce {
    input: BoxedOperator,
    named_expressions: Vec<(String, Expr, SymbolId)>,
}

impl Produce {
    pub fn new(input: BoxedOperator, named_expressions: Vec<(String, Expr, SymbolId)>) -> Self {
        Self {
            input,
            named_expressions,
        }
    }
}

impl PhysicalOperator for Produce {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        for (_, expression, symbol) in &self.named_expressions {
            let value = evaluate(expression, frame, ctx)?;
            frame.set(*symbol, value);
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

#[derive(Default)]
struct Accumulator {
    count: i64,
    sum: Option<Value>,
    min: Option<Value>,
    max: Option<Value>,
    collected: Vec<Value>,
    distinct_seen: HashSet<Value>,
}

impl Accumulator {
    fn update(&mut self, spec: &AggregateSpec, value: Option<Value>) -> ExecutionResult<()> {
        let Some(value) = value else {
            // count(*) counts rows, not values.
            self.count += 1;
            return Ok(());
        };
        if value.is_null() {
            return Ok(());
        }
        if spec.distinct && !self.distinct_seen.insert(value.clone()) {
            return Ok(());
        }
        self.count += 1;
        match spec.op {
            AggregateOp::Count => {}
            AggregateOp::Collect => self.collected.push(value),
            AggregateOp::Min => {
                let replace = match &self.min {
                    None => true,
                    Some(current) => compare(&value, current).is_some_and(|o| o.is_lt()),
                };
                if replace {
                    self.min = Some(value);
                }
            }
            AggregateOp::Max => {
                let replace = match &self.max {
                    None => true,
                    Some(current) => compare(&value, current).is_some_and(|o| o.is_gt()),
                };
                if replace {
                    self.max = Some(value);
                }
            }
            AggregateOp::Sum | AggregateOp::Avg => {
                let next = match &self.sum {
                    None => value,
                    Some(current) => add_numbers(current, &value)?,
                };
                self.sum = Some(next);
            }
        }
        Ok(())
    }

    fn finish(&self, spec: &AggregateSpec) -> Value {
        match spec.op {
            AggregateOp::Count => Value::int(self.count),
            AggregateOp::Sum => self.sum.clone().unwrap_or(Value::int(0)),
            AggregateOp::Min => self.min.clone().unwrap_or(Value::NULL),
            AggregateOp::Max => self.max.clone().unwrap_or(Value::NULL),
            AggregateOp::Avg => match &self.sum {
                None => Value::NULL,
                Some(sum) => {
                    let total = match sum {
                        Value::Property(p) => p.as_double().unwrap_or(0.0),
                        _ => 0.0,
                    };
                    Value::Property(PropertyValue::from(total / self.count as f64))
                }
            },
            AggregateOp::Collect => Value::List(self.collected.clone()),
        }
    }
}

fn add_numbers(a: &Value, b: &Value) -> ExecutionResult<Value> {
    match (a, b) {
        (Value::Property(PropertyValue::Int(x)), Value::Property(PropertyValue::Int(y))) => x
            .checked_add(*y)
            .map(Value::int)
            .ok_or_else(|| ExecutionError::evaluation("integer overflow in sum")),
        (Value::Property(x), Value::Property(y)) => match (x.as_double(), y.as_double()) {
            (Some(x), Some(y)) => Ok(Value::Property(PropertyValue::from(x + y))),
            _ => Err(ExecutionError::evaluation("sum over non-numeric values")),
        },
        _ => Err(ExecutionError::evaluation("sum over non-numeric values")),
    }
}

/// Hash aggregation: drains the input, groups rows by the grouping key and
/// emits one row per group.
pub struct Aggregate {
    input: BoxedOperator,
    aggregations: Vec<AggregateSpec>,
    group_by: Vec<Expr>,
    group_symbols: Vec<SymbolId>,
    groups: Option<Vec<(Vec<Value>, Vec<Accumulator>)>>,
    next: usize,
}

impl Aggregate {
    pub fn new(
        input: BoxedOperator,
        aggregations: Vec<AggregateSpec>,
        group_by: Vec<Expr>,
        group_symbols: Vec<SymbolId>,
    ) -> Self {
        Self {
            input,
            aggregations,
            group_by,
            group_symbols,
            groups: None,
            next: 0,
        }
    }

    fn materialize(
        &mut self,
        frame: &mut Frame,
        ctx: &mut ExecutionContext,
    ) -> ExecutionResult<()> {
        let mut order: Vec<Vec<Value>> = Vec::new();
        let mut groups: HashMap<Vec<Value>, Vec<Accumulator>> = HashMap::new();
        while self.input.pull(frame, ctx)? {
            let key = self
                .group_by
                .iter()
                .map(|e| evaluate(e, frame, ctx))
                .collect::<ExecutionResult<Vec<_>>>()?;
            if !groups.contains_key(&key) {
                order.push(key.clone());
                let fresh: Vec<Accumulator> =
                    self.aggregations.iter().map(|_| Accumulator::default()).collect();
                groups.insert(key.clone(), fresh);
            }
            let accumulators = groups.get_mut(&key).expect("inserted above");
            for (spec, accumulator) in self.aggregations.iter().zip(accumulators.iter_mut()) {
                let value = spec
                    .expression
                    .as_ref()
                    .map(|e| evaluate(e, frame, ctx))
                    .transpose()?;
                accumulator.update(spec, value)?;
            }
        }
        // With no grouping key, an empty input still yields one (empty)
        // group so `count(*)` returns 0.
        if order.is_empty() && self.group_by.is_empty() {
            order.push(Vec::new());
            groups.insert(
                Vec::new(),
                self.aggregations.iter().map(|_| Accumulator::default()).collect(),
            );
        }
        self.groups = Some(
            order
                .into_iter()
                .map(|key| {
                    let accumulators = groups.remove(&key).expect("group recorded in order");
                    (key, accumulators)
                })
                .collect(),
        );
        Ok(())
    }
}

impl PhysicalOperator for Aggregate {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if self.groups.is_none() {
            self.materialize(frame, ctx)?;
        }
        let groups = self.groups.as_ref().expect("materialized above");
        if self.next >= groups.len() {
            return Ok(false);
        }
        let (key, accumulators) = &groups[self.next];
        self.next += 1;
        for (symbol, value) in self.group_symbols.iter().zip(key.iter()) {
            frame.set(*symbol, value.clone());
        }
        for (spec, accumulator) in self.aggregations.iter().zip(accumulators.iter()) {
            frame.set(spec.output_symbol, accumulator.finish(spec));
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.groups = None;
        self.next = 0;
    }
}

pub struct OrderBy {
    input: BoxedOperator,
    order: Vec<SortSpec>,
    symbols: Vec<SymbolId>,
    rows: Option<Vec<(Vec<Value>, Vec<Value>)>>,
    next: usize,
}

impl OrderBy {
    pub fn new(input: BoxedOperator, order: Vec<SortSpec>, symbols: Vec<SymbolId>) -> Self {
        Self {
            input,
            order,
            symbols,
            rows: None,
            next: 0,
        }
    }
}

impl PhysicalOperator for OrderBy {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if self.rows.is_none() {
            let mut rows = Vec::new();
            while self.input.pull(frame, ctx)? {
                let keys = self
                    .order
                    .iter()
                    .map(|spec| evaluate(&spec.expression, frame, ctx))
                    .collect::<ExecutionResult<Vec<_>>>()?;
                rows.push((keys, frame.save(&self.symbols)));
            }
            let order = self.order.clone();
            rows.sort_by(|(a, _), (b, _)| {
                for (spec, (x, y)) in order.iter().zip(a.iter().zip(b.iter())) {
                    let ordering = sort_cmp(x, y);
                    let ordering = if spec.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    };
                    if !ordering.is_eq() {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
            self.rows = Some(rows);
            self.next = 0;
        }
        let rows = self.rows.as_ref().expect("materialized above");
        if self.next >= rows.len() {
            return Ok(false);
        }
        let (_, saved) = &rows[self.next];
        self.next += 1;
        frame.restore(&self.symbols, saved);
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.rows = None;
        self.next = 0;
    }
}

pub struct Skip {
    input: BoxedOperator,
    expression: Expr,
    skipped: u64,
    to_skip: Option<u64>,
}

impl Skip {
    pub fn new(input: BoxedOperator, expression: Expr) -> Self {
        Self {
            input,
            expression,
            skipped: 0,
            to_skip: None,
        }
    }
}

impl PhysicalOperator for Skip {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        loop {
            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            let to_skip = match self.to_skip {
                Some(n) => n,
                None => {
                    let n = count_operand("SKIP", &evaluate(&self.expression, frame, ctx)?)?;
                    self.to_skip = Some(n);
                    n
                }
            };
            if self.skipped < to_skip {
                self.skipped += 1;
                continue;
            }
            return Ok(true);
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.skipped = 0;
        self.to_skip = None;
    }
}

pub struct Limit {
    input: BoxedOperator,
    expression: Expr,
    emitted: u64,
    limit: Option<u64>,
}

impl Limit {
    pub fn new(input: BoxedOperator, expression: Expr) -> Self {
        Self {
            input,
            expression,
            emitted: 0,
            limit: None,
        }
    }
}

impl PhysicalOperator for Limit {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        let limit = match self.limit {
            Some(n) => n,
            None => {
                let n = count_operand("LIMIT", &evaluate(&self.expression, frame, ctx)?)?;
                self.limit = Some(n);
                n
            }
        };
        if self.emitted >= limit {
            return Ok(false);
        }
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        self.emitted += 1;
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.emitted = 0;
        self.limit = None;
    }
}

fn count_operand(clause: &str, value: &Value) -> ExecutionResult<u64> {
    match value {
        Value::Property(PropertyValue::Int(n)) if *n >= 0 => Ok(*n as u64),
        other => Err(ExecutionError::evaluation(format!(
            "{clause} needs a non-negative integer, got {}",
            other.type_name()
        ))),
    }
}

pub struct Distinct {
    input: BoxedOperator,
    symbols: Vec<SymbolId>,
    seen: HashSet<Vec<Value>>,
}

impl Distinct {
    pub fn new(input: BoxedOperator, symbols: Vec<SymbolId>) -> Self {
        Self {
            input,
            symbols,
            seen: HashSet::new(),
        }
    }
}

impl PhysicalOperator for Distinct {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        while self.input.pull(frame, ctx)? {
            let row = frame.save(&self.symbols);
            if self.seen.insert(row) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.seen.clear();
    }
}

pub struct Unwind {
    input: BoxedOperator,
    expression: Expr,
    symbol: SymbolId,
    items: Vec<Value>,
    next: usize,
    active: bool,
}

impl Unwind {
    pub fn new(input: BoxedOperator, expression: Expr, symbol: SymbolId) -> Self {
        Self {
            input,
            expression,
            symbol,
            items: Vec::new(),
            next: 0,
            active: false,
        }
    }
}

impl PhysicalOperator for Unwind {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        loop {
            if self.active && self.next < self.items.len() {
                let value = self.items[self.next].clone();
                self.next += 1;
                frame.set(self.symbol, value);
                return Ok(true);
            }
            self.active = false;
            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            self.items = match evaluate(&self.expression, frame, ctx)? {
                Value::List(items) => items,
                Value::Property(PropertyValue::List(items)) => {
                    items.into_iter().map(Value::Property).collect()
                }
                // UNWIND over null contributes no rows.
                Value::Property(PropertyValue::Null) => Vec::new(),
                other => {
                    return Err(ExecutionError::evaluation(format!(
                        "UNWIND over a {}",
                        other.type_name()
                    )));
                }
            };
            self.next = 0;
            self.active = true;
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.items.clear();
        self.next = 0;
        self.active = false;
    }
}
