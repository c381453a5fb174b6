use quiver_common::types::{Gid, LabelId, PropertyId};
use quiver_common::value::PropertyValue;
use quiver_planner::SymbolId;
use quiver_planner::ast::Direction;
use quiver_planner::operator::{EdgeCreationInfo, Expr, NodeCreationInfo};
use quiver_storage::VertexAccessor;

use super::{BoxedOperator, PhysicalOperator};
use crate::context::ExecutionContext;
use crate::error::{ExecutionError, ExecutionResult};
use crate::eval::evaluate;
use crate::frame::Frame;
use crate::value::Value;

fn property_value(value: Value) -> ExecutionResult<PropertyValue> {
    match value {
        Value::Property(value) => Ok(value),
        other => Err(ExecutionError::evaluation(format!(
            "a {} cannot be stored as a property",
            other.type_name()
        ))),
    }
}

fn evaluate_properties(
    properties: &[(PropertyId, Expr)],
    frame: &Frame,
    ctx: &ExecutionContext,
) -> ExecutionResult<Vec<(PropertyId, PropertyValue)>> {
    properties
        .iter()
        .map(|(property, expression)| {
            Ok((*property, property_value(evaluate(expression, frame, ctx)?)?))
        })
        .collect()
}

fn create_node(
    node: &NodeCreationInfo,
    frame: &mut Frame,
    ctx: &mut ExecutionContext,
) -> ExecutionResult<VertexAccessor> {
    let properties = evaluate_properties(&node.properties, frame, ctx)?;
    let accessor = ctx.graph.create_vertex(node.labels.clone(), properties)?;
    frame.set(node.symbol, Value::Vertex(accessor.gid));
    Ok(accessor)
}

fn frame_entity(frame: &Frame, symbol: SymbolId) -> ExecutionResult<Value> {
    Ok(frame.get(symbol).clone())
}

pub struct CreateNode {
    input: BoxedOperator,
    node: NodeCreationInfo,
}

impl CreateNode {
    pub fn new(input: BoxedOperator, node: NodeCreationInfo) -> Self {
        Self { input, node }
    }
}

impl PhysicalOperator for CreateNode {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        create_node(&self.node, frame, ctx)?;
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

/// Creates an edge from the bound `input_symbol` vertex, creating the far
/// node too unless it was already bound.
pub struct CreateExpand {
    input: BoxedOperator,
    input_symbol: SymbolId,
    node: NodeCreationInfo,
    edge: EdgeCreationInfo,
}

impl CreateExpand {
    pub fn new(
        input: BoxedOperator,
        input_symbol: SymbolId,
        node: NodeCreationInfo,
        edge: EdgeCreationInfo,
    ) -> Self {
        Self {
            input,
            input_symbol,
            node,
            edge,
        }
    }
}

impl PhysicalOperator for CreateExpand {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let from = frame.get(self.input_symbol).as_vertex().ok_or_else(|| {
            ExecutionError::evaluation("edge creation source is not a vertex")
        })?;
        let to = if self.node.bound {
            frame.get(self.node.symbol).as_vertex().ok_or_else(|| {
                ExecutionError::evaluation("edge creation target is not a vertex")
            })?
        } else {
            create_node(&self.node, frame, ctx)?.gid
        };
        let (source, target) = match self.edge.direction {
            Direction::Out => (from, to),
            Direction::In => (to, from),
            Direction::Both => {
                return Err(ExecutionError::evaluation(
                    "created edges need a direction",
                ));
            }
        };
        let edge = ctx.graph.create_edge(
            address_of(source),
            address_of(target),
            self.edge.edge_type,
        )?;
        for (property, value) in evaluate_properties(&self.edge.properties, frame, ctx)? {
            ctx.graph.set_edge_property(edge.gid, property, value)?;
        }
        frame.set(self.edge.symbol, Value::Edge(edge.gid));
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

fn address_of(gid: Gid) -> quiver_common::types::Address {
    quiver_common::types::Address::new(gid.worker_id(), gid)
}

pub struct SetProperty {
    input: BoxedOperator,
    symbol: SymbolId,
    property: PropertyId,
    value: Expr,
}

impl SetProperty {
    pub fn new(input: BoxedOperator, symbol: SymbolId, property: PropertyId, value: Expr) -> Self {
        Self {
            input,
            symbol,
            property,
            value,
        }
    }
}

impl PhysicalOperator for SetProperty {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let value = property_value(evaluate(&self.value, frame, ctx)?)?;
        match frame_entity(frame, self.symbol)? {
            // SET on a null entity (an empty OPTIONAL MATCH) is a no-op.
            Value::Property(PropertyValue::Null) => {}
            Value::Vertex(gid) => ctx.graph.set_vertex_property(gid, self.property, value)?,
            Value::Edge(gid) => ctx.graph.set_edge_property(gid, self.property, value)?,
            other => {
                return Err(ExecutionError::evaluation(format!(
                    "SET on a {}",
                    other.type_name()
                )));
            }
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

pub struct SetLabels {
    input: BoxedOperator,
    symbol: SymbolId,
    labels: Vec<LabelId>,
}

impl SetLabels {
    pub fn new(input: BoxedOperator, symbol: SymbolId, labels: Vec<LabelId>) -> Self {
        Self {
            input,
            symbol,
            labels,
        }
    }
}

impl PhysicalOperator for SetLabels {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        match frame_entity(frame, self.symbol)? {
            Value::Property(PropertyValue::Null) => {}
            Value::Vertex(gid) => {
                for label in &self.labels {
                    ctx.graph.add_label(gid, *label)?;
                }
            }
            other => {
                return Err(ExecutionError::evaluation(format!(
                    "SET labels on a {}",
                    other.type_name()
                )));
            }
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

pub struct RemoveProperty {
    input: BoxedOperator,
    symbol: SymbolId,
    property: PropertyId,
}

impl RemoveProperty {
    pub fn new(input: BoxedOperator, symbol: SymbolId, property: PropertyId) -> Self {
        Self {
            input,
            symbol,
            property,
        }
    }
}

impl PhysicalOperator for RemoveProperty {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        match frame_entity(frame, self.symbol)? {
            Value::Property(PropertyValue::Null) => {}
            Value::Vertex(gid) => {
                ctx.graph
                    .set_vertex_property(gid, self.property, PropertyValue::Null)?;
            }
            Value::Edge(gid) => {
                ctx.graph
                    .set_edge_property(gid, self.property, PropertyValue::Null)?;
            }
            other => {
                return Err(ExecutionError::evaluation(format!(
                    "REMOVE on a {}",
                    other.type_name()
                )));
            }
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

pub struct RemoveLabels {
    input: BoxedOperator,
    symbol: SymbolId,
    labels: Vec<LabelId>,
}

impl RemoveLabels {
    pub fn new(input: BoxedOperator, symbol: SymbolId, labels: Vec<LabelId>) -> Self {
        Self {
            input,
            symbol,
            labels,
        }
    }
}

impl PhysicalOperator for RemoveLabels {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        match frame_entity(frame, self.symbol)? {
            Value::Property(PropertyValue::Null) => {}
            Value::Vertex(gid) => {
                for label in &self.labels {
                    ctx.graph.remove_label(gid, *label)?;
                }
            }
            other => {
                return Err(ExecutionError::evaluation(format!(
                    "REMOVE labels on a {}",
                    other.type_name()
                )));
            }
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

/// DELETE / DETACH DELETE. Detaching removes incident edges first; a plain
/// delete of a vertex with edges fails.
pub struct Delete {
    input: BoxedOperator,
    expressions: Vec<Expr>,
    detach: bool,
}

impl Delete {
    pub fn new(input: BoxedOperator, expressions: Vec<Expr>, detach: bool) -> Self {
        Self {
            input,
            expressions,
            detach,
        }
    }

    fn delete_vertex(&self, gid: Gid, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        if self.detach {
            let accessor = ctx.graph.find_vertex(gid)?;
            let mut edges: Vec<Gid> = accessor
                .data
                .out_edges
                .iter()
                .chain(accessor.data.in_edges.iter())
                .map(|r| r.edge.gid)
                .collect();
            edges.sort_unstable();
            edges.dedup();
            for edge in edges {
                ctx.graph.remove_edge(edge)?;
            }
        }
        ctx.graph.remove_vertex(gid, !self.detach)?;
        Ok(())
    }
}

impl PhysicalOperator for Delete {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        for expression in &self.expressions {
            match evaluate(expression, frame, ctx)? {
                Value::Property(PropertyValue::Null) => {}
                Value::Vertex(gid) => self.delete_vertex(gid, ctx)?,
                Value::Edge(gid) => ctx.graph.remove_edge(gid)?,
                other => {
                    return Err(ExecutionError::evaluation(format!(
                        "DELETE of a {}",
                        other.type_name()
                    )));
                }
            }
        }
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}
