use std::collections::VecDeque;

use quiver_common::types::{EdgeTypeId, Gid};
use quiver_planner::SymbolId;
use quiver_planner::ast::Direction;
use quiver_storage::EdgeRef;

use super::{BoxedOperator, PhysicalOperator};
use crate::context::ExecutionContext;
use crate::error::{ExecutionError, ExecutionResult};
use crate::frame::Frame;
use crate::value::{Path, Value};

/// One outgoing hop candidate: the neighbor and the edge between.
#[derive(Debug, Clone, Copy)]
struct Hop {
    neighbor: Gid,
    edge: Gid,
}

fn hops(
    ctx: &ExecutionContext,
    vertex: Gid,
    direction: Direction,
    edge_types: &[EdgeTypeId],
) -> ExecutionResult<Vec<Hop>> {
    let accessor = ctx.graph.find_vertex(vertex)?;
    let admit = |r: &EdgeRef| edge_types.is_empty() || edge_types.contains(&r.edge_type);
    let mut hops = Vec::new();
    if matches!(direction, Direction::Out | Direction::Both) {
        hops.extend(accessor.data.out_edges.iter().filter(|r| admit(r)).map(|r| Hop {
            neighbor: r.vertex.gid,
            edge: r.edge.gid,
        }));
    }
    if matches!(direction, Direction::In | Direction::Both) {
        hops.extend(accessor.data.in_edges.iter().filter(|r| admit(r)).map(|r| Hop {
            neighbor: r.vertex.gid,
            edge: r.edge.gid,
        }));
    }
    Ok(hops)
}

fn frame_vertex(frame: &Frame, symbol: SymbolId) -> ExecutionResult<Gid> {
    frame.get(symbol).as_vertex().ok_or_else(|| {
        ExecutionError::evaluation(format!(
            "expansion source is a {}, expected a vertex",
            frame.get(symbol).type_name()
        ))
    })
}

/// Single-hop expansion from a bound vertex.
pub struct Expand {
    input: BoxedOperator,
    input_symbol: SymbolId,
    node_symbol: SymbolId,
    edge_symbol: SymbolId,
    direction: Direction,
    edge_types: Vec<EdgeTypeId>,
    existing_node: bool,
    pending: Vec<Hop>,
    next: usize,
    active: bool,
}

impl Expand {
    pub fn new(
        input: BoxedOperator,
        input_symbol: SymbolId,
        node_symbol: SymbolId,
        edge_symbol: SymbolId,
        direction: Direction,
        edge_types: Vec<EdgeTypeId>,
        existing_node: bool,
    ) -> Self {
        Self {
            input,
            input_symbol,
            node_symbol,
            edge_symbol,
            direction,
            edge_types,
            existing_node,
            pending: Vec::new(),
            next: 0,
            active: false,
        }
    }
}

impl PhysicalOperator for Expand {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        loop {
            while self.active && self.next < self.pending.len() {
                let hop = self.pending[self.next];
                self.next += 1;
                if self.existing_node {
                    let bound = frame.get(self.node_symbol).as_vertex();
                    if bound != Some(hop.neighbor) {
                        continue;
                    }
                } else {
                    frame.set(self.node_symbol, Value::Vertex(hop.neighbor));
                }
                frame.set(self.edge_symbol, Value::Edge(hop.edge));
                return Ok(true);
            }
            self.active = false;
            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            let vertex = frame_vertex(frame, self.input_symbol)?;
            self.pending = hops(ctx, vertex, self.direction, &self.edge_types)?;
            self.next = 0;
            self.active = true;
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.pending.clear();
        self.next = 0;
        self.active = false;
    }
}

/// Variable-length expansion: paths of `lower..=upper` hops, depth-first
/// or breadth-first. A path never repeats an edge, which also bounds
/// unbounded expansions.
pub struct ExpandVariable {
    input: BoxedOperator,
    input_symbol: SymbolId,
    node_symbol: SymbolId,
    edge_list_symbol: SymbolId,
    direction: Direction,
    edge_types: Vec<EdgeTypeId>,
    lower: u64,
    upper: Option<u64>,
    breadth_first: bool,
    existing_node: bool,
    pending: Vec<(Gid, Vec<Gid>)>,
    next: usize,
    active: bool,
}

impl ExpandVariable {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input: BoxedOperator,
        input_symbol: SymbolId,
        node_symbol: SymbolId,
        edge_list_symbol: SymbolId,
        direction: Direction,
        edge_types: Vec<EdgeTypeId>,
        lower: u64,
        upper: Option<u64>,
        breadth_first: bool,
        existing_node: bool,
    ) -> Self {
        Self {
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
            pending: Vec::new(),
            next: 0,
            active: false,
        }
    }

    /// Enumerates all admissible paths from `start`. The traversal order
    /// (queue vs stack) is the only difference between the two modes.
    fn enumerate(&self, ctx: &ExecutionContext, start: Gid) -> ExecutionResult<Vec<(Gid, Vec<Gid>)>> {
        let mut results = Vec::new();
        if self.lower == 0 {
            results.push((start, Vec::new()));
        }
        let mut work: VecDeque<(Gid, Vec<Gid>)> = VecDeque::new();
        work.push_back((start, Vec::new()));
        while let Some((vertex, edges)) = if self.breadth_first {
            work.pop_front()
        } else {
            work.pop_back()
        } {
            if self.upper.is_some_and(|upper| edges.len() as u64 >= upper) {
                continue;
            }
            for hop in hops(ctx, vertex, self.direction, &self.edge_types)? {
                if edges.contains(&hop.edge) {
                    continue;
                }
                let mut path = edges.clone();
                path.push(hop.edge);
                let depth = path.len() as u64;
                if depth >= self.lower {
                    results.push((hop.neighbor, path.clone()));
                }
                work.push_back((hop.neighbor, path));
            }
        }
        Ok(results)
    }
}

impl PhysicalOperator for ExpandVariable {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        loop {
            while self.active && self.next < self.pending.len() {
                let (neighbor, edges) = self.pending[self.next].clone();
                self.next += 1;
                if self.existing_node {
                    let bound = frame.get(self.node_symbol).as_vertex();
                    if bound != Some(neighbor) {
                        continue;
                    }
                } else {
                    frame.set(self.node_symbol, Value::Vertex(neighbor));
                }
                frame.set(
                    self.edge_list_symbol,
                    Value::List(edges.into_iter().map(Value::Edge).collect()),
                );
                return Ok(true);
            }
            self.active = false;
            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            let vertex = frame_vertex(frame, self.input_symbol)?;
            self.pending = self.enumerate(ctx, vertex)?;
            self.next = 0;
            self.active = true;
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.pending.clear();
        self.next = 0;
        self.active = false;
    }
}

/// Materializes a named path from the pattern's alternating
/// vertex/edge/vertex symbols.
pub struct ConstructNamedPath {
    input: BoxedOperator,
    path_symbol: SymbolId,
    symbols: Vec<SymbolId>,
}

impl ConstructNamedPath {
    pub fn new(input: BoxedOperator, path_symbol: SymbolId, symbols: Vec<SymbolId>) -> Self {
        Self {
            input,
            path_symbol,
            symbols,
        }
    }
}

impl PhysicalOperator for ConstructNamedPath {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let mut path = Path {
            vertices: Vec::new(),
            edges: Vec::new(),
        };
        for symbol in &self.symbols {
            match frame.get(*symbol) {
                Value::Vertex(gid) => path.vertices.push(*gid),
                Value::Edge(gid) => path.edges.push(*gid),
                // A variable-length segment contributes its whole list.
                Value::List(edges) => {
                    path.edges.extend(edges.iter().filter_map(|e| e.as_edge()));
                }
                other => {
                    return Err(ExecutionError::evaluation(format!(
                        "path segment is a {}",
                        other.type_name()
                    )));
                }
            }
        }
        frame.set(self.path_symbol, Value::Path(path));
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}
