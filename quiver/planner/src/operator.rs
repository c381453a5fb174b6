//! The logical operator tree. One sum type over all operator kinds; cost
//! estimation and compilation to physical operators are two folds over it.

use quiver_common::types::{EdgeTypeId, LabelId, PropertyId};
use quiver_common::value::PropertyValue;

use crate::ast::{AggregateOp, BinaryOp, Direction, FunctionKind, UnaryOp};
use crate::symbols::SymbolId;

/// A resolved expression: identifiers are frame slots, names are interned
/// ids. Produced by the planner, evaluated by the executor.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(PropertyValue),
    Parameter(String),
    Symbol(SymbolId),
    /// Property access on a vertex/edge/map value. The name is kept for
    /// map keys, which are not interned.
    Property(Box<Expr>, PropertyId, String),
    HasLabel(Box<Expr>, Vec<LabelId>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Function(FunctionKind, Vec<Expr>),
}

impl Expr {
    pub fn literal(value: impl Into<PropertyValue>) -> Self {
        Expr::Literal(value.into())
    }

    /// The literal value, if the expression is one.
    pub fn as_literal(&self) -> Option<&PropertyValue> {
        match self {
            Expr::Literal(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RangeBound {
    pub expression: Expr,
    pub inclusive: bool,
}

#[derive(Debug, Clone)]
pub struct NodeCreationInfo {
    pub symbol: SymbolId,
    pub labels: Vec<LabelId>,
    pub properties: Vec<(PropertyId, Expr)>,
    /// True when the node was already bound by an earlier clause and the
    /// creation only attaches an edge to it.
    pub bound: bool,
}

#[derive(Debug, Clone)]
pub struct EdgeCreationInfo {
    pub symbol: SymbolId,
    pub edge_type: EdgeTypeId,
    pub properties: Vec<(PropertyId, Expr)>,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub op: AggregateOp,
    /// `None` for `count(*)`.
    pub expression: Option<Expr>,
    pub distinct: bool,
    pub output_symbol: SymbolId,
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub expression: Expr,
    pub ascending: bool,
}

/// Logical operators. Rows flow from the leaf (`Once`) upward; every
/// non-leaf holds its input.
#[derive(Debug, Clone)]
pub enum LogicalOperator {
    /// Emits one empty row; terminates every plan chain at the bottom.
    Once,
    ScanAll {
        input: Box<LogicalOperator>,
        symbol: SymbolId,
    },
    ScanAllByLabel {
        input: Box<LogicalOperator>,
        symbol: SymbolId,
        label: LabelId,
    },
    ScanAllByLabelPropertyValue {
        input: Box<LogicalOperator>,
        symbol: SymbolId,
        label: LabelId,
        property: PropertyId,
        expression: Expr,
    },
    ScanAllByLabelPropertyRange {
        input: Box<LogicalOperator>,
        symbol: SymbolId,
        label: LabelId,
        property: PropertyId,
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    },
    Expand {
        input: Box<LogicalOperator>,
        input_symbol: SymbolId,
        node_symbol: SymbolId,
        edge_symbol: SymbolId,
        direction: Direction,
        edge_types: Vec<EdgeTypeId>,
        /// The far node was bound earlier: emit only rows reaching that
        /// exact vertex instead of rebinding the symbol.
        existing_node: bool,
    },
    ExpandVariable {
        input: Box<LogicalOperator>,
        input_symbol: SymbolId,
        node_symbol: SymbolId,
        edge_list_symbol: SymbolId,
        direction: Direction,
        edge_types: Vec<EdgeTypeId>,
        lower: u64,
        upper: Option<u64>,
        breadth_first: bool,
        existing_node: bool,
    },
    ConstructNamedPath {
        input: Box<LogicalOperator>,
        path_symbol: SymbolId,
        symbols: Vec<SymbolId>,
    },
    Filter {
        input: Box<LogicalOperator>,
        expression: Expr,
    },
    /// Enforces Cypher's edge-isomorphism rule: the edge bound by
    /// `expand_symbol` must differ from the edges in `previous_symbols`.
    EdgeUniquenessFilter {
        input: Box<LogicalOperator>,
        expand_symbol: SymbolId,
        previous_symbols: Vec<SymbolId>,
    },
    Produce {
        input: Box<LogicalOperator>,
        named_expressions: Vec<(String, Expr, SymbolId)>,
    },
    Aggregate {
        input: Box<LogicalOperator>,
        aggregations: Vec<AggregateSpec>,
        group_by: Vec<Expr>,
        group_symbols: Vec<SymbolId>,
    },
    OrderBy {
        input: Box<LogicalOperator>,
        order: Vec<SortSpec>,
        symbols: Vec<SymbolId>,
    },
    Skip {
        input: Box<LogicalOperator>,
        expression: Expr,
    },
    Limit {
        input: Box<LogicalOperator>,
        expression: Expr,
    },
    Distinct {
        input: Box<LogicalOperator>,
        symbols: Vec<SymbolId>,
    },
    Unwind {
        input: Box<LogicalOperator>,
        expression: Expr,
        symbol: SymbolId,
    },
    CreateNode {
        input: Box<LogicalOperator>,
        node: NodeCreationInfo,
    },
    /// Creates an edge from `input_symbol` to `node` (creating the node
    /// too unless it is already bound).
    CreateExpand {
        input: Box<LogicalOperator>,
        input_symbol: SymbolId,
        node: NodeCreationInfo,
        edge: EdgeCreationInfo,
    },
    SetProperty {
        input: Box<LogicalOperator>,
        symbol: SymbolId,
        property: PropertyId,
        value: Expr,
    },
    SetLabels {
        input: Box<LogicalOperator>,
        symbol: SymbolId,
        labels: Vec<LabelId>,
    },
    RemoveProperty {
        input: Box<LogicalOperator>,
        symbol: SymbolId,
        property: PropertyId,
    },
    RemoveLabels {
        input: Box<LogicalOperator>,
        symbol: SymbolId,
        labels: Vec<LabelId>,
    },
    Delete {
        input: Box<LogicalOperator>,
        expressions: Vec<Expr>,
        detach: bool,
    },
    Merge {
        input: Box<LogicalOperator>,
        on_match: Box<LogicalOperator>,
        on_create: Box<LogicalOperator>,
    },
    Optional {
        input: Box<LogicalOperator>,
        branch: Box<LogicalOperator>,
        optional_symbols: Vec<SymbolId>,
    },
    /// Materializes its input before streaming it on, isolating writes in
    /// earlier clauses from reads in later ones.
    Accumulate {
        input: Box<LogicalOperator>,
        symbols: Vec<SymbolId>,
    },
    Cartesian {
        left: Box<LogicalOperator>,
        right: Box<LogicalOperator>,
        /// Slots the left side binds; the executor materializes these.
        left_symbols: Vec<SymbolId>,
    },
    /// Left arm's rows, then right arm's rows with each right output slot
    /// copied into the matching left output slot.
    Union {
        left: Box<LogicalOperator>,
        right: Box<LogicalOperator>,
        left_symbols: Vec<SymbolId>,
        right_symbols: Vec<SymbolId>,
    },
}

impl LogicalOperator {
    /// Short operator name for plan rendering and tests.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOperator::Once => "Once",
            LogicalOperator::ScanAll { .. } => "ScanAll",
            LogicalOperator::ScanAllByLabel { .. } => "ScanAllByLabel",
            LogicalOperator::ScanAllByLabelPropertyValue { .. } => "ScanAllByLabelPropertyValue",
            LogicalOperator::ScanAllByLabelPropertyRange { .. } => "ScanAllByLabelPropertyRange",
            LogicalOperator::Expand { .. } => "Expand",
            LogicalOperator::ExpandVariable { .. } => "ExpandVariable",
            LogicalOperator::ConstructNamedPath { .. } => "ConstructNamedPath",
            LogicalOperator::Filter { .. } => "Filter",
            LogicalOperator::EdgeUniquenessFilter { .. } => "EdgeUniquenessFilter",
            LogicalOperator::Produce { .. } => "Produce",
            LogicalOperator::Aggregate { .. } => "Aggregate",
            LogicalOperator::OrderBy { .. } => "OrderBy",
            LogicalOperator::Skip { .. } => "Skip",
            LogicalOperator::Limit { .. } => "Limit",
            LogicalOperator::Distinct { .. } => "Distinct",
            LogicalOperator::Unwind { .. } => "Unwind",
            LogicalOperator::CreateNode { .. } => "CreateNode",
            LogicalOperator::CreateExpand { .. } => "CreateExpand",
            LogicalOperator::SetProperty { .. } => "SetProperty",
            LogicalOperator::SetLabels { .. } => "SetLabels",
            LogicalOperator::RemoveProperty { .. } => "RemoveProperty",
            LogicalOperator::RemoveLabels { .. } => "RemoveLabels",
            LogicalOperator::Delete { .. } => "Delete",
            LogicalOperator::Merge { .. } => "Merge",
            LogicalOperator::Optional { .. } => "Optional",
            LogicalOperator::Accumulate { .. } => "Accumulate",
            LogicalOperator::Cartesian { .. } => "Cartesian",
            LogicalOperator::Union { .. } => "Union",
        }
    }

    /// The operator chain from the leaf up (`Once` elided), for plan
    /// inspection in tests.
    pub fn chain_names(&self) -> Vec<&'static str> {
        let mut names = match self {
            LogicalOperator::Once => return Vec::new(),
            LogicalOperator::Cartesian { left, .. } | LogicalOperator::Union { left, .. } => {
                left.chain_names()
            }
            other => other
                .input()
                .map(|input| input.chain_names())
                .unwrap_or_default(),
        };
        names.push(self.name());
        names
    }

    /// The main input of a linear operator, `None` for `Once`.
    pub fn input(&self) -> Option<&LogicalOperator> {
        match self {
            LogicalOperator::Once => None,
            LogicalOperator::ScanAll { input, .. }
            | LogicalOperator::ScanAllByLabel { input, .. }
            | LogicalOperator::ScanAllByLabelPropertyValue { input, .. }
            | LogicalOperator::ScanAllByLabelPropertyRange { input, .. }
            | LogicalOperator::Expand { input, .. }
            | LogicalOperator::ExpandVariable { input, .. }
            | LogicalOperator::ConstructNamedPath { input, .. }
            | LogicalOperator::Filter { input, .. }
            | LogicalOperator::EdgeUniquenessFilter { input, .. }
            | LogicalOperator::Produce { input, .. }
            | LogicalOperator::Aggregate { input, .. }
            | LogicalOperator::OrderBy { input, .. }
            | LogicalOperator::Skip { input, .. }
            | LogicalOperator::Limit { input, .. }
            | LogicalOperator::Distinct { input, .. }
            | LogicalOperator::Unwind { input, .. }
            | LogicalOperator::CreateNode { input, .. }
            | LogicalOperator::CreateExpand { input, .. }
            | LogicalOperator::SetProperty { input, .. }
            | LogicalOperator::SetLabels { input, .. }
            | LogicalOperator::RemoveProperty { input, .. }
            | LogicalOperator::RemoveLabels { input, .. }
            | LogicalOperator::Delete { input, .. }
            | LogicalOperator::Merge { input, .. }
            | LogicalOperator::Optional { input, .. }
            | LogicalOperator::Accumulate { input, .. } => Some(input),
            LogicalOperator::Cartesian { .. } | LogicalOperator::Union { .. } => None,
        }
    }
}
