//! The query AST: the contract between the (external) parser and the
//! planner. Names are still strings here; the planner interns them and
//! resolves identifiers to frame slots.

use quiver_common::value::PropertyValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub clauses: Vec<Clause>,
    /// `UNION [ALL]` chains another whole query after this one.
    pub union: Option<UnionPart>,
}

impl Query {
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self {
            clauses,
            union: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionPart {
    pub all: bool,
    pub query: Box<Query>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Clause {
    Match {
        optional: bool,
        patterns: Vec<Pattern>,
        r#where: Option<Expression>,
    },
    Create {
        patterns: Vec<Pattern>,
    },
    Merge {
        pattern: Pattern,
        on_match: Vec<SetItem>,
        on_create: Vec<SetItem>,
    },
    Delete {
        detach: bool,
        expressions: Vec<Expression>,
    },
    Set {
        items: Vec<SetItem>,
    },
    Remove {
        items: Vec<RemoveItem>,
    },
    Unwind {
        expression: Expression,
        alias: String,
    },
    With {
        projection: Projection,
        r#where: Option<Expression>,
    },
    Return {
        projection: Projection,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub distinct: bool,
    pub items: Vec<NamedExpression>,
    pub order_by: Vec<SortItem>,
    pub skip: Option<Expression>,
    pub limit: Option<Expression>,
}

impl Projection {
    pub fn items(items: Vec<NamedExpression>) -> Self {
        Self {
            distinct: false,
            items,
            order_by: Vec::new(),
            skip: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedExpression {
    pub expression: Expression,
    /// `AS` alias; defaults to the expression's text form.
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortItem {
    pub expression: Expression,
    pub ascending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SetItem {
    Property {
        variable: String,
        property: String,
        value: Expression,
    },
    Labels {
        variable: String,
        labels: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RemoveItem {
    Property { variable: String, property: String },
    Labels { variable: String, labels: Vec<String> },
}

// ----- patterns -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// `p = (a)-[..]->(b)` binds the whole path.
    pub name: Option<String>,
    pub start: NodePattern,
    pub steps: Vec<(EdgePattern, NodePattern)>,
}

impl Pattern {
    pub fn node(node: NodePattern) -> Self {
        Self {
            name: None,
            start: node,
            steps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expression)>,
}

impl NodePattern {
    pub fn with_variable(variable: &str) -> Self {
        Self {
            variable: Some(variable.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Out,
    In,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgePattern {
    pub variable: Option<String>,
    pub direction: Direction,
    pub types: Vec<String>,
    pub properties: Vec<(String, Expression)>,
    /// `*min..max` variable-length expansion; `None` is a single hop.
    pub range: Option<VariableLength>,
}

impl EdgePattern {
    pub fn any(direction: Direction) -> Self {
        Self {
            variable: None,
            direction,
            types: Vec::new(),
            properties: Vec::new(),
            range: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VariableLength {
    pub lower: Option<u64>,
    pub upper: Option<u64>,
    /// Breadth-first expansion order instead of the default depth-first.
    pub breadth_first: bool,
}

// ----- expressions -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expression {
    Literal(PropertyValue),
    Parameter(String),
    Identifier(String),
    Property(Box<Expression>, String),
    Unary(UnaryOp, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    List(Vec<Expression>),
    Map(Vec<(String, Expression)>),
    Function(FunctionKind, Vec<Expression>),
    Aggregate {
        op: AggregateOp,
        /// `None` for `count(*)`.
        expression: Option<Box<Expression>>,
        distinct: bool,
    },
}

impl Expression {
    pub fn ident(name: &str) -> Self {
        Expression::Identifier(name.to_string())
    }

    pub fn property(name: &str, property: &str) -> Self {
        Expression::Property(Box::new(Expression::ident(name)), property.to_string())
    }

    pub fn literal(value: impl Into<PropertyValue>) -> Self {
        Expression::Literal(value.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Gid of a vertex or edge.
    Id,
    /// Label names of a vertex.
    Labels,
    /// Type name of an edge.
    Type,
    /// Length of a list or string.
    Size,
    /// First non-null argument.
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateOp {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Collect,
}
