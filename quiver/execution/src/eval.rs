//! Recursive expression evaluation against a frame and the execution
//! context, with Cypher null semantics: comparisons and arithmetic over
//! null yield null, and three-valued logic for AND/OR/NOT.

use quiver_common::value::PropertyValue;
use quiver_planner::ast::{BinaryOp, FunctionKind, UnaryOp};
use quiver_planner::operator::Expr;

use crate::context::ExecutionContext;
use crate::error::{ExecutionError, ExecutionResult};
use crate::frame::Frame;
use crate::value::{Value, compare, equals};

pub fn evaluate(expr: &Expr, frame: &Frame, ctx: &ExecutionContext) -> ExecutionResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(Value::Property(value.clone())),
        Expr::Parameter(name) => ctx
            .parameters
            .get(name)
            .cloned()
            .map(Value::Property)
            .ok_or_else(|| ExecutionError::evaluation(format!("missing parameter `${name}`"))),
        Expr::Symbol(symbol) => Ok(frame.get(*symbol).clone()),
        Expr::Property(inner, property, name) => {
            match evaluate(inner, frame, ctx)? {
                Value::Property(PropertyValue::Null) => Ok(Value::NULL),
                Value::Vertex(gid) => {
                    let vertex = ctx.graph.find_vertex(gid)?;
                    Ok(vertex
                        .data
                        .property(*property)
                        .cloned()
                        .map(Value::Property)
                        .unwrap_or(Value::NULL))
                }
                Value::Edge(gid) => {
                    let edge = ctx.graph.find_edge(gid)?;
                    Ok(edge
                        .data
                        .property(*property)
                        .cloned()
                        .map(Value::Property)
                        .unwrap_or(Value::NULL))
                }
                Value::Property(PropertyValue::Map(map)) => Ok(map
                    .get(name)
                    .cloned()
                    .map(Value::Property)
                    .unwrap_or(Value::NULL)),
                other => Err(ExecutionError::evaluation(format!(
                    "cannot read property `{name}` of a {}",
                    other.type_name()
                ))),
            }
        }
        Expr::HasLabel(inner, labels) => match evaluate(inner, frame, ctx)? {
            Value::Property(PropertyValue::Null) => Ok(Value::NULL),
            Value::Vertex(gid) => {
                let vertex = ctx.graph.find_vertex(gid)?;
                Ok(Value::bool(
                    labels.iter().all(|label| vertex.data.has_label(*label)),
                ))
            }
            other => Err(ExecutionError::evaluation(format!(
                "label check on a {}",
                other.type_name()
            ))),
        },
        Expr::Unary(op, inner) => {
            let value = evaluate(inner, frame, ctx)?;
            evaluate_unary(*op, value)
        }
        Expr::Binary(op, lhs, rhs) => evaluate_binary(*op, lhs, rhs, frame, ctx),
        Expr::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|item| evaluate(item, frame, ctx))
                .collect::<ExecutionResult<_>>()?,
        )),
        Expr::Map(entries) => {
            let mut map = std::collections::BTreeMap::new();
            for (key, value_expr) in entries {
                match evaluate(value_expr, frame, ctx)? {
                    Value::Property(value) => {
                        map.insert(key.clone(), value);
                    }
                    other => {
                        return Err(ExecutionError::evaluation(format!(
                            "map values must be property values, got a {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::Property(PropertyValue::Map(map)))
        }
        Expr::Function(kind, args) => evaluate_function(*kind, args, frame, ctx),
    }
}

/// A value passed to `Filter` must be true to admit the row; null and
/// false both reject it.
pub fn is_true(value: &Value) -> ExecutionResult<bool> {
    match value {
        Value::Property(PropertyValue::Null) => Ok(false),
        Value::Property(PropertyValue::Bool(b)) => Ok(*b),
        other => Err(ExecutionError::evaluation(format!(
            "predicate evaluated to a {}, expected a bool",
            other.type_name()
        ))),
    }
}

fn evaluate_unary(op: UnaryOp, value: Value) -> ExecutionResult<Value> {
    match op {
        UnaryOp::Not => match value {
            Value::Property(PropertyValue::Null) => Ok(Value::NULL),
            Value::Property(PropertyValue::Bool(b)) => Ok(Value::bool(!b)),
            other => Err(ExecutionError::evaluation(format!(
                "NOT over a {}",
                other.type_name()
            ))),
        },
        UnaryOp::Minus => match value {
            Value::Property(PropertyValue::Null) => Ok(Value::NULL),
            Value::Property(PropertyValue::Int(i)) => Ok(Value::int(-i)),
            Value::Property(PropertyValue::Double(d)) => {
                Ok(Value::Property(PropertyValue::from(-d.into_inner())))
            }
            other => Err(ExecutionError::evaluation(format!(
                "unary minus over a {}",
                other.type_name()
            ))),
        },
    }
}

fn evaluate_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    frame: &Frame,
    ctx: &ExecutionContext,
) -> ExecutionResult<Value> {
    // AND/OR get three-valued logic with short-circuiting.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        return evaluate_logic(op, lhs, rhs, frame, ctx);
    }
    let a = evaluate(lhs, frame, ctx)?;
    let b = evaluate(rhs, frame, ctx)?;
    match op {
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide
        | BinaryOp::Modulo => evaluate_arithmetic(op, a, b),
        BinaryOp::Eq => Ok(equals(&a, &b).map(Value::bool).unwrap_or(Value::NULL)),
        BinaryOp::Ne => Ok(equals(&a, &b)
            .map(|eq| Value::bool(!eq))
            .unwrap_or(Value::NULL)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if a.is_null() || b.is_null() {
                return Ok(Value::NULL);
            }
            let Some(ordering) = compare(&a, &b) else {
                return Ok(Value::NULL);
            };
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::bool(result))
        }
        BinaryOp::In => evaluate_in(a, b),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn evaluate_logic(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    frame: &Frame,
    ctx: &ExecutionContext,
) -> ExecutionResult<Value> {
    let a = logic_operand(evaluate(lhs, frame, ctx)?)?;
    // Short-circuit on the determining value.
    match (op, a) {
        (BinaryOp::And, Some(false)) => return Ok(Value::bool(false)),
        (BinaryOp::Or, Some(true)) => return Ok(Value::bool(true)),
        _ => {}
    }
    let b = logic_operand(evaluate(rhs, frame, ctx)?)?;
    let result = match op {
        BinaryOp::And => match (a, b) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BinaryOp::Or => match (a, b) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        _ => unreachable!(),
    };
    Ok(result.map(Value::bool).unwrap_or(Value::NULL))
}

fn logic_operand(value: Value) -> ExecutionResult<Option<bool>> {
    match value {
        Value::Property(PropertyValue::Null) => Ok(None),
        Value::Property(PropertyValue::Bool(b)) => Ok(Some(b)),
        other => Err(ExecutionError::evaluation(format!(
            "logical operand is a {}",
            other.type_name()
        ))),
    }
}

fn evaluate_arithmetic(op: BinaryOp, a: Value, b: Value) -> ExecutionResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::NULL);
    }
    // String concatenation rides on Add.
    if op == BinaryOp::Add {
        if let (
            Value::Property(PropertyValue::String(x)),
            Value::Property(PropertyValue::String(y)),
        ) = (&a, &b)
        {
            return Ok(Value::Property(PropertyValue::String(format!("{x}{y}"))));
        }
    }
    let ints = match (&a, &b) {
        (
            Value::Property(PropertyValue::Int(x)),
            Value::Property(PropertyValue::Int(y)),
        ) => Some((*x, *y)),
        _ => None,
    };
    if let Some((x, y)) = ints {
        let result = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Subtract => x.checked_sub(y),
            BinaryOp::Multiply => x.checked_mul(y),
            BinaryOp::Divide => {
                if y == 0 {
                    return Err(ExecutionError::evaluation("division by zero"));
                }
                x.checked_div(y)
            }
            BinaryOp::Modulo => {
                if y == 0 {
                    return Err(ExecutionError::evaluation("division by zero"));
                }
                x.checked_rem(y)
            }
            _ => unreachable!(),
        };
        return result
            .map(Value::int)
            .ok_or_else(|| ExecutionError::evaluation("integer overflow"));
    }
    let (Value::Property(pa), Value::Property(pb)) = (&a, &b) else {
        return Err(ExecutionError::evaluation(format!(
            "arithmetic over {} and {}",
            a.type_name(),
            b.type_name()
        )));
    };
    let (Some(x), Some(y)) = (pa.as_double(), pb.as_double()) else {
        return Err(ExecutionError::evaluation(format!(
            "arithmetic over {} and {}",
            a.type_name(),
            b.type_name()
        )));
    };
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Subtract => x - y,
        BinaryOp::Multiply => x * y,
        BinaryOp::Divide => x / y,
        BinaryOp::Modulo => x % y,
        _ => unreachable!(),
    };
    Ok(Value::Property(PropertyValue::from(result)))
}

fn evaluate_in(needle: Value, haystack: Value) -> ExecutionResult<Value> {
    let items: Vec<Value> = match haystack {
        Value::Property(PropertyValue::Null) => return Ok(Value::NULL),
        Value::List(items) => items,
        Value::Property(PropertyValue::List(items)) => {
            items.into_iter().map(Value::Property).collect()
        }
        other => {
            return Err(ExecutionError::evaluation(format!(
                "IN over a {}",
                other.type_name()
            )));
        }
    };
    if needle.is_null() {
        return Ok(Value::NULL);
    }
    let mut saw_null = false;
    for item in &items {
        match equals(&needle, item) {
            Some(true) => return Ok(Value::bool(true)),
            Some(false) => {}
            None => saw_null = true,
        }
    }
    Ok(if saw_null {
        Value::NULL
    } else {
        Value::bool(false)
    })
}

fn evaluate_function(
    kind: FunctionKind,
    args: &[Expr],
    frame: &Frame,
    ctx: &ExecutionContext,
) -> ExecutionResult<Value> {
    let values: Vec<Value> = args
        .iter()
        .map(|arg| evaluate(arg, frame, ctx))
        .collect::<ExecutionResult<_>>()?;
    match kind {
        FunctionKind::Coalesce => Ok(values
            .into_iter()
            .find(|v| !v.is_null())
            .unwrap_or(Value::NULL)),
        FunctionKind::Id => match single(kind, &values)? {
            Value::Property(PropertyValue::Null) => Ok(Value::NULL),
            Value::Vertex(gid) | Value::Edge(gid) => Ok(Value::int(gid.raw() as i64)),
            other => Err(ExecutionError::evaluation(format!(
                "id() over a {}",
                other.type_name()
            ))),
        },
        FunctionKind::Labels => match single(kind, &values)? {
            Value::Property(PropertyValue::Null) => Ok(Value::NULL),
            Value::Vertex(gid) => {
                let vertex = ctx.graph.find_vertex(*gid)?;
                let labels = vertex
                    .data
                    .labels
                    .iter()
                    .filter_map(|label| ctx.names.labels.name_of(label.get()))
                    .map(PropertyValue::String)
                    .collect();
                Ok(Value::Property(PropertyValue::List(labels)))
            }
            other => Err(ExecutionError::evaluation(format!(
                "labels() over a {}",
                other.type_name()
            ))),
        },
        FunctionKind::Type => match single(kind, &values)? {
            Value::Property(PropertyValue::Null) => Ok(Value::NULL),
            Value::Edge(gid) => {
                let edge = ctx.graph.find_edge(*gid)?;
                let name = ctx
                    .names
                    .edge_types
                    .name_of(edge.data.edge_type.get())
                    .unwrap_or_default();
                Ok(Value::Property(PropertyValue::String(name)))
            }
            other => Err(ExecutionError::evaluation(format!(
                "type() over a {}",
                other.type_name()
            ))),
        },
        FunctionKind::Size => match single(kind, &values)? {
            Value::Property(PropertyValue::Null) => Ok(Value::NULL),
            Value::Property(PropertyValue::List(items)) => Ok(Value::int(items.len() as i64)),
            Value::Property(PropertyValue::String(s)) => Ok(Value::int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::int(items.len() as i64)),
            other => Err(ExecutionError::evaluation(format!(
                "size() over a {}",
                other.type_name()
            ))),
        },
    }
}

fn single<'v>(kind: FunctionKind, values: &'v [Value]) -> ExecutionResult<&'v Value> {
    match values {
        [value] => Ok(value),
        _ => Err(ExecutionError::evaluation(format!(
            "{kind:?} takes exactly one argument"
        ))),
    }
}
