use std::cmp::Ordering;

use quiver_common::types::Gid;
use quiver_common::value::PropertyValue;

/// A runtime value in a frame slot: a property value, a graph entity or a
/// list mixing both (paths collected into lists, `collect(n)`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Property(PropertyValue),
    Vertex(Gid),
    Edge(Gid),
    Path(Path),
    List(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub vertices: Vec<Gid>,
    pub edges: Vec<Gid>,
}

impl Value {
    pub const NULL: Value = Value::Property(PropertyValue::Null);

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Property(PropertyValue::Null))
    }

    pub fn bool(value: bool) -> Value {
        Value::Property(PropertyValue::Bool(value))
    }

    pub fn int(value: i64) -> Value {
        Value::Property(PropertyValue::Int(value))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Property(PropertyValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_vertex(&self) -> Option<Gid> {
        match self {
            Value::Vertex(gid) => Some(*gid),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<Gid> {
        match self {
            Value::Edge(gid) => Some(*gid),
            _ => None,
        }
    }

    fn as_double(&self) -> Option<f64> {
        match self {
            Value::Property(p) => p.as_double(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Property(p) => p.type_name(),
            Value::Vertex(_) => "vertex",
            Value::Edge(_) => "edge",
            Value::Path(_) => "path",
            Value::List(_) => "list",
        }
    }
}

impl From<PropertyValue> for Value {
    fn from(value: PropertyValue) -> Self {
        Value::Property(value)
    }
}

/// Cypher comparison: `None` when the operands are incomparable (which the
/// caller treats as null). Ints and doubles compare numerically.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(x), Some(y)) = (a.as_double(), b.as_double()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::Property(PropertyValue::String(x)), Value::Property(PropertyValue::String(y))) => {
            Some(x.cmp(y))
        }
        (Value::Property(PropertyValue::Bool(x)), Value::Property(PropertyValue::Bool(y))) => {
            Some(x.cmp(y))
        }
        (Value::Vertex(x), Value::Vertex(y)) | (Value::Edge(x), Value::Edge(y)) => Some(x.cmp(y)),
        (Value::List(x), Value::List(y)) => compare_lists(x, y),
        (Value::Property(PropertyValue::List(x)), Value::Property(PropertyValue::List(y))) => {
            let x: Vec<Value> = x.iter().cloned().map(Value::from).collect();
            let y: Vec<Value> = y.iter().cloned().map(Value::from).collect();
            compare_lists(&x, &y)
        }
        _ => None,
    }
}

fn compare_lists(x: &[Value], y: &[Value]) -> Option<Ordering> {
    for (a, b) in x.iter().zip(y.iter()) {
        match compare(a, b)? {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(x.len().cmp(&y.len()))
}

/// Equality under Cypher semantics: `None` for null operands.
pub fn equals(a: &Value, b: &Value) -> Option<bool> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match compare(a, b) {
        Some(ordering) => Some(ordering == Ordering::Equal),
        // Incomparable non-null values are simply not equal.
        None => Some(false),
    }
}

/// Total order for ORDER BY: nulls sort last, otherwise by type rank then
/// the Cypher comparison.
pub fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    compare(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Property(PropertyValue::Bool(_)) => 0,
        Value::Property(PropertyValue::Int(_) | PropertyValue::Double(_)) => 1,
        Value::Property(PropertyValue::String(_)) => 2,
        Value::Property(PropertyValue::List(_)) | Value::List(_) => 3,
        Value::Property(PropertyValue::Map(_)) => 4,
        Value::Vertex(_) => 5,
        Value::Edge(_) => 6,
        Value::Path(_) => 7,
        Value::Property(PropertyValue::Null) => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_across_kinds() {
        assert_eq!(
            compare(&Value::int(1), &Value::Property(PropertyValue::from(1.0))),
            Some(Ordering::Equal)
        );
        assert_eq!(equals(&Value::int(2), &Value::int(2)), Some(true));
        assert_eq!(equals(&Value::int(2), &Value::NULL), None);
    }

    #[test]
    fn nulls_sort_last() {
        let mut values = vec![Value::NULL, Value::int(2), Value::int(1)];
        values.sort_by(sort_cmp);
        assert_eq!(values[0], Value::int(1));
        assert!(values[2].is_null());
    }
}
