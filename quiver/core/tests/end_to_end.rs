use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use quiver::ast::{
    BinaryOp, Clause, Direction, EdgePattern, Expression, NamedExpression, NodePattern, Pattern,
    Projection, Query, SetItem, SortItem, UnionPart,
};
use quiver::{Database, DatabaseConfig, DatabaseError, Value};
use quiver_common::value::PropertyValue;

fn open_db(dir: &Path) -> Arc<Database> {
    let config = DatabaseConfig {
        durability_directory: dir.join("durability"),
        lock_timeout_ms: 200,
        ..Default::default()
    };
    Database::open(config).unwrap()
}

fn no_params() -> HashMap<String, PropertyValue> {
    HashMap::new()
}

fn node(variable: &str, labels: &[&str], properties: &[(&str, Expression)]) -> NodePattern {
    NodePattern {
        variable: Some(variable.to_string()),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        properties: properties
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect(),
    }
}

fn create(patterns: Vec<Pattern>) -> Clause {
    Clause::Create { patterns }
}

fn match_patterns(patterns: Vec<Pattern>, predicate: Option<Expression>) -> Clause {
    Clause::Match {
        optional: false,
        patterns,
        r#where: predicate,
    }
}

fn return_items(items: Vec<(&str, Expression)>) -> Clause {
    Clause::Return {
        projection: Projection::items(
            items
                .into_iter()
                .map(|(alias, expression)| NamedExpression {
                    expression,
                    alias: alias.to_string(),
                })
                .collect(),
        ),
    }
}

fn int_rows(results: &quiver::QueryResults) -> Vec<Vec<i64>> {
    results
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| match v {
                    Value::Property(PropertyValue::Int(i)) => *i,
                    other => panic!("expected int, got {other:?}"),
                })
                .collect()
        })
        .collect()
}

#[test]
fn create_match_and_filter() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    for (name, age) in [("ada", 36i64), ("grace", 45), ("alan", 41)] {
        let query = Query::new(vec![create(vec![Pattern::node(node(
            "n",
            &["Person"],
            &[
                ("name", Expression::literal(name)),
                ("age", Expression::literal(age)),
            ],
        ))])]);
        db.run(&query, no_params()).unwrap();
    }

    let query = Query::new(vec![
        match_patterns(
            vec![Pattern::node(node("n", &["Person"], &[]))],
            Some(Expression::Binary(
                BinaryOp::Gt,
                Box::new(Expression::property("n", "age")),
                Box::new(Expression::literal(40i64)),
            )),
        ),
        return_items(vec![("age", Expression::property("n", "age"))]),
    ]);
    let results = db.run(&query, no_params()).unwrap();
    assert_eq!(results.columns, ["age"]);
    let mut ages: Vec<i64> = int_rows(&results).into_iter().map(|r| r[0]).collect();
    ages.sort_unstable();
    assert_eq!(ages, [41, 45]);
}

#[test]
fn snapshot_isolation_between_transactions() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let a = db.begin().unwrap();
    let b = db.begin().unwrap();

    let create_query = Query::new(vec![create(vec![Pattern::node(node("n", &["Late"], &[]))])]);
    db.execute(&b, &create_query, no_params()).unwrap();
    db.commit(&b).unwrap();

    // A began before B committed: B's vertex is invisible to it.
    let match_query = Query::new(vec![
        match_patterns(vec![Pattern::node(node("n", &["Late"], &[]))], None),
        return_items(vec![("n", Expression::ident("n"))]),
    ]);
    let results = db.execute(&a, &match_query, no_params()).unwrap();
    assert!(results.rows.is_empty());
    db.commit(&a).unwrap();

    // A fresh transaction sees it.
    let results = db.run(&match_query, no_params()).unwrap();
    assert_eq!(results.rows.len(), 1);
}

#[test]
fn write_write_conflict_one_commits() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let setup = Query::new(vec![create(vec![Pattern::node(node(
        "n",
        &["Counter"],
        &[("x", Expression::literal(0i64))],
    ))])]);
    db.run(&setup, no_params()).unwrap();

    let set_query = |value: i64| {
        Query::new(vec![
            match_patterns(vec![Pattern::node(node("n", &["Counter"], &[]))], None),
            Clause::Set {
                items: vec![SetItem::Property {
                    variable: "n".to_string(),
                    property: "x".to_string(),
                    value: Expression::literal(value),
                }],
            },
        ])
    };

    let a = db.begin().unwrap();
    let b = db.begin().unwrap();
    db.execute(&a, &set_query(1), no_params()).unwrap();
    db.commit(&a).unwrap();

    let err = db.execute(&b, &set_query(2), no_params()).unwrap_err();
    assert!(matches!(
        err.code(),
        "SerializationError" | "LockTimeout"
    ));

    let check = Query::new(vec![
        match_patterns(vec![Pattern::node(node("n", &["Counter"], &[]))], None),
        return_items(vec![("x", Expression::property("n", "x"))]),
    ]);
    let results = db.run(&check, no_params()).unwrap();
    assert_eq!(int_rows(&results), [[1]]);
}

#[test]
fn accumulate_barrier_applies_writes_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    for _ in 0..3 {
        let query = Query::new(vec![create(vec![Pattern::node(node(
            "n",
            &["Cell"],
            &[("x", Expression::literal(0i64))],
        ))])]);
        db.run(&query, no_params()).unwrap();
    }

    // MATCH (n) SET n.x = n.x + 1 WITH n MATCH (n) RETURN n.x
    let query = Query::new(vec![
        match_patterns(vec![Pattern::node(node("n", &["Cell"], &[]))], None),
        Clause::Set {
            items: vec![SetItem::Property {
                variable: "n".to_string(),
                property: "x".to_string(),
                value: Expression::Binary(
                    BinaryOp::Add,
                    Box::new(Expression::property("n", "x")),
                    Box::new(Expression::literal(1i64)),
                ),
            }],
        },
        Clause::With {
            projection: Projection::items(vec![NamedExpression {
                expression: Expression::ident("n"),
                alias: String::new(),
            }]),
            r#where: None,
        },
        match_patterns(vec![Pattern::node(NodePattern::with_variable("n"))], None),
        return_items(vec![("x", Expression::property("n", "x"))]),
    ]);
    let results = db.run(&query, no_params()).unwrap();
    assert_eq!(int_rows(&results), [[1], [1], [1]]);
}

#[test]
fn expand_and_edge_filters() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let query = Query::new(vec![create(vec![Pattern {
        name: None,
        start: node("a", &["City"], &[("id", Expression::literal(1i64))]),
        steps: vec![(
            EdgePattern {
                variable: Some("r".to_string()),
                direction: Direction::Out,
                types: vec!["ROAD".to_string()],
                properties: vec![("km".to_string(), Expression::literal(12i64))],
                range: None,
            },
            node("b", &["City"], &[("id", Expression::literal(2i64))]),
        )],
    }])]);
    db.run(&query, no_params()).unwrap();

    let query = Query::new(vec![
        Clause::Match {
            optional: false,
            patterns: vec![Pattern {
                name: None,
                start: node("a", &["City"], &[]),
                steps: vec![(
                    EdgePattern {
                        variable: Some("r".to_string()),
                        direction: Direction::Out,
                        types: vec!["ROAD".to_string()],
                        properties: vec![],
                        range: None,
                    },
                    node("b", &["City"], &[]),
                )],
            }],
            r#where: None,
        },
        return_items(vec![
            ("from", Expression::property("a", "id")),
            ("to", Expression::property("b", "id")),
            ("km", Expression::property("r", "km")),
        ]),
    ]);
    let results = db.run(&query, no_params()).unwrap();
    assert_eq!(int_rows(&results), [[1, 2, 12]]);

    // The reverse direction from b.
    let query = Query::new(vec![
        Clause::Match {
            optional: false,
            patterns: vec![Pattern {
                name: None,
                start: node("b", &["City"], &[("id", Expression::literal(2i64))]),
                steps: vec![(
                    EdgePattern::any(Direction::In),
                    NodePattern::with_variable("a"),
                )],
            }],
            r#where: None,
        },
        return_items(vec![("from", Expression::property("a", "id"))]),
    ]);
    let results = db.run(&query, no_params()).unwrap();
    assert_eq!(int_rows(&results), [[1]]);
}

#[test]
fn unwind_aggregate_order_skip_limit_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let unwind = Clause::Unwind {
        expression: Expression::List(vec![
            Expression::literal(3i64),
            Expression::literal(1i64),
            Expression::literal(2i64),
            Expression::literal(3i64),
        ]),
        alias: "x".to_string(),
    };

    // UNWIND ... RETURN DISTINCT x ORDER BY x DESC SKIP 1 LIMIT 1
    let query = Query::new(vec![
        unwind.clone(),
        Clause::Return {
            projection: Projection {
                distinct: true,
                items: vec![NamedExpression {
                    expression: Expression::ident("x"),
                    alias: String::new(),
                }],
                order_by: vec![SortItem {
                    expression: Expression::ident("x"),
                    ascending: false,
                }],
                skip: Some(Expression::literal(1i64)),
                limit: Some(Expression::literal(1i64)),
            },
        },
    ]);
    let results = db.run(&query, no_params()).unwrap();
    assert_eq!(int_rows(&results), [[2]]);

    // UNWIND ... RETURN count(*), sum(x)
    let query = Query::new(vec![
        unwind,
        return_items(vec![
            (
                "c",
                Expression::Aggregate {
                    op: quiver::ast::AggregateOp::Count,
                    expression: None,
                    distinct: false,
                },
            ),
            (
                "s",
                Expression::Aggregate {
                    op: quiver::ast::AggregateOp::Sum,
                    expression: Some(Box::new(Expression::ident("x"))),
                    distinct: false,
                },
            ),
        ]),
    ]);
    let results = db.run(&query, no_params()).unwrap();
    assert_eq!(results.columns, ["c", "s"]);
    assert_eq!(int_rows(&results), [[4, 9]]);
}

#[test]
fn merge_matches_or_creates() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let merge = Query::new(vec![Clause::Merge {
        pattern: Pattern::node(node(
            "t",
            &["Tag"],
            &[("name", Expression::literal("rust"))],
        )),
        on_match: vec![SetItem::Property {
            variable: "t".to_string(),
            property: "seen".to_string(),
            value: Expression::literal(2i64),
        }],
        on_create: vec![SetItem::Property {
            variable: "t".to_string(),
            property: "seen".to_string(),
            value: Expression::literal(1i64),
        }],
    }]);
    db.run(&merge, no_params()).unwrap();
    db.run(&merge, no_params()).unwrap();

    let query = Query::new(vec![
        match_patterns(vec![Pattern::node(node("t", &["Tag"], &[]))], None),
        return_items(vec![("seen", Expression::property("t", "seen"))]),
    ]);
    let results = db.run(&query, no_params()).unwrap();
    // One vertex, updated by the second merge's ON MATCH.
    assert_eq!(int_rows(&results), [[2]]);
}

#[test]
fn optional_match_fills_nulls() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let query = Query::new(vec![create(vec![Pattern::node(node(
        "a",
        &["Lonely"],
        &[],
    ))])]);
    db.run(&query, no_params()).unwrap();

    let query = Query::new(vec![
        match_patterns(vec![Pattern::node(node("a", &["Lonely"], &[]))], None),
        Clause::Match {
            optional: true,
            patterns: vec![Pattern {
                name: None,
                start: NodePattern::with_variable("a"),
                steps: vec![(
                    EdgePattern::any(Direction::Out),
                    NodePattern::with_variable("b"),
                )],
            }],
            r#where: None,
        },
        return_items(vec![("b", Expression::ident("b"))]),
    ]);
    let results = db.run(&query, no_params()).unwrap();
    assert_eq!(results.rows.len(), 1);
    assert!(results.rows[0][0].is_null());
}

#[test]
fn union_concatenates_and_dedupes() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let arm = |value: i64| {
        Query::new(vec![return_items(vec![(
            "v",
            Expression::literal(value),
        )])])
    };
    let mut left = arm(1);
    left.union = Some(UnionPart {
        all: true,
        query: Box::new(arm(1)),
    });
    let results = db.run(&left, no_params()).unwrap();
    assert_eq!(int_rows(&results), [[1], [1]]);

    let mut left = arm(1);
    left.union = Some(UnionPart {
        all: false,
        query: Box::new(arm(1)),
    });
    let results = db.run(&left, no_params()).unwrap();
    assert_eq!(int_rows(&results), [[1]]);
}

#[test]
fn delete_requires_detach_for_connected_vertices() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let query = Query::new(vec![create(vec![Pattern {
        name: None,
        start: node("a", &["Node"], &[]),
        steps: vec![(
            EdgePattern {
                variable: None,
                direction: Direction::Out,
                types: vec!["LINK".to_string()],
                properties: vec![],
                range: None,
            },
            node("b", &["Node"], &[]),
        )],
    }])]);
    db.run(&query, no_params()).unwrap();

    let plain_delete = Query::new(vec![
        match_patterns(vec![Pattern::node(node("a", &["Node"], &[]))], None),
        Clause::Delete {
            detach: false,
            expressions: vec![Expression::ident("a")],
        },
    ]);
    let err = db.run(&plain_delete, no_params()).unwrap_err();
    assert_eq!(err.code(), "UnableToDeleteVertex");

    let detach_delete = Query::new(vec![
        match_patterns(vec![Pattern::node(node("a", &["Node"], &[]))], None),
        Clause::Delete {
            detach: true,
            expressions: vec![Expression::ident("a")],
        },
    ]);
    db.run(&detach_delete, no_params()).unwrap();

    let count = Query::new(vec![
        match_patterns(vec![Pattern::node(NodePattern::with_variable("n"))], None),
        return_items(vec![(
            "c",
            Expression::Aggregate {
                op: quiver::ast::AggregateOp::Count,
                expression: None,
                distinct: false,
            },
        )]),
    ]);
    let results = db.run(&count, no_params()).unwrap();
    assert_eq!(int_rows(&results), [[0]]);
}

#[test]
fn parameters_bind_into_queries() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());

    let query = Query::new(vec![create(vec![Pattern::node(node(
        "n",
        &["Setting"],
        &[("v", Expression::Parameter("val".to_string()))],
    ))])]);
    let params: HashMap<String, PropertyValue> =
        [("val".to_string(), PropertyValue::Int(7))].into_iter().collect();
    db.run(&query, params).unwrap();

    let check = Query::new(vec![
        match_patterns(vec![Pattern::node(node("n", &["Setting"], &[]))], None),
        return_items(vec![("v", Expression::property("n", "v"))]),
    ]);
    let results = db.run(&check, no_params()).unwrap();
    assert_eq!(int_rows(&results), [[7]]);

    // A missing parameter surfaces as a query error and aborts cleanly.
    let err = db.run(&query, no_params()).unwrap_err();
    assert!(matches!(err, DatabaseError::Execution(_)));
}

#[test]
fn index_statistics_drive_cost_estimates() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(dir.path());
    db.build_index("Person", "age").unwrap();

    // 100 vertices; 30 labeled Person; ages 0..20 on 20 of them.
    for i in 0..100i64 {
        let labels: &[&str] = if i < 30 { &["Person"] } else { &[] };
        let properties: Vec<(&str, Expression)> = if i < 20 {
            vec![("age", Expression::literal(i))]
        } else {
            vec![]
        };
        let query = Query::new(vec![create(vec![Pattern::node(node(
            "n", labels, &properties,
        ))])]);
        db.run(&query, no_params()).unwrap();
    }

    let scan_all = Query::new(vec![
        match_patterns(vec![Pattern::node(NodePattern::with_variable("n"))], None),
        return_items(vec![("n", Expression::ident("n"))]),
    ]);
    let by_label = Query::new(vec![
        match_patterns(vec![Pattern::node(node("n", &["Person"], &[]))], None),
        return_items(vec![("n", Expression::ident("n"))]),
    ]);
    let by_value = Query::new(vec![
        match_patterns(
            vec![Pattern::node(node("n", &["Person"], &[]))],
            Some(Expression::Binary(
                BinaryOp::Eq,
                Box::new(Expression::property("n", "age")),
                Box::new(Expression::literal(12i64)),
            )),
        ),
        return_items(vec![("n", Expression::ident("n"))]),
    ]);
    let by_range = Query::new(vec![
        match_patterns(
            vec![Pattern::node(node("n", &["Person"], &[]))],
            Some(Expression::Binary(
                BinaryOp::Le,
                Box::new(Expression::property("n", "age")),
                Box::new(Expression::literal(12i64)),
            )),
        ),
        return_items(vec![("n", Expression::ident("n"))]),
    ]);

    let all = db.estimate(&scan_all).unwrap();
    let label = db.estimate(&by_label).unwrap();
    let value = db.estimate(&by_value).unwrap();
    let range = db.estimate(&by_range).unwrap();

    // Exact counts, because the index is small.
    assert_eq!(all.cardinality, 100.0);
    assert_eq!(label.cardinality, 30.0);
    assert_eq!(value.cardinality, 1.0);
    assert_eq!(range.cardinality, 13.0);
    assert!(value.cost < range.cost);
    assert!(range.cost < label.cost);
    assert!(label.cost < all.cost);

    // And the executed scans agree with the estimates.
    let results = db.run(&by_range, no_params()).unwrap();
    assert_eq!(results.rows.len(), 13);
    let results = db.run(&by_value, no_params()).unwrap();
    assert_eq!(results.rows.len(), 1);
}

#[test]
fn committed_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open_db(dir.path());
        for i in 0..10i64 {
            let query = Query::new(vec![create(vec![Pattern::node(node(
                "n",
                &["Durable"],
                &[("i", Expression::literal(i))],
            ))])]);
            db.run(&query, no_params()).unwrap();
        }
        db.shutdown();
    }

    let db = open_db(dir.path());
    let query = Query::new(vec![
        match_patterns(vec![Pattern::node(node("n", &["Durable"], &[]))], None),
        return_items(vec![("i", Expression::property("n", "i"))]),
    ]);
    let results = db.run(&query, no_params()).unwrap();
    let mut values: Vec<i64> = int_rows(&results).into_iter().map(|r| r[0]).collect();
    values.sort_unstable();
    assert_eq!(values, (0..10).collect::<Vec<_>>());
}
