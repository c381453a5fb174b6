use quiver_common::value::PropertyValue;

use crate::operator::{Expr, LogicalOperator};
use crate::stats::PlanningContext;

/// Tunable cost constants. All strictly positive; `filter_selectivity` is
/// strictly below one so stacking filters always shrinks cardinality.
#[derive(Debug, Clone)]
pub struct CostParams {
    pub scan_all: f64,
    pub scan_all_by_label: f64,
    pub scan_all_by_label_property_value: f64,
    pub scan_all_by_label_property_range: f64,
    pub expand: f64,
    pub expand_variable: f64,
    pub expand_breadth_first: f64,
    pub filter: f64,
    pub edge_uniqueness_filter: f64,
    pub unwind: f64,
    pub accumulate: f64,
    pub per_row: f64,
    pub filter_selectivity: f64,
    pub edge_uniqueness_selectivity: f64,
    /// Rows assumed for `UNWIND` over a non-literal expression.
    pub default_unwind_size: f64,
    /// Depth multiplier assumed for a variable-length expansion.
    pub default_expand_depth: f64,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            scan_all: 1.0,
            scan_all_by_label: 1.1,
            scan_all_by_label_property_value: 1.1,
            scan_all_by_label_property_range: 1.1,
            expand: 2.0,
            expand_variable: 3.0,
            expand_breadth_first: 5.0,
            filter: 1.5,
            edge_uniqueness_filter: 1.5,
            unwind: 1.3,
            accumulate: 1.0,
            per_row: 0.1,
            filter_selectivity: 0.25,
            edge_uniqueness_selectivity: 0.95,
            default_unwind_size: 10.0,
            default_expand_depth: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub cost: f64,
    pub cardinality: f64,
}

impl CostEstimate {
    const ZERO: CostEstimate = CostEstimate {
        cost: 0.0,
        cardinality: 1.0,
    };

    /// Pipelines `op` after `self`: the input's cost plus its cardinality
    /// times the cost of running `op` once, with the new cardinality.
    fn then(self, unit_cost: f64, output_cardinality: f64) -> CostEstimate {
        CostEstimate {
            cost: self.cost + self.cardinality * unit_cost,
            cardinality: output_cardinality,
        }
    }
}

/// Bottom-up fold computing cost and cardinality of a logical plan from
/// index statistics.
pub struct CostEstimator<'a, C: PlanningContext> {
    context: &'a C,
    params: &'a CostParams,
}

impl<'a, C: PlanningContext> CostEstimator<'a, C> {
    pub fn new(context: &'a C, params: &'a CostParams) -> Self {
        Self { context, params }
    }

    pub fn estimate(&self, op: &LogicalOperator) -> CostEstimate {
        let p = self.params;
        match op {
            LogicalOperator::Once => CostEstimate::ZERO,
            LogicalOperator::ScanAll { input, .. } => {
                let input = self.estimate(input);
                let n = self.context.vertices_count() as f64;
                input.then(n * p.scan_all, input.cardinality * n)
            }
            LogicalOperator::ScanAllByLabel { input, label, .. } => {
                let input = self.estimate(input);
                let n = self.context.label_count(*label) as f64;
                input.then(n * p.scan_all_by_label, input.cardinality * n)
            }
            LogicalOperator::ScanAllByLabelPropertyValue {
                input,
                label,
                property,
                expression,
                ..
            } => {
                let input = self.estimate(input);
                let n = match expression.as_literal() {
                    Some(value) => self.context.value_count(*label, *property, value) as f64,
                    // A non-literal equality still hits one index bucket;
                    // assume the average bucket size.
                    None => {
                        let total = self.context.label_property_count(*label, *property) as f64;
                        (total / 10.0).max(1.0)
                    }
                };
                input.then(
                    n * p.scan_all_by_label_property_value,
                    input.cardinality * n,
                )
            }
            LogicalOperator::ScanAllByLabelPropertyRange {
                input,
                label,
                property,
                lower,
                upper,
                ..
            } => {
                let input = self.estimate(input);
                let lower_literal = bound_literal(lower.as_ref().map(|b| (&b.expression, b.inclusive)));
                let upper_literal = bound_literal(upper.as_ref().map(|b| (&b.expression, b.inclusive)));
                let n = match (lower.is_none() || lower_literal.is_some())
                    && (upper.is_none() || upper_literal.is_some())
                {
                    true => self.context.range_count(
                        *label,
                        *property,
                        lower_literal.as_ref().map(|(v, i)| (*v, *i)),
                        upper_literal.as_ref().map(|(v, i)| (*v, *i)),
                    ) as f64,
                    false => (self.context.label_property_count(*label, *property) as f64 / 4.0)
                        .max(1.0),
                };
                input.then(
                    n * p.scan_all_by_label_property_range,
                    input.cardinality * n,
                )
            }
            LogicalOperator::Expand { input, .. } => {
                let input = self.estimate(input);
                input.then(p.expand, input.cardinality)
            }
            LogicalOperator::ExpandVariable {
                input,
                breadth_first,
                ..
            } => {
                let input = self.estimate(input);
                let unit = if *breadth_first {
                    p.expand_breadth_first
                } else {
                    p.expand_variable
                };
                input.then(
                    unit * p.default_expand_depth,
                    input.cardinality * p.default_expand_depth,
                )
            }
            LogicalOperator::Filter { input, .. } => {
                let input = self.estimate(input);
                input.then(p.filter, input.cardinality * p.filter_selectivity)
            }
            LogicalOperator::EdgeUniquenessFilter { input, .. } => {
                let input = self.estimate(input);
                input.then(
                    p.edge_uniqueness_filter,
                    input.cardinality * p.edge_uniqueness_selectivity,
                )
            }
            LogicalOperator::Unwind {
                input, expression, ..
            } => {
                let input = self.estimate(input);
                let k = match expression {
                    Expr::List(items) => items.len() as f64,
                    Expr::Literal(PropertyValue::List(items)) => items.len() as f64,
                    _ => p.default_unwind_size,
                };
                input.then(p.unwind, input.cardinality * k)
            }
            LogicalOperator::Accumulate { input, .. } => {
                let input = self.estimate(input);
                input.then(p.accumulate, input.cardinality)
            }
            LogicalOperator::Aggregate {
                input, group_by, ..
            } => {
                let input = self.estimate(input);
                let cardinality = if group_by.is_empty() {
                    1.0
                } else {
                    // Grouping keeps at most the input cardinality; half is
                    // as good a guess as any without value statistics.
                    (input.cardinality / 2.0).max(1.0)
                };
                input.then(p.per_row, cardinality)
            }
            LogicalOperator::Skip { input, expression } => {
                let input = self.estimate(input);
                let cardinality = match expression.as_literal().and_then(|v| v.as_int()) {
                    Some(n) => (input.cardinality - n as f64).max(0.0),
                    None => input.cardinality,
                };
                input.then(p.per_row, cardinality)
            }
            LogicalOperator::Limit { input, expression } => {
                let input = self.estimate(input);
                let cardinality = match expression.as_literal().and_then(|v| v.as_int()) {
                    Some(n) => input.cardinality.min(n as f64),
                    None => input.cardinality,
                };
                input.then(p.per_row, cardinality)
            }
            LogicalOperator::Cartesian { left, right, .. } => {
                let left = self.estimate(left);
                let right = self.estimate(right);
                CostEstimate {
                    cost: left.cost + left.cardinality * right.cost,
                    cardinality: left.cardinality * right.cardinality,
                }
            }
            LogicalOperator::Union { left, right, .. } => {
                let left = self.estimate(left);
                let right = self.estimate(right);
                CostEstimate {
                    cost: left.cost + right.cost,
                    cardinality: left.cardinality + right.cardinality,
                }
            }
            LogicalOperator::Merge {
                input,
                on_match,
                on_create,
            } => {
                let input = self.estimate(input);
                let on_match = self.estimate(on_match);
                let on_create = self.estimate(on_create);
                CostEstimate {
                    cost: input.cost
                        + input.cardinality * (on_match.cost + on_create.cost),
                    cardinality: input.cardinality * on_match.cardinality.max(1.0),
                }
            }
            LogicalOperator::Optional { input, branch, .. } => {
                let input = self.estimate(input);
                let branch = self.estimate(branch);
                CostEstimate {
                    cost: input.cost + input.cardinality * branch.cost,
                    cardinality: input.cardinality * branch.cardinality.max(1.0),
                }
            }
            // Projections, sorting, distinct and the mutating operators
            // pass cardinality through at a small per-row cost.
            other => {
                let input = self
                    .estimate(other.input().expect("remaining operators are linear"));
                input.then(p.per_row, input.cardinality)
            }
        }
    }
}

fn bound_literal<'e>(
    bound: Option<(&'e Expr, bool)>,
) -> Option<(&'e PropertyValue, bool)> {
    match bound {
        Some((expr, inclusive)) => expr.as_literal().map(|v| (v, inclusive)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use quiver_common::value::PropertyValue;

    use super::*;
    use crate::operator::RangeBound;
    use crate::stats::mock::MockContext;

    fn context() -> MockContext {
        MockContext {
            total_vertices: 100,
            label_counts: [("Person".to_string(), 30)].into_iter().collect(),
            indexes: vec![(
                "Person".to_string(),
                "age".to_string(),
                (0..20).map(PropertyValue::Int).collect(),
            )],
            ..Default::default()
        }
    }

    #[test]
    fn scan_costs_follow_index_counts() {
        let ctx = context();
        let params = CostParams::default();
        let estimator = CostEstimator::new(&ctx, &params);
        let label = ctx.intern_label("Person");
        let property = ctx.intern_property("age");

        let scan_all = LogicalOperator::ScanAll {
            input: Box::new(LogicalOperator::Once),
            symbol: 0,
        };
        let estimate = estimator.estimate(&scan_all);
        assert_eq!(estimate.cost, 100.0 * params.scan_all);
        assert_eq!(estimate.cardinality, 100.0);

        let by_label = LogicalOperator::ScanAllByLabel {
            input: Box::new(LogicalOperator::Once),
            symbol: 0,
            label,
        };
        let estimate = estimator.estimate(&by_label);
        assert_eq!(estimate.cost, 30.0 * params.scan_all_by_label);
        assert_eq!(estimate.cardinality, 30.0);

        let by_value = LogicalOperator::ScanAllByLabelPropertyValue {
            input: Box::new(LogicalOperator::Once),
            symbol: 0,
            label,
            property,
            expression: Expr::literal(12i64),
        };
        let estimate = estimator.estimate(&by_value);
        assert_eq!(
            estimate.cost,
            1.0 * params.scan_all_by_label_property_value
        );
        assert_eq!(estimate.cardinality, 1.0);

        let by_range = LogicalOperator::ScanAllByLabelPropertyRange {
            input: Box::new(LogicalOperator::Once),
            symbol: 0,
            label,
            property,
            lower: None,
            upper: Some(RangeBound {
                expression: Expr::literal(12i64),
                inclusive: true,
            }),
        };
        let estimate = estimator.estimate(&by_range);
        // Exact count: ages 0..=12.
        assert_eq!(
            estimate.cost,
            13.0 * params.scan_all_by_label_property_range
        );
        assert_eq!(estimate.cardinality, 13.0);
    }

    #[test]
    fn filter_shrinks_cardinality_and_grows_cost() {
        let ctx = context();
        let params = CostParams::default();
        let estimator = CostEstimator::new(&ctx, &params);
        let scan = LogicalOperator::ScanAll {
            input: Box::new(LogicalOperator::Once),
            symbol: 0,
        };
        let base = estimator.estimate(&scan);
        let filtered = LogicalOperator::Filter {
            input: Box::new(scan),
            expression: Expr::literal(true),
        };
        let estimate = estimator.estimate(&filtered);
        assert!(estimate.cost > base.cost);
        assert!(estimate.cardinality < base.cardinality);
        assert!(params.filter_selectivity < 1.0);
    }

    #[test]
    fn unwind_over_literal_list_is_exact() {
        let ctx = context();
        let params = CostParams::default();
        let estimator = CostEstimator::new(&ctx, &params);
        let unwind = LogicalOperator::Unwind {
            input: Box::new(LogicalOperator::Once),
            expression: Expr::Literal(PropertyValue::List(vec![])),
            symbol: 0,
        };
        let estimate = estimator.estimate(&unwind);
        assert_eq!(estimate.cardinality, 0.0);
        assert_eq!(estimate.cost, params.unwind);
    }
}
