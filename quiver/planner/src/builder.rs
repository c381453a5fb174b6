//! AST → logical plan translation: scan selection from index statistics,
//! expansion planning, filter placement, the write/read accumulation
//! barrier and union stitching.

use std::collections::HashSet;

use quiver_common::types::LabelId;
use quiver_common::value::PropertyValue;

use crate::ast::{
    self, BinaryOp, Clause, Expression, NodePattern, Pattern, Projection, RemoveItem, SetItem,
};
use crate::error::{PlanError, PlanResult};
use crate::operator::{
    AggregateSpec, EdgeCreationInfo, Expr, LogicalOperator, NodeCreationInfo, RangeBound,
    SortSpec,
};
use crate::stats::PlanningContext;
use crate::symbols::{SymbolId, SymbolKind, SymbolTable};

/// The planner's output: the operator tree plus the frame layout and the
/// result columns.
#[derive(Debug)]
pub struct PlannedQuery {
    pub plan: LogicalOperator,
    pub symbol_table: SymbolTable,
    pub columns: Vec<String>,
    pub output_symbols: Vec<SymbolId>,
    /// Set when the query contains any mutating clause.
    pub has_writes: bool,
}

pub fn plan_query<C: PlanningContext>(query: &ast::Query, context: &C) -> PlanResult<PlannedQuery> {
    let mut planner = QueryPlanner {
        context,
        table: SymbolTable::new(),
        bound: HashSet::new(),
        has_writes: false,
    };
    let (mut plan, mut columns, mut output_symbols) = planner.plan_single(query)?;

    let mut union = &query.union;
    while let Some(part) = union {
        planner.table.restrict_visible(&[]);
        planner.bound.clear();
        let (right, right_columns, right_symbols) = planner.plan_single(&part.query)?;
        if right_columns != columns {
            return Err(PlanError::UnionColumnMismatch);
        }
        plan = LogicalOperator::Union {
            left: Box::new(plan),
            right: Box::new(right),
            left_symbols: output_symbols.clone(),
            right_symbols,
        };
        if !part.all {
            plan = LogicalOperator::Distinct {
                input: Box::new(plan),
                symbols: output_symbols.clone(),
            };
        }
        union = &part.query.union;
    }

    Ok(PlannedQuery {
        plan,
        symbol_table: planner.table,
        columns,
        output_symbols,
        has_writes: planner.has_writes,
    })
}

struct QueryPlanner<'a, C: PlanningContext> {
    context: &'a C,
    table: SymbolTable,
    /// Symbols holding a value in the frame at the current plan point.
    bound: HashSet<SymbolId>,
    has_writes: bool,
}

impl<'a, C: PlanningContext> QueryPlanner<'a, C> {
    fn plan_single(
        &mut self,
        query: &ast::Query,
    ) -> PlanResult<(LogicalOperator, Vec<String>, Vec<SymbolId>)> {
        let mut op = LogicalOperator::Once;
        let mut pending_writes = false;
        let mut columns = Vec::new();
        let mut output_symbols = Vec::new();

        for clause in &query.clauses {
            match clause {
                Clause::Match {
                    optional,
                    patterns,
                    r#where,
                } => {
                    op = self.barrier_if_needed(op, &mut pending_writes);
                    if *optional {
                        op = self.plan_optional_match(op, patterns, r#where.as_ref())?;
                    } else {
                        op = self.plan_match(op, patterns, r#where.as_ref())?;
                    }
                }
                Clause::Create { patterns } => {
                    for pattern in patterns {
                        op = self.plan_create_pattern(op, pattern)?;
                    }
                    pending_writes = true;
                    self.has_writes = true;
                }
                Clause::Merge {
                    pattern,
                    on_match,
                    on_create,
                } => {
                    op = self.plan_merge(op, pattern, on_match, on_create)?;
                    pending_writes = true;
                    self.has_writes = true;
                }
                Clause::Delete {
                    detach,
                    expressions,
                } => {
                    let expressions = expressions
                        .iter()
                        .map(|e| self.resolve(e))
                        .collect::<PlanResult<_>>()?;
                    op = LogicalOperator::Delete {
                        input: Box::new(op),
                        expressions,
                        detach: *detach,
                    };
                    pending_writes = true;
                    self.has_writes = true;
                }
                Clause::Set { items } => {
                    for item in items {
                        op = self.plan_set_item(op, item)?;
                    }
                    pending_writes = true;
                    self.has_writes = true;
                }
                Clause::Remove { items } => {
                    for item in items {
                        op = self.plan_remove_item(op, item)?;
                    }
                    pending_writes = true;
                    self.has_writes = true;
                }
                Clause::Unwind { expression, alias } => {
                    op = self.barrier_if_needed(op, &mut pending_writes);
                    let expression = self.resolve(expression)?;
                    let symbol = self.table.declare(alias, SymbolKind::Any)?;
                    self.bound.insert(symbol);
                    op = LogicalOperator::Unwind {
                        input: Box::new(op),
                        expression,
                        symbol,
                    };
                }
                Clause::With {
                    projection,
                    r#where,
                } => {
                    op = self.barrier_if_needed(op, &mut pending_writes);
                    let (next, bindings) = self.plan_projection(op, projection)?;
                    op = next;
                    self.table.restrict_visible(&bindings);
                    self.bound = bindings.iter().map(|(_, s)| *s).collect();
                    if let Some(predicate) = r#where {
                        let expression = self.resolve(predicate)?;
                        op = LogicalOperator::Filter {
                            input: Box::new(op),
                            expression,
                        };
                    }
                }
                Clause::Return { projection } => {
                    op = self.barrier_if_needed(op, &mut pending_writes);
                    let (next, bindings) = self.plan_projection(op, projection)?;
                    op = next;
                    columns = bindings.iter().map(|(n, _)| n.clone()).collect();
                    output_symbols = bindings.iter().map(|(_, s)| *s).collect();
                }
            }
        }
        Ok((op, columns, output_symbols))
    }

    /// Inserts the materialization barrier between a write clause and a
    /// following read so the read observes the writes exactly once.
    fn barrier_if_needed(
        &mut self,
        op: LogicalOperator,
        pending_writes: &mut bool,
    ) -> LogicalOperator {
        if !*pending_writes {
            return op;
        }
        *pending_writes = false;
        let mut symbols: Vec<SymbolId> = self.bound.iter().copied().collect();
        symbols.sort_unstable();
        LogicalOperator::Accumulate {
            input: Box::new(op),
            symbols,
        }
    }

    // ----- expressions -----

    fn resolve(&self, expression: &Expression) -> PlanResult<Expr> {
        match expression {
            Expression::Literal(value) => Ok(Expr::Literal(value.clone())),
            Expression::Parameter(name) => Ok(Expr::Parameter(name.clone())),
            Expression::Identifier(name) => Ok(Expr::Symbol(self.table.resolve(name)?)),
            Expression::Property(inner, name) => Ok(Expr::Property(
                Box::new(self.resolve(inner)?),
                self.context.intern_property(name),
                name.clone(),
            )),
            Expression::Unary(op, inner) => {
                Ok(Expr::Unary(*op, Box::new(self.resolve(inner)?)))
            }
            Expression::Binary(op, lhs, rhs) => Ok(Expr::Binary(
                *op,
                Box::new(self.resolve(lhs)?),
                Box::new(self.resolve(rhs)?),
            )),
            Expression::List(items) => Ok(Expr::List(
                items.iter().map(|e| self.resolve(e)).collect::<PlanResult<_>>()?,
            )),
            Expression::Map(entries) => Ok(Expr::Map(
                entries
                    .iter()
                    .map(|(k, e)| Ok((k.clone(), self.resolve(e)?)))
                    .collect::<PlanResult<_>>()?,
            )),
            Expression::Function(kind, args) => Ok(Expr::Function(
                *kind,
                args.iter().map(|e| self.resolve(e)).collect::<PlanResult<_>>()?,
            )),
            Expression::Aggregate { .. } => Err(PlanError::InvalidAggregation),
        }
    }

    /// Names an identifier-only expression, or `None` when it needs an
    /// explicit alias.
    fn implicit_alias(expression: &Expression) -> Option<String> {
        match expression {
            Expression::Identifier(name) => Some(name.clone()),
            Expression::Property(inner, prop) => {
                Self::implicit_alias(inner).map(|base| format!("{base}.{prop}"))
            }
            _ => None,
        }
    }

    // ----- projections (WITH / RETURN) -----

    fn plan_projection(
        &mut self,
        input: LogicalOperator,
        projection: &Projection,
    ) -> PlanResult<(LogicalOperator, Vec<(String, SymbolId)>)> {
        let mut op = input;

        // Split each projection item into aggregates and plain expressions.
        let mut aggregations: Vec<AggregateSpec> = Vec::new();
        let mut plain_items: Vec<(String, Expression)> = Vec::new();
        let mut rewritten: Vec<(String, Expr)> = Vec::new();
        for item in &projection.items {
            let alias = if item.alias.is_empty() {
                Self::implicit_alias(&item.expression).ok_or_else(|| {
                    PlanError::Unsupported("projection expression needs an alias".to_string())
                })?
            } else {
                item.alias.clone()
            };
            match &item.expression {
                Expression::Aggregate {
                    op: agg_op,
                    expression,
                    distinct,
                } => {
                    let resolved = expression
                        .as_deref()
                        .map(|e| self.resolve(e))
                        .transpose()?;
                    let output_symbol = self.table.declare_anonymous(SymbolKind::Any);
                    aggregations.push(AggregateSpec {
                        op: *agg_op,
                        expression: resolved,
                        distinct: *distinct,
                        output_symbol,
                    });
                    rewritten.push((alias, Expr::Symbol(output_symbol)));
                }
                other => {
                    let resolved = self.resolve(other)?;
                    plain_items.push((alias.clone(), other.clone()));
                    rewritten.push((alias, resolved));
                }
            }
        }

        if !aggregations.is_empty() {
            // Non-aggregated items become the grouping key.
            let group_by = plain_items
                .iter()
                .map(|(_, e)| self.resolve(e))
                .collect::<PlanResult<Vec<_>>>()?;
            let group_symbols = plain_items
                .iter()
                .map(|_| self.table.declare_anonymous(SymbolKind::Any))
                .collect::<Vec<_>>();
            // Grouped values are re-read from their group slots after the
            // aggregation materializes them.
            for ((alias, _), symbol) in plain_items.iter().zip(&group_symbols) {
                if let Some(entry) = rewritten.iter_mut().find(|(a, _)| a == alias) {
                    entry.1 = Expr::Symbol(*symbol);
                }
            }
            op = LogicalOperator::Aggregate {
                input: Box::new(op),
                aggregations,
                group_by,
                group_symbols,
            };
        }

        let mut bindings = Vec::new();
        let mut named_expressions = Vec::new();
        for (alias, expr) in rewritten {
            let symbol = match &expr {
                // An identity projection keeps its slot.
                Expr::Symbol(symbol) => *symbol,
                _ => self.table.declare_anonymous(SymbolKind::Any),
            };
            named_expressions.push((alias.clone(), expr, symbol));
            bindings.push((alias, symbol));
        }
        op = LogicalOperator::Produce {
            input: Box::new(op),
            named_expressions,
        };

        let produced: Vec<SymbolId> = bindings.iter().map(|(_, s)| *s).collect();
        if projection.distinct {
            op = LogicalOperator::Distinct {
                input: Box::new(op),
                symbols: produced.clone(),
            };
        }
        if !projection.order_by.is_empty() {
            // ORDER BY may reference the projected aliases.
            let order = projection
                .order_by
                .iter()
                .map(|item| {
                    Ok(SortSpec {
                        expression: self.resolve_with_bindings(&item.expression, &bindings)?,
                        ascending: item.ascending,
                    })
                })
                .collect::<PlanResult<Vec<_>>>()?;
            op = LogicalOperator::OrderBy {
                input: Box::new(op),
                order,
                symbols: produced.clone(),
            };
        }
        if let Some(skip) = &projection.skip {
            op = LogicalOperator::Skip {
                input: Box::new(op),
                expression: self.resolve(skip)?,
            };
        }
        if let Some(limit) = &projection.limit {
            op = LogicalOperator::Limit {
                input: Box::new(op),
                expression: self.resolve(limit)?,
            };
        }
        Ok((op, bindings))
    }

    /// Resolves an expression that may reference projection aliases on top
    /// of the still-visible outer names. Aliases shadow outer names.
    fn resolve_with_bindings(
        &self,
        expression: &Expression,
        bindings: &[(String, SymbolId)],
    ) -> PlanResult<Expr> {
        match expression {
            Expression::Identifier(name) => {
                if let Some((_, symbol)) = bindings.iter().find(|(alias, _)| alias == name) {
                    return Ok(Expr::Symbol(*symbol));
                }
                self.resolve(expression)
            }
            Expression::Property(inner, name) => Ok(Expr::Property(
                Box::new(self.resolve_with_bindings(inner, bindings)?),
                self.context.intern_property(name),
                name.clone(),
            )),
            Expression::Unary(op, inner) => Ok(Expr::Unary(
                *op,
                Box::new(self.resolve_with_bindings(inner, bindings)?),
            )),
            Expression::Binary(op, lhs, rhs) => Ok(Expr::Binary(
                *op,
                Box::new(self.resolve_with_bindings(lhs, bindings)?),
                Box::new(self.resolve_with_bindings(rhs, bindings)?),
            )),
            Expression::Function(kind, args) => Ok(Expr::Function(
                *kind,
                args.iter()
                    .map(|e| self.resolve_with_bindings(e, bindings))
                    .collect::<PlanResult<_>>()?,
            )),
            other => self.resolve(other),
        }
    }

    // ----- MATCH -----

    fn plan_match(
        &mut self,
        input: LogicalOperator,
        patterns: &[Pattern],
        predicate: Option<&Expression>,
    ) -> PlanResult<LogicalOperator> {
        let mut conjuncts: Vec<Expression> = Vec::new();
        if let Some(predicate) = predicate {
            split_conjuncts(predicate, &mut conjuncts);
        }
        let mut op = input;
        for pattern in patterns {
            op = self.plan_pattern(op, pattern, &mut conjuncts)?;
        }
        // Whatever no scan consumed becomes a residual filter.
        if let Some(residual) = join_conjuncts(&conjuncts) {
            let expression = self.resolve(&residual)?;
            op = LogicalOperator::Filter {
                input: Box::new(op),
                expression,
            };
        }
        Ok(op)
    }

    fn plan_optional_match(
        &mut self,
        input: LogicalOperator,
        patterns: &[Pattern],
        predicate: Option<&Expression>,
    ) -> PlanResult<LogicalOperator> {
        let bound_before = self.bound.clone();
        let branch = self.plan_match(LogicalOperator::Once, patterns, predicate)?;
        let optional_symbols: Vec<SymbolId> = self
            .bound
            .difference(&bound_before)
            .copied()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(LogicalOperator::Optional {
            input: Box::new(input),
            branch: Box::new(branch),
            optional_symbols,
        })
    }

    fn plan_pattern(
        &mut self,
        input: LogicalOperator,
        pattern: &Pattern,
        conjuncts: &mut Vec<Expression>,
    ) -> PlanResult<LogicalOperator> {
        // A pattern disconnected from everything bound so far crosses with
        // the current plan instead of extending it.
        let bound_before = self.bound.clone();
        let disconnected = !matches!(input, LogicalOperator::Once)
            && !self.pattern_shares_bound_symbol(pattern);

        let (start_symbol, start_new) = self.node_symbol(&pattern.start)?;
        let mut op = LogicalOperator::Once;
        let mut path_symbols = vec![start_symbol];

        if start_new || !self.bound.contains(&start_symbol) {
            op = self.plan_scan(op, start_symbol, &pattern.start, conjuncts)?;
            self.bound.insert(start_symbol);
        }

        let mut pattern_edges: Vec<SymbolId> = Vec::new();
        let mut current = start_symbol;
        for (edge_pattern, node_pattern) in &pattern.steps {
            let edge_kind = if edge_pattern.range.is_some() {
                SymbolKind::EdgeList
            } else {
                SymbolKind::Edge
            };
            let edge_symbol = match &edge_pattern.variable {
                Some(name) => {
                    let (symbol, fresh) = self.table.get_or_declare(name, edge_kind)?;
                    if !fresh {
                        return Err(PlanError::Unsupported(format!(
                            "edge variable `{name}` is used twice in a pattern"
                        )));
                    }
                    symbol
                }
                None => self.table.declare_anonymous(edge_kind),
            };
            let (node_symbol, node_new) = self.node_symbol(node_pattern)?;
            let existing_node = !node_new;
            let edge_types = edge_pattern
                .types
                .iter()
                .map(|t| self.context.intern_edge_type(t))
                .collect::<Vec<_>>();

            op = match edge_pattern.range {
                None => LogicalOperator::Expand {
                    input: Box::new(op),
                    input_symbol: current,
                    node_symbol,
                    edge_symbol,
                    direction: edge_pattern.direction,
                    edge_types,
                    existing_node,
                },
                Some(range) => LogicalOperator::ExpandVariable {
                    input: Box::new(op),
                    input_symbol: current,
                    node_symbol,
                    edge_list_symbol: edge_symbol,
                    direction: edge_pattern.direction,
                    edge_types,
                    lower: range.lower.unwrap_or(1),
                    upper: range.upper,
                    breadth_first: range.breadth_first,
                    existing_node,
                },
            };
            if !pattern_edges.is_empty() {
                op = LogicalOperator::EdgeUniquenessFilter {
                    input: Box::new(op),
                    expand_symbol: edge_symbol,
                    previous_symbols: pattern_edges.clone(),
                };
            }
            pattern_edges.push(edge_symbol);
            self.bound.insert(edge_symbol);
            self.bound.insert(node_symbol);

            op = self.filter_node_inline(op, node_symbol, node_pattern)?;
            op = self.filter_edge_inline(op, edge_symbol, edge_pattern)?;
            path_symbols.push(edge_symbol);
            path_symbols.push(node_symbol);
            current = node_symbol;
        }

        if let Some(name) = &pattern.name {
            let path_symbol = self.table.declare(name, SymbolKind::Path)?;
            self.bound.insert(path_symbol);
            op = LogicalOperator::ConstructNamedPath {
                input: Box::new(op),
                path_symbol,
                symbols: path_symbols,
            };
        }

        Ok(if disconnected {
            let mut left_symbols: Vec<SymbolId> = bound_before.iter().copied().collect();
            left_symbols.sort_unstable();
            LogicalOperator::Cartesian {
                left: Box::new(input),
                right: Box::new(op),
                left_symbols,
            }
        } else {
            splice_input(op, input)
        })
    }

    fn pattern_shares_bound_symbol(&self, pattern: &Pattern) -> bool {
        let mut names = vec![&pattern.start.variable];
        for (edge, node) in &pattern.steps {
            names.push(&edge.variable);
            names.push(&node.variable);
        }
        names.into_iter().flatten().any(|name| {
            self.table
                .resolve(name)
                .is_ok_and(|symbol| self.bound.contains(&symbol))
        })
    }

    fn node_symbol(&mut self, node: &NodePattern) -> PlanResult<(SymbolId, bool)> {
        match &node.variable {
            Some(name) => self.table.get_or_declare(name, SymbolKind::Vertex),
            None => Ok((self.table.declare_anonymous(SymbolKind::Vertex), true)),
        }
    }

    /// Scan choice for an unbound pattern node, per the index statistics:
    /// indexed equality first, then indexed inequality, then label, then
    /// the full scan. Predicates a scan absorbs are removed from
    /// `conjuncts`.
    fn plan_scan(
        &mut self,
        input: LogicalOperator,
        symbol: SymbolId,
        node: &NodePattern,
        conjuncts: &mut Vec<Expression>,
    ) -> PlanResult<LogicalOperator> {
        let labels: Vec<LabelId> = node
            .labels
            .iter()
            .map(|l| self.context.intern_label(l))
            .collect();
        let variable = node.variable.as_deref();

        // Indexed equality: lowest estimated cardinality wins, ties broken
        // by label id.
        let mut best_value: Option<(u64, LabelId, u32, usize)> = None;
        if let Some(variable) = variable {
            for (i, conjunct) in conjuncts.iter().enumerate() {
                let Some((property, value_expr)) = equality_on(variable, conjunct) else {
                    continue;
                };
                if !self.expression_is_evaluable(value_expr) {
                    continue;
                }
                let property = self.context.intern_property(property);
                for &label in &labels {
                    if !self.context.has_index(label, property) {
                        continue;
                    }
                    let cardinality = match value_expr {
                        Expression::Literal(value) => {
                            self.context.value_count(label, property, value)
                        }
                        _ => self
                            .context
                            .label_property_count(label, property)
                            .div_ceil(10),
                    };
                    let candidate = (cardinality, label, property, i);
                    if best_value.is_none_or(|best| (candidate.0, candidate.1) < (best.0, best.1))
                    {
                        best_value = Some(candidate);
                    }
                }
            }
        }
        if let Some((_, label, property, index)) = best_value {
            let consumed = conjuncts.remove(index);
            let (_, value_expr) =
                equality_on(variable.unwrap(), &consumed).expect("re-splitting the same conjunct");
            let expression = self.resolve(value_expr)?;
            let op = LogicalOperator::ScanAllByLabelPropertyValue {
                input: Box::new(input),
                symbol,
                label,
                property,
                expression,
            };
            return self.filter_remaining_labels(op, symbol, &labels, Some(label), node);
        }

        // Indexed inequality: gather range bounds per (label, property).
        let mut best_range: Option<(u64, LabelId, u32, Vec<usize>)> = None;
        if let Some(variable) = variable {
            for &label in &labels {
                let mut by_property: Vec<(u32, Vec<usize>)> = Vec::new();
                for (i, conjunct) in conjuncts.iter().enumerate() {
                    let Some((property, _, bound_expr)) = inequality_on(variable, conjunct)
                    else {
                        continue;
                    };
                    if !self.expression_is_evaluable(bound_expr) {
                        continue;
                    }
                    let property = self.context.intern_property(property);
                    if !self.context.has_index(label, property) {
                        continue;
                    }
                    match by_property.iter_mut().find(|(p, _)| *p == property) {
                        Some((_, indices)) => indices.push(i),
                        None => by_property.push((property, vec![i])),
                    }
                }
                for (property, indices) in by_property {
                    let (lower, upper) = self.range_bounds(variable, conjuncts, &indices)?;
                    let cardinality = self.context.range_count(
                        label,
                        property,
                        bound_literal(&lower),
                        bound_literal(&upper),
                    );
                    if best_range
                        .as_ref()
                        .is_none_or(|best| (cardinality, label) < (best.0, best.1))
                    {
                        best_range = Some((cardinality, label, property, indices));
                    }
                }
            }
        }
        if let Some((_, label, property, indices)) = best_range {
            let variable = variable.unwrap();
            let (lower, upper) = self.range_bounds(variable, conjuncts, &indices)?;
            // Remove consumed conjuncts back to front so indices stay valid.
            for &i in indices.iter().rev() {
                conjuncts.remove(i);
            }
            let op = LogicalOperator::ScanAllByLabelPropertyRange {
                input: Box::new(input),
                symbol,
                label,
                property,
                lower,
                upper,
            };
            return self.filter_remaining_labels(op, symbol, &labels, Some(label), node);
        }

        // Label scan, cheapest label first.
        if !labels.is_empty() {
            let scan_label = labels
                .iter()
                .copied()
                .min_by_key(|l| (self.context.label_count(*l), *l))
                .expect("labels is non-empty");
            let op = LogicalOperator::ScanAllByLabel {
                input: Box::new(input),
                symbol,
                label: scan_label,
            };
            return self.filter_remaining_labels(op, symbol, &labels, Some(scan_label), node);
        }

        let op = LogicalOperator::ScanAll {
            input: Box::new(input),
            symbol,
        };
        self.filter_remaining_labels(op, symbol, &labels, None, node)
    }

    fn filter_remaining_labels(
        &mut self,
        mut op: LogicalOperator,
        symbol: SymbolId,
        labels: &[LabelId],
        scanned: Option<LabelId>,
        node: &NodePattern,
    ) -> PlanResult<LogicalOperator> {
        let remaining: Vec<LabelId> = labels
            .iter()
            .copied()
            .filter(|l| Some(*l) != scanned)
            .collect();
        if !remaining.is_empty() {
            op = LogicalOperator::Filter {
                input: Box::new(op),
                expression: Expr::HasLabel(Box::new(Expr::Symbol(symbol)), remaining),
            };
        }
        // Inline property map entries that the scan did not absorb.
        for (property, value) in &node.properties {
            let expression = Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::Property(
                    Box::new(Expr::Symbol(symbol)),
                    self.context.intern_property(property),
                    property.clone(),
                )),
                Box::new(self.resolve(value)?),
            );
            op = LogicalOperator::Filter {
                input: Box::new(op),
                expression,
            };
        }
        Ok(op)
    }

    fn filter_node_inline(
        &mut self,
        mut op: LogicalOperator,
        symbol: SymbolId,
        node: &NodePattern,
    ) -> PlanResult<LogicalOperator> {
        if !node.labels.is_empty() {
            let labels = node
                .labels
                .iter()
                .map(|l| self.context.intern_label(l))
                .collect();
            op = LogicalOperator::Filter {
                input: Box::new(op),
                expression: Expr::HasLabel(Box::new(Expr::Symbol(symbol)), labels),
            };
        }
        for (property, value) in &node.properties {
            let expression = Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::Property(
                    Box::new(Expr::Symbol(symbol)),
                    self.context.intern_property(property),
                    property.clone(),
                )),
                Box::new(self.resolve(value)?),
            );
            op = LogicalOperator::Filter {
                input: Box::new(op),
                expression,
            };
        }
        Ok(op)
    }

    fn filter_edge_inline(
        &mut self,
        mut op: LogicalOperator,
        symbol: SymbolId,
        edge: &ast::EdgePattern,
    ) -> PlanResult<LogicalOperator> {
        for (property, value) in &edge.properties {
            let expression = Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::Property(
                    Box::new(Expr::Symbol(symbol)),
                    self.context.intern_property(property),
                    property.clone(),
                )),
                Box::new(self.resolve(value)?),
            );
            op = LogicalOperator::Filter {
                input: Box::new(op),
                expression,
            };
        }
        Ok(op)
    }

    fn range_bounds(
        &self,
        variable: &str,
        conjuncts: &[Expression],
        indices: &[usize],
    ) -> PlanResult<(Option<RangeBound>, Option<RangeBound>)> {
        let mut lower: Option<RangeBound> = None;
        let mut upper: Option<RangeBound> = None;
        for &i in indices {
            let (_, op, value_expr) =
                inequality_on(variable, &conjuncts[i]).expect("index came from inequality_on");
            let bound = RangeBound {
                expression: self.resolve(value_expr)?,
                inclusive: matches!(op, BinaryOp::Le | BinaryOp::Ge),
            };
            match op {
                BinaryOp::Gt | BinaryOp::Ge => lower = Some(bound),
                BinaryOp::Lt | BinaryOp::Le => upper = Some(bound),
                _ => unreachable!("inequality_on only yields comparisons"),
            }
        }
        Ok((lower, upper))
    }

    /// An expression usable before the scan binds its symbol: it must only
    /// reference already-bound names.
    fn expression_is_evaluable(&self, expression: &Expression) -> bool {
        let mut names = Vec::new();
        identifier_dependencies(expression, &mut names);
        names.iter().all(|name| {
            self.table
                .resolve(name)
                .is_ok_and(|symbol| self.bound.contains(&symbol))
        })
    }

    // ----- CREATE / MERGE -----

    fn plan_create_pattern(
        &mut self,
        input: LogicalOperator,
        pattern: &Pattern,
    ) -> PlanResult<LogicalOperator> {
        let mut op = input;
        // Bound state, not symbol freshness, decides creation: MERGE's
        // create branch shares symbols with its match branch but starts
        // from the rolled-back binding state.
        let (start_symbol, _) = self.node_symbol(&pattern.start)?;
        let start_bound = self.bound.contains(&start_symbol);
        if !start_bound {
            let node = self.node_creation_info(start_symbol, &pattern.start, false)?;
            op = LogicalOperator::CreateNode {
                input: Box::new(op),
                node,
            };
            self.bound.insert(start_symbol);
        }
        let mut current = start_symbol;
        for (edge_pattern, node_pattern) in &pattern.steps {
            if edge_pattern.range.is_some() {
                return Err(PlanError::Unsupported(
                    "variable-length patterns cannot be created".to_string(),
                ));
            }
            if edge_pattern.direction == ast::Direction::Both {
                return Err(PlanError::Unsupported(
                    "created edges need a direction".to_string(),
                ));
            }
            let edge_type = match edge_pattern.types.as_slice() {
                [edge_type] => self.context.intern_edge_type(edge_type),
                _ => {
                    return Err(PlanError::Unsupported(
                        "created edges need exactly one type".to_string(),
                    ));
                }
            };
            let edge_symbol = match &edge_pattern.variable {
                Some(name) => self.table.get_or_declare(name, SymbolKind::Edge)?.0,
                None => self.table.declare_anonymous(SymbolKind::Edge),
            };
            let (node_symbol, _) = self.node_symbol(node_pattern)?;
            let node_bound = self.bound.contains(&node_symbol);
            let node = self.node_creation_info(node_symbol, node_pattern, node_bound)?;
            let edge_properties = edge_pattern
                .properties
                .iter()
                .map(|(name, value)| {
                    Ok((self.context.intern_property(name), self.resolve(value)?))
                })
                .collect::<PlanResult<_>>()?;
            op = LogicalOperator::CreateExpand {
                input: Box::new(op),
                input_symbol: current,
                node,
                edge: EdgeCreationInfo {
                    symbol: edge_symbol,
                    edge_type,
                    properties: edge_properties,
                    direction: edge_pattern.direction,
                },
            };
            self.bound.insert(edge_symbol);
            self.bound.insert(node_symbol);
            current = node_symbol;
        }
        Ok(op)
    }

    fn node_creation_info(
        &mut self,
        symbol: SymbolId,
        node: &NodePattern,
        bound: bool,
    ) -> PlanResult<NodeCreationInfo> {
        let labels = node
            .labels
            .iter()
            .map(|l| self.context.intern_label(l))
            .collect();
        let properties = node
            .properties
            .iter()
            .map(|(name, value)| Ok((self.context.intern_property(name), self.resolve(value)?)))
            .collect::<PlanResult<_>>()?;
        Ok(NodeCreationInfo {
            symbol,
            labels,
            properties,
            bound,
        })
    }

    fn plan_merge(
        &mut self,
        input: LogicalOperator,
        pattern: &Pattern,
        on_match: &[SetItem],
        on_create: &[SetItem],
    ) -> PlanResult<LogicalOperator> {
        let bound_before = self.bound.clone();
        let mut conjuncts = Vec::new();
        let mut match_branch = self.plan_pattern(LogicalOperator::Once, pattern, &mut conjuncts)?;
        for item in on_match {
            match_branch = self.plan_set_item(match_branch, item)?;
        }
        // The create branch re-uses the symbols the match branch declared;
        // only the binding state is rolled back.
        self.bound = bound_before;
        let mut create_branch = self.plan_create_pattern(LogicalOperator::Once, pattern)?;
        for item in on_create {
            create_branch = self.plan_set_item(create_branch, item)?;
        }
        Ok(LogicalOperator::Merge {
            input: Box::new(input),
            on_match: Box::new(match_branch),
            on_create: Box::new(create_branch),
        })
    }

    // ----- SET / REMOVE -----

    fn plan_set_item(
        &mut self,
        input: LogicalOperator,
        item: &SetItem,
    ) -> PlanResult<LogicalOperator> {
        Ok(match item {
            SetItem::Property {
                variable,
                property,
                value,
            } => LogicalOperator::SetProperty {
                input: Box::new(input),
                symbol: self.table.resolve(variable)?,
                property: self.context.intern_property(property),
                value: self.resolve(value)?,
            },
            SetItem::Labels { variable, labels } => LogicalOperator::SetLabels {
                input: Box::new(input),
                symbol: self.table.resolve(variable)?,
                labels: labels
                    .iter()
                    .map(|l| self.context.intern_label(l))
                    .collect(),
            },
        })
    }

    fn plan_remove_item(
        &mut self,
        input: LogicalOperator,
        item: &RemoveItem,
    ) -> PlanResult<LogicalOperator> {
        Ok(match item {
            RemoveItem::Property { variable, property } => LogicalOperator::RemoveProperty {
                input: Box::new(input),
                symbol: self.table.resolve(variable)?,
                property: self.context.intern_property(property),
            },
            RemoveItem::Labels { variable, labels } => LogicalOperator::RemoveLabels {
                input: Box::new(input),
                symbol: self.table.resolve(variable)?,
                labels: labels
                    .iter()
                    .map(|l| self.context.intern_label(l))
                    .collect(),
            },
        })
    }
}

/// Replaces the `Once` leaf of `op` with `input`, chaining two plan
/// fragments.
fn splice_input(op: LogicalOperator, input: LogicalOperator) -> LogicalOperator {
    fn splice(op: &mut LogicalOperator, input: LogicalOperator) {
        match op {
            LogicalOperator::Once => *op = input,
            LogicalOperator::Cartesian { left, .. } | LogicalOperator::Union { left, .. } => {
                splice(left, input);
            }
            other => {
                let child = input_mut(other).expect("linear operators have an input");
                splice(child, input);
            }
        }
    }
    let mut op = op;
    splice(&mut op, input);
    op
}

fn input_mut(op: &mut LogicalOperator) -> Option<&mut LogicalOperator> {
    use LogicalOperator::*;
    match op {
        Once => None,
        ScanAll { input, .. }
        | ScanAllByLabel { input, .. }
        | ScanAllByLabelPropertyValue { input, .. }
        | ScanAllByLabelPropertyRange { input, .. }
        | Expand { input, .. }
        | ExpandVariable { input, .. }
        | ConstructNamedPath { input, .. }
        | Filter { input, .. }
        | EdgeUniquenessFilter { input, .. }
        | Produce { input, .. }
        | Aggregate { input, .. }
        | OrderBy { input, .. }
        | Skip { input, .. }
        | Limit { input, .. }
        | Distinct { input, .. }
        | Unwind { input, .. }
        | CreateNode { input, .. }
        | CreateExpand { input, .. }
        | SetProperty { input, .. }
        | SetLabels { input, .. }
        | RemoveProperty { input, .. }
        | RemoveLabels { input, .. }
        | Delete { input, .. }
        | Merge { input, .. }
        | Optional { input, .. }
        | Accumulate { input, .. } => Some(input),
        Cartesian { .. } | Union { .. } => None,
    }
}

fn split_conjuncts(expression: &Expression, out: &mut Vec<Expression>) {
    match expression {
        Expression::Binary(BinaryOp::And, lhs, rhs) => {
            split_conjuncts(lhs, out);
            split_conjuncts(rhs, out);
        }
        other => out.push(other.clone()),
    }
}

fn join_conjuncts(conjuncts: &[Expression]) -> Option<Expression> {
    let mut iter = conjuncts.iter().cloned();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, next| {
        Expression::Binary(BinaryOp::And, Box::new(acc), Box::new(next))
    }))
}

/// Matches `var.prop = expr` (either operand order); yields the property
/// name and the value expression.
fn equality_on<'e>(variable: &str, conjunct: &'e Expression) -> Option<(&'e str, &'e Expression)> {
    let Expression::Binary(BinaryOp::Eq, lhs, rhs) = conjunct else {
        return None;
    };
    property_of(variable, lhs)
        .map(|p| (p, rhs.as_ref()))
        .or_else(|| property_of(variable, rhs).map(|p| (p, lhs.as_ref())))
}

/// Matches `var.prop <op> expr` or `expr <op> var.prop` for the four
/// comparison operators, normalized so the property is on the left.
fn inequality_on<'e>(
    variable: &str,
    conjunct: &'e Expression,
) -> Option<(&'e str, BinaryOp, &'e Expression)> {
    let Expression::Binary(op, lhs, rhs) = conjunct else {
        return None;
    };
    let flipped = |op: BinaryOp| match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Le => BinaryOp::Ge,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Ge => BinaryOp::Le,
        other => other,
    };
    if !matches!(op, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge) {
        return None;
    }
    property_of(variable, lhs)
        .map(|p| (p, *op, rhs.as_ref()))
        .or_else(|| property_of(variable, rhs).map(|p| (p, flipped(*op), lhs.as_ref())))
}

/// The literal side of a range bound, for exact cardinality estimates.
fn bound_literal(bound: &Option<RangeBound>) -> Option<(&PropertyValue, bool)> {
    bound
        .as_ref()
        .and_then(|b| b.expression.as_literal().map(|v| (v, b.inclusive)))
}

fn property_of<'e>(variable: &str, expression: &'e Expression) -> Option<&'e str> {
    match expression {
        Expression::Property(inner, property) => match inner.as_ref() {
            Expression::Identifier(name) if name == variable => Some(property),
            _ => None,
        },
        _ => None,
    }
}

fn identifier_dependencies(expression: &Expression, out: &mut Vec<String>) {
    match expression {
        Expression::Identifier(name) => out.push(name.clone()),
        Expression::Property(inner, _) | Expression::Unary(_, inner) => {
            identifier_dependencies(inner, out);
        }
        Expression::Binary(_, lhs, rhs) => {
            identifier_dependencies(lhs, out);
            identifier_dependencies(rhs, out);
        }
        Expression::List(items) | Expression::Function(_, items) => {
            for item in items {
                identifier_dependencies(item, out);
            }
        }
        Expression::Map(entries) => {
            for (_, value) in entries {
                identifier_dependencies(value, out);
            }
        }
        Expression::Aggregate { expression, .. } => {
            if let Some(inner) = expression {
                identifier_dependencies(inner, out);
            }
        }
        Expression::Literal(_) | Expression::Parameter(_) => {}
    }
}
