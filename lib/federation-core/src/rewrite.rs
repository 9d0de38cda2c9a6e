//! The algebra rewriter (§4.4): turns a source-annotated basic graph pattern into federation
//! algebra through four ordered passes — exclusive-group extraction, filter push-down,
//! bound-join marking, projection preservation — then hands the result to the join-order
//! optimiser (§4.5) in between passes 1 and 3, since bound-join marking needs a fixed
//! left-to-right evaluation order to know which side of a join is "left".

use crate::algebra::PlanNode;
use crate::error::{FederationError, ParseError};
use crate::joinorder;
use crate::query::QueryInfo;
use crate::registry::EndpointRegistry;
use crate::cache::SourceSelectionCache;
use crate::scheduler::WorkerPool;
use crate::selection::SourceSelector;
use oxrdf::Variable;
use rustc_hash::FxHashSet;
use spargebra::algebra::{Expression, GraphPattern};
use spargebra::term::TriplePattern;
use std::sync::Arc;

/// Builds federation algebra from a parsed SPARQL query's `WHERE` tree (§2 pipeline: "parsed
/// algebra → [source selection → rewrite → join order] → execution plan").
pub struct AlgebraRewriter<'a> {
    registry: &'a EndpointRegistry,
    cache: Arc<SourceSelectionCache>,
    pool: &'a WorkerPool,
}

impl<'a> AlgebraRewriter<'a> {
    pub fn new(registry: &'a EndpointRegistry, cache: Arc<SourceSelectionCache>, pool: &'a WorkerPool) -> Self {
        Self { registry, cache, pool }
    }

    pub fn build(&self, pattern: &GraphPattern, query: &Arc<QueryInfo>) -> Result<PlanNode, FederationError> {
        match pattern {
            GraphPattern::Bgp { patterns } => Ok(self.build_bgp(patterns, query)?),
            GraphPattern::Join { left, right } => {
                let left = self.build(left, query)?;
                let right = self.build(right, query)?;
                Ok(join_two(left, right))
            }
            GraphPattern::Filter { expr, inner } => {
                let inner = self.build(inner, query)?;
                Ok(push_down_filter(expr.clone(), inner))
            }
            GraphPattern::Union { left, right } => {
                let left = self.build(left, query)?;
                let right = self.build(right, query)?;
                Ok(flatten_union(left, right))
            }
            GraphPattern::Project { inner, variables } => {
                let inner = self.build(inner, query)?;
                Ok(PlanNode::Projection(variables.clone(), Box::new(inner)))
            }
            GraphPattern::Distinct { inner } | GraphPattern::Reduced { inner } => self.build(inner, query),
            GraphPattern::Slice { inner, .. } => self.build(inner, query),
            _ => Err(ParseError::Unplannable.into()),
        }
    }

    /// Passes 1 and 3 of §4.4, with the join-order optimiser (§4.5) run in between: exclusive
    /// groups are extracted over the BGP's original adjacency, the resulting nodes are then
    /// ordered by the variable-overlap heuristic, and finally consecutive non-exclusive,
    /// multi-source nodes are marked as bound joins against the accumulated left side.
    fn build_bgp(&self, patterns: &[TriplePattern], query: &Arc<QueryInfo>) -> Result<PlanNode, FederationError> {
        let selector = SourceSelector::new(self.registry, Arc::clone(&self.cache), self.pool);
        let leaves = selector.select(patterns, query)?;

        // §8 boundary behaviour: a pattern with zero surviving sources makes the whole
        // conjunction empty, without issuing any remote I/O for the rest of the BGP.
        if let Some(empty) = leaves.iter().find(|leaf| matches!(leaf, PlanNode::EmptyStatementPattern(_))) {
            return Ok(empty.clone());
        }

        let grouped = extract_exclusive_groups(leaves);
        let ordered = joinorder::order(grouped);
        Ok(mark_bound_joins(ordered))
    }
}

/// §4.4 pass 1: group adjacent patterns sharing the same unique source into one
/// [`PlanNode::ExclusiveGroup`], shipped as a single remote sub-query. Adjacency is over this
/// BGP's original pattern order — groups never cross a union/filter boundary because this
/// function only ever sees the leaves of one conjunctive scope.
fn extract_exclusive_groups(leaves: Vec<PlanNode>) -> Vec<PlanNode> {
    let mut result: Vec<PlanNode> = Vec::new();
    for leaf in leaves {
        let merged = match (result.last(), &leaf) {
            (Some(PlanNode::ExclusiveStatement(_, prev_source)), PlanNode::ExclusiveStatement(_, source)) if prev_source == source => true,
            (Some(PlanNode::ExclusiveGroup { source: prev_source, .. }), PlanNode::ExclusiveStatement(_, source)) if prev_source == source => true,
            _ => false,
        };
        if merged {
            match (result.pop(), leaf) {
                (Some(PlanNode::ExclusiveStatement(prev_pattern, source)), PlanNode::ExclusiveStatement(pattern, _)) => {
                    result.push(PlanNode::ExclusiveGroup {
                        patterns: vec![prev_pattern, pattern],
                        source,
                        filter: None,
                    });
                }
                (Some(PlanNode::ExclusiveGroup { mut patterns, source, filter }), PlanNode::ExclusiveStatement(pattern, _)) => {
                    patterns.push(pattern);
                    result.push(PlanNode::ExclusiveGroup { patterns, source, filter });
                }
                (popped, leaf) => {
                    // Unreachable given the `merged` match above, but keep rewriting total.
                    if let Some(popped) = popped {
                        result.push(popped);
                    }
                    result.push(leaf);
                }
            }
        } else {
            result.push(leaf);
        }
    }
    result
}

/// §4.4 pass 3: turns the ordered child list into a left-deep chain, marking a join as
/// [`PlanNode::BoundJoin`] whenever its right side is a multi-source
/// [`PlanNode::StatementSourcePattern`] rather than an exclusive node. Plain joins between
/// exclusive nodes accumulate into one flat [`PlanNode::NJoin`] instead of nesting binary joins
/// one-by-one, since the evaluator treats an `NJoin`'s children as one left-deep join anyway
/// (§4.7) and a flatter tree is simpler to explain in `debugQueryPlan` output (§6).
fn mark_bound_joins(ordered: Vec<PlanNode>) -> PlanNode {
    let mut iter = ordered.into_iter();
    let Some(first) = iter.next() else {
        return PlanNode::NJoin(Vec::new());
    };
    let mut acc = first;
    let mut plain_children: Vec<PlanNode> = Vec::new();
    for next in iter {
        if needs_bound_join(&next) {
            acc = if plain_children.is_empty() {
                acc
            } else {
                plain_children.push(acc);
                PlanNode::NJoin(std::mem::take(&mut plain_children))
            };
            acc = PlanNode::BoundJoin(Box::new(acc), Box::new(next));
        } else {
            plain_children.push(acc);
            acc = next;
        }
    }
    if plain_children.is_empty() {
        acc
    } else {
        plain_children.push(acc);
        PlanNode::NJoin(plain_children)
    }
}

fn needs_bound_join(node: &PlanNode) -> bool {
    matches!(node, PlanNode::StatementSourcePattern(_, _))
}

/// Combines two already-built subtrees from a `GraphPattern::Join` into one join node, flattening
/// into a single `NJoin` when neither side already needs bound-join treatment — keeps nested
/// `{ {a} . {b} }` groups from each parsing into their own redundant join layer.
fn join_two(left: PlanNode, right: PlanNode) -> PlanNode {
    match (left, right) {
        (PlanNode::NJoin(mut children), PlanNode::NJoin(more)) => {
            children.extend(more);
            PlanNode::NJoin(children)
        }
        (PlanNode::NJoin(mut children), right) => {
            children.push(right);
            PlanNode::NJoin(children)
        }
        (left, PlanNode::NJoin(mut children)) => {
            children.insert(0, left);
            PlanNode::NJoin(children)
        }
        (left, right) => PlanNode::NJoin(vec![left, right]),
    }
}

fn flatten_union(left: PlanNode, right: PlanNode) -> PlanNode {
    match (left, right) {
        (PlanNode::NUnion(mut children), PlanNode::NUnion(more)) => {
            children.extend(more);
            PlanNode::NUnion(children)
        }
        (PlanNode::NUnion(mut children), right) => {
            children.push(right);
            PlanNode::NUnion(children)
        }
        (left, right) => PlanNode::NUnion(vec![left, right]),
    }
}

/// §4.4 pass 2: attach `expr` to `inner` when `inner` is an exclusive node whose free variables
/// cover every variable the filter reads, so the filter ships remotely instead of running
/// locally over every row.
fn push_down_filter(expr: Expression, inner: PlanNode) -> PlanNode {
    let Some(expr_vars) = expression_variables(&expr) else {
        // An expression this rewriter doesn't recognise is never pushed down — safer to
        // evaluate it locally than risk shipping a remote query it can't actually satisfy.
        return PlanNode::Filter(expr, Box::new(inner));
    };
    let inner_vars: FxHashSet<Variable> = inner.free_variables().into_iter().collect();
    let coverable = expr_vars.iter().all(|v| inner_vars.contains(v));
    if !coverable {
        return PlanNode::Filter(expr, Box::new(inner));
    }
    match inner {
        PlanNode::ExclusiveStatement(pattern, source) => PlanNode::ExclusiveGroup {
            patterns: vec![pattern],
            source,
            filter: Some(expr),
        },
        PlanNode::ExclusiveGroup { patterns, source, filter } => {
            let combined = match filter {
                Some(existing) => Expression::And(Box::new(existing), Box::new(expr)),
                None => expr,
            };
            PlanNode::ExclusiveGroup {
                patterns,
                source,
                filter: Some(combined),
            }
        }
        other => PlanNode::Filter(expr, Box::new(other)),
    }
}

/// Best-effort free-variable walk over a SPARQL filter expression. Returns `None` for any
/// expression shape this rewriter doesn't recognise, which tells [`push_down_filter`] to keep it
/// local rather than guess.
fn expression_variables(expr: &Expression) -> Option<FxHashSet<Variable>> {
    let mut vars = FxHashSet::default();
    if collect_expression_variables(expr, &mut vars) {
        Some(vars)
    } else {
        None
    }
}

fn collect_expression_variables(expr: &Expression, out: &mut FxHashSet<Variable>) -> bool {
    match expr {
        Expression::NamedNode(_) | Expression::Literal(_) => true,
        Expression::Variable(v) | Expression::Bound(v) => {
            out.insert(v.clone());
            true
        }
        Expression::Not(inner) | Expression::UnaryPlus(inner) | Expression::UnaryMinus(inner) => {
            collect_expression_variables(inner, out)
        }
        Expression::Or(l, r)
        | Expression::And(l, r)
        | Expression::Equal(l, r)
        | Expression::SameTerm(l, r)
        | Expression::Greater(l, r)
        | Expression::GreaterOrEqual(l, r)
        | Expression::Less(l, r)
        | Expression::LessOrEqual(l, r)
        | Expression::Add(l, r)
        | Expression::Subtract(l, r)
        | Expression::Multiply(l, r)
        | Expression::Divide(l, r) => collect_expression_variables(l, out) && collect_expression_variables(r, out),
        Expression::In(base, options) => {
            collect_expression_variables(base, out) && options.iter().all(|option| collect_expression_variables(option, out))
        }
        Expression::If(cond, then, otherwise) => {
            collect_expression_variables(cond, out)
                && collect_expression_variables(then, out)
                && collect_expression_variables(otherwise, out)
        }
        Expression::Coalesce(options) | Expression::FunctionCall(_, options) => {
            options.iter().all(|option| collect_expression_variables(option, out))
        }
        // `EXISTS { ... }` depends on the evaluation of a nested graph pattern; treating it as
        // opaque avoids having to intersect its own variable scope with the outer one.
        Expression::Exists(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EndpointId, StatementSource, StatementSourceKind};
    use oxrdf::NamedNode;
    use spargebra::term::{NamedNodePattern, TermPattern};

    fn var(name: &str) -> Variable {
        Variable::new(name).unwrap()
    }

    fn pattern(s: &str, p: &str, o: &str) -> TriplePattern {
        TriplePattern {
            subject: TermPattern::Variable(var(s)),
            predicate: NamedNodePattern::NamedNode(NamedNode::new(format!("http://example.com/{p}")).unwrap()),
            object: TermPattern::Variable(var(o)),
        }
    }

    fn exclusive(s: &str, p: &str, o: &str, endpoint: &str) -> PlanNode {
        PlanNode::ExclusiveStatement(
            pattern(s, p, o),
            StatementSource::new(EndpointId::new(endpoint), StatementSourceKind::Remote),
        )
    }

    #[test]
    fn adjacent_same_source_statements_become_one_group() {
        let leaves = vec![exclusive("a", "p1", "b", "e1"), exclusive("b", "p2", "c", "e1")];
        let grouped = extract_exclusive_groups(leaves);
        assert_eq!(grouped.len(), 1);
        assert!(matches!(&grouped[0], PlanNode::ExclusiveGroup { patterns, .. } if patterns.len() == 2));
    }

    #[test]
    fn different_sources_do_not_merge() {
        let leaves = vec![exclusive("a", "p1", "b", "e1"), exclusive("b", "p2", "c", "e2")];
        let grouped = extract_exclusive_groups(leaves);
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn non_adjacent_same_source_statements_do_not_merge() {
        let leaves = vec![
            exclusive("a", "p1", "b", "e1"),
            exclusive("b", "p2", "c", "e2"),
            exclusive("c", "p3", "d", "e1"),
        ];
        let grouped = extract_exclusive_groups(leaves);
        assert_eq!(grouped.len(), 3);
    }

    #[test]
    fn bound_join_marks_multi_source_right_side() {
        let left = exclusive("a", "p1", "b", "e1");
        let right = PlanNode::StatementSourcePattern(
            pattern("b", "p2", "c"),
            vec![
                StatementSource::new(EndpointId::new("e1"), StatementSourceKind::Remote),
                StatementSource::new(EndpointId::new("e2"), StatementSourceKind::Remote),
            ],
        );
        let plan = mark_bound_joins(vec![left, right]);
        assert!(matches!(plan, PlanNode::BoundJoin(_, _)));
    }

    #[test]
    fn all_exclusive_chain_flattens_to_one_njoin() {
        let nodes = vec![
            exclusive("a", "p1", "b", "e1"),
            exclusive("b", "p2", "c", "e2"),
            exclusive("c", "p3", "d", "e3"),
        ];
        let plan = mark_bound_joins(nodes);
        assert!(matches!(plan, PlanNode::NJoin(children) if children.len() == 3));
    }

    #[test]
    fn filter_over_bound_variables_pushes_into_exclusive_statement() {
        let inner = exclusive("a", "p1", "b", "e1");
        let expr = Expression::Bound(var("a"));
        let plan = push_down_filter(expr, inner);
        assert!(matches!(plan, PlanNode::ExclusiveGroup { filter: Some(_), .. }));
    }

    #[test]
    fn filter_over_unbound_variable_stays_local() {
        let inner = exclusive("a", "p1", "b", "e1");
        let expr = Expression::Bound(var("unrelated"));
        let plan = push_down_filter(expr, inner);
        assert!(matches!(plan, PlanNode::Filter(_, _)));
    }
}
