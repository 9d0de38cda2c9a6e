//! The federation-aware algebra the rewriter (§4.4) produces and the evaluator (§4.7) consumes.
//!
//! Modeled as a single tagged-variant enum with a [`Visitor`] trait for traversal, rather than a
//! node-per-struct class hierarchy (§9 "replace inheritance with tagged variants + visitor...
//! sufficient for both rewriting and evaluation").

use crate::model::StatementSource;
use spargebra::algebra::Expression;
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};
use oxrdf::Variable;

/// One node of the rewritten query tree (§3 Algebra nodes).
#[derive(Debug, Clone)]
pub enum PlanNode {
    /// No source can answer this pattern at all; evaluates to zero rows without remote I/O
    /// (§8 boundary behaviour).
    EmptyStatementPattern(TriplePattern),
    /// Exactly one source can answer this pattern.
    ExclusiveStatement(TriplePattern, StatementSource),
    /// Several sources can answer this pattern; requires a union at evaluation time.
    StatementSourcePattern(TriplePattern, Vec<StatementSource>),
    /// Several patterns, all exclusive to the same source, shipped as one remote sub-query
    /// (§4.4 pass 1). `filter` holds a pushed-down expression (§4.4 pass 2), if any.
    ExclusiveGroup {
        patterns: Vec<TriplePattern>,
        source: StatementSource,
        filter: Option<Expression>,
    },
    NJoin(Vec<PlanNode>),
    NUnion(Vec<PlanNode>),
    Filter(Expression, Box<PlanNode>),
    Projection(Vec<Variable>, Box<PlanNode>),
    /// A join whose right side is parameterised by the left side's bindings, evaluated in
    /// batches (§4.4 pass 3, §4.7 NJoin/BoundJoin).
    BoundJoin(Box<PlanNode>, Box<PlanNode>),
}

impl PlanNode {
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::EmptyStatementPattern(_)
            | PlanNode::ExclusiveStatement(_, _)
            | PlanNode::StatementSourcePattern(_, _)
            | PlanNode::ExclusiveGroup { .. } => Vec::new(),
            PlanNode::NJoin(children) | PlanNode::NUnion(children) => children.iter().collect(),
            PlanNode::Filter(_, child) | PlanNode::Projection(_, child) => vec![child.as_ref()],
            PlanNode::BoundJoin(left, right) => vec![left.as_ref(), right.as_ref()],
        }
    }

    /// Every variable that could appear bound in this node's output, used by the join-order
    /// heuristic (§4.5) and filter push-down (§4.4 pass 2).
    pub fn free_variables(&self) -> Vec<Variable> {
        let mut vars = Vec::new();
        self.collect_free_variables(&mut vars);
        vars
    }

    fn collect_free_variables(&self, out: &mut Vec<Variable>) {
        match self {
            PlanNode::EmptyStatementPattern(pattern) => push_pattern_variables(pattern, out),
            PlanNode::ExclusiveStatement(pattern, _) => push_pattern_variables(pattern, out),
            PlanNode::StatementSourcePattern(pattern, _) => push_pattern_variables(pattern, out),
            PlanNode::ExclusiveGroup { patterns, .. } => {
                for pattern in patterns {
                    push_pattern_variables(pattern, out);
                }
            }
            PlanNode::NJoin(children) | PlanNode::NUnion(children) => {
                for child in children {
                    child.collect_free_variables(out);
                }
            }
            PlanNode::Filter(_, child) => {
                child.collect_free_variables(out);
            }
            PlanNode::Projection(variables, child) => {
                let mut child_vars = Vec::new();
                child.collect_free_variables(&mut child_vars);
                for variable in variables {
                    if child_vars.contains(variable) {
                        push_unique(out, variable);
                    }
                }
            }
            PlanNode::BoundJoin(left, right) => {
                left.collect_free_variables(out);
                right.collect_free_variables(out);
            }
        }
    }

    /// Whether this node is an `ExclusiveStatement`/`ExclusiveGroup` — i.e. answerable by
    /// exactly one endpoint in one remote call (§4.5 "exclusive statements beat source-pattern
    /// statements of equal variable count").
    pub fn is_exclusive(&self) -> bool {
        matches!(self, PlanNode::ExclusiveStatement(_, _) | PlanNode::ExclusiveGroup { .. })
    }

    /// The single source this node targets, if it targets exactly one (§4.4 pass 1 adjacency
    /// grouping key).
    pub fn sole_source(&self) -> Option<&StatementSource> {
        match self {
            PlanNode::ExclusiveStatement(_, source) => Some(source),
            PlanNode::ExclusiveGroup { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn push_pattern_variables(pattern: &TriplePattern, out: &mut Vec<Variable>) {
    if let TermPattern::Variable(v) = &pattern.subject {
        push_unique(out, v);
    }
    if let NamedNodePattern::Variable(v) = &pattern.predicate {
        push_unique(out, v);
    }
    if let TermPattern::Variable(v) = &pattern.object {
        push_unique(out, v);
    }
}

fn push_unique(out: &mut Vec<Variable>, variable: &Variable) {
    if !out.contains(variable) {
        out.push(variable.clone());
    }
}

/// Traversal hook for passes that need to inspect or transform every node without hand-writing
/// the recursion each time (§9). Default methods simply recurse; a pass overrides only the
/// variants it cares about.
pub trait Visitor {
    fn visit(&mut self, node: &PlanNode) {
        walk(self, node);
    }
}

pub fn walk<V: Visitor + ?Sized>(visitor: &mut V, node: &PlanNode) {
    for child in node.children() {
        visitor.visit(child);
    }
}

/// Counts every `PlanNode` in the tree; used by tests and `debugQueryPlan` diagnostics (§6).
pub struct NodeCounter {
    pub count: usize,
}

impl Visitor for NodeCounter {
    fn visit(&mut self, node: &PlanNode) {
        self.count += 1;
        walk(self, node);
    }
}
