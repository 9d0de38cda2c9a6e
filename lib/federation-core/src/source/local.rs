use crate::error::EvaluationError;
use crate::model::Bindings;
use crate::source::buffer::ConsumingBuffer;
use crate::source::trait_def::{BindingStream, TripleSource, TripleStream};
use oxrdf::{NamedOrBlankNode, Term, Triple};
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};
use std::sync::Arc;

/// The callback a caller supplies for a co-located federation member (`NativeStore`, §6):
/// evaluate an in-memory algebra without going over the wire. The engine never inspects the
/// store's on-disk representation (§1) — only this evaluation surface.
pub trait LocalEvaluator: Send + Sync {
    fn evaluate(&self, query_text: &str) -> Result<Vec<Bindings>, EvaluationError>;
    fn get_statements(&self, pattern: &TriplePattern) -> Result<Vec<Triple>, EvaluationError>;
}

/// Wraps a [`LocalEvaluator`] to satisfy [`TripleSource`]. `uses_prepared_query` is `false`:
/// the federation manager ships this source an already-built query string anyway (to keep the
/// evaluator code path uniform), but local sources are free to ignore remote-only concerns like
/// connection repair.
pub struct LocalTripleSource {
    evaluator: Arc<dyn LocalEvaluator>,
}

impl LocalTripleSource {
    pub fn new(evaluator: Arc<dyn LocalEvaluator>) -> Self {
        Self { evaluator }
    }
}

impl TripleSource for LocalTripleSource {
    fn evaluate(&self, query_text: &str, _bindings: Option<&Bindings>) -> Result<BindingStream, EvaluationError> {
        let rows = self.evaluator.evaluate(query_text)?;
        Ok(Box::new(ConsumingBuffer::new(64, rows.into_iter().map(Ok))))
    }

    fn ask(&self, pattern: &TriplePattern) -> Result<bool, EvaluationError> {
        Ok(!self.evaluator.get_statements(pattern)?.is_empty())
    }

    fn get_statements(&self, pattern: &TriplePattern) -> Result<TripleStream, EvaluationError> {
        let triples = self.evaluator.get_statements(pattern)?;
        Ok(Box::new(ConsumingBuffer::new(64, triples.into_iter().map(Ok))))
    }

    fn uses_prepared_query(&self) -> bool {
        false
    }
}

/// Re-assembles a concrete `Triple` from a pattern and one solution row, substituting each
/// variable slot with its bound value. Used to turn a probe `SELECT` row back into the
/// `Statement` shape `getStatements` promises (§4.1).
pub fn reify_pattern(subject: &TermPattern, predicate: &NamedNodePattern, object: &TermPattern, row: &Bindings) -> Option<Triple> {
    Some(Triple::new(
        term_pattern_to_subject(subject, row)?,
        named_node_pattern_to_named_node(predicate, row)?,
        term_pattern_to_term(object, row)?,
    ))
}

fn term_pattern_to_subject(pattern: &TermPattern, row: &Bindings) -> Option<NamedOrBlankNode> {
    match term_pattern_to_term(pattern, row)? {
        Term::NamedNode(n) => Some(NamedOrBlankNode::NamedNode(n)),
        Term::BlankNode(b) => Some(NamedOrBlankNode::BlankNode(b)),
        Term::Literal(_) => None,
    }
}

fn term_pattern_to_term(pattern: &TermPattern, row: &Bindings) -> Option<Term> {
    match pattern {
        TermPattern::NamedNode(n) => Some(Term::NamedNode(n.clone())),
        TermPattern::BlankNode(b) => Some(Term::BlankNode(b.clone())),
        TermPattern::Literal(l) => Some(Term::Literal(l.clone())),
        TermPattern::Variable(v) => row.get(v).cloned(),
    }
}

fn named_node_pattern_to_named_node(pattern: &NamedNodePattern, row: &Bindings) -> Option<oxrdf::NamedNode> {
    match pattern {
        NamedNodePattern::NamedNode(n) => Some(n.clone()),
        NamedNodePattern::Variable(v) => match row.get(v)? {
            Term::NamedNode(n) => Some(n.clone()),
            _ => None,
        },
    }
}
