//! The pipelined parallel evaluator (§4.7): walks the rewritten algebra bottom-up, turning each
//! [`crate::algebra::PlanNode`] into a [`crate::source::BindingStream`] that its parent pulls
//! from lazily rather than a materialised result set.

mod bound_join;
mod expr;
mod union_iter;

pub use union_iter::ConcurrentUnion;

use crate::algebra::PlanNode;
use crate::error::EvaluationError;
use crate::model::Bindings;
use crate::query::QueryInfo;
use crate::registry::EndpointRegistry;
use crate::scheduler::{ExecutorControl, FederationSchedulers};
use crate::source::BindingStream;
use crate::sparql_text::{render_expression, render_select};
use crossbeam_channel::bounded;
use oxrdf::Variable;
use rustc_hash::FxHashMap;
use spargebra::term::TriplePattern;
use std::sync::Arc;

/// Drives evaluation of one query's algebra tree against the endpoints held by `registry`
/// (§4.7, §4.8). Stateless across calls — all per-query state lives in the [`QueryInfo`] and
/// [`ExecutorControl`] passed to [`Evaluator::evaluate`].
pub struct Evaluator<'a> {
    registry: &'a EndpointRegistry,
    schedulers: &'a FederationSchedulers,
    bound_join_block_size: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(registry: &'a EndpointRegistry, schedulers: &'a FederationSchedulers, bound_join_block_size: usize) -> Self {
        Self {
            registry,
            schedulers,
            bound_join_block_size: bound_join_block_size.max(1),
        }
    }

    /// Evaluates `plan`, returning a stream the caller can pull lazily. The returned stream
    /// checks [`QueryInfo::is_aborted`] on every `next()` call, so a consumer that stops pulling
    /// (or a sibling task that tosses an error into `control`) closes this subtree on its very
    /// next poll rather than running it to completion (§4.7 Cancellation).
    pub fn evaluate(&self, plan: &PlanNode, query: Arc<QueryInfo>, control: Arc<ExecutorControl>) -> Result<BindingStream, EvaluationError> {
        let stream = self.evaluate_inner(plan, &query, &control)?;
        Ok(Box::new(Cancellable { inner: stream, query }))
    }

    fn evaluate_inner(&self, plan: &PlanNode, query: &Arc<QueryInfo>, control: &Arc<ExecutorControl>) -> Result<BindingStream, EvaluationError> {
        match plan {
            PlanNode::EmptyStatementPattern(_) => Ok(Box::new(std::iter::empty())),
            PlanNode::ExclusiveStatement(pattern, source) => {
                let text = render_select(std::slice::from_ref(pattern), None);
                self.run_remote(&source.endpoint_id, &text, query)
            }
            PlanNode::ExclusiveGroup { patterns, source, filter } => {
                let filter_text = filter.as_ref().map(render_expression);
                let text = render_select(patterns, filter_text.as_deref());
                self.run_remote(&source.endpoint_id, &text, query)
            }
            PlanNode::StatementSourcePattern(pattern, sources) => self.evaluate_union_pattern(pattern, sources, query, control),
            PlanNode::NJoin(children) => self.evaluate_njoin(children, query, control),
            PlanNode::NUnion(children) => self.evaluate_nunion(children, query, control),
            PlanNode::Filter(expr, child) => {
                let child_stream = self.evaluate_inner(child, query, control)?;
                Ok(Box::new(child_stream.filter_map(|row| match row {
                    Ok(row) => expr::effective_boolean_value(expr, &row).unwrap_or(false).then_some(Ok(row)),
                    Err(error) => Some(Err(error)),
                })))
            }
            PlanNode::Projection(variables, child) => {
                let child_stream = self.evaluate_inner(child, query, control)?;
                let variables = variables.clone();
                Ok(Box::new(child_stream.map(move |row| row.map(|row| row.project(&variables)))))
            }
            PlanNode::BoundJoin(left, right) => self.evaluate_bound_join(left, right, query, control),
        }
    }

    fn run_remote(&self, endpoint_id: &crate::model::EndpointId, text: &str, query: &Arc<QueryInfo>) -> Result<BindingStream, EvaluationError> {
        let Some(triple_source) = self.registry.triple_source(endpoint_id) else {
            return Err(EvaluationError::Remote {
                endpoint: endpoint_id.clone(),
                message: "endpoint is not initialized".to_owned(),
            });
        };
        query.stats().record_remote_request();
        triple_source.evaluate(text, None)
    }

    /// `StatementSourcePattern` (§4.7): one single-pattern `SELECT` per candidate source, fanned
    /// out onto the union worker pool and merged as results arrive (bag union, no dedup, no
    /// ordering guarantee — §4.7 NUnion).
    fn evaluate_union_pattern(
        &self,
        pattern: &TriplePattern,
        sources: &[crate::model::StatementSource],
        query: &Arc<QueryInfo>,
        control: &Arc<ExecutorControl>,
    ) -> Result<BindingStream, EvaluationError> {
        let mut streams = Vec::with_capacity(sources.len());
        for source in sources {
            let text = render_select(std::slice::from_ref(pattern), None);
            streams.push(self.run_remote(&source.endpoint_id, &text, query)?);
        }
        Ok(Box::new(ConcurrentUnion::new(&self.schedulers.unions, streams, 64, Arc::clone(control))))
    }

    fn evaluate_nunion(&self, children: &[PlanNode], query: &Arc<QueryInfo>, control: &Arc<ExecutorControl>) -> Result<BindingStream, EvaluationError> {
        let mut streams = Vec::with_capacity(children.len());
        for child in children {
            streams.push(self.evaluate_inner(child, query, control)?);
        }
        Ok(Box::new(ConcurrentUnion::new(&self.schedulers.unions, streams, 64, Arc::clone(control))))
    }

    /// `NJoin` (§4.7): a left-deep chain of hash joins. The right side of each step is
    /// materialised into a hash index keyed on the variables it shares with the accumulated
    /// left side, then the left stream probes that index lazily as rows arrive.
    fn evaluate_njoin(&self, children: &[PlanNode], query: &Arc<QueryInfo>, control: &Arc<ExecutorControl>) -> Result<BindingStream, EvaluationError> {
        let mut children_iter = children.iter();
        let Some(first) = children_iter.next() else {
            return Ok(Box::new(std::iter::empty()));
        };
        let mut acc_stream = self.evaluate_inner(first, query, control)?;
        let mut acc_vars: rustc_hash::FxHashSet<Variable> = first.free_variables().into_iter().collect();
        for child in children_iter {
            if control.is_aborted() {
                return Err(EvaluationError::Cancelled { query_id: query.id() });
            }
            let right_stream = self.evaluate_inner(child, query, control)?;
            let right_rows = self.collect_on_join_pool(right_stream, query)?;
            let child_vars: rustc_hash::FxHashSet<Variable> = child.free_variables().into_iter().collect();
            let shared: Vec<Variable> = acc_vars.intersection(&child_vars).cloned().collect();
            acc_stream = hash_join(acc_stream, right_rows, shared);
            acc_vars.extend(child_vars);
        }
        Ok(acc_stream)
    }

    /// `BoundJoin` (§4.4 pass 3, §4.7): batches the left side into blocks of
    /// `bound_join_block_size` rows, ships one remote sub-query per block per candidate source
    /// with a hidden `?__row` index, and re-associates each returned row with its originating
    /// left tuple by that index. The per-source batches within one block are fanned out onto the
    /// join worker pool so candidate sources are queried concurrently rather than one at a time.
    fn evaluate_bound_join(&self, left: &PlanNode, right: &PlanNode, query: &Arc<QueryInfo>, control: &Arc<ExecutorControl>) -> Result<BindingStream, EvaluationError> {
        let PlanNode::StatementSourcePattern(pattern, sources) = right else {
            // The rewriter (`rewrite::mark_bound_joins`) only ever marks `BoundJoin` when its
            // right side is a `StatementSourcePattern`; anything else is an invariant violation
            // upstream rather than a shape this evaluator should guess how to handle.
            return Err(EvaluationError::BindingMismatch {
                variable: "__row".to_owned(),
                detail: "bound join right side was not a multi-source statement pattern".to_owned(),
            });
        };

        let left_stream = self.evaluate_inner(left, query, control)?;
        let left_rows = self.collect_on_join_pool(left_stream, query)?;
        let row_variable = Variable::new("__row").expect("reserved bound-join row variable is always valid");
        let mut out = Vec::new();
        for chunk in left_rows.chunks(self.bound_join_block_size) {
            if control.is_aborted() {
                return Err(EvaluationError::Cancelled { query_id: query.id() });
            }
            if chunk.is_empty() {
                continue;
            }
            let batch: Vec<(usize, Bindings)> = chunk.iter().cloned().enumerate().collect();
            let (sender, receiver) = bounded(sources.len().max(1));
            let mut dispatched = 0usize;
            for source in sources {
                let Some(triple_source) = self.registry.triple_source(&source.endpoint_id) else {
                    return Err(EvaluationError::Remote {
                        endpoint: source.endpoint_id.clone(),
                        message: "endpoint is not initialized".to_owned(),
                    });
                };
                query.stats().record_remote_request();
                let pattern = pattern.clone();
                let batch = batch.clone();
                let row_variable = row_variable.clone();
                let sender = sender.clone();
                dispatched += 1;
                self.schedulers.joins.schedule_fn(move || {
                    let result = bound_join::evaluate_batch(triple_source.as_ref(), &pattern, &batch, &row_variable);
                    let _ = sender.send(result);
                });
            }
            drop(sender);
            for _ in 0..dispatched {
                let rows = receiver.recv().map_err(|_| EvaluationError::Cancelled { query_id: query.id() })??;
                out.extend(rows);
            }
        }
        query.stats().record_rows(out.len() as u64);
        Ok(Box::new(out.into_iter().map(Ok)))
    }

    /// Runs `stream` to completion on the join worker pool instead of the calling thread, so a
    /// join's side materialisation actually executes concurrently with whatever else the query is
    /// doing (§4.6, §4.7) rather than blocking the consumer thread.
    fn collect_on_join_pool(&self, stream: BindingStream, query: &Arc<QueryInfo>) -> Result<Vec<Bindings>, EvaluationError> {
        let (sender, receiver) = bounded(1);
        self.schedulers.joins.schedule_fn(move || {
            let _ = sender.send(stream.collect::<Result<Vec<_>, _>>());
        });
        receiver.recv().unwrap_or_else(|_| Err(EvaluationError::Cancelled { query_id: query.id() }))
    }
}

/// Builds a hash index over `right` keyed on `shared_vars`, then probes it lazily for every row
/// the `left` stream produces (§4.7 NJoin).
fn hash_join(left: BindingStream, right: Vec<Bindings>, shared_vars: Vec<Variable>) -> BindingStream {
    let mut index: FxHashMap<Vec<Option<oxrdf::Term>>, Vec<Bindings>> = FxHashMap::default();
    for row in &right {
        let key = shared_vars.iter().map(|v| row.get(v).cloned()).collect();
        index.entry(key).or_default().push(row.clone());
    }
    Box::new(left.flat_map(move |row| match row {
        Ok(row) => {
            let key: Vec<Option<oxrdf::Term>> = shared_vars.iter().map(|v| row.get(v).cloned()).collect();
            let candidates = index.get(&key).cloned().unwrap_or_default();
            candidates
                .into_iter()
                .filter_map(|candidate| row.merge(&candidate))
                .map(Ok)
                .collect::<Vec<_>>()
        }
        Err(error) => vec![Err(error)],
    }))
}

struct Cancellable<I> {
    inner: I,
    query: Arc<QueryInfo>,
}

impl<I: Iterator<Item = Result<Bindings, EvaluationError>>> Iterator for Cancellable<I> {
    type Item = Result<Bindings, EvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.query.is_aborted() {
            return None;
        }
        self.inner.next()
    }
}
