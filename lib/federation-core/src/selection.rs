//! Concurrent per-pattern source selection (§4.3): for every triple pattern, resolve which
//! endpoints can contribute answers using the cache plus remote probes, then rewrite the
//! pattern into the corresponding algebra leaf.

use crate::algebra::PlanNode;
use crate::cache::SourceSelectionCache;
use crate::error::{EvaluationError, OptimizationError};
use crate::model::{Assurance, EndpointId, StatementSource, StatementSourceKind, SubQuery};
use crate::query::QueryInfo;
use crate::registry::EndpointRegistry;
use crate::scheduler::{CountdownLatch, WorkerPool};
use rustc_hash::FxHashMap;
use spargebra::term::TriplePattern;
use std::sync::{Arc, Mutex, PoisonError};

/// Resolves the source list for every triple pattern of one basic graph pattern (§4.3).
pub struct SourceSelector<'a> {
    registry: &'a EndpointRegistry,
    cache: Arc<SourceSelectionCache>,
    pool: &'a WorkerPool,
}

impl<'a> SourceSelector<'a> {
    pub fn new(registry: &'a EndpointRegistry, cache: Arc<SourceSelectionCache>, pool: &'a WorkerPool) -> Self {
        Self { registry, cache, pool }
    }

    /// Runs the full algorithm from §4.3 over `patterns`, returning one [`PlanNode`] leaf per
    /// input pattern in the same order.
    pub fn select(&self, patterns: &[TriplePattern], query: &Arc<QueryInfo>) -> Result<Vec<PlanNode>, OptimizationError> {
        // Group pattern indices by subquery key so identical subqueries — including those that
        // differ only in variable naming — share one probe instead of one per occurrence
        // ("probes for identical subqueries are deduplicated within one selection pass").
        let mut groups: FxHashMap<SubQuery, Vec<usize>> = FxHashMap::default();
        for (index, pattern) in patterns.iter().enumerate() {
            groups.entry(SubQuery::from_pattern(pattern)).or_default().push(index);
        }

        let endpoint_ids = self.registry.endpoint_ids();
        let resolved: Vec<Arc<Mutex<Vec<StatementSource>>>> =
            patterns.iter().map(|_| Arc::new(Mutex::new(Vec::new()))).collect();
        let errors: Arc<Mutex<Vec<(EndpointId, String)>>> = Arc::new(Mutex::new(Vec::new()));

        // Step 1: consult the cache synchronously for every (subquery, endpoint) pair. Anything
        // still unresolved becomes a deduplicated probe task.
        let mut pending_probes: Vec<(SubQuery, EndpointId, TriplePattern, Vec<usize>, bool)> = Vec::new();
        for (subquery, indices) in &groups {
            let representative = patterns[indices[0]].clone();
            for endpoint_id in &endpoint_ids {
                // A catch-all member (§2.2) is never short-circuited by a cached `NONE` — it is
                // re-probed every time instead of being permanently excluded.
                let catch_all = self.registry.endpoint(endpoint_id).is_some_and(|endpoint| endpoint.catch_all);
                if catch_all {
                    query.stats().record_cache_miss();
                    pending_probes.push((subquery.clone(), endpoint_id.clone(), representative.clone(), indices.clone(), true));
                    continue;
                }
                match self.cache.can_provide_statements(subquery, endpoint_id) {
                    Assurance::None => {
                        query.stats().record_cache_hit();
                    }
                    Assurance::HasLocalStatements => {
                        query.stats().record_cache_hit();
                        push_source(&resolved, indices, endpoint_id, StatementSourceKind::Local);
                    }
                    Assurance::HasRemoteStatements => {
                        query.stats().record_cache_hit();
                        push_source(&resolved, indices, endpoint_id, StatementSourceKind::Remote);
                    }
                    Assurance::PossiblyHasStatements => {
                        query.stats().record_cache_miss();
                        pending_probes.push((subquery.clone(), endpoint_id.clone(), representative.clone(), indices.clone(), false));
                    }
                }
            }
        }

        if pending_probes.is_empty() {
            return Ok(finish(patterns, &resolved));
        }

        // Step 2/3: submit every probe to the scheduler, then wait on a latch counting down once
        // per completion, bounded by the query's remaining time budget.
        let latch = Arc::new(CountdownLatch::new(pending_probes.len()));
        for (subquery, endpoint_id, pattern, indices, catch_all) in pending_probes {
            let Some(triple_source) = self.registry.triple_source(&endpoint_id) else {
                // Endpoint shut down between enumeration and dispatch: treat as a miss.
                latch.count_down();
                continue;
            };
            let cache = Arc::clone(&self.cache);
            let resolved = resolved.clone();
            let errors = Arc::clone(&errors);
            let latch = Arc::clone(&latch);
            let query = Arc::clone(query);
            let kind = if triple_source.uses_prepared_query() {
                StatementSourceKind::Remote
            } else {
                StatementSourceKind::Local
            };
            self.pool.schedule_fn(move || {
                // Step 4: a newly dequeued task belonging to an already-aborted query exits
                // without running (§4.6).
                if query.is_aborted() {
                    latch.count_down();
                    return;
                }
                match triple_source.ask(&pattern) {
                    Ok(true) => {
                        cache.update_entry(&subquery, &endpoint_id, observed_assurance(kind));
                        for &index in &indices {
                            resolved[index]
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .push(StatementSource::new(endpoint_id.clone(), kind));
                        }
                    }
                    Ok(false) => {
                        if !catch_all {
                            cache.update_entry(&subquery, &endpoint_id, Assurance::None);
                        }
                    }
                    Err(error) => {
                        errors
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((endpoint_id.clone(), error.to_string()));
                    }
                }
                latch.count_down();
            });
        }

        if !latch.wait_timeout(query.remaining_time()) {
            return Err(OptimizationError::Timeout {
                query_id: query.id(),
                budget: query.max_execution_time(),
            });
        }

        if let Some((endpoint, message)) = first_error(&errors) {
            return Err(OptimizationError::ProbeFailed {
                endpoint: endpoint.clone(),
                source: Box::new(EvaluationError::Remote { endpoint, message }),
            });
        }

        Ok(finish(patterns, &resolved))
    }
}

fn first_error(errors: &Arc<Mutex<Vec<(EndpointId, String)>>>) -> Option<(EndpointId, String)> {
    errors.lock().unwrap_or_else(PoisonError::into_inner).first().cloned()
}

fn push_source(resolved: &[Arc<Mutex<Vec<StatementSource>>>], indices: &[usize], endpoint_id: &EndpointId, kind: StatementSourceKind) {
    for &index in indices {
        resolved[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StatementSource::new(endpoint_id.clone(), kind));
    }
}

fn observed_assurance(kind: StatementSourceKind) -> Assurance {
    match kind {
        StatementSourceKind::Local => Assurance::HasLocalStatements,
        StatementSourceKind::Remote => Assurance::HasRemoteStatements,
    }
}

fn finish(patterns: &[TriplePattern], resolved: &[Arc<Mutex<Vec<StatementSource>>>]) -> Vec<PlanNode> {
    patterns
        .iter()
        .zip(resolved)
        .map(|(pattern, sources)| {
            let sources = sources.lock().unwrap_or_else(PoisonError::into_inner).clone();
            rewrite_leaf(pattern.clone(), sources)
        })
        .collect()
}

/// §4.3 step 5: rewrite one pattern plus its resolved sources into the matching algebra leaf.
fn rewrite_leaf(pattern: TriplePattern, mut sources: Vec<StatementSource>) -> PlanNode {
    match sources.len() {
        0 => PlanNode::EmptyStatementPattern(pattern),
        1 => PlanNode::ExclusiveStatement(pattern, sources.remove(0)),
        _ => PlanNode::StatementSourcePattern(pattern, sources),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError as EvalError;
    use crate::model::{Bindings, Endpoint, EndpointType};
    use crate::source::local::LocalEvaluator;
    use crate::source::LocalTripleSource;
    use oxrdf::{NamedNode, Triple, Variable};
    use spargebra::term::{NamedNodePattern, TermPattern};
    use std::time::Duration;
    use url::Url;

    struct FixedEvaluator {
        has_match: bool,
    }

    impl LocalEvaluator for FixedEvaluator {
        fn evaluate(&self, _query_text: &str) -> Result<Vec<Bindings>, EvalError> {
            Ok(Vec::new())
        }
        fn get_statements(&self, _pattern: &TriplePattern) -> Result<Vec<Triple>, EvalError> {
            if self.has_match {
                Ok(vec![Triple::new(
                    NamedNode::new("http://example.com/s").unwrap(),
                    NamedNode::new("http://example.com/p").unwrap(),
                    NamedNode::new("http://example.com/o").unwrap(),
                )])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn pattern() -> TriplePattern {
        TriplePattern {
            subject: TermPattern::Variable(Variable::new("s").unwrap()),
            predicate: NamedNodePattern::NamedNode(NamedNode::new("http://example.com/p").unwrap()),
            object: TermPattern::Variable(Variable::new("o").unwrap()),
        }
    }

    fn registry_with(has_match: bool) -> EndpointRegistry {
        let registry = EndpointRegistry::new();
        let endpoint = Endpoint::new("e1", "e1", EndpointType::NativeStore, Url::parse("http://example.com/").unwrap());
        let source: Arc<dyn crate::source::TripleSource> = Arc::new(LocalTripleSource::new(Arc::new(FixedEvaluator { has_match })));
        registry.register(endpoint, source);
        registry
    }

    #[test]
    fn pattern_with_one_positive_probe_becomes_exclusive() {
        let registry = registry_with(true);
        let cache = Arc::new(SourceSelectionCache::new());
        let pool = WorkerPool::new("selector-test", 2);
        let selector = SourceSelector::new(&registry, Arc::clone(&cache), &pool);
        let query = QueryInfo::new(Duration::from_secs(5));
        let plan = selector.select(&[pattern()], &query).unwrap();
        pool.shutdown();
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], PlanNode::ExclusiveStatement(_, _)));
    }

    #[test]
    fn pattern_with_no_positive_probes_becomes_empty() {
        let registry = registry_with(false);
        let cache = Arc::new(SourceSelectionCache::new());
        let pool = WorkerPool::new("selector-test", 2);
        let selector = SourceSelector::new(&registry, Arc::clone(&cache), &pool);
        let query = QueryInfo::new(Duration::from_secs(5));
        let plan = selector.select(&[pattern()], &query).unwrap();
        pool.shutdown();
        assert!(matches!(plan[0], PlanNode::EmptyStatementPattern(_)));
    }

    #[test]
    fn cached_positive_short_circuits_a_second_selection() {
        let registry = registry_with(true);
        let cache = Arc::new(SourceSelectionCache::new());
        let pool = WorkerPool::new("selector-test", 2);
        let selector = SourceSelector::new(&registry, Arc::clone(&cache), &pool);
        let q1 = QueryInfo::new(Duration::from_secs(5));
        selector.select(&[pattern()], &q1).unwrap();
        assert_eq!(cache.len(), 1);
        let q2 = QueryInfo::new(Duration::from_secs(5));
        let plan = selector.select(&[pattern()], &q2).unwrap();
        pool.shutdown();
        assert!(matches!(plan[0], PlanNode::ExclusiveStatement(_, _)));
    }

    struct SlowEvaluator;

    impl LocalEvaluator for SlowEvaluator {
        fn evaluate(&self, _query_text: &str) -> Result<Vec<Bindings>, EvalError> {
            Ok(Vec::new())
        }
        fn get_statements(&self, _pattern: &TriplePattern) -> Result<Vec<Triple>, EvalError> {
            std::thread::sleep(Duration::from_millis(50));
            Ok(Vec::new())
        }
    }

    #[test]
    fn probe_slower_than_budget_times_out() {
        let registry = EndpointRegistry::new();
        let endpoint = Endpoint::new("slow", "slow", EndpointType::NativeStore, Url::parse("http://example.com/").unwrap());
        let source: Arc<dyn crate::source::TripleSource> = Arc::new(LocalTripleSource::new(Arc::new(SlowEvaluator)));
        registry.register(endpoint, source);
        let cache = Arc::new(SourceSelectionCache::new());
        let pool = WorkerPool::new("selector-test", 2);
        let selector = SourceSelector::new(&registry, Arc::clone(&cache), &pool);
        let query = QueryInfo::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(2));
        let plan = selector.select(&[pattern()], &query);
        pool.shutdown();
        assert!(matches!(plan, Err(OptimizationError::Timeout { .. })));
    }
}
