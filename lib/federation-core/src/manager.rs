//! The federation manager (§4.8): owns the registry, the source-selection cache and the two
//! worker pools for the lifetime of the engine instance, and is the single entry point an
//! embedding application (or the CLI) calls to register members, prepare a query, and run it.

use crate::algebra::PlanNode;
use crate::cache::SourceSelectionCache;
use crate::config::{EngineConfig, MemberConfig};
use crate::error::{ConfigError, EvaluationError, FederationError, ParseError};
use crate::model::{Bindings, Endpoint, EndpointId};
use crate::query::{AbortReason, QueryInfo};
use crate::registry::EndpointRegistry;
use crate::rewrite::AlgebraRewriter;
use crate::scheduler::{ExecutorControl, FederationSchedulers};
use crate::source::local::LocalEvaluator;
use crate::source::{LocalTripleSource, RemoteTripleSource, TripleSource};
use crate::stats::{NoopStatisticsSink, QueryStatsSnapshot, StatisticsSink, TracingStatisticsSink};
use dashmap::DashMap;
use oxrdf::Variable;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Everything needed to run one query: the rewritten algebra plus the per-query context created
/// during rewriting. Kept as a separate value from running it (§4.8 "prepare, then execute") so a
/// caller can inspect the plan — e.g. for `debugQueryPlan` (§6) — before committing to executing
/// it.
pub struct PreparedQuery {
    query_info: Arc<QueryInfo>,
    plan: PlanNode,
    variables: Vec<Variable>,
}

impl PreparedQuery {
    pub fn id(&self) -> u64 {
        self.query_info.id()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn plan(&self) -> &PlanNode {
        &self.plan
    }
}

/// A lazily-pulled stream of solution rows for one executing query (§4.7, §4.8). Dropping this
/// before it is exhausted aborts the query: the shared [`QueryInfo::is_aborted`] flag every
/// scheduled task checks cooperatively is set, and the query is removed from the manager's
/// in-flight tracker.
pub struct QueryResultStream<'a> {
    manager: &'a FederationManager,
    query_info: Arc<QueryInfo>,
    control: Arc<ExecutorControl>,
    inner: crate::source::BindingStream,
    started: Instant,
    errored: bool,
    finished: bool,
}

impl<'a> QueryResultStream<'a> {
    pub fn query_id(&self) -> u64 {
        self.query_info.id()
    }

    fn finish(&mut self, error: Option<&str>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.manager.in_flight.remove(&self.query_info.id());
        let snapshot = QueryStatsSnapshot::capture(self.query_info.stats(), self.started.elapsed());
        match error {
            Some(message) => self.manager.sink.query_failed(self.query_info.id(), message),
            None => self.manager.sink.query_completed(self.query_info.id(), &snapshot),
        }
    }
}

impl Iterator for QueryResultStream<'_> {
    type Item = Result<Bindings, EvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored || self.finished {
            return None;
        }
        match self.inner.next() {
            Some(Ok(row)) => Some(Ok(row)),
            Some(Err(error)) => {
                self.errored = true;
                self.finish(Some(&error.to_string()));
                Some(Err(error))
            }
            None => {
                // The evaluator's cooperative cancellation means the underlying iterator can run
                // dry without ever surfacing the error a sibling task tossed; check the shared
                // control once more before declaring success (§7).
                if let Some(error) = self.control.take_error() {
                    self.errored = true;
                    self.finish(Some(&error.to_string()));
                    return Some(Err(error));
                }
                self.finish(None);
                None
            }
        }
    }
}

impl Drop for QueryResultStream<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.query_info.abort(AbortReason::UserCancelled);
            self.finish(None);
        }
    }
}

/// Owns every piece of shared, per-engine-instance state (§4.8, §9 "forbid globals" — one
/// instance per embedding application rather than process-wide statics).
pub struct FederationManager {
    registry: EndpointRegistry,
    cache: Arc<SourceSelectionCache>,
    schedulers: FederationSchedulers,
    config: EngineConfig,
    sink: Arc<dyn StatisticsSink>,
    in_flight: DashMap<u64, Arc<QueryInfo>>,
}

impl FederationManager {
    pub fn new(config: EngineConfig) -> Self {
        let cache = Arc::new(match config.source_selection_cache_capacity {
            Some(capacity) => SourceSelectionCache::with_capacity(capacity),
            None => SourceSelectionCache::new(),
        });
        let sink: Arc<dyn StatisticsSink> = if config.enable_monitoring {
            Arc::new(TracingStatisticsSink)
        } else {
            Arc::new(NoopStatisticsSink)
        };
        Self {
            registry: EndpointRegistry::new(),
            cache,
            schedulers: FederationSchedulers::new(config.join_worker_threads, config.union_worker_threads),
            config,
            sink,
            in_flight: DashMap::new(),
        }
    }

    pub fn with_statistics_sink(mut self, sink: Arc<dyn StatisticsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Registers a federation member (§3, §6). Remote member kinds (`SparqlEndpoint`,
    /// `RemoteResolvable`) build their own [`RemoteTripleSource`] from `location`; co-located
    /// kinds (`NativeStore`, `RemoteRepository`) need `local_evaluator` — the engine never ships
    /// a client for a specific triple-store API (§1 Non-goals), so the embedding application
    /// supplies that bridge itself.
    pub fn add_member(&self, member: &MemberConfig, local_evaluator: Option<Arc<dyn LocalEvaluator>>) -> Result<(), ConfigError> {
        let endpoint_id = EndpointId::new(member.id.clone());
        if member.endpoint_type.is_remote() {
            if !member.supports_ask_queries && !self.config.allow_ask_fallback {
                return Err(ConfigError::AskFallbackDisallowed { id: member.id.clone() });
            }
            let location = member.location.as_deref().ok_or_else(|| ConfigError::MissingLocation { id: member.id.clone() })?;
            let url = Url::parse(location).map_err(|_| ConfigError::MissingLocation { id: member.id.clone() })?;
            let endpoint = Endpoint::new(endpoint_id, member.name.clone(), member.endpoint_type, url.clone())
                .with_catch_all(member.catch_all);
            let endpoint = Endpoint { writable: member.writable, supports_ask_queries: member.supports_ask_queries, ..endpoint };
            let source = Arc::new(RemoteTripleSource::new(
                endpoint.id.clone(),
                url,
                member.supports_ask_queries,
                self.config.default_max_execution_time(),
            ));
            self.registry.register(endpoint, source as Arc<dyn TripleSource>);
        } else {
            let evaluator = local_evaluator.ok_or_else(|| ConfigError::MissingLocalEvaluator { id: member.id.clone() })?;
            let location = member
                .location
                .as_deref()
                .map(Url::parse)
                .transpose()
                .unwrap_or(None)
                .unwrap_or_else(|| Url::parse("urn:fedsparql:local").expect("fixed URL is always valid"));
            let endpoint = Endpoint::new(endpoint_id, member.name.clone(), member.endpoint_type, location).with_catch_all(member.catch_all);
            let endpoint = Endpoint { writable: member.writable, supports_ask_queries: member.supports_ask_queries, ..endpoint };
            let source = Arc::new(LocalTripleSource::new(evaluator));
            self.registry.register(endpoint, source as Arc<dyn TripleSource>);
        }
        Ok(())
    }

    /// Parses `sparql` and builds its federation algebra (§2 pipeline, §4.4). Only `SELECT`
    /// queries are planned to federation algebra — `ASK`/`CONSTRUCT`/`DESCRIBE` query forms are
    /// the concern of the SPARQL engine this crate is embedded in (§1 Non-goals: "the SPARQL
    /// parser itself").
    pub fn prepare_query(&self, sparql: &str, max_execution_time: Duration) -> Result<PreparedQuery, FederationError> {
        let query = spargebra::Query::parse(sparql, None).map_err(ParseError::from)?;
        let spargebra::Query::Select { pattern, .. } = query else {
            return Err(ParseError::Unplannable.into());
        };
        let query_info = QueryInfo::new(max_execution_time);
        self.in_flight.insert(query_info.id(), Arc::clone(&query_info));
        let rewriter = AlgebraRewriter::new(&self.registry, Arc::clone(&self.cache), &self.schedulers.joins);
        let plan = match rewriter.build(&pattern, &query_info) {
            Ok(plan) => plan,
            Err(error) => {
                self.in_flight.remove(&query_info.id());
                return Err(error);
            }
        };
        let variables = plan.free_variables();
        Ok(PreparedQuery { query_info, plan, variables })
    }

    /// Runs a prepared query, returning a lazily-pulled stream of solution rows (§4.7, §4.8).
    pub fn execute(&self, prepared: PreparedQuery) -> Result<QueryResultStream<'_>, EvaluationError> {
        self.sink.query_started(prepared.query_info.id());
        let control = ExecutorControl::new(Arc::clone(&prepared.query_info));
        let evaluator = crate::eval::Evaluator::new(&self.registry, &self.schedulers, self.config.bound_join_block_size);
        let inner = match evaluator.evaluate(&prepared.plan, Arc::clone(&prepared.query_info), Arc::clone(&control)) {
            Ok(stream) => stream,
            Err(error) => {
                self.in_flight.remove(&prepared.query_info.id());
                self.sink.query_failed(prepared.query_info.id(), &error.to_string());
                return Err(error);
            }
        };
        Ok(QueryResultStream {
            manager: self,
            query_info: prepared.query_info,
            control,
            inner,
            started: Instant::now(),
            errored: false,
            finished: false,
        })
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Shuts the engine down gracefully (§4.8, §2.2): new source-selection probes stop being
    /// trusted (every member is marked uninitialized), and in-flight queries are given
    /// `grace_period` to finish on their own before being force-aborted. Consumes `self` because
    /// the underlying worker pools only release their threads once every job has drained (§4.6
    /// `WorkerPool::shutdown`).
    pub fn shutdown(self, grace_period: Duration) {
        self.registry.shutdown_all();
        let deadline = Instant::now() + grace_period;
        while !self.in_flight.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        for entry in self.in_flight.iter() {
            entry.value().abort(AbortReason::UserCancelled);
        }
        self.schedulers.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError as EvalError;
    use crate::model::EndpointType;
    use oxrdf::{NamedNode, Term, Triple};
    use spargebra::term::TriplePattern;

    struct FixedRows(Vec<Bindings>);

    impl LocalEvaluator for FixedRows {
        fn evaluate(&self, _query_text: &str) -> Result<Vec<Bindings>, EvalError> {
            Ok(self.0.clone())
        }
        fn get_statements(&self, _pattern: &TriplePattern) -> Result<Vec<Triple>, EvalError> {
            Ok(Vec::new())
        }
    }

    fn row(var_name: &str, value: &str) -> Bindings {
        let mut bindings = Bindings::new();
        bindings.insert(Variable::new(var_name).unwrap(), Term::NamedNode(NamedNode::new(format!("http://example.com/{value}")).unwrap()));
        bindings
    }

    fn local_member(id: &str) -> MemberConfig {
        MemberConfig {
            id: id.to_owned(),
            name: id.to_owned(),
            endpoint_type: EndpointType::NativeStore,
            location: None,
            writable: false,
            supports_ask_queries: true,
            catch_all: false,
        }
    }

    #[test]
    fn add_member_without_evaluator_errors_for_local_kinds() {
        let manager = FederationManager::new(EngineConfig::default());
        let result = manager.add_member(&local_member("store"), None);
        assert!(matches!(result, Err(ConfigError::MissingLocalEvaluator { .. })));
    }

    #[test]
    fn add_member_without_location_errors_for_remote_kinds() {
        let manager = FederationManager::new(EngineConfig::default());
        let mut member = local_member("endpoint");
        member.endpoint_type = EndpointType::SparqlEndpoint;
        let result = manager.add_member(&member, None);
        assert!(matches!(result, Err(ConfigError::MissingLocation { .. })));
    }

    #[test]
    fn add_member_without_ask_support_is_rejected_when_fallback_disallowed() {
        let mut config = EngineConfig::default();
        config.allow_ask_fallback = false;
        let manager = FederationManager::new(config);
        let mut member = local_member("endpoint");
        member.endpoint_type = EndpointType::SparqlEndpoint;
        member.location = Some("http://example.com/sparql".to_owned());
        member.supports_ask_queries = false;
        let result = manager.add_member(&member, None);
        assert!(matches!(result, Err(ConfigError::AskFallbackDisallowed { .. })));
    }

    #[test]
    fn add_member_without_ask_support_is_allowed_when_fallback_allowed() {
        let manager = FederationManager::new(EngineConfig::default());
        let mut member = local_member("endpoint");
        member.endpoint_type = EndpointType::SparqlEndpoint;
        member.location = Some("http://example.com/sparql".to_owned());
        member.supports_ask_queries = false;
        let result = manager.add_member(&member, None);
        assert!(result.is_ok());
    }

    #[test]
    fn prepare_and_execute_a_simple_select() {
        let manager = FederationManager::new(EngineConfig::default());
        let evaluator: Arc<dyn LocalEvaluator> = Arc::new(FixedRows(vec![row("o", "x")]));
        manager.add_member(&local_member("e1"), Some(evaluator)).unwrap();
        let sparql = "SELECT ?o WHERE { ?s <http://example.com/p> ?o }";
        let prepared = manager.prepare_query(sparql, Duration::from_secs(5)).unwrap();
        assert_eq!(manager.in_flight_count(), 1);
        let rows: Vec<Bindings> = manager.execute(prepared).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(manager.in_flight_count(), 0);
        manager.shutdown(Duration::from_millis(50));
    }

    #[test]
    fn unplannable_query_form_is_rejected() {
        let manager = FederationManager::new(EngineConfig::default());
        let result = manager.prepare_query("ASK { ?s ?p ?o }", Duration::from_secs(5));
        assert!(matches!(result, Err(FederationError::Parse(ParseError::Unplannable))));
        manager.shutdown(Duration::from_millis(10));
    }

    #[test]
    fn dropping_the_result_stream_early_aborts_the_query() {
        let manager = FederationManager::new(EngineConfig::default());
        let evaluator: Arc<dyn LocalEvaluator> = Arc::new(FixedRows(vec![row("o", "x"), row("o", "y")]));
        manager.add_member(&local_member("e1"), Some(evaluator)).unwrap();
        let prepared = manager.prepare_query("SELECT ?o WHERE { ?s <http://example.com/p> ?o }", Duration::from_secs(5)).unwrap();
        let stream = manager.execute(prepared).unwrap();
        drop(stream);
        assert_eq!(manager.in_flight_count(), 0);
        manager.shutdown(Duration::from_millis(50));
    }
}
