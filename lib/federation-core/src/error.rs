use crate::model::EndpointId;
use std::time::Duration;

/// Error raised while loading federation-member or engine configuration.
///
/// Configuration errors are always fatal at startup (§7): they are surfaced before any query
/// is accepted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("federation member {id} has no location configured")]
    MissingLocation { id: String },
    #[error("unknown endpoint type {type_name} for member {id}")]
    UnknownEndpointType { id: String, type_name: String },
    #[error("member {id} is a co-located store and needs a LocalEvaluator supplied by the embedding application")]
    MissingLocalEvaluator { id: String },
    #[error("member {id} does not support ASK queries and `allow_ask_fallback` is disabled, so it cannot be registered")]
    AskFallbackDisallowed { id: String },
}

/// Error raised while parsing SPARQL query text.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed SPARQL query: {0}")]
    Sparql(#[from] spargebra::SparqlSyntaxError),
    #[error("query has no WHERE clause the engine can plan over")]
    Unplannable,
}

/// Error raised during source selection (§4.3) or algebra rewriting (§4.4).
#[derive(Debug, thiserror::Error)]
pub enum OptimizationError {
    #[error("source selection did not complete within {budget:?} (query {query_id})")]
    Timeout { query_id: u64, budget: Duration },
    #[error("probe of endpoint {endpoint} failed: {source}")]
    ProbeFailed {
        endpoint: EndpointId,
        #[source]
        source: Box<EvaluationError>,
    },
}

/// Error raised while evaluating the federation algebra (§4.7) or talking to a triple source.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("remote endpoint {endpoint} returned an error: {message}")]
    Remote { endpoint: EndpointId, message: String },
    #[error("endpoint {endpoint} connection failed even after repair: {source}")]
    ConnectionFailed {
        endpoint: EndpointId,
        #[source]
        source: reqwest::Error,
    },
    #[error("binding type mismatch for variable ?{variable}: {detail}")]
    BindingMismatch { variable: String, detail: String },
    #[error("query {query_id} was cancelled")]
    Cancelled { query_id: u64 },
}

impl EvaluationError {
    /// The endpoint this error is attributable to, if any — used to route a diagnostic through
    /// [`crate::scheduler::ExecutorControl::toss`] without losing which member caused it.
    pub fn endpoint(&self) -> Option<EndpointId> {
        match self {
            EvaluationError::Remote { endpoint, .. } | EvaluationError::ConnectionFailed { endpoint, .. } => Some(endpoint.clone()),
            EvaluationError::BindingMismatch { .. } | EvaluationError::Cancelled { .. } => None,
        }
    }
}

/// Top-level error type returned to CLI / embedding callers.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Optimization(#[from] OptimizationError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

pub type Result<T, E = FederationError> = std::result::Result<T, E>;
