use crate::error::EvaluationError;
use crate::model::Bindings;
use oxrdf::Triple;
use spargebra::term::TriplePattern;

/// A lazy, closable sequence of solution rows. Closing is implicit: dropping the stream drops
/// whatever resource (HTTP response body, local cursor) it owns, which is the ownership model
/// §9 calls for — "model the stream as the owner of its connection, released on close."
pub type BindingStream = Box<dyn Iterator<Item = Result<Bindings, EvaluationError>> + Send>;

/// A lazy, closable sequence of RDF triples, used by `get_statements` (§4.1).
pub type TripleStream = Box<dyn Iterator<Item = Result<Triple, EvaluationError>> + Send>;

/// The per-endpoint façade every component in this crate talks to instead of a concrete
/// HTTP client or local store (§4.1).
///
/// Implementors must make every produced stream closable and must release the underlying
/// connection on close, even if the consumer stops pulling early — see
/// [`crate::source::buffer::ConsumingBuffer`], which wraps remote sources to guarantee this.
pub trait TripleSource: Send + Sync {
    /// Runs a SPARQL SELECT (already rendered to text or already an in-memory algebra,
    /// depending on [`TripleSource::uses_prepared_query`]), parameterised by `bindings` when
    /// this call is the right side of a [`crate::algebra::PlanNode::BoundJoin`].
    fn evaluate(&self, query_text: &str, bindings: Option<&Bindings>) -> Result<BindingStream, EvaluationError>;

    /// SPARQL ASK, or a `SELECT ... LIMIT 1` fallback when the endpoint does not support ASK
    /// (§4.1, configured via [`crate::model::Endpoint::supports_ask_queries`]).
    fn ask(&self, pattern: &TriplePattern) -> Result<bool, EvaluationError>;

    /// Direct triple-pattern lookup, used by local stores that skip SPARQL text entirely.
    fn get_statements(&self, pattern: &TriplePattern) -> Result<TripleStream, EvaluationError>;

    /// Whether this source accepts SPARQL query text (`true`, remote endpoints) or an
    /// in-memory algebra tree (`false`, co-located stores) — §4.1.
    fn uses_prepared_query(&self) -> bool;
}
