//! Query planning and parallel execution engine for federated SPARQL.
//!
//! This crate takes an already-parsed SPARQL algebra tree (via `spargebra`) and a registry of
//! federation members, and turns it into a rewritten, source-annotated execution plan that is
//! then evaluated by a bounded, pipelined thread-pool scheduler. It does not parse SPARQL text
//! itself, does not implement the RDF/SPARQL client used to talk to any one remote endpoint's
//! wire protocol beyond plain HTTP, and does not persist data — those are the concerns of the
//! crates this one is embedded alongside.

pub mod algebra;
pub mod cache;
pub mod config;
pub mod error;
pub mod eval;
pub mod joinorder;
pub mod manager;
pub mod model;
pub mod query;
pub mod registry;
pub mod rewrite;
pub mod scheduler;
pub mod selection;
pub mod source;
pub mod sparql_text;
pub mod stats;

pub use config::{EngineConfig, FederationMembers, MemberConfig};
pub use error::{ConfigError, EvaluationError, FederationError, OptimizationError, ParseError, Result};
pub use manager::{FederationManager, PreparedQuery, QueryResultStream};
pub use model::{Assurance, Bindings, Endpoint, EndpointId, EndpointType, StatementSource, StatementSourceKind};
pub use query::{AbortReason, QueryInfo, QueryStats};
pub use stats::{NoopStatisticsSink, QueryStatsSnapshot, StatisticsSink, TracingStatisticsSink};
