//! Configuration loading (§6): two separate TOML documents, one listing federation members and
//! one tuning the engine itself, mirroring the split between "what the federation talks to" and
//! "how the engine runs" that the CLI exposes as `-d <members.toml>` / `-c <engine.toml>`.

use crate::error::ConfigError;
use crate::model::EndpointType;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// One `[[member]]` table in a members file.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
    pub location: Option<String>,
    #[serde(default)]
    pub writable: bool,
    #[serde(default = "default_true")]
    pub supports_ask_queries: bool,
    #[serde(default)]
    pub catch_all: bool,
}

fn default_true() -> bool {
    true
}

/// The full set of federation members (§3 Endpoint), loaded from one TOML document:
///
/// ```toml
/// [[member]]
/// id = "dbpedia"
/// name = "DBpedia"
/// type = "SparqlEndpoint"
/// location = "https://dbpedia.org/sparql"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FederationMembers {
    #[serde(rename = "member", default)]
    pub members: Vec<MemberConfig>,
}

impl FederationMembers {
    pub fn from_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Engine-wide tuning knobs (§4.6, §4.7, §4.2, §2.2), loaded from a second TOML document kept
/// separate from the member list so operators can tune one without touching the other.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads in the join pool (§4.6).
    pub join_worker_threads: usize,
    /// Worker threads in the union pool (§4.6) — kept smaller by default so union fan-out never
    /// starves the joins that depend on it.
    pub union_worker_threads: usize,
    /// Rows per batch in a bound join (§4.4 pass 3, §4.7).
    pub bound_join_block_size: usize,
    /// Per-query wall-clock budget unless a caller overrides it explicitly.
    #[serde(rename = "default_max_execution_time_secs")]
    pub default_max_execution_time_secs: u64,
    /// Soft cap on distinct subqueries tracked by the source-selection cache. `None` (the
    /// default) never evicts (§9 Open Question, resolved in DESIGN.md).
    pub source_selection_cache_capacity: Option<usize>,
    /// Wires the `tracing`-backed statistics sink in place of the no-op default (§2.2).
    pub enable_monitoring: bool,
    /// Whether a remote member without `supportsAskQueries` is still usable at all
    /// (`FederationManager::add_member` falls back to a `SELECT ... LIMIT 1` probe for it), or
    /// whether such members should be rejected at registration time instead.
    pub allow_ask_fallback: bool,
    /// Grace period before a shutdown in progress force-aborts queries that are still running
    /// (§4.8, §2.2 "graceful partial shutdown").
    #[serde(rename = "shutdown_grace_period_secs")]
    pub shutdown_grace_period_secs: u64,
}

impl EngineConfig {
    pub fn default_max_execution_time(&self) -> Duration {
        Duration::from_secs(self.default_max_execution_time_secs)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
    }

    pub fn from_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            join_worker_threads: 8,
            union_worker_threads: 4,
            bound_join_block_size: 15,
            default_max_execution_time_secs: 30,
            source_selection_cache_capacity: None,
            enable_monitoring: false,
            allow_ask_fallback: true,
            shutdown_grace_period_secs: 5,
        }
    }
}
