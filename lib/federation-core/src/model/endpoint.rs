use std::fmt;
use std::sync::Arc;
use url::Url;

/// The equality key for a federation member (§3 Endpoint).
///
/// Cheap to clone: every `EndpointId` is a reference-counted string, since it is used as a
/// hash-map key across the registry, the cache, and every in-flight `QueryInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(Arc<str>);

impl EndpointId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EndpointId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// The four member kinds recognised by the federation-member config (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum EndpointType {
    SparqlEndpoint,
    RemoteRepository,
    NativeStore,
    RemoteResolvable,
}

impl EndpointType {
    /// Whether this endpoint kind talks SPARQL text over the wire (REMOTE) or evaluates an
    /// in-memory algebra directly (LOCAL) — see §3 Statement source and §4.1
    /// `usePreparedQuery()`.
    pub fn is_remote(self) -> bool {
        matches!(self, Self::SparqlEndpoint | Self::RemoteResolvable)
    }
}

/// The immutable identity of a federation member (§3). Runtime state — the opened connection,
/// the triple-source handle — is not part of this type; it is held alongside this value by
/// [`crate::registry::EndpointRegistry`], since it has its own lifecycle independent of the
/// member's static identity.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    pub endpoint_type: EndpointType,
    pub location: Url,
    /// Whether this endpoint is excluded from write operations. The core described here never
    /// writes (§1 Non-goals), but the flag is part of the member's identity as configured.
    pub writable: bool,
    /// `supportsAskQueries` from the member config extras (§6): if false, `ask()` falls back to
    /// `SELECT ... LIMIT 1` (§4.1).
    pub supports_ask_queries: bool,
    /// A catch-all / default-graph member (§2.2): never short-circuited out of source selection
    /// by a cached `NONE`, so it is re-probed on every query instead of being permanently
    /// excluded the first time it happens to miss a pattern. Off by default.
    pub catch_all: bool,
}

impl Endpoint {
    pub fn new(id: impl Into<EndpointId>, name: impl Into<String>, endpoint_type: EndpointType, location: Url) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            endpoint_type,
            location,
            writable: false,
            supports_ask_queries: true,
            catch_all: false,
        }
    }

    pub fn with_catch_all(mut self, catch_all: bool) -> Self {
        self.catch_all = catch_all;
        self
    }
}
