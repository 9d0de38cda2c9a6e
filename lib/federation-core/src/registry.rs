use crate::model::{Endpoint, EndpointId};
use crate::source::TripleSource;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One federation member's identity plus its runtime state (§3 Endpoint: "immutable identity...
/// + mutable runtime state"). The identity fields never change after construction; `initialized`
/// and `triple_source` are the mutable half.
struct RegisteredEndpoint {
    endpoint: Endpoint,
    initialized: AtomicBool,
    triple_source: Arc<dyn TripleSource>,
}

/// Owns every federation member for the lifetime of the engine instance (§4.8, §9 "forbid
/// globals"). Multiple queries share one registry and, through it, one triple source per
/// endpoint — exactly the "multiple queries share one endpoint" rule from §3.
#[derive(Default)]
pub struct EndpointRegistry {
    members: DashMap<EndpointId, RegisteredEndpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a member and immediately calls `initialize()` (§3 lifecycle): the factory that
    /// built `triple_source` from configuration already opened whatever connection pool the
    /// source type needs, so registration and initialization happen together here rather than
    /// as two separately-callable steps.
    pub fn register(&self, endpoint: Endpoint, triple_source: Arc<dyn TripleSource>) {
        self.members.insert(
            endpoint.id.clone(),
            RegisteredEndpoint {
                endpoint,
                initialized: AtomicBool::new(true),
                triple_source,
            },
        );
    }

    pub fn endpoint(&self, id: &EndpointId) -> Option<Endpoint> {
        self.members.get(id).map(|entry| entry.endpoint.clone())
    }

    pub fn triple_source(&self, id: &EndpointId) -> Option<Arc<dyn TripleSource>> {
        self.members.get(id).and_then(|entry| {
            entry
                .initialized
                .load(Ordering::Acquire)
                .then(|| Arc::clone(&entry.triple_source))
        })
    }

    pub fn is_initialized(&self, id: &EndpointId) -> bool {
        self.members
            .get(id)
            .is_some_and(|entry| entry.initialized.load(Ordering::Acquire))
    }

    pub fn endpoint_ids(&self) -> Vec<EndpointId> {
        self.members.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// `shutdown()` for one member (§3): marks it uninitialized so no new query can obtain its
    /// triple source. The `Arc<dyn TripleSource>` itself is only dropped once every in-flight
    /// query holding a clone finishes with it — this registry never forcibly revokes a source
    /// out from under a running task.
    pub fn shutdown(&self, id: &EndpointId) {
        if let Some(entry) = self.members.get(id) {
            entry.initialized.store(false, Ordering::Release);
        }
    }

    /// Shuts every member down (§4.8 federation manager `shutdown()`).
    pub fn shutdown_all(&self) {
        for entry in self.members.iter() {
            entry.initialized.store(false, Ordering::Release);
        }
    }
}
