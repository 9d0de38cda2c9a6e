use crate::model::{Assurance, EndpointId, SubQuery};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// The `(subquery, endpoint) → assurance` cache that short-circuits source selection (§4.2).
///
/// A process-wide, read-mostly concurrent map with no eviction by default. Updates are
/// monotone: [`Assurance::merge`] guarantees a probe can never downgrade a previously recorded
/// positive to `None` within — or across — queries (§3, §8 cache monotonicity).
pub struct SourceSelectionCache {
    entries: DashMap<SubQuery, DashMap<EndpointId, CacheSlot>>,
    capacity: Option<usize>,
    clock: AtomicU64,
}

struct CacheSlot {
    assurance: Assurance,
    last_touched: u64,
}

impl SourceSelectionCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            capacity: None,
            clock: AtomicU64::new(0),
        }
    }

    /// Build a cache with a soft cap on the number of distinct subqueries tracked. When the cap
    /// is reached, the least-recently-touched subquery is evicted wholesale (§9 Open Question).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: Some(capacity),
            clock: AtomicU64::new(0),
        }
    }

    /// `canProvideStatements` (§4.2): `PossiblyHasStatements` when unknown.
    pub fn can_provide_statements(&self, subquery: &SubQuery, endpoint: &EndpointId) -> Assurance {
        self.entries
            .get(subquery)
            .and_then(|per_endpoint| per_endpoint.get(endpoint).map(|slot| slot.assurance))
            .unwrap_or(Assurance::PossiblyHasStatements)
    }

    /// `updateEntry` (§4.2): records a probe outcome, merging monotonically with any existing
    /// entry so a definite positive is never overwritten by a negative from the same or a later
    /// probe of the same subquery (§8).
    pub fn update_entry(&self, subquery: &SubQuery, endpoint: &EndpointId, observed: Assurance) {
        self.evict_if_over_capacity(subquery);
        let touched = self.clock.fetch_add(1, Ordering::Relaxed);
        let per_endpoint = self.entries.entry(subquery.clone()).or_default();
        per_endpoint
            .entry(endpoint.clone())
            .and_modify(|slot| {
                slot.assurance = slot.assurance.merge(observed);
                slot.last_touched = touched;
            })
            .or_insert(CacheSlot {
                assurance: observed,
                last_touched: touched,
            });
    }

    fn evict_if_over_capacity(&self, incoming: &SubQuery) {
        let Some(capacity) = self.capacity else {
            return;
        };
        if self.entries.contains_key(incoming) || self.entries.len() < capacity {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .map(|entry| {
                let oldest_touch = entry
                    .value()
                    .iter()
                    .map(|slot| slot.last_touched)
                    .min()
                    .unwrap_or(0);
                (entry.key().clone(), oldest_touch)
            })
            .min_by_key(|(_, touch)| *touch)
            .map(|(key, _)| key);
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SourceSelectionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for CacheSlot {
    fn default() -> Self {
        Self {
            assurance: Assurance::PossiblyHasStatements,
            last_touched: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};

    fn dummy_subquery(label: &str) -> SubQuery {
        let pattern = TriplePattern {
            subject: TermPattern::Variable(oxrdf::Variable::new("s").unwrap()),
            predicate: NamedNodePattern::NamedNode(oxrdf::NamedNode::new(format!("http://example.com/{label}")).unwrap()),
            object: TermPattern::Variable(oxrdf::Variable::new("o").unwrap()),
        };
        SubQuery::from_pattern(&pattern)
    }

    #[test]
    fn unknown_subquery_is_possibly_has_statements() {
        let cache = SourceSelectionCache::new();
        let sq = dummy_subquery("p");
        let e = EndpointId::new("e1");
        assert_eq!(cache.can_provide_statements(&sq, &e), Assurance::PossiblyHasStatements);
    }

    #[test]
    fn positive_is_never_downgraded_to_none() {
        let cache = SourceSelectionCache::new();
        let sq = dummy_subquery("p");
        let e = EndpointId::new("e1");
        cache.update_entry(&sq, &e, Assurance::HasRemoteStatements);
        cache.update_entry(&sq, &e, Assurance::None);
        assert_eq!(cache.can_provide_statements(&sq, &e), Assurance::HasRemoteStatements);
    }

    #[test]
    fn negative_then_positive_upgrades() {
        let cache = SourceSelectionCache::new();
        let sq = dummy_subquery("p");
        let e = EndpointId::new("e1");
        cache.update_entry(&sq, &e, Assurance::None);
        cache.update_entry(&sq, &e, Assurance::HasRemoteStatements);
        assert_eq!(cache.can_provide_statements(&sq, &e), Assurance::HasRemoteStatements);
    }

    #[test]
    fn capacity_evicts_least_recently_touched() {
        let cache = SourceSelectionCache::with_capacity(1);
        let e = EndpointId::new("e1");
        let sq1 = dummy_subquery("one");
        let sq2 = dummy_subquery("two");
        cache.update_entry(&sq1, &e, Assurance::HasRemoteStatements);
        cache.update_entry(&sq2, &e, Assurance::HasRemoteStatements);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.can_provide_statements(&sq1, &e), Assurance::PossiblyHasStatements);
        assert_eq!(cache.can_provide_statements(&sq2, &e), Assurance::HasRemoteStatements);
    }
}
