use oxrdf::{BlankNode, Literal, NamedNode};
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};

/// A single `(s,p,o)` slot collapsed to its cache-relevant identity: a bound IRI/blank
/// node/literal keeps its value, a variable collapses to the wildcard (§3 Subquery key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SlotKey {
    Wildcard,
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    Literal(Literal),
}

impl From<&TermPattern> for SlotKey {
    fn from(term: &TermPattern) -> Self {
        match term {
            TermPattern::NamedNode(n) => SlotKey::NamedNode(n.clone()),
            TermPattern::BlankNode(b) => SlotKey::BlankNode(b.clone()),
            TermPattern::Literal(l) => SlotKey::Literal(l.clone()),
            TermPattern::Variable(_) => SlotKey::Wildcard,
        }
    }
}

impl From<&NamedNodePattern> for SlotKey {
    fn from(term: &NamedNodePattern) -> Self {
        match term {
            NamedNodePattern::NamedNode(n) => SlotKey::NamedNode(n.clone()),
            NamedNodePattern::Variable(_) => SlotKey::Wildcard,
        }
    }
}

/// A normalised triple pattern used as a cache key (§3 Subquery key). Two patterns differing
/// only in variable naming — `?a foaf:knows ?b` vs. `?x foaf:knows ?y` — map to the same
/// `SubQuery`, since only the bound slots are part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubQuery {
    subject: SlotKey,
    predicate: SlotKey,
    object: SlotKey,
}

impl SubQuery {
    pub fn from_pattern(pattern: &TriplePattern) -> Self {
        Self {
            subject: SlotKey::from(&pattern.subject),
            predicate: SlotKey::from(&pattern.predicate),
            object: SlotKey::from(&pattern.object),
        }
    }
}
