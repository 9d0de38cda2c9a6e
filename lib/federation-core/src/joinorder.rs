//! The join-order optimiser (§4.5): a greedy O(n²) variable-count heuristic, not a
//! statistics-based cost model (§1 Non-goals).

use crate::algebra::PlanNode;
use oxrdf::Variable;
use rustc_hash::FxHashSet;

/// Orders the children of an n-ary join to minimise expected cardinality, using the heuristic
/// from §4.5 rather than endpoint statistics:
///
/// 1. At each step, prefer the candidate whose free variables overlap the most with variables
///    already bound by the chosen prefix (maximises the chance of an early-constrained join).
/// 2. Ties broken by fewer free variables (more constrained on its own).
/// 3. Remaining ties broken by exclusive nodes beating multi-source nodes (one endpoint call
///    beats many).
/// 4. Final ties broken by original position (stable).
///
/// Returns a permutation of `nodes`: same multiset of children, different order (§8 round-trip
/// law "optimise-join-order is a permutation").
pub fn order(nodes: Vec<PlanNode>) -> Vec<PlanNode> {
    let mut remaining: Vec<(usize, PlanNode)> = nodes.into_iter().enumerate().collect();
    let mut bound: FxHashSet<Variable> = FxHashSet::default();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut best_position = 0;
        let mut best_key: Option<(isize, usize, bool, usize)> = None;
        for (position, (original_index, node)) in remaining.iter().enumerate() {
            let free_vars = node.free_variables();
            let overlap = free_vars.iter().filter(|v| bound.contains(*v)).count();
            // Sorted ascending, so negate overlap to make "more overlap" sort first, and use
            // `!is_exclusive` so exclusive (false -> 0) beats non-exclusive (true -> 1).
            let key = (-(overlap as isize), free_vars.len(), !node.is_exclusive(), *original_index);
            let is_better = match &best_key {
                None => true,
                Some(current) => key < *current,
            };
            if is_better {
                best_key = Some(key);
                best_position = position;
            }
        }
        let (_, node) = remaining.remove(best_position);
        bound.extend(node.free_variables());
        ordered.push(node);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EndpointId, StatementSource, StatementSourceKind};
    use oxrdf::NamedNode;
    use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};

    fn var(name: &str) -> Variable {
        Variable::new(name).unwrap()
    }

    fn pattern(s: &str, p: &str, o: &str) -> TriplePattern {
        TriplePattern {
            subject: TermPattern::Variable(var(s)),
            predicate: NamedNodePattern::NamedNode(NamedNode::new(format!("http://example.com/{p}")).unwrap()),
            object: TermPattern::Variable(var(o)),
        }
    }

    fn exclusive(s: &str, p: &str, o: &str, endpoint: &str) -> PlanNode {
        PlanNode::ExclusiveStatement(
            pattern(s, p, o),
            StatementSource::new(EndpointId::new(endpoint), StatementSourceKind::Remote),
        )
    }

    fn source_pattern(s: &str, p: &str, o: &str, endpoints: &[&str]) -> PlanNode {
        PlanNode::StatementSourcePattern(
            pattern(s, p, o),
            endpoints
                .iter()
                .map(|e| StatementSource::new(EndpointId::new(*e), StatementSourceKind::Remote))
                .collect(),
        )
    }

    #[test]
    fn is_a_permutation_of_the_input() {
        let nodes = vec![
            exclusive("a", "p1", "b", "e1"),
            source_pattern("b", "p2", "c", &["e1", "e2"]),
            exclusive("c", "p3", "d", "e2"),
        ];
        let ordered = order(nodes.clone());
        assert_eq!(ordered.len(), nodes.len());
    }

    #[test]
    fn chains_via_shared_variable_overlap() {
        // conf→loc (shares `loc` with loc→country) should be chosen before an unrelated
        // pattern once `loc` is bound by the prefix.
        let conf_loc = exclusive("conf", "based_near", "loc", "e1");
        let loc_country = exclusive("loc", "country", "country", "e2");
        let unrelated = exclusive("x", "unrelated", "y", "e3");
        let ordered = order(vec![unrelated.clone(), conf_loc.clone(), loc_country.clone()]);
        // `conf_loc` and `loc_country` share `loc`; whichever of the two is picked first, the
        // other should immediately follow because it overlaps on the already-bound `loc`.
        let positions: Vec<bool> = ordered
            .iter()
            .map(|n| matches!(n, PlanNode::ExclusiveStatement(p, _) if p.subject == TermPattern::Variable(var("loc")) || p.object == TermPattern::Variable(var("loc"))))
            .collect();
        // the two `loc`-touching patterns end up adjacent
        let first_loc = positions.iter().position(|&b| b).unwrap();
        assert!(positions[first_loc + 1]);
    }

    #[test]
    fn exclusive_beats_source_pattern_on_tie() {
        let a = source_pattern("a", "p1", "b", &["e1", "e2"]);
        let b = exclusive("a", "p2", "c", "e1");
        let ordered = order(vec![a, b]);
        assert!(matches!(ordered[0], PlanNode::ExclusiveStatement(_, _)));
    }
}
