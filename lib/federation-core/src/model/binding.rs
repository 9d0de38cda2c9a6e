use oxrdf::{Term, Variable};

/// An immutable variable→value mapping: one SPARQL solution row (§3 Binding set).
///
/// Stored as a small sorted vector rather than a hash map: BGPs in practice bind a handful of
/// variables, and a vector wins on both allocation count and cache locality at that size —
/// the same reasoning `sparesults::QuerySolution` rows follow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(Vec<(Variable, Term)>);

impl Bindings {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn single(variable: Variable, value: Term) -> Self {
        Self(vec![(variable, value)])
    }

    pub fn get(&self, variable: &Variable) -> Option<&Term> {
        self.0.iter().find(|(v, _)| v == variable).map(|(_, t)| t)
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.0.iter().map(|(v, _)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.0.iter().map(|(v, t)| (v, t))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, variable: Variable, value: Term) {
        if let Some(slot) = self.0.iter_mut().find(|(v, _)| *v == variable) {
            slot.1 = value;
        } else {
            self.0.push((variable, value));
        }
    }

    /// Restrict to a subset of variables (§4.7 Projection): does not change which row this is,
    /// only which variables remain visible.
    pub fn project(&self, keep: &[Variable]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(v, _)| keep.contains(v))
                .cloned()
                .collect(),
        )
    }

    /// Merge two binding sets, checking consistency on shared variables (§3 Binding set,
    /// §4.7 NJoin). Returns `None` when a shared variable is bound to different values in each
    /// side — the pair is then dropped from the join's output rather than merged.
    pub fn merge(&self, other: &Bindings) -> Option<Bindings> {
        let mut merged = self.clone();
        for (variable, value) in &other.0 {
            match merged.get(variable) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => merged.insert(variable.clone(), value.clone()),
            }
        }
        Some(merged)
    }
}

impl FromIterator<(Variable, Term)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (Variable, Term)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (variable, term) in iter {
            bindings.insert(variable, term);
        }
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Literal, NamedNode};

    fn var(name: &str) -> Variable {
        Variable::new(name).unwrap()
    }

    fn lit(value: &str) -> Term {
        Term::Literal(Literal::new_simple_literal(value))
    }

    #[test]
    fn merge_compatible_rows() {
        let mut a = Bindings::new();
        a.insert(var("x"), lit("1"));
        let mut b = Bindings::new();
        b.insert(var("y"), lit("2"));
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(&var("x")), Some(&lit("1")));
        assert_eq!(merged.get(&var("y")), Some(&lit("2")));
    }

    #[test]
    fn merge_incompatible_rows_drops() {
        let mut a = Bindings::new();
        a.insert(var("x"), lit("1"));
        let mut b = Bindings::new();
        b.insert(var("x"), lit("2"));
        assert!(a.merge(&b).is_none());
    }

    #[test]
    fn project_keeps_only_requested_variables() {
        let mut a = Bindings::new();
        a.insert(var("x"), lit("1"));
        a.insert(var("y"), lit("2"));
        let projected = a.project(&[var("x")]);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected.get(&var("x")), Some(&lit("1")));
        assert_eq!(projected.get(&var("y")), None);
    }

    #[test]
    fn named_node_terms_merge_correctly() {
        let mut a = Bindings::new();
        a.insert(var("s"), Term::NamedNode(NamedNode::new("http://example.com/a").unwrap()));
        let mut b = Bindings::new();
        b.insert(var("s"), Term::NamedNode(NamedNode::new("http://example.com/a").unwrap()));
        assert!(a.merge(&b).is_some());
    }
}
