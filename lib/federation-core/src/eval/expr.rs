//! Local filter-expression evaluation (§4.7 Filter): computes the effective boolean value of a
//! value expression over one binding, dropping the row on `None` (unbound operand, unsupported
//! expression shape, or a type the engine doesn't compare) rather than treating it as an error.
//!
//! This is deliberately not a general SPARQL expression evaluator — full builtin-function and
//! datatype coverage belongs to the SPARQL engine that produced the algebra this crate consumes
//! (§1 Non-goals), not to the federation layer. It covers exactly the operators
//! `rewrite::collect_expression_variables` already recognises, so a filter this module can't
//! evaluate was never a candidate for remote push-down either.

use crate::model::Bindings;
use oxrdf::Term;
use spargebra::algebra::Expression;
use std::cmp::Ordering;

/// Computes the effective boolean value of `expr` over `row`. Returns `None` when the
/// expression touches an unbound variable or an operator this module doesn't support; the
/// caller treats that the same as `Some(false)` — the row is dropped.
pub fn effective_boolean_value(expr: &Expression, row: &Bindings) -> Option<bool> {
    match expr {
        Expression::Bound(variable) => Some(row.get(variable).is_some()),
        Expression::Not(inner) => effective_boolean_value(inner, row).map(|value| !value),
        Expression::And(left, right) => Some(effective_boolean_value(left, row)? && effective_boolean_value(right, row)?),
        Expression::Or(left, right) => Some(effective_boolean_value(left, row)? || effective_boolean_value(right, row)?),
        Expression::Equal(left, right) => Some(resolve(left, row)? == resolve(right, row)?),
        Expression::SameTerm(left, right) => Some(resolve(left, row)? == resolve(right, row)?),
        Expression::Greater(left, right) => compare(left, right, row).map(|ordering| ordering == Ordering::Greater),
        Expression::GreaterOrEqual(left, right) => compare(left, right, row).map(|ordering| ordering != Ordering::Less),
        Expression::Less(left, right) => compare(left, right, row).map(|ordering| ordering == Ordering::Less),
        Expression::LessOrEqual(left, right) => compare(left, right, row).map(|ordering| ordering != Ordering::Greater),
        Expression::If(condition, then, otherwise) => {
            if effective_boolean_value(condition, row)? {
                effective_boolean_value(then, row)
            } else {
                effective_boolean_value(otherwise, row)
            }
        }
        Expression::Variable(_) | Expression::Literal(_) => term_truthy(&resolve(expr, row)?),
        // Unsupported shape: arithmetic, `IN`, `COALESCE`, function calls, `EXISTS`. Keeping
        // the row would risk silently including what should have been filtered out, so the row
        // is dropped instead.
        _ => None,
    }
}

fn resolve(expr: &Expression, row: &Bindings) -> Option<Term> {
    match expr {
        Expression::NamedNode(node) => Some(Term::NamedNode(node.clone())),
        Expression::Literal(literal) => Some(Term::Literal(literal.clone())),
        Expression::Variable(variable) => row.get(variable).cloned(),
        _ => None,
    }
}

fn compare(left: &Expression, right: &Expression, row: &Bindings) -> Option<Ordering> {
    match (resolve(left, row)?, resolve(right, row)?) {
        (Term::Literal(a), Term::Literal(b)) => match (a.value().parse::<f64>(), b.value().parse::<f64>()) {
            (Ok(x), Ok(y)) => x.partial_cmp(&y),
            _ => Some(a.value().cmp(b.value())),
        },
        _ => None,
    }
}

fn term_truthy(term: &Term) -> Option<bool> {
    match term {
        Term::Literal(literal) => Some(!literal.value().is_empty() && literal.value() != "false" && literal.value() != "0"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Literal, NamedNode, Variable};

    fn var(name: &str) -> Variable {
        Variable::new(name).unwrap()
    }

    #[test]
    fn bound_checks_variable_presence() {
        let mut row = Bindings::new();
        row.insert(var("x"), Term::Literal(Literal::new_simple_literal("1")));
        assert_eq!(effective_boolean_value(&Expression::Bound(var("x")), &row), Some(true));
        assert_eq!(effective_boolean_value(&Expression::Bound(var("y")), &row), Some(false));
    }

    #[test]
    fn numeric_comparison_prefers_numeric_order() {
        let mut row = Bindings::new();
        row.insert(var("x"), Term::Literal(Literal::new_simple_literal("9")));
        row.insert(var("y"), Term::Literal(Literal::new_simple_literal("10")));
        let expr = Expression::Less(Box::new(Expression::Variable(var("x"))), Box::new(Expression::Variable(var("y"))));
        assert_eq!(effective_boolean_value(&expr, &row), Some(true));
    }

    #[test]
    fn named_node_equality() {
        let mut row = Bindings::new();
        row.insert(var("s"), Term::NamedNode(NamedNode::new("http://example.com/a").unwrap()));
        let expr = Expression::Equal(
            Box::new(Expression::Variable(var("s"))),
            Box::new(Expression::NamedNode(NamedNode::new("http://example.com/a").unwrap())),
        );
        assert_eq!(effective_boolean_value(&expr, &row), Some(true));
    }

    #[test]
    fn unsupported_shape_returns_none() {
        let row = Bindings::new();
        let expr = Expression::Coalesce(vec![Expression::Variable(var("x"))]);
        assert_eq!(effective_boolean_value(&expr, &row), None);
    }
}
