//! Renders algebra fragments back to SPARQL text for shipping to remote endpoints.
//!
//! This crate treats `spargebra` as the authority on SPARQL syntax (§1) but that crate parses
//! text into algebra, not the reverse; the federation engine needs the reverse direction for
//! exclusive groups, ASK probes and bound-join `VALUES` blocks, so a small, purpose-built
//! renderer lives here rather than inside `spargebra` itself.

use crate::model::Bindings;
use oxrdf::{Literal, NamedNode, Term, Variable};
use spargebra::algebra::Expression;
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};
use std::fmt::Write as _;

fn write_named_node(out: &mut String, node: &NamedNode) {
    let _ = write!(out, "<{}>", node.as_str());
}

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

fn write_literal(out: &mut String, literal: &Literal) {
    let _ = write!(out, "\"{}\"", literal.value().replace('\\', "\\\\").replace('"', "\\\""));
    if let Some(language) = literal.language() {
        let _ = write!(out, "@{language}");
    } else if literal.datatype().as_str() != XSD_STRING {
        out.push_str("^^");
        write_named_node(out, &literal.datatype().into_owned());
    }
}

fn write_term_pattern(out: &mut String, term: &TermPattern) {
    match term {
        TermPattern::NamedNode(n) => write_named_node(out, n),
        TermPattern::BlankNode(b) => {
            let _ = write!(out, "_:{}", b.as_str());
        }
        TermPattern::Literal(l) => write_literal(out, l),
        TermPattern::Variable(v) => {
            let _ = write!(out, "?{}", v.as_str());
        }
    }
}

fn write_predicate_pattern(out: &mut String, predicate: &NamedNodePattern) {
    match predicate {
        NamedNodePattern::NamedNode(n) => write_named_node(out, n),
        NamedNodePattern::Variable(v) => {
            let _ = write!(out, "?{}", v.as_str());
        }
    }
}

fn write_triple_pattern(out: &mut String, pattern: &TriplePattern) {
    write_term_pattern(out, &pattern.subject);
    out.push(' ');
    write_predicate_pattern(out, &pattern.predicate);
    out.push(' ');
    write_term_pattern(out, &pattern.object);
    out.push_str(" .\n");
}

/// `ASK { pattern }` (§4.1).
pub fn render_ask(pattern: &TriplePattern) -> String {
    let mut out = String::from("ASK {\n");
    write_triple_pattern(&mut out, pattern);
    out.push('}');
    out
}

/// `SELECT ... LIMIT 1` fallback when an endpoint does not support ASK (§4.1).
pub fn render_probe_select(pattern: &TriplePattern) -> String {
    let mut out = String::from("SELECT * WHERE {\n");
    write_triple_pattern(&mut out, pattern);
    out.push_str("} LIMIT 1");
    out
}

/// A single exclusive group / exclusive statement (§4.4, §4.7): one `SELECT` over a conjunction
/// of patterns, optionally with a pushed-down filter (§4.4 pass 2).
pub fn render_select(patterns: &[TriplePattern], filter: Option<&str>) -> String {
    let mut out = String::from("SELECT * WHERE {\n");
    for pattern in patterns {
        write_triple_pattern(&mut out, pattern);
    }
    if let Some(filter) = filter {
        let _ = write!(out, "FILTER({filter})\n");
    }
    out.push('}');
    out
}

/// Renders a pushed-down filter expression (§4.4 pass 2) back to SPARQL text for shipping
/// alongside an exclusive group's `SELECT`. Only reached for expressions
/// `rewrite::expression_variables` already proved coverable by the group's own patterns, so
/// every variant it recognises must render here too.
pub fn render_expression(expr: &Expression) -> String {
    match expr {
        Expression::NamedNode(n) => {
            let mut out = String::new();
            write_named_node(&mut out, n);
            out
        }
        Expression::Literal(l) => {
            let mut out = String::new();
            write_literal(&mut out, l);
            out
        }
        Expression::Variable(v) => format!("?{}", v.as_str()),
        Expression::Bound(v) => format!("BOUND(?{})", v.as_str()),
        Expression::Not(inner) => format!("(!{})", render_expression(inner)),
        Expression::UnaryPlus(inner) => format!("(+{})", render_expression(inner)),
        Expression::UnaryMinus(inner) => format!("(-{})", render_expression(inner)),
        Expression::Or(l, r) => format!("({} || {})", render_expression(l), render_expression(r)),
        Expression::And(l, r) => format!("({} && {})", render_expression(l), render_expression(r)),
        Expression::Equal(l, r) => format!("({} = {})", render_expression(l), render_expression(r)),
        Expression::SameTerm(l, r) => format!("sameTerm({}, {})", render_expression(l), render_expression(r)),
        Expression::Greater(l, r) => format!("({} > {})", render_expression(l), render_expression(r)),
        Expression::GreaterOrEqual(l, r) => format!("({} >= {})", render_expression(l), render_expression(r)),
        Expression::Less(l, r) => format!("({} < {})", render_expression(l), render_expression(r)),
        Expression::LessOrEqual(l, r) => format!("({} <= {})", render_expression(l), render_expression(r)),
        Expression::Add(l, r) => format!("({} + {})", render_expression(l), render_expression(r)),
        Expression::Subtract(l, r) => format!("({} - {})", render_expression(l), render_expression(r)),
        Expression::Multiply(l, r) => format!("({} * {})", render_expression(l), render_expression(r)),
        Expression::Divide(l, r) => format!("({} / {})", render_expression(l), render_expression(r)),
        Expression::In(base, options) => format!(
            "({} IN ({}))",
            render_expression(base),
            options.iter().map(render_expression).collect::<Vec<_>>().join(", ")
        ),
        Expression::If(cond, then, otherwise) => {
            format!("IF({}, {}, {})", render_expression(cond), render_expression(then), render_expression(otherwise))
        }
        Expression::Coalesce(options) => {
            format!("COALESCE({})", options.iter().map(render_expression).collect::<Vec<_>>().join(", "))
        }
        Expression::FunctionCall(function, args) => {
            format!("{}({})", function, args.iter().map(render_expression).collect::<Vec<_>>().join(", "))
        }
        // Never actually reached: `expression_variables` treats `EXISTS` as opaque, so
        // `push_down_filter` never attaches one of these to a remote group.
        Expression::Exists(_) => "true".to_owned(),
    }
}

fn write_term(out: &mut String, term: &Term) {
    match term {
        Term::NamedNode(n) => write_named_node(out, n),
        Term::BlankNode(b) => {
            let _ = write!(out, "_:{}", b.as_str());
        }
        Term::Literal(l) => write_literal(out, l),
    }
}

/// A bound-join batch (§4.7): the right-hand patterns plus a `VALUES` block carrying one row
/// per left-side tuple, each row tagged with the hidden `?__row` index used to re-associate
/// right-side results with their originating left tuple.
pub fn render_bound_join_batch(patterns: &[TriplePattern], batch: &[(usize, Bindings)], row_variable: &Variable) -> String {
    let mut bound_vars: Vec<Variable> = Vec::new();
    for (_, bindings) in batch {
        for variable in bindings.variables() {
            if !bound_vars.contains(variable) {
                bound_vars.push(variable.clone());
            }
        }
    }

    let mut out = String::from("SELECT * WHERE {\n");
    for pattern in patterns {
        write_triple_pattern(&mut out, pattern);
    }
    let _ = write!(out, "VALUES (?{} {}) {{\n", row_variable.as_str(), bound_vars.iter().map(|v| format!("?{}", v.as_str())).collect::<Vec<_>>().join(" "));
    for (row_index, bindings) in batch {
        out.push('(');
        let _ = write!(out, "{row_index}");
        for variable in &bound_vars {
            out.push(' ');
            match bindings.get(variable) {
                Some(term) => write_term(&mut out, term),
                None => out.push_str("UNDEF"),
            }
        }
        out.push_str(")\n");
    }
    out.push_str("}\n}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::Variable;

    #[test]
    fn ask_renders_single_pattern() {
        let pattern = TriplePattern {
            subject: TermPattern::Variable(Variable::new("s").unwrap()),
            predicate: NamedNodePattern::NamedNode(NamedNode::new("http://www.w3.org/1999/02/22-rdf-syntax-ns#type").unwrap()),
            object: TermPattern::NamedNode(NamedNode::new("http://example.com/Thing").unwrap()),
        };
        let text = render_ask(&pattern);
        assert!(text.starts_with("ASK {"));
        assert!(text.contains("<http://example.com/Thing>"));
    }

    #[test]
    fn bound_join_batch_includes_every_row() {
        let pattern = TriplePattern {
            subject: TermPattern::Variable(Variable::new("loc").unwrap()),
            predicate: NamedNodePattern::NamedNode(NamedNode::new("http://example.com/country").unwrap()),
            object: TermPattern::Variable(Variable::new("country").unwrap()),
        };
        let mut b0 = Bindings::new();
        b0.insert(Variable::new("loc").unwrap(), Term::NamedNode(NamedNode::new("http://example.com/l0").unwrap()));
        let mut b1 = Bindings::new();
        b1.insert(Variable::new("loc").unwrap(), Term::NamedNode(NamedNode::new("http://example.com/l1").unwrap()));
        let row_var = Variable::new("__row").unwrap();
        let text = render_bound_join_batch(&[pattern], &[(0, b0), (1, b1)], &row_var);
        assert!(text.contains("l0"));
        assert!(text.contains("l1"));
        assert!(text.contains("VALUES"));
    }
}
