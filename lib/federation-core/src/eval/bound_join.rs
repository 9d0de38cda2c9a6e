//! Bound-join batch execution (§4.4 pass 3, §4.7): renders one `VALUES`-parameterised remote
//! `SELECT` per batch, then re-associates each returned row with the left tuple that produced it
//! via the hidden `?__row` index `sparql_text::render_bound_join_batch` injects.

use crate::error::EvaluationError;
use crate::model::Bindings;
use crate::source::TripleSource;
use crate::sparql_text::render_bound_join_batch;
use oxrdf::{Term, Variable};
use spargebra::term::TriplePattern;

/// Runs one batch of left tuples against `triple_source`, returning one merged row per
/// compatible (left tuple, remote row) pair. A remote row whose `row_variable` cannot be parsed
/// back to an index into `batch`, or whose other bindings conflict with that tuple's own, is
/// dropped rather than treated as fatal — the same "incompatible rows don't merge" rule
/// [`Bindings::merge`] already applies to plain joins.
pub fn evaluate_batch(
    triple_source: &dyn TripleSource,
    pattern: &TriplePattern,
    batch: &[(usize, Bindings)],
    row_variable: &Variable,
) -> Result<Vec<Bindings>, EvaluationError> {
    let query_text = render_bound_join_batch(std::slice::from_ref(pattern), batch, row_variable);
    let stream = triple_source.evaluate(&query_text, None)?;
    let mut merged = Vec::new();
    for row in stream {
        let row = row?;
        if let Some(result) = reassociate(&row, batch, row_variable) {
            merged.push(result);
        }
    }
    Ok(merged)
}

fn reassociate(row: &Bindings, batch: &[(usize, Bindings)], row_variable: &Variable) -> Option<Bindings> {
    let index: usize = match row.get(row_variable)? {
        Term::Literal(literal) => literal.value().parse().ok()?,
        _ => return None,
    };
    let left = batch.iter().find(|(i, _)| *i == index).map(|(_, bindings)| bindings)?;
    let mut trimmed = Bindings::new();
    for (variable, term) in row.iter() {
        if variable != row_variable {
            trimmed.insert(variable.clone(), term.clone());
        }
    }
    left.merge(&trimmed)
}
