//! Interval compression of version serial sets
//!
//! A set of serial numbers becomes a disjunction of runs: a single value is
//! written `(= x v)` and a longer run `(and (>= x lo) (<= x hi))`.

use super::term::Term;

/// Order in which runs are discovered and emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Compress `serials` into a membership constraint on `var`
///
/// Input order does not matter: serials are sorted and deduplicated in the
/// requested direction first. An empty set yields `false`.
pub fn group_versions(var: &str, serials: &[i64], direction: Direction) -> Term {
    let mut sorted = serials.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if direction == Direction::Descending {
        sorted.reverse();
    }

    let clauses = runs(&sorted, direction)
        .into_iter()
        .map(|(first, last)| run_clause(var, first, last))
        .collect();
    Term::or(clauses)
}

/// Split an ordered, deduplicated list into maximal runs of consecutive values
fn runs(sorted: &[i64], direction: Direction) -> Vec<(i64, i64)> {
    let step: i64 = match direction {
        Direction::Ascending => 1,
        Direction::Descending => -1,
    };
    let mut out = Vec::new();
    let mut iter = sorted.iter().copied();
    let Some(mut first) = iter.next() else {
        return out;
    };
    let mut last = first;
    for value in iter {
        if last.checked_add(step) == Some(value) {
            last = value;
        } else {
            out.push((first, last));
            first = value;
            last = value;
        }
    }
    out.push((first, last));
    out
}

fn run_clause(var: &str, first: i64, last: i64) -> Term {
    if first == last {
        return Term::eq(Term::sym(var), Term::int(first));
    }
    let (low, high) = (first.min(last), first.max(last));
    Term::and(vec![
        Term::ge(Term::sym(var), Term::int(low)),
        Term::le(Term::sym(var), Term::int(high)),
    ])
}
