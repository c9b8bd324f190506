//! Built-in solver that enumerates assignments
//!
//! Only practical for small graphs, but needs no external binary and is
//! fully deterministic. Each integer constant ranges over `-1` plus every
//! literal the assertions compare it against; `(and (>= x lo) (<= x hi))`
//! contributes the whole run `lo..=hi`. That is complete for the formulas
//! the translator emits, where integer constants are only ever compared
//! through such equalities and runs. Real constants are not enumerated but
//! derived from definitions of the form `(= r expr)` and
//! `(=> guard (= r expr))`; reals no definition fires for are `0.0`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{CheckResult, Goal, Model, ModelEntry, SolverBackend, SolverSession};
use crate::error::SolverError;
use crate::smt::{Assignment, Sort, Term, Value, eval, eval_bool};

/// How often the wall clock is consulted, in assignments
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Opens [`ExhaustiveSession`]s
#[derive(Debug, Clone)]
pub struct ExhaustiveBackend {
    timeout: Duration,
    limit: u64,
}

impl ExhaustiveBackend {
    /// `limit` bounds the number of assignments a single `check-sat` may visit
    pub fn new(timeout: Duration, limit: u64) -> Self {
        Self { timeout, limit }
    }
}

#[async_trait]
impl SolverBackend for ExhaustiveBackend {
    fn name(&self) -> &'static str {
        "exhaustive"
    }

    async fn open(&self) -> Result<Box<dyn SolverSession>, SolverError> {
        Ok(Box::new(ExhaustiveSession::new(self.timeout, self.limit)))
    }
}

#[derive(Debug, Clone, Default)]
struct Problem {
    declarations: Vec<(String, Sort)>,
    assertions: Vec<Term>,
    objective: Option<(Term, Goal)>,
}

enum Outcome {
    Found(Model),
    Unsat,
    GaveUp,
}

pub struct ExhaustiveSession {
    timeout: Duration,
    limit: u64,
    problem: Problem,
    model: Option<Model>,
}

impl ExhaustiveSession {
    pub fn new(timeout: Duration, limit: u64) -> Self {
        Self {
            timeout,
            limit,
            problem: Problem::default(),
            model: None,
        }
    }
}

#[async_trait]
impl SolverSession for ExhaustiveSession {
    async fn declare(&mut self, name: &str, sort: Sort) -> Result<(), SolverError> {
        if self.problem.declarations.iter().any(|(n, _)| n == name) {
            return Err(SolverError::Solver(format!("constant {name} already declared")));
        }
        self.problem.declarations.push((name.to_string(), sort));
        Ok(())
    }

    async fn assert(&mut self, term: &Term) -> Result<(), SolverError> {
        self.problem.assertions.push(term.clone());
        Ok(())
    }

    async fn optimize(&mut self, term: &Term, goal: Goal) -> Result<(), SolverError> {
        self.problem.objective = Some((term.clone(), goal));
        Ok(())
    }

    async fn check_sat(&mut self) -> Result<CheckResult, SolverError> {
        self.model = None;
        let problem = self.problem.clone();
        let deadline = Instant::now() + self.timeout;
        let limit = self.limit;

        let outcome = tokio::task::spawn_blocking(move || search(&problem, deadline, limit))
            .await
            .map_err(|e| SolverError::Protocol(format!("search task failed: {e}")))?;

        let result = match outcome {
            Outcome::Found(model) => {
                self.model = Some(model);
                CheckResult::Sat
            }
            Outcome::Unsat => CheckResult::Unsat,
            Outcome::GaveUp => CheckResult::Unknown,
        };
        tracing::debug!(solver = "exhaustive", ?result, "check-sat");
        Ok(result)
    }

    async fn get_model(&mut self) -> Result<Model, SolverError> {
        self.model
            .clone()
            .ok_or_else(|| SolverError::NoModel("last check-sat was not sat".into()))
    }
}

/// Candidate values per enumerated constant; `None` when the domain is too large
fn candidates(problem: &Problem, limit: u64) -> Option<Vec<(String, Vec<Value>)>> {
    let mut ints: HashMap<&str, BTreeSet<i64>> = problem
        .declarations
        .iter()
        .filter(|(_, sort)| *sort == Sort::Int)
        .map(|(name, _)| (name.as_str(), BTreeSet::from([-1])))
        .collect();

    for assertion in &problem.assertions {
        collect_literals(assertion, &mut ints, limit)?;
    }

    let mut domains = Vec::new();
    for (name, sort) in &problem.declarations {
        match sort {
            Sort::Int => {
                let values = ints
                    .get(name.as_str())
                    .map(|set| set.iter().map(|v| Value::Int(*v)).collect())
                    .unwrap_or_default();
                domains.push((name.clone(), values));
            }
            Sort::Bool => {
                domains.push((name.clone(), vec![Value::Bool(false), Value::Bool(true)]));
            }
            Sort::Real => {}
        }
    }
    Some(domains)
}

fn collect_literals(
    term: &Term,
    ints: &mut HashMap<&str, BTreeSet<i64>>,
    limit: u64,
) -> Option<()> {
    let Term::App(op, args) = term else {
        return Some(());
    };
    match (op.as_str(), args.as_slice()) {
        ("=", [Term::Symbol(name), Term::Int(k)]) | ("=", [Term::Int(k), Term::Symbol(name)]) => {
            if let Some(set) = ints.get_mut(name.as_str()) {
                set.insert(*k);
            }
        }
        ("and", _) => {
            for arg in args {
                let Term::App(ge, bound) = arg else { continue };
                let (">=", [Term::Symbol(name), Term::Int(low)]) = (ge.as_str(), bound.as_slice())
                else {
                    continue;
                };
                let high = args.iter().find_map(|other| match other {
                    Term::App(le, bound) if le == "<=" => match bound.as_slice() {
                        [Term::Symbol(n), Term::Int(high)] if n == name => Some(*high),
                        _ => None,
                    },
                    _ => None,
                });
                if let Some(high) = high
                    && high >= *low
                    && let Some(set) = ints.get_mut(name.as_str())
                {
                    let width = high.abs_diff(*low);
                    if width >= limit {
                        return None;
                    }
                    set.extend(*low..=high);
                }
            }
        }
        _ => {}
    }
    for arg in args {
        collect_literals(arg, ints, limit)?;
    }
    Some(())
}

/// Bind real constants reachable through definitions, then default the rest to zero
fn derive_reals(env: &mut Assignment, assertions: &[Term], reals: &HashSet<&str>) {
    loop {
        let mut changed = false;
        for assertion in assertions {
            let definition = match assertion {
                Term::App(op, args) if op == "=>" && args.len() == 2 => {
                    if eval_bool(&args[0], env) != Some(true) {
                        continue;
                    }
                    &args[1]
                }
                other => other,
            };
            let Term::App(op, args) = definition else {
                continue;
            };
            let (name, expr) = match (op.as_str(), args.as_slice()) {
                ("=", [Term::Symbol(name), expr]) if reals.contains(name.as_str()) => (name, expr),
                ("=", [expr, Term::Symbol(name)]) if reals.contains(name.as_str()) => (name, expr),
                _ => continue,
            };
            if env.contains_key(name) {
                continue;
            }
            if let Some(value) = eval(expr, env).and_then(|v| v.as_f64()) {
                env.insert(name.clone(), Value::Real(value));
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    for name in reals {
        env.entry((*name).to_string()).or_insert(Value::Real(0.0));
    }
}

fn search(problem: &Problem, deadline: Instant, limit: u64) -> Outcome {
    let Some(domains) = candidates(problem, limit) else {
        tracing::debug!(limit, "Integer domain wider than the exhaustive limit");
        return Outcome::GaveUp;
    };
    let total = domains
        .iter()
        .try_fold(1u64, |acc, (_, values)| acc.checked_mul(values.len() as u64));
    match total {
        Some(0) => return Outcome::Unsat,
        Some(total) if total <= limit => {}
        _ => {
            tracing::debug!(limit, "Assignment space exceeds the exhaustive limit");
            return Outcome::GaveUp;
        }
    }

    let reals: HashSet<&str> = problem
        .declarations
        .iter()
        .filter(|(_, sort)| *sort == Sort::Real)
        .map(|(name, _)| name.as_str())
        .collect();

    let mut odometer = vec![0usize; domains.len()];
    let mut best: Option<(f64, Assignment)> = None;
    let mut visited: u64 = 0;

    loop {
        if visited % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
            return Outcome::GaveUp;
        }
        visited += 1;

        let mut env: Assignment = domains
            .iter()
            .zip(&odometer)
            .map(|((name, values), idx)| (name.clone(), values[*idx]))
            .collect();
        derive_reals(&mut env, &problem.assertions, &reals);

        let satisfied = problem
            .assertions
            .iter()
            .all(|assertion| eval_bool(assertion, &env) == Some(true));

        if satisfied {
            match &problem.objective {
                None => return Outcome::Found(to_model(problem, &env)),
                Some((objective, goal)) => {
                    if let Some(score) = eval(objective, &env).and_then(|v| v.as_f64()) {
                        let improves = match (&best, goal) {
                            (None, _) => true,
                            (Some((current, _)), Goal::Minimize) => score < *current,
                            (Some((current, _)), Goal::Maximize) => score > *current,
                        };
                        if improves {
                            best = Some((score, env));
                        }
                    }
                }
            }
        }

        if !advance(&mut odometer, &domains) {
            break;
        }
    }

    match best {
        Some((_, env)) => Outcome::Found(to_model(problem, &env)),
        None => Outcome::Unsat,
    }
}

/// Step to the next assignment in lexicographic order; false once exhausted
fn advance(odometer: &mut [usize], domains: &[(String, Vec<Value>)]) -> bool {
    for position in (0..odometer.len()).rev() {
        odometer[position] += 1;
        if odometer[position] < domains[position].1.len() {
            return true;
        }
        odometer[position] = 0;
    }
    false
}

fn to_model(problem: &Problem, env: &Assignment) -> Model {
    let entries = problem
        .declarations
        .iter()
        .filter_map(|(name, sort)| {
            env.get(name).map(|value| ModelEntry {
                name: name.clone(),
                sort: *sort,
                value: *value,
            })
        })
        .collect();
    Model { entries }
}
