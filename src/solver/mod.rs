//! Solver sessions
//!
//! A [`SolverBackend`] opens one [`SolverSession`] per request. Sessions are
//! never shared: each one owns its declarations, assertions and objectives,
//! and dropping it releases whatever the backend holds (for z3, the child
//! process).

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{SolverConfig, SolverKind};
use crate::error::SolverError;
use crate::smt::{Formula, Sort, Term, Value};

pub mod exhaustive;
pub mod z3;

pub use exhaustive::ExhaustiveBackend;
pub use z3::Z3Backend;

/// Answer to `check-sat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    Sat,
    Unsat,
    /// Gave up, usually because the time budget ran out
    Unknown,
}

/// Optimisation direction of an objective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    Minimize,
    Maximize,
}

/// One constant of a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    pub name: String,
    pub sort: Sort,
    pub value: Value,
}

/// Constant assignments of a satisfying model, in solver order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub entries: Vec<ModelEntry>,
}

impl Model {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A request-scoped solver instance
#[async_trait]
pub trait SolverSession: Send {
    async fn declare(&mut self, name: &str, sort: Sort) -> Result<(), SolverError>;

    async fn assert(&mut self, term: &Term) -> Result<(), SolverError>;

    /// Register an objective; only the most recent one is optimised
    async fn optimize(&mut self, term: &Term, goal: Goal) -> Result<(), SolverError>;

    async fn check_sat(&mut self) -> Result<CheckResult, SolverError>;

    /// Model of the last `Sat` answer
    async fn get_model(&mut self) -> Result<Model, SolverError>;

    async fn minimize(&mut self, term: &Term) -> Result<(), SolverError> {
        self.optimize(term, Goal::Minimize).await
    }

    async fn maximize(&mut self, term: &Term) -> Result<(), SolverError> {
        self.optimize(term, Goal::Maximize).await
    }

    /// `check-sat` where `unknown` counts as a timeout
    async fn is_sat(&mut self) -> Result<bool, SolverError> {
        match self.check_sat().await? {
            CheckResult::Sat => Ok(true),
            CheckResult::Unsat => Ok(false),
            CheckResult::Unknown => Err(SolverError::Timeout),
        }
    }
}

/// Factory for solver sessions
#[async_trait]
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open(&self) -> Result<Box<dyn SolverSession>, SolverError>;
}

/// Send every declaration and assertion of `formula` to `session`
pub async fn install(session: &mut dyn SolverSession, formula: &Formula) -> Result<(), SolverError> {
    for (name, sort) in &formula.declarations {
        session.declare(name, *sort).await?;
    }
    for assertion in &formula.assertions {
        session.assert(assertion).await?;
    }
    Ok(())
}

/// Build the backend selected in `[solver]`
pub fn from_config(config: &SolverConfig) -> Arc<dyn SolverBackend> {
    match config.backend {
        SolverKind::Z3 => Arc::new(Z3Backend::new(
            config.z3_path.clone(),
            config.timeout(),
            config.grace(),
        )),
        SolverKind::Exhaustive => Arc::new(ExhaustiveBackend::new(
            config.timeout(),
            config.exhaustive_limit,
        )),
    }
}
