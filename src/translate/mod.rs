//! Graph-to-formula translation
//!
//! Every required package `p` gets an Int variable named after it, whose
//! value is the serial number of the chosen version or `-1` when the package
//! is not installed, and a Real `impact_p`. The file gets a Real
//! `file_risk_<name>` bound to the aggregated impacts.
//!
//! Constraints emitted:
//! - a domain clause per direct requirement,
//! - `parent selects k => child in domain` for indirect requirements,
//! - `no parent selects a pulling version => child = -1` for indirect-only packages,
//! - `x_p in V => impact_p = I` bindings,
//! - the file risk definition.

pub mod aggregate;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub use aggregate::Aggregator;

use crate::graph::{GraphData, RequireEdge, VersionRecord};
use crate::smt::{Direction, Formula, Sort, Term, group_versions};
use crate::versions::{self, Ecosystem};

/// Prefix of per-package impact variables
pub const IMPACT_PREFIX: &str = "impact_";
/// Prefix of the file risk variable
pub const FILE_RISK_PREFIX: &str = "file_risk_";

pub fn impact_var(package: &str) -> String {
    format!("{IMPACT_PREFIX}{package}")
}

pub fn file_risk_var(file_name: &str) -> String {
    format!("{FILE_RISK_PREFIX}{file_name}")
}

/// An impact value usable as an ordered map key
#[derive(Debug, Clone, Copy)]
struct Impact(f64);

impl PartialEq for Impact {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Impact {}

impl PartialOrd for Impact {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Impact {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

enum EdgeOutcome {
    Accepted,
    /// Parent not accepted yet; retry after other edges
    Deferred,
    Discarded,
}

/// Per-translation state
struct TranslationContext<'g> {
    graph: &'g GraphData,
    ecosystem: Ecosystem,
    aggregator: Aggregator,
    /// Allocated packages, in allocation order
    vars: Vec<String>,
    directs: BTreeSet<String>,
    /// Accepted serial numbers per package
    filtered_versions: HashMap<String, BTreeSet<i64>>,
    /// Child domain (rendered) -> parent package -> parent serials
    children: BTreeMap<String, (Term, BTreeMap<String, BTreeSet<i64>>)>,
    /// Indirect-only child -> parent package -> parent serials
    parents: BTreeMap<String, BTreeMap<String, BTreeSet<i64>>>,
    /// Package -> impact -> serials
    ctcs: BTreeMap<String, BTreeMap<Impact, BTreeSet<i64>>>,
    impacts: Vec<String>,
    constraints: Vec<Term>,
    filter_memo: HashMap<(String, String), Vec<&'g VersionRecord>>,
}

impl<'g> TranslationContext<'g> {
    fn new(graph: &'g GraphData, ecosystem: Ecosystem, aggregator: Aggregator) -> Self {
        Self {
            graph,
            ecosystem,
            aggregator,
            vars: Vec::new(),
            directs: BTreeSet::new(),
            filtered_versions: HashMap::new(),
            children: BTreeMap::new(),
            parents: BTreeMap::new(),
            ctcs: BTreeMap::new(),
            impacts: Vec::new(),
            constraints: Vec::new(),
            filter_memo: HashMap::new(),
        }
    }

    /// Versions of `package` satisfying `constraints`
    fn filter(&mut self, package: &str, constraints: &str) -> Vec<&'g VersionRecord> {
        let key = (package.to_string(), constraints.to_string());
        if let Some(hit) = self.filter_memo.get(&key) {
            return hit.clone();
        }
        let graph: &'g GraphData = self.graph;
        let filtered = match graph.have.get(package) {
            Some(versions) => versions::filter(self.ecosystem, versions, constraints),
            None => Vec::new(),
        };
        self.filter_memo.insert(key, filtered.clone());
        filtered
    }

    /// Allocate the variables of `package`; returns whether this was the first allocation
    fn allocate(&mut self, package: &str) -> bool {
        if self.vars.iter().any(|p| p == package) {
            return false;
        }
        self.vars.push(package.to_string());
        self.impacts.push(impact_var(package));
        true
    }

    fn record_impacts(&mut self, package: &str, versions: &[&VersionRecord]) {
        let bindings = self.ctcs.entry(package.to_string()).or_default();
        for version in versions {
            bindings
                .entry(Impact(self.aggregator.impact_of(version)))
                .or_default()
                .insert(version.serial_number);
        }
    }

    fn add_direct(&mut self, edge: &RequireEdge) {
        let filtered = self.filter(&edge.package, &edge.constraints);
        let serials: BTreeSet<i64> = filtered.iter().map(|v| v.serial_number).collect();

        self.directs.insert(edge.package.clone());
        self.allocate(&edge.package);

        let domain: Vec<i64> = serials.iter().copied().collect();
        self.constraints
            .push(group_versions(&edge.package, &domain, Direction::Descending));

        // repeated direct requirements narrow the accepted set
        self.filtered_versions
            .entry(edge.package.clone())
            .and_modify(|accepted| accepted.retain(|s| serials.contains(s)))
            .or_insert_with(|| serials.clone());

        self.record_impacts(&edge.package, &filtered);
    }

    fn add_indirect(&mut self, edge: &RequireEdge) -> EdgeOutcome {
        let (Some(parent), Some(parent_serial)) =
            (edge.parent_version_name.as_deref(), edge.parent_serial_number)
        else {
            tracing::debug!(package = %edge.package, "Indirect edge without parent, ignoring");
            return EdgeOutcome::Discarded;
        };

        let filtered = self.filter(&edge.package, &edge.constraints);
        if filtered.is_empty() {
            return EdgeOutcome::Discarded;
        }
        let parent_accepts = self
            .filtered_versions
            .get(parent)
            .is_some_and(|accepted| accepted.contains(&parent_serial));
        if !parent_accepts {
            return EdgeOutcome::Deferred;
        }

        let package = edge.package.as_str();
        if self.allocate(package) {
            self.ctcs
                .entry(package.to_string())
                .or_default()
                .entry(Impact(0.0))
                .or_default()
                .insert(-1);
        }

        let serials: Vec<i64> = filtered.iter().map(|v| v.serial_number).collect();
        let domain = group_versions(package, &serials, Direction::Descending);
        self.children
            .entry(domain.to_string())
            .or_insert_with(|| (domain, BTreeMap::new()))
            .1
            .entry(parent.to_string())
            .or_default()
            .insert(parent_serial);

        if !self.directs.contains(package) {
            self.parents
                .entry(package.to_string())
                .or_default()
                .entry(parent.to_string())
                .or_default()
                .insert(parent_serial);
            self.filtered_versions
                .entry(package.to_string())
                .or_default()
                .extend(serials.iter().copied());
        }

        self.record_impacts(package, &filtered);
        EdgeOutcome::Accepted
    }

    /// Process indirect edges until no deferred edge can be accepted
    fn add_indirects(&mut self, edges: &[RequireEdge]) {
        let mut pending: Vec<&RequireEdge> = edges.iter().collect();
        loop {
            let before = pending.len();
            pending.retain(|edge| matches!(self.add_indirect(edge), EdgeOutcome::Deferred));
            if pending.len() == before || pending.is_empty() {
                break;
            }
        }
        if !pending.is_empty() {
            tracing::debug!(
                unreachable = pending.len(),
                "Indirect edges whose parent version is never selectable"
            );
        }
    }

    fn finish(mut self, file_name: &str) -> Formula {
        let ascending = |var: &str, serials: &BTreeSet<i64>| {
            let serials: Vec<i64> = serials.iter().copied().collect();
            group_versions(var, &serials, Direction::Ascending)
        };

        for (domain, parent_map) in self.children.values() {
            for (parent, serials) in parent_map {
                self.constraints
                    .push(Term::implies(ascending(parent, serials), domain.clone()));
            }
        }

        for (child, parent_map) in &self.parents {
            let pulling: Vec<Term> = parent_map
                .iter()
                .map(|(parent, serials)| ascending(parent, serials))
                .collect();
            self.constraints.push(Term::implies(
                Term::not(Term::or(pulling)),
                Term::eq(Term::sym(child.clone()), Term::int(-1)),
            ));
        }

        for (package, bindings) in &self.ctcs {
            for (impact, serials) in bindings {
                self.constraints.push(Term::implies(
                    ascending(package, serials),
                    Term::eq(Term::sym(impact_var(package)), Term::real(impact.0)),
                ));
            }
        }

        let file_risk = file_risk_var(file_name);
        let impacts: Vec<Term> = self.impacts.iter().map(|i| Term::sym(i.clone())).collect();
        self.constraints.push(Term::eq(
            Term::sym(file_risk.clone()),
            self.aggregator.aggregate(&impacts),
        ));

        let mut formula = Formula::new(file_risk.clone());
        for package in &self.vars {
            formula.declare(package.clone(), Sort::Int);
            formula.declare(impact_var(package), Sort::Real);
        }
        formula.declare(file_risk, Sort::Real);
        formula.assertions = self.constraints;
        formula
    }
}

/// Translate a graph projection into a formula
///
/// `file_name` names the file risk variable.
pub fn translate(
    graph: &GraphData,
    file_name: &str,
    ecosystem: Ecosystem,
    aggregator: Aggregator,
) -> Formula {
    let mut ctx = TranslationContext::new(graph, ecosystem, aggregator);
    for edge in &graph.require.direct {
        ctx.add_direct(edge);
    }
    ctx.add_indirects(&graph.require.indirect);

    let packages = ctx.vars.len();
    let formula = ctx.finish(file_name);
    tracing::debug!(
        file = file_name,
        %ecosystem,
        %aggregator,
        packages,
        constraints = formula.assertions.len(),
        "Translated graph"
    );
    formula
}
