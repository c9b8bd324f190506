//! File-level risk aggregators

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::VersionRecord;
use crate::smt::Term;

/// How per-package impacts reduce to one file risk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    /// Mean over the non-zero impacts
    #[default]
    Mean,
    /// Impacts weighted by themselves
    WeightedMean,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown aggregator `{0}`")]
pub struct UnknownAggregator(pub String);

impl Aggregator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregator::Mean => "mean",
            Aggregator::WeightedMean => "weighted_mean",
        }
    }

    /// The precomputed impact of a version under this aggregator
    pub fn impact_of(&self, version: &VersionRecord) -> f64 {
        match self {
            Aggregator::Mean => version.mean,
            Aggregator::WeightedMean => version.weighted_mean,
        }
    }

    /// Build the real-valued objective over `impacts`
    pub fn aggregate(&self, impacts: &[Term]) -> Term {
        if impacts.is_empty() {
            return Term::real(0.0);
        }
        match self {
            Aggregator::Mean => mean(impacts),
            Aggregator::WeightedMean => weighted_mean(impacts),
        }
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregator {
    type Err = UnknownAggregator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Aggregator::Mean),
            "weighted_mean" => Ok(Aggregator::WeightedMean),
            other => Err(UnknownAggregator(other.to_string())),
        }
    }
}

/// `ite(n = 0, 0, Σ imp / n)` where `n` counts the non-zero impacts
fn mean(impacts: &[Term]) -> Term {
    let non_zero = Term::sum(
        impacts
            .iter()
            .map(|imp| {
                Term::ite(
                    Term::eq(imp.clone(), Term::real(0.0)),
                    Term::real(0.0),
                    Term::real(1.0),
                )
            })
            .collect(),
    );
    Term::ite(
        Term::eq(non_zero.clone(), Term::real(0.0)),
        Term::real(0.0),
        Term::div(Term::sum(impacts.to_vec()), non_zero),
    )
}

/// `ite(d = 0, 0, Σ imp²·0.1 / d)` where `d = Σ imp·0.1`
fn weighted_mean(impacts: &[Term]) -> Term {
    let divisor = Term::sum(
        impacts
            .iter()
            .map(|imp| Term::mul(vec![imp.clone(), Term::real(0.1)]))
            .collect(),
    );
    let numerator = Term::sum(
        impacts
            .iter()
            .map(|imp| Term::mul(vec![imp.clone(), imp.clone(), Term::real(0.1)]))
            .collect(),
    );
    Term::ite(
        Term::eq(divisor.clone(), Term::real(0.0)),
        Term::real(0.0),
        Term::div(numerator, divisor),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::{Assignment, Value, eval};

    fn risk(aggregator: Aggregator, values: &[f64]) -> f64 {
        let names: Vec<String> = (0..values.len()).map(|i| format!("impact_p{i}")).collect();
        let terms: Vec<Term> = names.iter().map(|n| Term::sym(n.clone())).collect();
        let env: Assignment = names
            .iter()
            .zip(values)
            .map(|(n, v)| (n.clone(), Value::Real(*v)))
            .collect();
        eval(&aggregator.aggregate(&terms), &env)
            .and_then(|v| v.as_f64())
            .unwrap()
    }

    #[test]
    fn test_mean_ignores_zero_impacts() {
        assert!((risk(Aggregator::Mean, &[0.0, 3.0, 5.0]) - 4.0).abs() < 1e-9);
        assert_eq!(risk(Aggregator::Mean, &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_weighted_mean() {
        // (9 + 25) / (3 + 5)
        assert!((risk(Aggregator::WeightedMean, &[3.0, 5.0]) - 4.25).abs() < 1e-9);
        assert_eq!(risk(Aggregator::WeightedMean, &[0.0]), 0.0);
    }

    #[test]
    fn test_empty_impacts() {
        assert_eq!(Aggregator::Mean.aggregate(&[]), Term::real(0.0));
        assert_eq!(Aggregator::WeightedMean.aggregate(&[]), Term::real(0.0));
    }

    #[test]
    fn test_single_impact_shape() {
        let term = Aggregator::Mean.aggregate(&[Term::sym("impact_A")]);
        assert_eq!(
            term.to_string(),
            "(ite (= (ite (= impact_A 0.0) 0.0 1.0) 0.0) 0.0 (/ impact_A (ite (= impact_A 0.0) 0.0 1.0)))"
        );
    }

    #[test]
    fn test_tags() {
        assert_eq!("weighted_mean".parse::<Aggregator>().unwrap(), Aggregator::WeightedMean);
        assert!("median".parse::<Aggregator>().is_err());
        let parsed: Aggregator = serde_json::from_str("\"mean\"").unwrap();
        assert_eq!(parsed, Aggregator::Mean);
    }
}
