//! Turning solver models into user-facing configurations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::GraphData;
use crate::smt::Value;
use crate::solver::Model;
use crate::translate::IMPACT_PREFIX;

/// One entry of a sanitised configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Name of the selected version
    Version(String),
    /// Serial number without a matching version name
    Serial(i64),
    /// Impact or file risk, rounded to two decimals
    Impact(f64),
}

/// A sanitised model: package to version name, impact and file risk entries
pub type Configuration = BTreeMap<String, ConfigValue>;

/// Solver-internal names that never reach a configuration
const INTERNAL_MARKERS: [&str; 2] = ["/0", "func_obj"];

pub fn is_internal(name: &str) -> bool {
    INTERNAL_MARKERS.iter().any(|marker| name.contains(marker))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sanitise `model` against the graph it was built from
///
/// Uninstalled packages (`-1`) are dropped together with their impact, and
/// serial numbers are mapped back to version names.
pub fn sanitize(model: &Model, graph: &GraphData) -> Configuration {
    let mut config = Configuration::new();
    let mut impacts = Vec::new();

    for entry in &model.entries {
        let name = entry.name.as_str();
        if is_internal(name) {
            continue;
        }
        if let Some(package) = name.strip_prefix(IMPACT_PREFIX) {
            if let Some(value) = entry.value.as_f64() {
                impacts.push((name, package, round2(value)));
            }
            continue;
        }
        match entry.value {
            Value::Int(-1) => {}
            Value::Int(serial) => {
                let value = match graph.version_name(name, serial) {
                    Some(version) => ConfigValue::Version(version.to_string()),
                    None => ConfigValue::Serial(serial),
                };
                config.insert(name.to_string(), value);
            }
            Value::Real(value) => {
                config.insert(name.to_string(), ConfigValue::Impact(round2(value)));
            }
            Value::Bool(_) => {}
        }
    }

    for (name, package, value) in impacts {
        if config.contains_key(package) {
            config.insert(name.to_string(), ConfigValue::Impact(value));
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VersionRecord;
    use crate::smt::Sort;
    use crate::solver::ModelEntry;

    fn graph() -> GraphData {
        let mut graph = GraphData::default();
        graph.have.insert(
            "A".into(),
            vec![
                VersionRecord::new("1.0", 0, 0.0, 0.0),
                VersionRecord::new("2.0", 1, 3.0, 3.0),
            ],
        );
        graph
            .have
            .insert("B".into(), vec![VersionRecord::new("0.1", 0, 5.0, 5.0)]);
        graph
    }

    fn entry(name: &str, value: Value) -> ModelEntry {
        let sort = match value {
            Value::Int(_) => Sort::Int,
            Value::Real(_) => Sort::Real,
            Value::Bool(_) => Sort::Bool,
        };
        ModelEntry {
            name: name.into(),
            sort,
            value,
        }
    }

    #[test]
    fn test_maps_serials_to_names() {
        let model = Model {
            entries: vec![
                entry("A", Value::Int(1)),
                entry("impact_A", Value::Real(3.0)),
                entry("file_risk_f", Value::Real(3.0)),
            ],
        };
        let config = sanitize(&model, &graph());
        assert_eq!(config.get("A"), Some(&ConfigValue::Version("2.0".into())));
        assert_eq!(config.get("impact_A"), Some(&ConfigValue::Impact(3.0)));
        assert_eq!(config.get("file_risk_f"), Some(&ConfigValue::Impact(3.0)));
    }

    #[test]
    fn test_uninstalled_package_drops_its_impact() {
        let model = Model {
            entries: vec![
                entry("impact_B", Value::Real(0.0)),
                entry("B", Value::Int(-1)),
                entry("A", Value::Int(0)),
                entry("impact_A", Value::Real(0.0)),
            ],
        };
        let config = sanitize(&model, &graph());
        assert!(!config.contains_key("B"));
        assert!(!config.contains_key("impact_B"));
        assert_eq!(config.get("impact_A"), Some(&ConfigValue::Impact(0.0)));
    }

    #[test]
    fn test_skips_internal_names() {
        let model = Model {
            entries: vec![
                entry("/0", Value::Real(1.0)),
                entry("x!func_obj!1", Value::Int(4)),
                entry("A", Value::Int(0)),
            ],
        };
        let config = sanitize(&model, &graph());
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn test_rounds_reals_and_keeps_unknown_serials() {
        let model = Model {
            entries: vec![
                entry("A", Value::Int(7)),
                entry("impact_A", Value::Real(10.0 / 3.0)),
                entry("file_risk_f", Value::Real(2.0 / 3.0)),
            ],
        };
        let config = sanitize(&model, &graph());
        assert_eq!(config.get("A"), Some(&ConfigValue::Serial(7)));
        assert_eq!(config.get("impact_A"), Some(&ConfigValue::Impact(3.33)));
        assert_eq!(config.get("file_risk_f"), Some(&ConfigValue::Impact(0.67)));
    }

    #[test]
    fn test_serializes_untagged() {
        let mut config = Configuration::new();
        config.insert("A".into(), ConfigValue::Version("1.0".into()));
        config.insert("impact_A".into(), ConfigValue::Impact(0.5));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json, serde_json::json!({"A": "1.0", "impact_A": 0.5}));
    }
}
