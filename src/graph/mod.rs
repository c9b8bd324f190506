//! Dependency graph documents and the providers that serve them
//!
//! A graph document describes one requirement file: its direct and indirect
//! requirement edges and, for every package reachable from it, the ordered
//! list of known versions with their precomputed impact scores.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::GraphError;

pub mod file;

pub use file::FileGraphProvider;

fn any_constraint() -> String {
    "any".to_string()
}

/// A requirement edge; `parent_version_name` is the parent package, absent for direct edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequireEdge {
    pub package: String,
    #[serde(default = "any_constraint")]
    pub constraints: String,
    #[serde(default)]
    pub parent_version_name: Option<String>,
    #[serde(default)]
    pub parent_serial_number: Option<i64>,
}

impl RequireEdge {
    pub fn direct(package: impl Into<String>, constraints: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            constraints: constraints.into(),
            parent_version_name: None,
            parent_serial_number: None,
        }
    }

    pub fn indirect(
        package: impl Into<String>,
        constraints: impl Into<String>,
        parent: impl Into<String>,
        parent_serial: i64,
    ) -> Self {
        Self {
            package: package.into(),
            constraints: constraints.into(),
            parent_version_name: Some(parent.into()),
            parent_serial_number: Some(parent_serial),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub direct: Vec<RequireEdge>,
    #[serde(default)]
    pub indirect: Vec<RequireEdge>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.indirect.is_empty()
    }
}

/// One known version of a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub name: String,
    pub serial_number: i64,
    #[serde(default)]
    pub mean: f64,
    #[serde(default)]
    pub weighted_mean: f64,
}

impl VersionRecord {
    pub fn new(name: impl Into<String>, serial_number: i64, mean: f64, weighted_mean: f64) -> Self {
        Self {
            name: name.into(),
            serial_number,
            mean,
            weighted_mean,
        }
    }
}

impl crate::versions::Versioned for VersionRecord {
    fn version_name(&self) -> &str {
        &self.name
    }
}

/// The `(have, require)` projection of one requirement file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    #[serde(default)]
    pub name: Option<String>,
    /// Last mutation of the graph
    #[serde(default, deserialize_with = "deserialize_moment")]
    pub moment: Option<DateTime<Utc>>,
    #[serde(default)]
    pub require: Requirements,
    #[serde(default)]
    pub have: BTreeMap<String, Vec<VersionRecord>>,
}

/// Accept RFC 3339 timestamps and, for older documents, naive timestamps taken as UTC
fn deserialize_moment<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

impl GraphData {
    /// A graph with no name or no requirement edges has nothing to translate
    pub fn has_dependencies(&self) -> bool {
        self.name.is_some() && !self.require.is_empty()
    }

    /// Version name for `serial` of `package`
    pub fn version_name(&self, package: &str, serial: i64) -> Option<&str> {
        self.have
            .get(package)?
            .iter()
            .find(|v| v.serial_number == serial)
            .map(|v| v.name.as_str())
    }

    /// Serial number for version `name` of `package`
    pub fn serial_of(&self, package: &str, name: &str) -> Option<i64> {
        self.have
            .get(package)?
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.serial_number)
    }

    /// Shortest depth of every package reachable within `max_depth`
    ///
    /// Direct packages sit at depth 1; a child is one deeper than its
    /// shallowest parent.
    pub fn package_depths(&self, max_depth: u32) -> HashMap<&str, u32> {
        let mut depth: HashMap<&str, u32> = HashMap::new();
        if max_depth >= 1 {
            for edge in &self.require.direct {
                depth.insert(edge.package.as_str(), 1);
            }
        }

        // relax until no shorter path is found; depths only decrease
        loop {
            let mut changed = false;
            for edge in &self.require.indirect {
                let Some(parent) = edge.parent_version_name.as_deref() else {
                    continue;
                };
                let Some(&parent_depth) = depth.get(parent) else {
                    continue;
                };
                if parent_depth >= max_depth {
                    continue;
                }
                let child_depth = parent_depth + 1;
                let entry = depth.entry(edge.package.as_str()).or_insert(u32::MAX);
                if child_depth < *entry {
                    *entry = child_depth;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        depth
    }

    /// Restrict the graph to packages reachable within `max_depth` requirement hops
    ///
    /// Direct requirements sit at depth 1; an indirect edge is kept when its
    /// parent package is reached at a depth below `max_depth`.
    pub fn project(&self, max_depth: u32) -> GraphData {
        let depth = self.package_depths(max_depth);

        let direct = if max_depth >= 1 {
            self.require.direct.clone()
        } else {
            Vec::new()
        };
        let indirect = self
            .require
            .indirect
            .iter()
            .filter(|edge| {
                edge.parent_version_name
                    .as_deref()
                    .and_then(|parent| depth.get(parent))
                    .is_some_and(|d| *d < max_depth)
            })
            .cloned()
            .collect();
        let have = self
            .have
            .iter()
            .filter(|(package, _)| depth.contains_key(package.as_str()))
            .map(|(package, versions)| (package.clone(), versions.clone()))
            .collect();

        GraphData {
            name: self.name.clone(),
            moment: self.moment,
            require: Requirements { direct, indirect },
            have,
        }
    }
}

/// Read-only source of graph projections
#[async_trait]
pub trait GraphProvider: Send + Sync {
    /// Fetch the projection of `file_id` at `max_depth`; `None` when the file is unknown
    async fn read_graph(&self, file_id: &str, max_depth: u32)
    -> Result<Option<GraphData>, GraphError>;
}

/// In-memory provider keyed by file id
#[derive(Debug, Default, Clone)]
pub struct StaticGraphProvider {
    graphs: HashMap<String, GraphData>,
}

impl StaticGraphProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(mut self, file_id: impl Into<String>, graph: GraphData) -> Self {
        self.insert(file_id, graph);
        self
    }

    pub fn insert(&mut self, file_id: impl Into<String>, graph: GraphData) {
        self.graphs.insert(file_id.into(), graph);
    }
}

#[async_trait]
impl GraphProvider for StaticGraphProvider {
    async fn read_graph(
        &self,
        file_id: &str,
        max_depth: u32,
    ) -> Result<Option<GraphData>, GraphError> {
        Ok(self.graphs.get(file_id).map(|graph| graph.project(max_depth)))
    }
}
