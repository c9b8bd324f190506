//! Dependency listing of a requirement file

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::graph::{GraphData, RequireEdge};
use crate::versions::{Ecosystem, filter};

/// One requirement with the versions its constraints admit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub package_name: String,
    pub package_constraints: String,
    pub versions: Vec<String>,
}

impl DependencyInfo {
    fn from_edge(graph: &GraphData, edge: &RequireEdge, ecosystem: Ecosystem) -> Self {
        let known = graph.have.get(&edge.package).map(Vec::as_slice).unwrap_or_default();
        Self {
            package_name: edge.package.clone(),
            package_constraints: edge.constraints.clone(),
            versions: filter(ecosystem, known, &edge.constraints)
                .into_iter()
                .map(|version| version.name.clone())
                .collect(),
        }
    }
}

/// `file_info` result: direct requirements, and indirect ones keyed by depth
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub direct_dependencies: Vec<DependencyInfo>,
    pub total_direct_dependencies: usize,
    pub indirect_dependencies_by_depth: BTreeMap<u32, Vec<DependencyInfo>>,
    pub total_indirect_dependencies: usize,
}

impl FileInfo {
    /// Summarise `graph` up to `max_depth`
    ///
    /// An indirect requirement sits one level below its parent package.
    /// Requirements repeated across parent versions are listed once per depth.
    pub fn from_graph(graph: &GraphData, ecosystem: Ecosystem, max_depth: u32) -> Self {
        let depths = graph.package_depths(max_depth);

        let direct_dependencies: Vec<DependencyInfo> = graph
            .require
            .direct
            .iter()
            .map(|edge| DependencyInfo::from_edge(graph, edge, ecosystem))
            .collect();

        let mut seen: BTreeSet<(u32, &str, &str)> = BTreeSet::new();
        let mut indirect_dependencies_by_depth: BTreeMap<u32, Vec<DependencyInfo>> = BTreeMap::new();
        for edge in &graph.require.indirect {
            let Some(&parent_depth) = edge
                .parent_version_name
                .as_deref()
                .and_then(|parent| depths.get(parent))
            else {
                continue;
            };
            if parent_depth >= max_depth {
                continue;
            }
            let depth = parent_depth + 1;
            if seen.insert((depth, edge.package.as_str(), edge.constraints.as_str())) {
                indirect_dependencies_by_depth
                    .entry(depth)
                    .or_default()
                    .push(DependencyInfo::from_edge(graph, edge, ecosystem));
            }
        }

        Self {
            total_direct_dependencies: direct_dependencies.len(),
            total_indirect_dependencies: seen.len(),
            direct_dependencies,
            indirect_dependencies_by_depth,
        }
    }
}
