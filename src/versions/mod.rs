//! Ecosystem-specific version range evaluation
//!
//! Each ecosystem parses its native range syntax and decides whether a
//! concrete version name falls inside it. PyPI, npm and Cargo delegate to
//! the reference crates; Maven, RubyGems and NuGet orderings live here.

pub mod cargo;
pub mod maven;
pub mod npm;
pub mod nuget;
pub mod pypi;
pub mod rubygems;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Package ecosystem tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ecosystem {
    #[serde(rename = "PyPI", alias = "PyPIPackage")]
    PyPI,
    #[serde(rename = "NPM", alias = "NPMPackage")]
    Npm,
    #[serde(rename = "Maven", alias = "MavenPackage")]
    Maven,
    #[serde(rename = "Cargo", alias = "CargoPackage")]
    Cargo,
    #[serde(rename = "RubyGems", alias = "RubyGemsPackage")]
    RubyGems,
    #[serde(rename = "NuGet", alias = "NuGetPackage")]
    NuGet,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 6] = [
        Ecosystem::PyPI,
        Ecosystem::Npm,
        Ecosystem::Maven,
        Ecosystem::Cargo,
        Ecosystem::RubyGems,
        Ecosystem::NuGet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::PyPI => "PyPI",
            Ecosystem::Npm => "NPM",
            Ecosystem::Maven => "Maven",
            Ecosystem::Cargo => "Cargo",
            Ecosystem::RubyGems => "RubyGems",
            Ecosystem::NuGet => "NuGet",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown ecosystem `{0}`")]
pub struct UnknownEcosystem(pub String);

impl FromStr for Ecosystem {
    type Err = UnknownEcosystem;

    /// Tags are case-sensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ecosystem::ALL
            .into_iter()
            .find(|eco| eco.as_str() == s)
            .ok_or_else(|| UnknownEcosystem(s.to_string()))
    }
}

/// Error parsing a native range string
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {ecosystem} range `{input}`: {reason}")]
pub struct RangeError {
    pub ecosystem: Ecosystem,
    pub input: String,
    pub reason: String,
}

impl RangeError {
    pub(crate) fn new(ecosystem: Ecosystem, input: &str, reason: impl fmt::Display) -> Self {
        Self {
            ecosystem,
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Anything carrying a version name
pub trait Versioned {
    fn version_name(&self) -> &str;
}

impl Versioned for String {
    fn version_name(&self) -> &str {
        self
    }
}

impl Versioned for &str {
    fn version_name(&self) -> &str {
        self
    }
}

/// A parsed native range for one ecosystem
#[derive(Debug, Clone)]
pub enum VersionRange {
    PyPI(pypi::PypiRange),
    Npm(npm::NpmRange),
    Maven(maven::MavenRange),
    Cargo(cargo::CargoRange),
    RubyGems(rubygems::GemRequirement),
    NuGet(nuget::NuGetRange),
}

impl VersionRange {
    pub fn parse(ecosystem: Ecosystem, constraints: &str) -> Result<Self, RangeError> {
        Ok(match ecosystem {
            Ecosystem::PyPI => VersionRange::PyPI(pypi::PypiRange::parse(constraints)?),
            Ecosystem::Npm => VersionRange::Npm(npm::NpmRange::parse(constraints)?),
            Ecosystem::Maven => VersionRange::Maven(maven::MavenRange::parse(constraints)?),
            Ecosystem::Cargo => VersionRange::Cargo(cargo::CargoRange::parse(constraints)?),
            Ecosystem::RubyGems => {
                VersionRange::RubyGems(rubygems::GemRequirement::parse(constraints)?)
            }
            Ecosystem::NuGet => VersionRange::NuGet(nuget::NuGetRange::parse(constraints)?),
        })
    }

    /// Whether `version` satisfies the range; `None` when the version does not parse
    pub fn matches(&self, version: &str) -> Option<bool> {
        match self {
            VersionRange::PyPI(range) => range.matches(version),
            VersionRange::Npm(range) => range.matches(version),
            VersionRange::Maven(range) => range.matches(version),
            VersionRange::Cargo(range) => range.matches(version),
            VersionRange::RubyGems(range) => range.matches(version),
            VersionRange::NuGet(range) => range.matches(version),
        }
    }
}

/// Keep the versions whose names satisfy `constraints`, preserving order
///
/// `any` (or an empty string) keeps everything. An unparsable range keeps
/// everything too, since dropping a package over a bad constraint would
/// hide it from the formula. Versions that do not parse are excluded.
pub fn filter<'a, T: Versioned>(
    ecosystem: Ecosystem,
    versions: &'a [T],
    constraints: &str,
) -> Vec<&'a T> {
    let constraints = constraints.trim();
    if constraints.is_empty() || constraints == "any" {
        return versions.iter().collect();
    }

    let range = match VersionRange::parse(ecosystem, constraints) {
        Ok(range) => range,
        Err(e) => {
            tracing::debug!(error = %e, "Keeping all versions for unparsable range");
            return versions.iter().collect();
        }
    };

    versions
        .iter()
        .filter(|v| match range.matches(v.version_name()) {
            Some(matched) => matched,
            None => {
                tracing::trace!(
                    ecosystem = %ecosystem,
                    version = v.version_name(),
                    "Skipping unparsable version"
                );
                false
            }
        })
        .collect()
}

/// Pad a dotted release to `major.minor.patch`, keeping any pre-release or build suffix
///
/// Registries report names like `1.0` or `v2`; the semver grammars need
/// three components.
pub(crate) fn coerce_semver(version: &str) -> String {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('='))
        .unwrap_or(version);
    let split = version.find(['-', '+']).unwrap_or(version.len());
    let (release, suffix) = version.split_at(split);
    let mut parts: Vec<&str> = release.split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    format!("{}{suffix}", parts.join("."))
}

/// Split a release into numeric dotted components
pub(crate) fn numeric_components(release: &str) -> Option<Vec<u64>> {
    release
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}
