//! node-semver ranges

use node_semver::{Range, Version};

use super::{Ecosystem, RangeError, coerce_semver};

#[derive(Debug, Clone)]
pub struct NpmRange {
    range: Range,
}

impl NpmRange {
    /// Supports `^`, `~`, hyphen ranges, x-ranges and `||` alternation
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let range =
            Range::parse(input.trim()).map_err(|e| RangeError::new(Ecosystem::Npm, input, e))?;
        Ok(Self { range })
    }

    pub fn matches(&self, version: &str) -> Option<bool> {
        let version = Version::parse(coerce_semver(version)).ok()?;
        Some(self.range.satisfies(&version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(range: &str, version: &str) -> bool {
        NpmRange::parse(range).unwrap().matches(version).unwrap()
    }

    #[test]
    fn test_caret_and_tilde() {
        assert!(matches("^1.2.3", "1.9.0"));
        assert!(!matches("^1.2.3", "2.0.0"));
        assert!(matches("~1.2.3", "1.2.9"));
        assert!(!matches("~1.2.3", "1.3.0"));
    }

    #[test]
    fn test_hyphen_and_alternation() {
        assert!(matches("1.0.0 - 2.0.0", "2.0.0"));
        assert!(!matches("1.0.0 - 2.0.0", "2.0.1"));
        assert!(matches("<1.0.0 || >=3.0.0", "3.1.0"));
        assert!(!matches("<1.0.0 || >=3.0.0", "2.0.0"));
    }

    #[test]
    fn test_short_version_names() {
        assert!(matches(">=1.0.0", "1.2"));
    }

    #[test]
    fn test_prerelease_default() {
        assert!(!matches("^1.0.0", "1.1.0-beta.1"));
    }
}
