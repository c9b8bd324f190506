//! PEP 440 specifiers

use std::str::FromStr;

use pep440_rs::{Version, VersionSpecifiers};

use super::{Ecosystem, RangeError};

/// Comma-separated, conjunctive PEP 440 specifiers
#[derive(Debug, Clone)]
pub struct PypiRange {
    specifiers: VersionSpecifiers,
}

impl PypiRange {
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let specifiers = VersionSpecifiers::from_str(input.trim())
            .map_err(|e| RangeError::new(Ecosystem::PyPI, input, e))?;
        Ok(Self { specifiers })
    }

    /// Pre-releases only match when some specifier names a pre-release itself
    pub fn matches(&self, version: &str) -> Option<bool> {
        let version = Version::from_str(version.trim()).ok()?;
        if version.any_prerelease() && !self.allows_prereleases() {
            return Some(false);
        }
        Some(self.specifiers.contains(&version))
    }

    fn allows_prereleases(&self) -> bool {
        self.specifiers
            .iter()
            .any(|specifier| specifier.version().any_prerelease())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(range: &str, version: &str) -> bool {
        PypiRange::parse(range).unwrap().matches(version).unwrap()
    }

    #[test]
    fn test_conjunction() {
        assert!(matches(">=1.0,<2.0", "1.5"));
        assert!(!matches(">=1.0,<2.0", "2.0"));
        assert!(!matches(">=1.0, <2.0", "0.9"));
    }

    #[test]
    fn test_compatible_release() {
        assert!(matches("~=1.4.2", "1.4.9"));
        assert!(!matches("~=1.4.2", "1.5.0"));
    }

    #[test]
    fn test_wildcard() {
        assert!(matches("==1.2.*", "1.2.7"));
        assert!(!matches("==1.2.*", "1.3.0"));
        assert!(matches("!=1.2.*", "1.3.0"));
    }

    #[test]
    fn test_prerelease_excluded_by_default() {
        assert!(!matches(">=1.0", "1.1.0rc1"));
        assert!(!matches(">=1.0", "1.1.0.dev3"));
        assert!(matches(">=1.0", "1.1.0"));
        assert!(matches(">=1.1.0rc1", "1.1.0rc2"));
        assert!(matches(">=1.0,<2.0a1", "1.5b2"));
    }

    #[test]
    fn test_normalised_names() {
        assert!(matches(">=1.0", "1.0.0"));
        assert!(matches("==2.0", "2.0.0"));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(PypiRange::parse("=>>1").is_err());
        assert_eq!(PypiRange::parse(">=1").unwrap().matches("not valid"), None);
    }
}
