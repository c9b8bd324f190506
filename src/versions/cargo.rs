//! Cargo requirements (caret by default)

use semver::{Version, VersionReq};

use super::{Ecosystem, RangeError, coerce_semver};

#[derive(Debug, Clone)]
pub struct CargoRange {
    reqs: Vec<VersionReq>,
}

impl CargoRange {
    /// Parse a Cargo requirement; `||` alternatives are accepted as a union
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let reqs = input
            .split("||")
            .map(|part| {
                VersionReq::parse(part.trim()).map_err(|e| RangeError::new(Ecosystem::Cargo, input, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { reqs })
    }

    pub fn matches(&self, version: &str) -> Option<bool> {
        let version = Version::parse(&coerce_semver(version)).ok()?;
        Some(self.reqs.iter().any(|req| req.matches(&version)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(range: &str, version: &str) -> bool {
        CargoRange::parse(range).unwrap().matches(version).unwrap()
    }

    #[test]
    fn test_bare_requirement_is_caret() {
        assert!(matches("1.2", "1.9.0"));
        assert!(!matches("1.2", "2.0.0"));
        assert!(matches("0.3", "0.3.7"));
        assert!(!matches("0.3", "0.4.0"));
    }

    #[test]
    fn test_tilde_and_comparators() {
        assert!(matches("~1.2.3", "1.2.9"));
        assert!(!matches("~1.2.3", "1.3.0"));
        assert!(matches(">=1.0, <1.5", "1.4.9"));
        assert!(matches("*", "7.0.0"));
    }

    #[test]
    fn test_prerelease_excluded_by_default() {
        assert!(!matches("^1.0", "1.1.0-alpha.1"));
        assert!(matches(">=1.1.0-alpha", "1.1.0-alpha.1"));
    }

    #[test]
    fn test_invalid_version() {
        assert_eq!(CargoRange::parse("^1").unwrap().matches("x.y"), None);
    }
}
