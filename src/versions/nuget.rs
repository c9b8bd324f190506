//! NuGet versions and version ranges

use std::cmp::Ordering;

use super::{Ecosystem, RangeError, numeric_components};

/// `major.minor.patch.revision[-label][+metadata]`
#[derive(Debug, Clone)]
pub struct NuGetVersion {
    release: [u64; 4],
    label: Vec<String>,
}

impl NuGetVersion {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let input = input.split_once('+').map_or(input, |(v, _)| v);
        let (release_text, label) = match input.split_once('-') {
            Some((release, label)) if !label.is_empty() => (release, label),
            Some(_) => return None,
            None => (input, ""),
        };
        let parts = numeric_components(release_text)?;
        if parts.is_empty() || parts.len() > 4 {
            return None;
        }
        let mut release = [0u64; 4];
        release[..parts.len()].copy_from_slice(&parts);
        let label = if label.is_empty() {
            Vec::new()
        } else {
            label.split('.').map(str::to_ascii_lowercase).collect()
        };
        Some(Self { release, label })
    }
}

fn compare_labels(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        // a release sorts above any prerelease
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    for (x, y) in a.iter().zip(b) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

impl Ord for NuGetVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.release
            .cmp(&other.release)
            .then_with(|| compare_labels(&self.label, &other.label))
    }
}

impl PartialOrd for NuGetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NuGetVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NuGetVersion {}

#[derive(Debug, Clone)]
enum NuGetRangeKind {
    Interval {
        lower: Option<(NuGetVersion, bool)>,
        upper: Option<(NuGetVersion, bool)>,
    },
    /// `1.2.*`: any version whose release starts with the given prefix
    Floating(Vec<u64>),
}

/// NuGet range notation
///
/// - `1.0` means `>= 1.0`
/// - `[1.0]` pins an exact version
/// - `[1.0,2.0)`, `(,1.0]`, `(1.0,)` are intervals
/// - `1.*` floats within a prefix
#[derive(Debug, Clone)]
pub struct NuGetRange {
    kind: NuGetRangeKind,
}

impl NuGetRange {
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let err = |reason: &str| RangeError::new(Ecosystem::NuGet, input, reason);
        let text: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        if text.is_empty() {
            return Err(err("empty range"));
        }

        if text == "*" {
            return Ok(Self {
                kind: NuGetRangeKind::Interval {
                    lower: None,
                    upper: None,
                },
            });
        }

        if let Some(prefix) = text.strip_suffix(".*") {
            let parts = numeric_components(prefix).ok_or_else(|| err("invalid floating range"))?;
            return Ok(Self {
                kind: NuGetRangeKind::Floating(parts),
            });
        }

        let open = text.chars().next().ok_or_else(|| err("empty range"))?;
        if open != '[' && open != '(' {
            let version = NuGetVersion::parse(&text).ok_or_else(|| err("invalid version"))?;
            return Ok(Self {
                kind: NuGetRangeKind::Interval {
                    lower: Some((version, true)),
                    upper: None,
                },
            });
        }

        let close = text.chars().last().ok_or_else(|| err("empty range"))?;
        if text.len() < 2 || (close != ']' && close != ')') {
            return Err(err("unterminated range"));
        }
        let body = &text[1..text.len() - 1];
        let bound = |s: &str| -> Result<Option<NuGetVersion>, RangeError> {
            if s.is_empty() {
                Ok(None)
            } else {
                NuGetVersion::parse(s)
                    .map(Some)
                    .ok_or_else(|| err("invalid version"))
            }
        };

        let kind = match body.split_once(',') {
            None => {
                if open != '[' || close != ']' {
                    return Err(err("exact version must use `[` and `]`"));
                }
                let version = bound(body)?.ok_or_else(|| err("empty range"))?;
                NuGetRangeKind::Interval {
                    lower: Some((version.clone(), true)),
                    upper: Some((version, true)),
                }
            }
            Some((low, high)) => {
                let lower = bound(low)?.map(|v| (v, open == '['));
                let upper = bound(high)?.map(|v| (v, close == ']'));
                if lower.is_none() && upper.is_none() {
                    return Err(err("range without bounds"));
                }
                NuGetRangeKind::Interval { lower, upper }
            }
        };
        Ok(Self { kind })
    }

    pub fn matches(&self, version: &str) -> Option<bool> {
        let v = NuGetVersion::parse(version)?;
        let matched = match &self.kind {
            NuGetRangeKind::Floating(prefix) => {
                v.label.is_empty() && v.release.iter().zip(prefix).all(|(a, b)| a == b)
            }
            NuGetRangeKind::Interval { lower, upper } => {
                let above = match lower {
                    None => true,
                    Some((bound, true)) => v >= *bound,
                    Some((bound, false)) => v > *bound,
                };
                let below = match upper {
                    None => true,
                    Some((bound, true)) => v <= *bound,
                    Some((bound, false)) => v < *bound,
                };
                above && below
            }
        };
        Some(matched)
    }
}
