//! Maven versions and version ranges
//!
//! Ordering follows Maven's `ComparableVersion`: numeric items compare
//! numerically, qualifiers by their well-known rank
//! (`alpha < beta < milestone < rc < snapshot < release < sp`), and trailing
//! zero / release items are insignificant, so `1.0.0 == 1 == 1-final`.

use std::cmp::Ordering;

use super::{Ecosystem, RangeError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Number(u64),
    Qualifier(String),
}

/// Rank of a qualifier relative to a plain release (rank 5)
fn qualifier_rank(q: &str) -> (u8, &str) {
    match q {
        "alpha" | "a" => (0, ""),
        "beta" | "b" => (1, ""),
        "milestone" | "m" => (2, ""),
        "rc" | "cr" => (3, ""),
        "snapshot" => (4, ""),
        "" | "ga" | "final" | "release" => (5, ""),
        "sp" => (6, ""),
        other => (7, other),
    }
}

#[derive(Debug, Clone)]
pub struct MavenVersion {
    items: Vec<Item>,
}

impl MavenVersion {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().to_ascii_lowercase();
        if input.is_empty() || input.contains(char::is_whitespace) {
            return None;
        }

        let mut items = Vec::new();
        let mut current = String::new();
        let mut current_digit = None;
        let push = |items: &mut Vec<Item>, token: &mut String| -> Option<()> {
            if token.is_empty() {
                items.push(Item::Number(0));
            } else if token.bytes().all(|b| b.is_ascii_digit()) {
                items.push(Item::Number(token.parse().ok()?));
            } else {
                // zeros before a qualifier are insignificant: 1.0.0-rc1 == 1-rc1
                while items.len() > 1 && items.last() == Some(&Item::Number(0)) {
                    items.pop();
                }
                items.push(Item::Qualifier(std::mem::take(token)));
            }
            token.clear();
            Some(())
        };

        for c in input.chars() {
            match c {
                '.' | '-' | '_' => {
                    push(&mut items, &mut current)?;
                    current_digit = None;
                }
                c if c.is_ascii_alphanumeric() => {
                    let is_digit = c.is_ascii_digit();
                    // a transition between letters and digits starts a new item
                    if current_digit.is_some_and(|d| d != is_digit) {
                        push(&mut items, &mut current)?;
                    }
                    current.push(c);
                    current_digit = Some(is_digit);
                }
                _ => return None,
            }
        }
        push(&mut items, &mut current)?;

        // drop insignificant trailing items
        while let Some(last) = items.last() {
            let insignificant = match last {
                Item::Number(n) => *n == 0,
                Item::Qualifier(q) => qualifier_rank(q).0 == 5,
            };
            if insignificant && items.len() > 1 {
                items.pop();
            } else {
                break;
            }
        }
        Some(Self { items })
    }
}

fn compare_items(a: Option<&Item>, b: Option<&Item>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(Item::Number(x)), Some(Item::Number(y))) => x.cmp(y),
        (Some(Item::Number(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Number(_))) => Ordering::Less,
        (Some(Item::Qualifier(x)), Some(Item::Qualifier(y))) => {
            qualifier_rank(x).cmp(&qualifier_rank(y))
        }
        (Some(Item::Number(x)), None) => x.cmp(&0),
        (None, Some(Item::Number(y))) => 0.cmp(y),
        (Some(Item::Qualifier(x)), None) => qualifier_rank(x).cmp(&(5, "")),
        (None, Some(Item::Qualifier(y))) => (5, "").cmp(&qualifier_rank(y)),
    }
}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.items.len().max(other.items.len());
        (0..len)
            .map(|i| compare_items(self.items.get(i), other.items.get(i)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MavenVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MavenVersion {}

#[derive(Debug, Clone)]
struct Bound {
    version: MavenVersion,
    inclusive: bool,
}

#[derive(Debug, Clone)]
struct Interval {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Interval {
    fn contains(&self, v: &MavenVersion) -> bool {
        let above = match &self.lower {
            None => true,
            Some(b) if b.inclusive => *v >= b.version,
            Some(b) => *v > b.version,
        };
        let below = match &self.upper {
            None => true,
            Some(b) if b.inclusive => *v <= b.version,
            Some(b) => *v < b.version,
        };
        above && below
    }
}

/// A union of intervals such as `[1.0,2.0),[3.0,)`
///
/// A bare version outside brackets is an exact match.
#[derive(Debug, Clone)]
pub struct MavenRange {
    intervals: Vec<Interval>,
}

impl MavenRange {
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let err = |reason: &str| RangeError::new(Ecosystem::Maven, input, reason);
        let text: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        if text.is_empty() {
            return Err(err("empty range"));
        }

        if !text.starts_with(['[', '(']) {
            let version = MavenVersion::parse(&text).ok_or_else(|| err("invalid version"))?;
            let bound = Bound {
                version,
                inclusive: true,
            };
            return Ok(Self {
                intervals: vec![Interval {
                    lower: Some(bound.clone()),
                    upper: Some(bound),
                }],
            });
        }

        let mut intervals = Vec::new();
        let mut rest = text.as_str();
        while !rest.is_empty() {
            let open = rest.chars().next().ok_or_else(|| err("empty range"))?;
            if open != '[' && open != '(' {
                return Err(err("expected `[` or `(`"));
            }
            let close_at = rest
                .find([']', ')'])
                .ok_or_else(|| err("unterminated range"))?;
            let close = rest[close_at..]
                .chars()
                .next()
                .ok_or_else(|| err("unterminated range"))?;
            let body = &rest[1..close_at];
            intervals.push(parse_interval(body, open == '[', close == ']').map_err(err)?);

            rest = &rest[close_at + 1..];
            if let Some(next) = rest.strip_prefix(',') {
                if next.is_empty() {
                    return Err(err("trailing comma"));
                }
                rest = next;
            }
        }
        Ok(Self { intervals })
    }

    pub fn matches(&self, version: &str) -> Option<bool> {
        let version = MavenVersion::parse(version)?;
        Some(self.intervals.iter().any(|i| i.contains(&version)))
    }
}

fn parse_interval(body: &str, lower_inclusive: bool, upper_inclusive: bool) -> Result<Interval, &'static str> {
    let bound = |text: &str, inclusive: bool| -> Result<Option<Bound>, &'static str> {
        if text.is_empty() {
            return Ok(None);
        }
        let version = MavenVersion::parse(text).ok_or("invalid version")?;
        Ok(Some(Bound { version, inclusive }))
    };

    match body.split_once(',') {
        None => {
            // `[1.0]` pins a single version
            if !(lower_inclusive && upper_inclusive) {
                return Err("single version must use `[` and `]`");
            }
            let pinned = bound(body, true)?.ok_or("empty range")?;
            Ok(Interval {
                lower: Some(pinned.clone()),
                upper: Some(pinned),
            })
        }
        Some((low, high)) => {
            if high.contains(',') {
                return Err("too many bounds");
            }
            Ok(Interval {
                lower: bound(low, lower_inclusive)?,
                upper: bound(high, upper_inclusive)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> MavenVersion {
        MavenVersion::parse(s).unwrap()
    }

    fn matches(range: &str, version: &str) -> bool {
        MavenRange::parse(range).unwrap().matches(version).unwrap()
    }

    #[test]
    fn test_version_ordering() {
        assert!(v("1.0-alpha") < v("1.0-beta"));
        assert!(v("1.0-beta") < v("1.0-rc1"));
        assert!(v("1.0-rc1") < v("1.0-SNAPSHOT"));
        assert!(v("1.0-SNAPSHOT") < v("1.0"));
        assert!(v("1.0") < v("1.0-sp1"));
        assert!(v("1.0-sp1") < v("1.0.1"));
        assert!(v("1.9") < v("1.10"));
    }

    #[test]
    fn test_version_equivalence() {
        assert_eq!(v("1"), v("1.0.0"));
        assert_eq!(v("1.0-final"), v("1"));
        assert_eq!(v("1.0.GA"), v("1.0"));
        assert_eq!(v("1.0.0-rc1"), v("1-cr-1"));
    }

    #[test]
    fn test_ranges() {
        assert!(matches("[1.0,2.0)", "1.5"));
        assert!(matches("[1.0,2.0)", "1.0"));
        assert!(!matches("[1.0,2.0)", "2.0"));
        assert!(matches("(,1.0]", "0.9"));
        assert!(!matches("(1.0,)", "1.0"));
        assert!(matches("[1.0]", "1.0.0"));
        assert!(!matches("[1.0]", "1.0.1"));
    }

    #[test]
    fn test_multi_range() {
        assert!(matches("(,1.0],[1.2,)", "1.3"));
        assert!(!matches("(,1.0],[1.2,)", "1.1"));
    }

    #[test]
    fn test_bare_version_is_exact() {
        assert!(matches("2.3.1", "2.3.1"));
        assert!(!matches("2.3.1", "2.3.2"));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(MavenRange::parse("[1.0,").is_err());
        assert!(MavenRange::parse("(1.0)").is_err());
        assert!(MavenRange::parse("[1.0,2.0],").is_err());
        assert!(MavenRange::parse("").is_err());
    }
}
