//! RubyGems versions and requirements

use std::cmp::Ordering;

use super::{Ecosystem, RangeError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Number(u64),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct GemVersion {
    segments: Vec<Segment>,
}

impl GemVersion {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let valid = !input.is_empty()
            && input.starts_with(|c: char| c.is_ascii_digit())
            && input
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if !valid {
            return None;
        }

        // `1.0.0-rc1` is treated as `1.0.0.pre.rc1`
        let normalized = input.replace('-', ".pre.");
        let mut segments = Vec::new();
        for part in normalized.split('.') {
            if part.is_empty() {
                return None;
            }
            let mut token = String::new();
            let mut digit = None;
            for c in part.chars() {
                let is_digit = c.is_ascii_digit();
                if digit.is_some_and(|d| d != is_digit) {
                    segments.push(segment(&token)?);
                    token.clear();
                }
                token.push(c);
                digit = Some(is_digit);
            }
            segments.push(segment(&token)?);
        }
        Some(Self { segments })
    }

    pub fn is_prerelease(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Text(_)))
    }

    /// Release segments without trailing zeros, followed by the prerelease part
    /// without trailing zeros
    fn canonical(&self) -> Vec<Segment> {
        let split = self
            .segments
            .iter()
            .position(|s| matches!(s, Segment::Text(_)))
            .unwrap_or(self.segments.len());
        let (release, pre) = self.segments.split_at(split);
        let mut out = trim_zeros(release);
        out.extend(trim_zeros(pre));
        out
    }

    /// Upper bound used by `~>`: drop the last release segment, then increment
    fn bump(&self) -> GemVersion {
        let mut release: Vec<u64> = self
            .segments
            .iter()
            .map_while(|s| match s {
                Segment::Number(n) => Some(*n),
                Segment::Text(_) => None,
            })
            .collect();
        if release.len() > 1 {
            release.pop();
        }
        if let Some(last) = release.last_mut() {
            *last += 1;
        }
        GemVersion {
            segments: release.into_iter().map(Segment::Number).collect(),
        }
    }
}

fn segment(token: &str) -> Option<Segment> {
    if token.bytes().all(|b| b.is_ascii_digit()) {
        token.parse().ok().map(Segment::Number)
    } else {
        Some(Segment::Text(token.to_string()))
    }
}

fn trim_zeros(segments: &[Segment]) -> Vec<Segment> {
    let mut out = segments.to_vec();
    while out.len() > 1 && out.last() == Some(&Segment::Number(0)) {
        out.pop();
    }
    out
}

impl Ord for GemVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let (lhs, rhs) = (self.canonical(), other.canonical());
        let len = lhs.len().max(rhs.len());
        let zero = Segment::Number(0);
        for i in 0..len {
            let a = lhs.get(i).unwrap_or(&zero);
            let b = rhs.get(i).unwrap_or(&zero);
            let ord = match (a, b) {
                (Segment::Number(x), Segment::Number(y)) => x.cmp(y),
                (Segment::Text(x), Segment::Text(y)) => x.cmp(y),
                (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
                (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for GemVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GemVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GemVersion {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Pessimistic,
}

#[derive(Debug, Clone)]
struct Predicate {
    op: Op,
    version: GemVersion,
}

impl Predicate {
    fn satisfied_by(&self, v: &GemVersion) -> bool {
        match self.op {
            Op::Eq => *v == self.version,
            Op::Ne => *v != self.version,
            Op::Gt => *v > self.version,
            Op::Lt => *v < self.version,
            Op::Ge => *v >= self.version,
            Op::Le => *v <= self.version,
            Op::Pessimistic => *v >= self.version && *v < self.version.bump(),
        }
    }
}

/// Comma-separated, conjunctive gem requirement such as `~> 2.1, >= 2.1.3`
#[derive(Debug, Clone)]
pub struct GemRequirement {
    predicates: Vec<Predicate>,
}

impl GemRequirement {
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let predicates = input
            .split(',')
            .map(|part| parse_predicate(part.trim()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| RangeError::new(Ecosystem::RubyGems, input, "invalid requirement"))?;
        Ok(Self { predicates })
    }

    pub fn matches(&self, version: &str) -> Option<bool> {
        let version = GemVersion::parse(version)?;
        Some(self.predicates.iter().all(|p| p.satisfied_by(&version)))
    }
}

fn parse_predicate(text: &str) -> Option<Predicate> {
    // longest operators first
    const OPS: [(&str, Op); 7] = [
        ("~>", Op::Pessimistic),
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("!=", Op::Ne),
        ("=", Op::Eq),
        (">", Op::Gt),
        ("<", Op::Lt),
    ];
    let (op, rest) = OPS
        .iter()
        .find_map(|(sym, op)| text.strip_prefix(sym).map(|rest| (*op, rest)))
        .unwrap_or((Op::Eq, text));
    let version = GemVersion::parse(rest.trim())?;
    Some(Predicate { op, version })
}
