//! Version ordering and version ranges.
//!
//! Versions follow the artifact ecosystem's ordering rather than lexical order: a version is
//! split into numeric and qualifier items at `.`, `-` and digit/letter transitions. Numbers compare
//! numerically, qualifiers by their well-known rank
//! (`alpha < beta < milestone < rc < snapshot < release < sp`), unknown qualifiers sort after
//! `sp` lexically. Trailing zeros and release qualifiers are insignificant, so `1`, `1.0` and
//! `1.0.0-final` are the same version.

use crate::error::ResolveError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    /// Decimal digits with leading zeros stripped; empty means zero.
    Number(String),
    Qualifier(String),
}

/// Rank of a release (empty) qualifier.
const RELEASE_RANK: usize = 5;

fn qualifier_rank(qualifier: &str) -> Option<usize> {
    match qualifier {
        "alpha" | "a" => Some(0),
        "beta" | "b" => Some(1),
        "milestone" | "m" => Some(2),
        "rc" | "cr" => Some(3),
        "snapshot" => Some(4),
        "" | "ga" | "final" | "release" => Some(RELEASE_RANK),
        "sp" => Some(6),
        _ => None,
    }
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    match (qualifier_rank(a), qualifier_rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl Item {
    fn is_null(&self) -> bool {
        match self {
            Item::Number(digits) => digits.is_empty(),
            Item::Qualifier(q) => qualifier_rank(q) == Some(RELEASE_RANK),
        }
    }

    fn cmp_item(&self, other: &Item) -> Ordering {
        match (self, other) {
            (Item::Number(a), Item::Number(b)) => compare_numbers(a, b),
            (Item::Number(_), Item::Qualifier(_)) => Ordering::Greater,
            (Item::Qualifier(_), Item::Number(_)) => Ordering::Less,
            (Item::Qualifier(a), Item::Qualifier(b)) => compare_qualifiers(a, b),
        }
    }

    /// Comparison against a missing item on the other side.
    fn cmp_null(&self) -> Ordering {
        match self {
            Item::Number(digits) if digits.is_empty() => Ordering::Equal,
            Item::Number(_) => Ordering::Greater,
            Item::Qualifier(q) => compare_qualifiers(q, ""),
        }
    }
}

/// A concrete, comparable artifact version.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    items: Vec<Item>,
}

impl Version {
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        let mut items = Vec::new();
        let mut current = String::new();
        let mut digits = false;

        fn flush(current: &mut String, digits: bool, items: &mut Vec<Item>) {
            if digits {
                items.push(Item::Number(current.trim_start_matches('0').to_string()));
            } else {
                items.push(Item::Qualifier(current.clone()));
            }
            current.clear();
        }

        for ch in lowered.chars() {
            if ch == '.' || ch == '-' || ch == '_' {
                if !current.is_empty() {
                    flush(&mut current, digits, &mut items);
                }
                continue;
            }
            let is_digit = ch.is_ascii_digit();
            if !current.is_empty() && is_digit != digits {
                flush(&mut current, digits, &mut items);
            }
            digits = is_digit;
            current.push(ch);
        }
        if !current.is_empty() {
            flush(&mut current, digits, &mut items);
        }

        while items.last().is_some_and(Item::is_null) {
            items.pop();
        }

        Self {
            raw: raw.trim().to_string(),
            items,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Case-insensitive "snapshot" marker anywhere in the version string.
    pub fn is_snapshot(&self) -> bool {
        self.raw.to_ascii_lowercase().contains("snapshot")
    }

    pub fn is_release(&self) -> bool {
        !self.is_snapshot()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut left = self.items.iter();
        let mut right = other.items.iter();
        loop {
            let ordering = match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (Some(a), Some(b)) => a.cmp_item(b),
                (Some(a), None) => a.cmp_null(),
                (None, Some(b)) => b.cmp_null().reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Version::parse(s))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Version::parse(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// One interval of a range. `None` bounds are unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Restriction {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Restriction {
    fn contains(&self, version: &Version) -> bool {
        let above_lower = match &self.lower {
            None => true,
            Some(bound) if bound.inclusive => *version >= bound.version,
            Some(bound) => *version > bound.version,
        };
        let below_upper = match &self.upper {
            None => true,
            Some(bound) if bound.inclusive => *version <= bound.version,
            Some(bound) => *version < bound.version,
        };
        above_lower && below_upper
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(lower), Some(upper)) = (&self.lower, &self.upper) {
            if lower.inclusive && upper.inclusive && lower.version == upper.version {
                return write!(f, "[{}]", lower.version);
            }
        }
        match &self.lower {
            Some(bound) => write!(
                f,
                "{}{}",
                if bound.inclusive { '[' } else { '(' },
                bound.version
            )?,
            None => f.write_str("(")?,
        }
        f.write_str(",")?;
        match &self.upper {
            Some(bound) => write!(
                f,
                "{}{}",
                bound.version,
                if bound.inclusive { ']' } else { ')' }
            ),
            None => f.write_str(")"),
        }
    }
}

/// A version constraint: an exact version or a union of intervals.
///
/// Syntax: `1.0` (exactly 1.0), `[1.0]`, `[1.0,2.0)`, `(,1.0]`, `[1.0,)`, `[1,2),[3,4)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    restrictions: Vec<Restriction>,
}

impl VersionRange {
    /// The `[0, inf)` range used to enumerate every known version.
    pub fn all() -> Self {
        Self {
            restrictions: vec![Restriction {
                lower: Some(Bound {
                    version: Version::parse("0"),
                    inclusive: true,
                }),
                upper: None,
            }],
        }
    }

    pub fn exact(version: &Version) -> Self {
        let bound = Bound {
            version: version.clone(),
            inclusive: true,
        };
        Self {
            restrictions: vec![Restriction {
                lower: Some(bound.clone()),
                upper: Some(bound),
            }],
        }
    }

    pub fn parse(spec: &str) -> Result<Self, ResolveError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ResolveError::InvalidRange("empty range".to_string()));
        }
        if !spec.starts_with('[') && !spec.starts_with('(') {
            return Ok(Self::exact(&Version::parse(spec)));
        }

        let mut restrictions = Vec::new();
        let mut rest = spec;
        while !rest.is_empty() {
            let close = rest
                .find([']', ')'])
                .ok_or_else(|| ResolveError::InvalidRange(spec.to_string()))?;
            restrictions.push(parse_restriction(&rest[..=close], spec)?);
            rest = rest[close + 1..].trim_start();
            if let Some(stripped) = rest.strip_prefix(',') {
                rest = stripped.trim_start();
                if rest.is_empty() {
                    return Err(ResolveError::InvalidRange(spec.to_string()));
                }
            } else if !rest.is_empty() {
                return Err(ResolveError::InvalidRange(spec.to_string()));
            }
        }
        Ok(Self { restrictions })
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.restrictions.iter().any(|r| r.contains(version))
    }

    /// Exact pins resolve without a version listing.
    pub fn as_exact(&self) -> Option<&Version> {
        match self.restrictions.as_slice() {
            [Restriction {
                lower: Some(lower),
                upper: Some(upper),
            }] if lower.inclusive && upper.inclusive && lower.version == upper.version => {
                Some(&lower.version)
            }
            _ => None,
        }
    }
}

fn parse_restriction(chunk: &str, spec: &str) -> Result<Restriction, ResolveError> {
    let invalid = || ResolveError::InvalidRange(spec.to_string());
    let lower_inclusive = chunk.starts_with('[');
    let upper_inclusive = chunk.ends_with(']');
    let inner = &chunk[1..chunk.len() - 1];

    let bound = |text: &str, inclusive: bool| {
        let text = text.trim();
        (!text.is_empty()).then(|| Bound {
            version: Version::parse(text),
            inclusive,
        })
    };

    match inner.split_once(',') {
        None => {
            if !(lower_inclusive && upper_inclusive) || inner.trim().is_empty() {
                return Err(invalid());
            }
            let version = Version::parse(inner.trim());
            Ok(Restriction {
                lower: Some(Bound {
                    version: version.clone(),
                    inclusive: true,
                }),
                upper: Some(Bound {
                    version,
                    inclusive: true,
                }),
            })
        }
        Some((low, high)) => {
            if high.contains(',') {
                return Err(invalid());
            }
            let lower = bound(low, lower_inclusive);
            let upper = bound(high, upper_inclusive);
            if let (Some(l), Some(u)) = (&lower, &upper) {
                if l.version > u.version {
                    return Err(invalid());
                }
            }
            Ok(Restriction { lower, upper })
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(version) = self.as_exact() {
            return write!(f, "{}", version);
        }
        let parts: Vec<String> = self.restrictions.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for VersionRange {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::parse(s)
    }
}
