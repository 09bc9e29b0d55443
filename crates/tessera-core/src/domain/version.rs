//! Semantic versions and the closed ranges lazy dependencies are pinned to.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing versions or building ranges.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version: {0:?}")]
    Invalid(String),

    #[error("Invalid version range: {min} is greater than {max}")]
    InvertedRange { min: Version, max: Version },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PreId {
    Numeric(u64),
    AlphaNum(String),
}

/// A SemVer 2.0 version. Build metadata is accepted and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pre: Vec<PreId>,
}

impl Version {
    /// A release version without pre-release identifiers.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
        }
    }

    /// Parse a version string, tolerating a leading `v`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::Invalid(input.to_string());
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

        let (core_and_pre, _build) = trimmed.split_once('+').unwrap_or((trimmed, ""));
        let (core, pre) = match core_and_pre.split_once('-') {
            Some((_, "")) => return Err(invalid()),
            Some(parts) => parts,
            None => (core_and_pre, ""),
        };

        let mut parts = core.split('.');
        let major = parse_numeric(parts.next().ok_or_else(invalid)?).ok_or_else(invalid)?;
        let minor = parse_numeric(parts.next().ok_or_else(invalid)?).ok_or_else(invalid)?;
        let patch = parse_numeric(parts.next().ok_or_else(invalid)?).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let mut pre_ids = Vec::new();
        if !pre.is_empty() {
            for ident in pre.split('.') {
                if ident.is_empty()
                    || !ident
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
                {
                    return Err(invalid());
                }
                if ident.bytes().all(|b| b.is_ascii_digit()) {
                    pre_ids.push(PreId::Numeric(parse_numeric(ident).ok_or_else(invalid)?));
                } else {
                    pre_ids.push(PreId::AlphaNum(ident.to_string()));
                }
            }
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre: pre_ids,
        })
    }

    /// Whether this is a pre-release version.
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

/// Numeric identifiers must not carry leading zeros.
fn parse_numeric(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) || (s.len() > 1 && s.starts_with('0'))
    {
        return None;
    }
    s.parse().ok()
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    for (a, b) in self.pre.iter().zip(&other.pre) {
                        let c = match (a, b) {
                            (PreId::Numeric(a), PreId::Numeric(b)) => a.cmp(b),
                            (PreId::Numeric(_), PreId::AlphaNum(_)) => Ordering::Less,
                            (PreId::AlphaNum(_), PreId::Numeric(_)) => Ordering::Greater,
                            (PreId::AlphaNum(a), PreId::AlphaNum(b)) => a.cmp(b),
                        };
                        if c != Ordering::Equal {
                            return c;
                        }
                    }
                    self.pre.len().cmp(&other.pre.len())
                }
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for (i, id) in self.pre.iter().enumerate() {
            f.write_str(if i == 0 { "-" } else { "." })?;
            match id {
                PreId::Numeric(n) => write!(f, "{n}")?,
                PreId::AlphaNum(s) => f.write_str(s)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Closed `[min, max]` range of supported versions.
///
/// Deserialization goes through `new`, so an inverted range is rejected
/// there too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RangeBounds")]
pub struct VersionRange {
    min: Version,
    max: Version,
}

#[derive(Deserialize)]
struct RangeBounds {
    min: Version,
    max: Version,
}

impl TryFrom<RangeBounds> for VersionRange {
    type Error = VersionError;

    fn try_from(bounds: RangeBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.min, bounds.max)
    }
}

impl VersionRange {
    /// Build a range, rejecting `min > max`.
    pub fn new(min: Version, max: Version) -> Result<Self, VersionError> {
        if min > max {
            return Err(VersionError::InvertedRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Parse both bounds and build the range.
    pub fn parse(min: &str, max: &str) -> Result<Self, VersionError> {
        Self::new(Version::parse(min)?, Version::parse(max)?)
    }

    pub const fn min(&self) -> &Version {
        &self.min
    }

    pub const fn max(&self) -> &Version {
        &self.max
    }

    /// Whether `version` lies inside the closed range.
    pub fn contains(&self, version: &Version) -> bool {
        *version >= self.min && *version <= self.max
    }

    /// Range expression understood by npm-style package managers.
    pub fn to_npm_range(&self) -> String {
        if self.min == self.max {
            self.min.to_string()
        } else {
            format!(">={} <={}", self.min, self.max)
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_release() {
        let version = v("24.9.1");
        assert_eq!((version.major, version.minor, version.patch), (24, 9, 1));
        assert!(!version.is_prerelease());
        assert_eq!(v("v2.1.1"), v("2.1.1"));
        assert_eq!(v("1.0.0+build.7"), v("1.0.0"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "1", "1.2", "1.2.3.4", "01.2.3", "1.x.3", "1.2.3-", "1.2.3-a..b"] {
            assert!(Version::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_precedence() {
        let ordered = [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
            "1.0.1",
            "1.10.0",
            "2.0.0",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_display_roundtrip() {
        assert_eq!(v("1.0.0-rc.1").to_string(), "1.0.0-rc.1");
        assert_eq!(v("v3.2.1").to_string(), "3.2.1");
    }

    #[test]
    fn test_range_contains_bounds() {
        let range = VersionRange::parse("1.0.0", "2.0.0").unwrap();
        assert!(range.contains(&v("1.0.0")));
        assert!(range.contains(&v("1.5.0")));
        assert!(range.contains(&v("2.0.0")));
        assert!(!range.contains(&v("2.0.1")));
        assert!(!range.contains(&v("0.9.9")));
        assert!(!range.contains(&v("1.0.0-beta")));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = VersionRange::parse("2.0.0", "1.0.0").unwrap_err();
        assert!(matches!(err, VersionError::InvertedRange { .. }));
    }

    #[test]
    fn test_deserialized_range_is_checked() {
        let range: VersionRange =
            serde_json::from_str(r#"{"min":"24.9.0","max":"26.0.1"}"#).unwrap();
        assert_eq!(range, VersionRange::parse("24.9.0", "26.0.1").unwrap());

        let err = serde_json::from_str::<VersionRange>(r#"{"min":"2.0.0","max":"1.0.0"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("2.0.0"), "{err}");
    }

    #[test]
    fn test_npm_range() {
        assert_eq!(
            VersionRange::parse("24.9.0", "26.0.1").unwrap().to_npm_range(),
            ">=24.9.0 <=26.0.1"
        );
        assert_eq!(
            VersionRange::parse("4.0.2", "4.0.2").unwrap().to_npm_range(),
            "4.0.2"
        );
    }
}
