//! # Versions and Version Ranges
//!
//! Units, capabilities and artifact keys are versioned with [`Version`], a
//! totally ordered type backed by `semver::Version`. Two spellings are
//! accepted:
//!
//! - **Full semver**: `1.2.3`, `1.2.3-rc.1`, `1.2.3+build.7`.
//! - **Dotted with qualifier**: `1`, `1.5`, `1.5.2`, `1.5.2.v20240101`. Missing
//!   segments default to zero and the fourth segment is a qualifier. A
//!   qualified version sorts after the unqualified one, and qualifiers compare
//!   lexically (numerically when both are numeric).
//!
//! Requirements select capability versions with a [`VersionRange`] written in
//! interval notation:
//!
//! - `[1.0,2.0)` includes `1.0.0` and everything below `2.0.0`.
//! - `(1.0,2.0]` excludes the lower bound and includes the upper one.
//! - `1.0` alone means "`1.0.0` or later".
//! - `[1.2.3,1.2.3]` pins exactly one version; such ranges are *strict*.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::BuildMetadata;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A totally ordered unit version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(semver::Version);

impl Version {
    /// The lowest possible version, `0.0.0`.
    pub const ZERO: Version = Version(semver::Version::new(0, 0, 0));

    /// Creates an unqualified version.
    pub const fn new(major: u64, minor: u64, micro: u64) -> Self {
        Version(semver::Version::new(major, minor, micro))
    }

    /// Parses a version in either accepted spelling.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::VersionParse {
                input: input.to_string(),
                message: "empty version".to_string(),
            });
        }

        if let Ok(version) = semver::Version::parse(trimmed) {
            return Ok(Version(version));
        }

        let segments: Vec<&str> = trimmed.split('.').collect();
        if segments.len() > 4 {
            return Err(Error::VersionParse {
                input: input.to_string(),
                message: "at most four segments are allowed".to_string(),
            });
        }

        let mut numbers = [0u64; 3];
        for (slot, segment) in numbers.iter_mut().zip(segments.iter().take(3)) {
            *slot = segment.parse::<u64>().map_err(|_| Error::VersionParse {
                input: input.to_string(),
                message: format!("segment {:?} is not a number", segment),
            })?;
        }

        let mut version = semver::Version::new(numbers[0], numbers[1], numbers[2]);
        if let Some(qualifier) = segments.get(3) {
            version.build = BuildMetadata::new(qualifier)?;
        }
        Ok(Version(version))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn micro(&self) -> u64 {
        self.0.patch
    }

    /// The qualifier segment, if any.
    pub fn qualifier(&self) -> Option<&str> {
        if self.0.build.is_empty() {
            None
        } else {
            Some(self.0.build.as_str())
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::ZERO
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.0.pre.is_empty() {
            return write!(f, "{}", self.0);
        }
        write!(f, "{}.{}.{}", self.0.major, self.0.minor, self.0.patch)?;
        if !self.0.build.is_empty() {
            write!(f, ".{}", self.0.build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// An interval of versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    min: Version,
    include_min: bool,
    max: Option<Version>,
    include_max: bool,
}

impl VersionRange {
    /// The range matching every version.
    pub fn any() -> Self {
        VersionRange::at_least(Version::ZERO)
    }

    /// `[min, ∞)`
    pub fn at_least(min: Version) -> Self {
        VersionRange {
            min,
            include_min: true,
            max: None,
            include_max: false,
        }
    }

    /// `[version, version]`
    pub fn exact(version: Version) -> Self {
        VersionRange {
            min: version.clone(),
            include_min: true,
            max: Some(version),
            include_max: true,
        }
    }

    /// Creates a bounded interval, rejecting empty ones.
    pub fn between(
        min: Version,
        include_min: bool,
        max: Version,
        include_max: bool,
    ) -> Result<Self> {
        let empty = match min.cmp(&max) {
            Ordering::Greater => true,
            Ordering::Equal => !(include_min && include_max),
            Ordering::Less => false,
        };
        if empty {
            return Err(Error::VersionParse {
                input: format!("{}..{}", min, max),
                message: "range is empty".to_string(),
            });
        }
        Ok(VersionRange {
            min,
            include_min,
            max: Some(max),
            include_max,
        })
    }

    /// Parses interval notation or a bare lower bound.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(VersionRange::any());
        }

        let open = trimmed.chars().next();
        if !matches!(open, Some('[') | Some('(')) {
            return Ok(VersionRange::at_least(Version::parse(trimmed)?));
        }

        let close = trimmed.chars().last();
        if !matches!(close, Some(']') | Some(')')) || trimmed.len() < 2 {
            return Err(Error::VersionParse {
                input: input.to_string(),
                message: "interval must end with ']' or ')'".to_string(),
            });
        }

        let inner = &trimmed[1..trimmed.len() - 1];
        let (low, high) = inner.split_once(',').ok_or_else(|| Error::VersionParse {
            input: input.to_string(),
            message: "interval needs two bounds separated by ','".to_string(),
        })?;

        VersionRange::between(
            Version::parse(low)?,
            open == Some('['),
            Version::parse(high)?,
            close == Some(']'),
        )
    }

    pub fn min(&self) -> &Version {
        &self.min
    }

    pub fn max(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    /// Whether `version` lies inside the interval.
    pub fn contains(&self, version: &Version) -> bool {
        let above_min = match version.cmp(&self.min) {
            Ordering::Greater => true,
            Ordering::Equal => self.include_min,
            Ordering::Less => false,
        };
        if !above_min {
            return false;
        }
        match &self.max {
            None => true,
            Some(max) => match version.cmp(max) {
                Ordering::Less => true,
                Ordering::Equal => self.include_max,
                Ordering::Greater => false,
            },
        }
    }

    /// True when the range pins exactly one version.
    pub fn is_exact(&self) -> bool {
        self.include_min && self.include_max && self.max.as_ref() == Some(&self.min)
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        VersionRange::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.max {
            None => write!(f, "{}", self.min),
            Some(max) => write!(
                f,
                "{}{},{}{}",
                if self.include_min { '[' } else { '(' },
                self.min,
                max,
                if self.include_max { ']' } else { ')' }
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        VersionRange::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        VersionRange::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.to_string()
    }
}
