//! Dependency version constraints
//!
//! A bare version pins one release. Anything else is a cargo-style
//! requirement handed to `semver` (`^1.2`, `~1.2.3`, `>=1, <2`). An empty
//! constraint and `*` accept every version.

use semver::{Version, VersionReq};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    Any,
    Exact(Version),
    Req(VersionReq),
}

impl VersionConstraint {
    pub fn parse(s: &str) -> Result<Self, semver::Error> {
        match s.trim() {
            "" | "*" => Ok(Self::Any),
            s => match Version::parse(s) {
                Ok(version) => Ok(Self::Exact(version)),
                Err(_) => VersionReq::parse(s).map(Self::Req),
            },
        }
    }

    /// Absence of a constraint accepts every version
    pub fn parse_optional(s: Option<&str>) -> Result<Self, semver::Error> {
        s.map_or(Ok(Self::Any), Self::parse)
    }

    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(pinned) => pinned == version,
            Self::Req(req) => req.matches(version),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(version) => write!(f, "={}", version),
            Self::Req(req) => write!(f, "{}", req),
        }
    }
}
