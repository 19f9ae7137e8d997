//! Four-component plugin versions and the relations used to gate loading

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version parse error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid plugin version: {0}")]
pub struct VersionParseError(pub String);

/// `MAJOR.MINOR.PATCH.BUILD`
///
/// Field order makes the derived ordering compare component-wise, left to
/// right, stopping at the first component that differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PluginVersion {
    /// Major component
    pub major: u32,
    /// Minor component
    pub minor: u32,
    /// Patch component
    pub patch: u32,
    /// Build component
    pub build: u32,
}

impl PluginVersion {
    /// Create a version
    pub const fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }
}

impl FromStr for PluginVersion {
    type Err = VersionParseError;

    /// Accepts `1.2.3.4` and `v1.2.3.4`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);

        let parts = digits
            .split('.')
            .map(str::parse::<u32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VersionParseError(s.to_string()))?;

        match parts.as_slice() {
            [major, minor, patch, build] => Ok(Self::new(*major, *minor, *patch, *build)),
            _ => Err(VersionParseError(s.to_string())),
        }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

/// Relation between the reported and the requested version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionRule {
    /// `<=`
    #[serde(rename = "<=")]
    LessOrEqual,
    /// `<`
    #[serde(rename = "<")]
    Less,
    /// `==`
    #[serde(rename = "==")]
    Equal,
    /// `>=`
    #[serde(rename = ">=")]
    GreaterOrEqual,
    /// `>`
    #[serde(rename = ">")]
    Greater,
}

impl VersionRule {
    /// Does `reported RULE requested` hold
    pub fn accepts(self, reported: PluginVersion, requested: PluginVersion) -> bool {
        match self {
            Self::LessOrEqual => reported <= requested,
            Self::Less => reported < requested,
            Self::Equal => reported == requested,
            Self::GreaterOrEqual => reported >= requested,
            Self::Greater => reported > requested,
        }
    }

    /// Script operator
    pub fn symbol(self) -> &'static str {
        match self {
            Self::LessOrEqual => "<=",
            Self::Less => "<",
            Self::Equal => "==",
            Self::GreaterOrEqual => ">=",
            Self::Greater => ">",
        }
    }
}

impl FromStr for VersionRule {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<=" => Ok(Self::LessOrEqual),
            "<" => Ok(Self::Less),
            "==" => Ok(Self::Equal),
            ">=" => Ok(Self::GreaterOrEqual),
            ">" => Ok(Self::Greater),
            other => Err(VersionParseError(format!("unknown relation {other}"))),
        }
    }
}

impl fmt::Display for VersionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Version constraint attached to a `LOAD_PLUGIN` directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRequirement {
    /// Relation to check
    pub rule: VersionRule,
    /// Version on the right-hand side
    pub version: PluginVersion,
}

impl VersionRequirement {
    /// Check a reported version against the constraint
    pub fn matches(&self, reported: PluginVersion) -> bool {
        self.rule.accepts(reported, self.version)
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.rule, self.version)
    }
}
