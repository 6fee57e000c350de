//! Indicators of compromise and their cross-target reuse.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of indicator observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IocType {
    /// An email address.
    Email,
    /// A cryptocurrency address.
    Crypto,
    /// SHA-256 of a downloaded file.
    FileHash,
}

impl IocType {
    /// The canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IocType::Email => "email",
            IocType::Crypto => "crypto",
            IocType::FileHash => "file_hash",
        }
    }
}

impl fmt::Display for IocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(IocType::Email),
            "crypto" => Ok(IocType::Crypto),
            "file_hash" => Ok(IocType::FileHash),
            other => Err(format!("unknown ioc type '{other}'")),
        }
    }
}

/// One sighting of an indicator on a target. Append-only; many rows per
/// `(type, value)` are expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IocObservation {
    /// Indicator kind.
    pub ioc_type: IocType,
    /// Indicator value.
    pub ioc_value: String,
    /// Target the indicator was seen on.
    pub target: String,
    /// When it was observed.
    pub timestamp: DateTime<Utc>,
}

/// Result of inserting an observation: the size of the indicator's reuse set
/// and whether the target had already contributed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IocReuse {
    /// Distinct targets the indicator has been seen on, after the insert.
    pub distinct_targets: u32,
    /// Whether the inserting target was already in the reuse set.
    pub target_was_known: bool,
}
