// SPDX-License-Identifier: MIT OR Apache-2.0
//! Totally ordered severity levels with a canonical text encoding.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// How serious a failure is.
///
/// Variants are declared lowest to highest so the derived [`Ord`] matches
/// `Debug < Info < Warning < Error < Critical < Fatal`. Thresholds compare
/// with `>=`; metrics group by exact value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Severity {
    /// Diagnostic detail.
    Debug,
    /// Informational.
    Info,
    /// Degraded but still working.
    Warning,
    /// The operation failed.
    #[default]
    Error,
    /// A failure that needs immediate attention.
    Critical,
    /// The process cannot continue.
    Fatal,
}

/// Failure to decode a [`Severity`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeverityParseError {
    /// The token is not one of the six canonical names.
    #[error("unknown severity: {0}")]
    Unknown(String),
}

impl Severity {
    /// All severities, lowest first.
    pub const ALL: [Severity; 6] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Fatal,
    ];

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Fatal => "FATAL",
        }
    }

    /// Position in [`Severity::ALL`]; stable for array-indexed counters.
    pub fn as_index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = SeverityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SeverityParseError::Unknown(s.to_string()))
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
