//! The ordered set of severities a log call can carry, and their fixed projections.

use std::{fmt, str::FromStr};

use crate::LoggerError;

/// Seriousness of a single log call.
///
/// Variants are ordered from most to least severe, so `Severity::Critical < Severity::Debug`.
/// A call at severity `S` is produced by a logger configured at level `L` iff `S <= L`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "&'static str"))]
#[repr(u8)]
pub enum Severity {
    /// Critical conditions.
    Critical = 0,

    /// Action must be taken immediately.
    Alert = 1,

    /// Unrecoverable condition. Logging at this severity terminates the process.
    Fatal = 2,

    /// Error conditions.
    Error = 3,

    /// Warning conditions.
    Warning = 4,

    /// Normal but significant conditions.
    Notice = 5,

    /// Informational messages.
    Info = 6,

    /// Debug-level messages.
    Debug = 7,
}

const NAMES: [&str; 8] = [
    "CRIT", "ALERT", "FATAL", "ERROR", "WARNING", "NOTICE", "INFO", "DEBUG",
];

const CHARS: [u8; 8] = *b"CAFEWNID";

// Fatal collapses onto Critical and Debug onto Info for downstream classification.
const FACILITY: [u8; 8] = [0, 1, 0, 3, 4, 5, 6, 6];

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Self; 8] = [
        Self::Critical,
        Self::Alert,
        Self::Fatal,
        Self::Error,
        Self::Warning,
        Self::Notice,
        Self::Info,
        Self::Debug,
    ];

    /// Converts a raw ordinal back into a severity.
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Critical),
            1 => Some(Self::Alert),
            2 => Some(Self::Fatal),
            3 => Some(Self::Error),
            4 => Some(Self::Warning),
            5 => Some(Self::Notice),
            6 => Some(Self::Info),
            7 => Some(Self::Debug),
            _ => None,
        }
    }

    /// The ordinal of this severity; lower is more severe.
    #[allow(clippy::as_conversions)] // Fieldless `repr(u8)` enum
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Display name, e.g. `"WARNING"`.
    pub fn name(self) -> &'static str {
        Self::name_of_raw(self.as_u8())
    }

    /// Display name for a raw ordinal. Out-of-range values render as an empty string.
    pub fn name_of_raw(raw: u8) -> &'static str {
        NAMES.get(usize::from(raw)).copied().unwrap_or_default()
    }

    /// Single character written in the log header, e.g. `b'W'`.
    pub fn as_char(self) -> u8 {
        CHARS
            .get(usize::from(self.as_u8()))
            .copied()
            .unwrap_or(b'?')
    }

    /// Facility number used by journald-style consumers for prefix-based filtering.
    pub fn facility(self) -> u8 {
        FACILITY
            .get(usize::from(self.as_u8()))
            .copied()
            .unwrap_or_default()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let severity = match s.trim().to_ascii_lowercase().as_str() {
            "crit" | "critical" => Self::Critical,
            "alert" => Self::Alert,
            "fatal" => Self::Fatal,
            "error" | "err" => Self::Error,
            "warning" | "warn" => Self::Warning,
            "notice" => Self::Notice,
            "info" => Self::Info,
            "debug" => Self::Debug,
            _ => return Err(LoggerError::InvalidSeverity(s.to_owned())),
        };
        Ok(severity)
    }
}

impl TryFrom<String> for Severity {
    type Error = LoggerError;

    fn try_from(value: String) -> Result<Self, LoggerError> {
        value.parse()
    }
}

impl From<Severity> for &'static str {
    fn from(severity: Severity) -> Self {
        severity.name()
    }
}
