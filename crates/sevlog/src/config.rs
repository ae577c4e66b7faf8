//! Logger configuration.

use std::{ops::BitOr, path::PathBuf, time::Duration};

use crate::{LoggerError, Severity};

/// A set of output options, combined with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct OutputFlags(u32);

impl OutputFlags {
    /// No output at all.
    pub const NONE: Self = Self(0);

    /// Write records to standard error.
    pub const STDERR: Self = Self(1);

    /// Write records to the configured log file.
    pub const FILE: Self = Self(1 << 1);

    /// Start each record with a `<N> ` journald facility prefix.
    pub const JOURNALD: Self = Self(1 << 2);

    /// The raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every flag in `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OutputFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Configuration for [`Logger::new`][crate::Logger::new].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LoggerConfig {
    /// Path of the log file, opened for append. Required when [`OutputFlags::FILE`] is set.
    pub file: Option<PathBuf>,

    /// How often buffered file output is flushed in the background.
    pub flush_interval: Duration,

    /// Initial verbosity of the returned logger.
    pub level: Severity,

    /// Selected outputs.
    pub flags: OutputFlags,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            file: None,
            flush_interval: Duration::from_secs(30),
            level: Severity::Info,
            flags: OutputFlags::STDERR,
        }
    }
}

impl LoggerConfig {
    /// The file to open, if file output is selected.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Configuration`] if file output is selected without a path, or with
    /// a zero flush interval.
    pub(crate) fn file_destination(&self) -> Result<Option<&PathBuf>, LoggerError> {
        if !self.flags.contains(OutputFlags::FILE) {
            return Ok(None);
        }
        if self.flush_interval.is_zero() {
            return Err(LoggerError::Configuration(
                "`flush_interval` must be non-zero when file output is enabled".to_owned(),
            ));
        }
        self.file.as_ref().map(Some).ok_or_else(|| {
            LoggerError::Configuration(
                "file output is enabled but no log file path was given".to_owned(),
            )
        })
    }
}
