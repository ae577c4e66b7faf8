//! `sevlog` is a severity-leveled logging facility with a fixed-width, line-oriented output format.
//!
//! It offers:
//! - A [`Logger`] handle with one method per [`Severity`], each gated by a lock-free per-handle
//!   verbosity level.
//! - A shared [`Sink`] that writes records to a buffered log file and/or standard error under a
//!   single write lock, flushes the file periodically in the background, and never waits longer
//!   than a fixed budget for a flush to finish.
//! - A fatal path that writes a stack dump to every destination and terminates the process.
//!
//! Every record has the form
//!
//! ```text
//!     Immdd hh:mm:ss.uuuuuu    pid file.rs:line] message
//! ```
//!
//! where the four leading columns carry a `<N> ` facility prefix when
//! [`OutputFlags::JOURNALD`] is set.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use sevlog::{Logger, LoggerConfig, OutputFlags, Severity};
//!
//! let dir = tempfile::tempdir()?;
//! let config = LoggerConfig {
//!     file: Some(dir.path().join("app.log")),
//!     flush_interval: Duration::from_secs(5),
//!     level: Severity::Info,
//!     flags: OutputFlags::FILE,
//! };
//!
//! let logger = Logger::new(&config)?;
//! logger.info("service started");
//! sevlog::warn!(logger, "{} retries left", 3);
//! logger.debug("not written at this verbosity");
//! logger.close();
//!
//! let contents = std::fs::read_to_string(dir.path().join("app.log"))?;
//! assert_eq!(contents.lines().count(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod buffer;
mod config;
mod header;
mod logger;
mod severity;
mod sink;
mod stacks;
mod verbosity;

use std::path::PathBuf;

pub use self::{
    buffer::{Buffer, BufferPool},
    config::{LoggerConfig, OutputFlags},
    header::{CallSite, HeaderEncoder, FIXED_HEADER_LEN},
    logger::Logger,
    severity::Severity,
    sink::{
        FlushOutcome, Sink, CLOSE_FLUSH_TIMEOUT, FATAL_EXIT_CODE, FLUSH_TIMEOUT,
    },
    stacks::{capture as capture_stacks, BacktraceSource, StackSource},
    verbosity::VerbosityGate,
};

/// Errors that can occur while setting up a logger.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// Represents an error in configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The log file could not be opened for append.
    #[error("Failed to open log file `{}`: {source}", path.display())]
    OpenFile {
        /// Path of the log file.
        path: PathBuf,

        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The background flush thread could not be started.
    #[error("Failed to start background log flusher: {0}")]
    FlushDaemon(#[source] std::io::Error),

    /// A severity name was not recognized.
    #[error("Unknown severity `{0}`")]
    InvalidSeverity(String),
}
