//! The per-handle logging facade.

use std::{fmt, sync::Arc};

use crate::{
    config::LoggerConfig,
    header::CallSite,
    sink::{self, Sink},
    verbosity::VerbosityGate,
    LoggerError, Severity,
};

/// A logging handle with its own verbosity, writing through a shared [`Sink`].
///
/// Records are attributed to the source location of the method call (or macro invocation).
/// Cloning a logger shares the sink; the clone starts at the same verbosity and can then be
/// changed independently.
#[derive(Debug, Clone)]
pub struct Logger {
    gate: VerbosityGate,
    sink: Arc<Sink>,
}

macro_rules! gated_methods {
    ($($(#[$doc:meta])* $severity:ident => $plain:ident, $formatted:ident;)*) => {
        $(
            $(#[$doc])*
            #[track_caller]
            pub fn $plain(&self, message: &str) {
                self.log_at(Severity::$severity, &CallSite::caller(), format_args!("{message}"));
            }

            $(#[$doc])*
            #[track_caller]
            pub fn $formatted(&self, args: fmt::Arguments<'_>) {
                self.log_at(Severity::$severity, &CallSite::caller(), args);
            }
        )*
    };
}

impl Logger {
    /// Creates a logger writing through the process-wide sink.
    ///
    /// The first successful call opens the destinations described by `config`. Later calls
    /// only take `config.level` into account and share the existing sink.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError`] if the sink has to be opened and that fails, e.g. because the
    /// log file cannot be opened for append.
    pub fn new(config: &LoggerConfig) -> Result<Self, LoggerError> {
        let (sink, created) = sink::global(config)?;
        if !created {
            tracing::debug!("log sink already initialized, only the verbosity is applied");
        }
        Ok(Self::with_sink(sink, config.level))
    }

    /// Creates a logger writing through an explicitly constructed sink.
    pub fn with_sink(sink: Arc<Sink>, level: Severity) -> Self {
        Self {
            gate: VerbosityGate::new(level),
            sink,
        }
    }

    /// The sink this logger writes through.
    pub fn sink(&self) -> &Arc<Sink> {
        &self.sink
    }

    /// Changes the verbosity of this handle.
    pub fn set_verbosity(&self, level: Severity) {
        self.gate.set_level(level);
    }

    /// The current verbosity of this handle.
    pub fn verbosity(&self) -> Severity {
        self.gate.level()
    }

    /// Whether a record at `severity` would be written.
    pub fn is_enabled(&self, severity: Severity) -> bool {
        severity == Severity::Fatal || self.gate.is_enabled(severity)
    }

    /// Logs `message` at `severity`.
    ///
    /// A [`Severity::Fatal`] record terminates the process.
    #[track_caller]
    pub fn log(&self, severity: Severity, message: &str) {
        self.log_at(severity, &CallSite::caller(), format_args!("{message}"));
    }

    /// Logs a formatted message at `severity`.
    ///
    /// A [`Severity::Fatal`] record terminates the process.
    #[track_caller]
    pub fn log_fmt(&self, severity: Severity, args: fmt::Arguments<'_>) {
        self.log_at(severity, &CallSite::caller(), args);
    }

    /// Logs a formatted message at `severity`, attributed to an explicit call site.
    ///
    /// A [`Severity::Fatal`] record terminates the process.
    pub fn log_at(&self, severity: Severity, site: &CallSite<'_>, args: fmt::Arguments<'_>) {
        if !self.is_enabled(severity) {
            return;
        }
        let buf = self.sink.format(severity, site, args);
        self.sink.output(severity, buf);
    }

    gated_methods! {
        /// Logs at [`Severity::Critical`] if enabled.
        Critical => crit, critf;
        /// Logs at [`Severity::Alert`] if enabled.
        Alert => alert, alertf;
        /// Logs at [`Severity::Error`] if enabled.
        Error => error, errorf;
        /// Logs at [`Severity::Warning`] if enabled.
        Warning => warn, warnf;
        /// Logs at [`Severity::Notice`] if enabled.
        Notice => notice, noticef;
        /// Logs at [`Severity::Info`] if enabled.
        Info => info, infof;
        /// Logs at [`Severity::Debug`] if enabled.
        Debug => debug, debugf;
    }

    /// Logs `message` with a stack dump and terminates the process.
    ///
    /// Never gated by verbosity.
    #[track_caller]
    pub fn fatal(&self, message: &str) -> ! {
        self.fatalf(format_args!("{message}"))
    }

    /// Logs a formatted message with a stack dump and terminates the process.
    ///
    /// Never gated by verbosity.
    #[track_caller]
    pub fn fatalf(&self, args: fmt::Arguments<'_>) -> ! {
        let buf = self
            .sink
            .format(Severity::Fatal, &CallSite::caller(), args);
        self.sink.fatal(buf)
    }

    /// Flushes buffered output within a short budget and closes the log file.
    ///
    /// Affects every logger sharing the sink. Only the first call has any effect.
    pub fn close(&self) {
        self.sink.close();
    }
}

/// Logs a formatted message at [`Severity::Critical`]: `crit!(logger, "{} failed", name)`.
#[macro_export]
macro_rules! crit {
    ($logger:expr, $($arg:tt)+) => {
        $logger.critf(::std::format_args!($($arg)+))
    };
}

/// Logs a formatted message at [`Severity::Alert`].
#[macro_export]
macro_rules! alert {
    ($logger:expr, $($arg:tt)+) => {
        $logger.alertf(::std::format_args!($($arg)+))
    };
}

/// Logs a formatted message at [`Severity::Error`].
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.errorf(::std::format_args!($($arg)+))
    };
}

/// Logs a formatted message at [`Severity::Warning`].
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $logger.warnf(::std::format_args!($($arg)+))
    };
}

/// Logs a formatted message at [`Severity::Notice`].
#[macro_export]
macro_rules! notice {
    ($logger:expr, $($arg:tt)+) => {
        $logger.noticef(::std::format_args!($($arg)+))
    };
}

/// Logs a formatted message at [`Severity::Info`].
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.infof(::std::format_args!($($arg)+))
    };
}

/// Logs a formatted message at [`Severity::Debug`].
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.debugf(::std::format_args!($($arg)+))
    };
}

/// Logs a formatted message at [`Severity::Fatal`] and terminates the process.
#[macro_export]
macro_rules! fatal {
    ($logger:expr, $($arg:tt)+) => {
        $logger.fatalf(::std::format_args!($($arg)+))
    };
}
