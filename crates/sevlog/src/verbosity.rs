//! Lock-free per-logger verbosity threshold.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::Severity;

/// Holds the minimum severity a logger produces output for.
///
/// The level is a single atomic scalar, so it can be changed while other threads are logging
/// without any lock.
#[derive(Debug)]
pub struct VerbosityGate {
    level: AtomicU8,
}

impl VerbosityGate {
    /// Creates a gate configured at `level`.
    pub fn new(level: Severity) -> Self {
        Self {
            level: AtomicU8::new(level.as_u8()),
        }
    }

    /// Replaces the configured level for all subsequent calls.
    pub fn set_level(&self, level: Severity) {
        self.level.store(level.as_u8(), Ordering::Release);
    }

    /// The currently configured level.
    pub fn level(&self) -> Severity {
        // Only `Severity` ordinals are ever stored.
        Severity::from_u8(self.level.load(Ordering::Acquire)).unwrap_or(Severity::Debug)
    }

    /// Whether a call at `severity` should produce output.
    #[inline]
    pub fn is_enabled(&self, severity: Severity) -> bool {
        severity.as_u8() <= self.level.load(Ordering::Acquire)
    }
}

impl Clone for VerbosityGate {
    fn clone(&self) -> Self {
        Self::new(self.level())
    }
}
