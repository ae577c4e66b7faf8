//! Stack trace capture for the fatal path.

use std::{backtrace::Backtrace, fmt::Write as _, thread};

/// Initial capture size for the calling thread only.
const SINGLE_THREAD_HINT: usize = 10_000;

/// Initial capture size when all threads are requested.
const ALL_THREADS_HINT: usize = 100_000;

/// Number of grow-and-retry rounds before a truncated trace is accepted.
const MAX_ATTEMPTS: usize = 5;

/// A host capability that renders thread stack traces.
pub trait StackSource: Send + Sync {
    /// Renders stack traces into `buf` and returns the number of bytes written.
    ///
    /// Writes at most `buf.len()` bytes. When `all` is set, every live thread the host can
    /// observe is included; otherwise only the calling thread.
    fn render(&self, buf: &mut [u8], all: bool) -> usize;
}

/// Captures traces with [`std::backtrace`].
///
/// The standard library only walks the calling thread's stack. For the all-threads dump the
/// remaining live threads are listed by name where the platform exposes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceSource;

impl StackSource for BacktraceSource {
    fn render(&self, buf: &mut [u8], all: bool) -> usize {
        let current = thread::current();
        let mut text = format!(
            "thread '{}' [running]:\n{}\n",
            current.name().unwrap_or("<unnamed>"),
            Backtrace::force_capture()
        );
        if all {
            for name in other_threads() {
                let _ = write!(text, "\nthread '{name}':\n  <stack not available>\n");
            }
        }

        let n = text.len().min(buf.len());
        if let (Some(dst), Some(src)) = (buf.get_mut(..n), text.as_bytes().get(..n)) {
            dst.copy_from_slice(src);
        }
        n
    }
}

#[cfg(target_os = "linux")]
fn other_threads() -> Vec<String> {
    let own = std::fs::read_to_string("/proc/thread-self/comm").unwrap_or_default();
    let Ok(tasks) = std::fs::read_dir("/proc/self/task") else {
        return Vec::new();
    };

    let mut own_seen = false;
    tasks
        .filter_map(Result::ok)
        .filter_map(|task| std::fs::read_to_string(task.path().join("comm")).ok())
        .filter(|comm| {
            // Skip one entry matching the calling thread, it has already been dumped.
            if !own_seen && *comm == own {
                own_seen = true;
                return false;
            }
            true
        })
        .map(|comm| comm.trim_end().to_owned())
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn other_threads() -> Vec<String> {
    Vec::new()
}

/// Captures stack traces from `source`, growing the buffer while the output fills it.
///
/// After [`MAX_ATTEMPTS`] rounds the last, possibly truncated, capture is returned.
pub fn capture(source: &dyn StackSource, all: bool) -> Vec<u8> {
    let mut size = if all {
        ALL_THREADS_HINT
    } else {
        SINGLE_THREAD_HINT
    };

    let mut trace = Vec::new();
    for _ in 0..MAX_ATTEMPTS {
        trace = vec![0; size];
        let written = source.render(&mut trace, all);
        if written < trace.len() {
            trace.truncate(written);
            return trace;
        }
        size = size.saturating_mul(2);
    }
    trace
}
