//! The shared output side of the logger: destinations, flushing and the fatal path.

use std::{
    fmt,
    fs::OpenOptions,
    io::{self, BufWriter, Write},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak,
    },
    thread,
    time::Duration,
};

use time::{OffsetDateTime, UtcOffset};

use crate::{
    buffer::{Buffer, BufferPool},
    config::{LoggerConfig, OutputFlags},
    header::{CallSite, HeaderEncoder},
    stacks::{self, BacktraceSource, StackSource},
    LoggerError, Severity,
};

/// Capacity of the buffered file writer.
const FILE_BUFFER_SIZE: usize = 256 * 1024;

/// Flush budget used by the background flusher and by the fatal path.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Flush budget used by [`Sink::close`].
pub const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Exit status of a process terminated by a fatal record.
pub const FATAL_EXIT_CODE: i32 = 255;

type FileWriter = BufWriter<Box<dyn Write + Send>>;

/// State guarded by the write lock.
struct Destinations {
    file: Option<FileWriter>,
}

type SharedDestinations = Arc<Mutex<Destinations>>;

fn lock(out: &Mutex<Destinations>) -> MutexGuard<'_, Destinations> {
    out.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of a bounded-time flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The buffered output reached the destination within the timeout.
    Completed,

    /// The timeout elapsed first. The flush keeps running in the background, unobserved.
    TimedOut,

    /// The flush could not be started, or the destination reported an I/O error.
    Failed,
}

/// Process-wide output state shared by every [`Logger`][crate::Logger].
///
/// Writes and flushes of the file destination are serialized by a single write lock. Message
/// buffers are recycled through a [`BufferPool`] with its own lock.
pub struct Sink {
    out: SharedDestinations,
    has_file: bool,
    stderr: bool,
    encoder: HeaderEncoder,
    pool: BufferPool,
    offset: UtcOffset,
    stacks: Box<dyn StackSource>,
    closed: AtomicBool,
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("has_file", &self.has_file)
            .field("stderr", &self.stderr)
            .field("encoder", &self.encoder)
            .field("offset", &self.offset)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Sink {
    /// Opens the destinations selected by `config`.
    ///
    /// With [`OutputFlags::FILE`] set, the log file is opened for append (and created if
    /// missing) and a background thread flushes it every `config.flush_interval`.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError`] if the configuration is inconsistent, the file cannot be opened,
    /// or the background flusher cannot be started.
    pub fn open(config: &LoggerConfig) -> Result<Self, LoggerError> {
        let file = match config.file_destination()? {
            Some(path) => {
                let file: Box<dyn Write + Send> = Box::new(open_append(path)?);
                Some(file)
            }
            None => None,
        };
        let sink = Self::build(file, config.flags, config.flush_interval)?;

        if let Some(path) = &config.file {
            if sink.has_file {
                tracing::debug!(path = %path.display(), "opened log file");
            }
        }
        Ok(sink)
    }

    /// Creates a sink whose file destination is an arbitrary writer.
    ///
    /// [`OutputFlags::FILE`] in `flags` is ignored; `writer` is always used. Its buffered
    /// contents are flushed every `flush_interval`.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::FlushDaemon`] if the background flusher cannot be started.
    pub fn from_writer<W>(
        writer: W,
        flags: OutputFlags,
        flush_interval: Duration,
    ) -> Result<Self, LoggerError>
    where
        W: Write + Send + 'static,
    {
        let writer: Box<dyn Write + Send> = Box::new(writer);
        Self::build(Some(writer), flags, flush_interval)
    }

    fn build(
        file: Option<Box<dyn Write + Send>>,
        flags: OutputFlags,
        flush_interval: Duration,
    ) -> Result<Self, LoggerError> {
        let has_file = file.is_some();
        let out = Arc::new(Mutex::new(Destinations {
            file: file.map(|w| BufWriter::with_capacity(FILE_BUFFER_SIZE, w)),
        }));

        if has_file {
            spawn_flush_daemon(Arc::downgrade(&out), flush_interval)?;
        }

        Ok(Self {
            out,
            has_file,
            stderr: flags.contains(OutputFlags::STDERR),
            encoder: HeaderEncoder::for_current_process(flags.contains(OutputFlags::JOURNALD)),
            pool: BufferPool::new(),
            offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
            stacks: Box::new(BacktraceSource),
            closed: AtomicBool::new(false),
        })
    }

    /// Replaces the source of stack traces written by the fatal path.
    #[must_use]
    pub fn with_stack_source(mut self, source: impl StackSource + 'static) -> Self {
        self.stacks = Box::new(source);
        self
    }

    /// The pool message buffers are drawn from.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Current wall-clock time in the offset records are stamped with.
    pub fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }

    /// Assembles a complete record in a pooled buffer.
    ///
    /// The record is terminated by exactly one newline.
    pub fn format(
        &self,
        severity: Severity,
        site: &CallSite<'_>,
        message: fmt::Arguments<'_>,
    ) -> Buffer {
        let mut buf = self.pool.acquire();
        self.encoder.encode(&mut buf, severity, site, self.now());
        let _ = buf.write_fmt(message);
        buf.terminate_line();
        buf
    }

    /// Writes a finished record to every active destination.
    ///
    /// Records at [`Severity::Fatal`] take the fatal path and never return.
    pub fn output(&self, severity: Severity, buf: Buffer) {
        if severity == Severity::Fatal {
            self.fatal(buf);
        }

        {
            let mut out = lock(&self.out);
            self.write_record(&mut out, buf.as_bytes());
        }
        self.pool.release(buf);
    }

    /// Writes a fatal record followed by a stack dump, flushes, and exits the process.
    ///
    /// If standard error is not a destination, the calling thread's trace is still written
    /// there so the operator always sees one. The dump of every thread goes to all active
    /// destinations. Other threads blocked on the write lock never resume.
    pub fn fatal(&self, buf: Buffer) -> ! {
        let mut out = lock(&self.out);
        self.write_record(&mut out, buf.as_bytes());
        if !self.stderr {
            let _ = io::stderr().write_all(&stacks::capture(self.stacks.as_ref(), false));
        }
        let trace = stacks::capture(self.stacks.as_ref(), true);
        self.write_record(&mut out, &trace);
        drop(out);

        if self.has_file {
            let outcome = self.timeout_flush(FLUSH_TIMEOUT);
            self.close_file(outcome);
        }
        std::process::exit(FATAL_EXIT_CODE)
    }

    fn write_record(&self, out: &mut Destinations, data: &[u8]) {
        if let Some(file) = out.file.as_mut() {
            let _ = file.write_all(data);
        }
        if self.stderr {
            let _ = io::stderr().write_all(data);
        }
    }

    /// Flushes buffered file output, waiting at most `timeout`.
    ///
    /// On timeout a one-line diagnostic is written to standard error and the flush is left to
    /// finish on its own.
    pub fn timeout_flush(&self, timeout: Duration) -> FlushOutcome {
        timeout_flush(&self.out, timeout)
    }

    /// Flushes with a [`CLOSE_FLUSH_TIMEOUT`] budget and closes the file destination.
    ///
    /// Later records are still written to standard error if enabled; file output is dropped.
    /// Only the first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.has_file {
            let outcome = self.timeout_flush(CLOSE_FLUSH_TIMEOUT);
            self.close_file(outcome);
        }
        tracing::debug!("log sink closed");
    }

    /// Whether [`Sink::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drops the file writer without flushing it again.
    ///
    /// After a timed-out flush the write lock may be held indefinitely, so the writer is only
    /// dropped if the lock is free right now. Otherwise the lock is waited for, since its
    /// holder is at most finishing one ordinary write.
    fn close_file(&self, flushed: FlushOutcome) {
        let mut out = match flushed {
            FlushOutcome::Completed | FlushOutcome::Failed => lock(&self.out),
            FlushOutcome::TimedOut => match self.out.try_lock() {
                Ok(out) => out,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            },
        };
        if let Some(writer) = out.file.take() {
            let (file, _unflushed) = writer.into_parts();
            drop(file);
        }
    }
}

fn open_append(path: &Path) -> Result<std::fs::File, LoggerError> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|source| LoggerError::OpenFile {
            path: path.to_path_buf(),
            source,
        })
}

fn flush(out: &Mutex<Destinations>) -> io::Result<()> {
    match lock(out).file.as_mut() {
        Some(file) => file.flush(),
        None => Ok(()),
    }
}

fn timeout_flush(out: &SharedDestinations, timeout: Duration) -> FlushOutcome {
    let (done_tx, done_rx) = mpsc::sync_channel(1);
    let out = Arc::clone(out);
    let spawned = thread::Builder::new()
        .name("sevlog-flush-worker".to_owned())
        .spawn(move || {
            let _ = done_tx.send(flush(&out));
        });
    if let Err(error) = spawned {
        let _ = writeln!(io::stderr(), "sevlog: could not start flush: {error}");
        return FlushOutcome::Failed;
    }

    match done_rx.recv_timeout(timeout) {
        Ok(Ok(())) => FlushOutcome::Completed,
        Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => FlushOutcome::Failed,
        Err(RecvTimeoutError::Timeout) => {
            let _ = writeln!(io::stderr(), "sevlog: flush took longer than {timeout:?}");
            FlushOutcome::TimedOut
        }
    }
}

/// Flushes the file destination every `interval` for as long as its sink exists.
fn spawn_flush_daemon(
    out: Weak<Mutex<Destinations>>,
    interval: Duration,
) -> Result<(), LoggerError> {
    thread::Builder::new()
        .name("sevlog-flush".to_owned())
        .spawn(move || loop {
            thread::sleep(interval);
            let Some(out) = out.upgrade() else {
                break;
            };
            timeout_flush(&out, FLUSH_TIMEOUT);
        })
        .map_err(LoggerError::FlushDaemon)?;

    tracing::debug!(?interval, "started background log flusher");
    Ok(())
}

static GLOBAL: Mutex<Option<Arc<Sink>>> = Mutex::new(None);

/// Returns the process-wide sink, opening it from `config` if none exists yet.
///
/// The boolean is `true` if this call created the sink. A failed open leaves the slot empty, so
/// a later call may still succeed.
pub(crate) fn global(config: &LoggerConfig) -> Result<(Arc<Sink>, bool), LoggerError> {
    let mut slot = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(sink) = slot.as_ref() {
        return Ok((Arc::clone(sink), false));
    }
    let sink = Arc::new(Sink::open(config)?);
    *slot = Some(Arc::clone(&sink));
    Ok((sink, true))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Instant;

    use super::*;

    /// A writer whose contents can be inspected after it has been handed to a sink.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Shared {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Takes `delay` to accept each write.
    struct Slow {
        inner: Shared,
        delay: Duration,
    }

    impl Write for Slow {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            thread::sleep(self.delay);
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    const NEVER: Duration = Duration::from_secs(3600);

    fn record(sink: &Sink, severity: Severity, message: &str) -> Buffer {
        sink.format(
            severity,
            &CallSite::new("src/sink.rs", Some(42)),
            format_args!("{message}"),
        )
    }

    #[test]
    fn format_terminates_with_one_newline() {
        let sink = Sink::open(&LoggerConfig {
            flags: OutputFlags::NONE,
            ..LoggerConfig::default()
        })
        .unwrap();

        let plain = record(&sink, Severity::Info, "hello");
        let newline = record(&sink, Severity::Info, "hello\n");
        let plain = String::from_utf8(plain.as_bytes().to_vec()).unwrap();
        let newline = String::from_utf8(newline.as_bytes().to_vec()).unwrap();

        assert!(plain.ends_with(" sink.rs:42] hello\n"), "{plain}");
        assert!(newline.ends_with(" sink.rs:42] hello\n"), "{newline}");
        assert!(!newline.ends_with("\n\n"));
    }

    #[test]
    fn output_buffers_until_flushed() {
        let shared = Shared::default();
        let sink = Sink::from_writer(shared.clone(), OutputFlags::NONE, NEVER).unwrap();

        let buf = record(&sink, Severity::Warning, "disk almost full");
        sink.output(Severity::Warning, buf);
        assert_eq!(shared.contents(), "");

        assert_eq!(sink.timeout_flush(Duration::from_secs(5)), FlushOutcome::Completed);
        let contents = shared.contents();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.starts_with("    W"));
        assert!(contents.ends_with("sink.rs:42] disk almost full\n"));
    }

    #[test]
    fn output_recycles_buffers() {
        let sink = Sink::from_writer(Shared::default(), OutputFlags::NONE, NEVER).unwrap();

        let buf = record(&sink, Severity::Info, "short");
        sink.output(Severity::Info, buf);
        assert_eq!(sink.pool().free_len(), 1);

        let buf = record(&sink, Severity::Info, &"long ".repeat(100));
        sink.output(Severity::Info, buf);
        assert_eq!(sink.pool().free_len(), 0);
    }

    #[test]
    fn timeout_flush_returns_before_slow_flush_finishes() {
        let shared = Shared::default();
        let slow = Slow {
            inner: shared.clone(),
            delay: Duration::from_millis(500),
        };
        let sink = Sink::from_writer(slow, OutputFlags::NONE, NEVER).unwrap();
        let buf = record(&sink, Severity::Error, "slow record");
        sink.output(Severity::Error, buf);

        let started = Instant::now();
        let outcome = sink.timeout_flush(Duration::from_millis(50));
        assert_eq!(outcome, FlushOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_millis(400));

        // The abandoned flush still completes and the writer stays usable.
        assert_eq!(sink.timeout_flush(Duration::from_secs(5)), FlushOutcome::Completed);
        assert!(shared.contents().ends_with("slow record\n"));

        let buf = record(&sink, Severity::Error, "after");
        sink.output(Severity::Error, buf);
        assert_eq!(sink.timeout_flush(Duration::from_secs(5)), FlushOutcome::Completed);
        assert_eq!(shared.contents().lines().count(), 2);
    }

    #[test]
    fn flush_daemon_flushes_periodically() {
        let shared = Shared::default();
        let sink =
            Sink::from_writer(shared.clone(), OutputFlags::NONE, Duration::from_millis(20)).unwrap();
        let buf = record(&sink, Severity::Notice, "eventually visible");
        sink.output(Severity::Notice, buf);

        let deadline = Instant::now() + Duration::from_secs(5);
        while shared.contents().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(shared.contents().ends_with("eventually visible\n"));
    }

    #[test]
    fn close_flushes_once_and_drops_later_file_output() {
        let shared = Shared::default();
        let sink = Sink::from_writer(shared.clone(), OutputFlags::NONE, NEVER).unwrap();
        let buf = record(&sink, Severity::Info, "before close");
        sink.output(Severity::Info, buf);

        sink.close();
        assert!(sink.is_closed());
        assert!(shared.contents().ends_with("before close\n"));

        let buf = record(&sink, Severity::Info, "after close");
        sink.output(Severity::Info, buf);
        sink.close();
        assert_eq!(sink.timeout_flush(Duration::from_secs(5)), FlushOutcome::Completed);
        assert_eq!(shared.contents().lines().count(), 1);
    }

    #[test]
    fn close_waits_for_in_progress_writes() {
        let shared = Shared::default();
        let slow = Slow {
            inner: shared.clone(),
            delay: Duration::from_millis(30),
        };
        let sink = Arc::new(Sink::from_writer(slow, OutputFlags::NONE, NEVER).unwrap());
        let lines = || shared.0.lock().unwrap().iter().filter(|&&b| b == b'\n').count();

        // Larger than the file buffer, so every record goes straight to the slow writer.
        let message = "x".repeat(FILE_BUFFER_SIZE + 1);
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let sink = Arc::clone(&sink);
                let message = message.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        let buf = record(&sink, Severity::Info, &message);
                        sink.output(Severity::Info, buf);
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(100));
        sink.close();
        let at_close = lines();
        assert!(at_close > 0);

        for writer in writers {
            writer.join().unwrap();
        }
        assert!(sink.is_closed());
        assert_eq!(lines(), at_close);
    }

    #[test]
    fn concurrent_records_never_interleave() {
        let shared = Shared::default();
        let sink = Arc::new(Sink::from_writer(shared.clone(), OutputFlags::NONE, NEVER).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for i in 0..200 {
                        let message = format!("thread {t} record {i}");
                        let buf = record(&sink, Severity::Info, &message);
                        sink.output(Severity::Info, buf);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        sink.close();

        let contents = shared.contents();
        assert_eq!(contents.lines().count(), 8 * 200);
        for line in contents.lines() {
            assert!(line.contains("sink.rs:42] thread "), "{line}");
        }
    }

    #[test]
    fn open_reports_unopenable_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggerConfig {
            file: Some(dir.path().join("missing").join("app.log")),
            flags: OutputFlags::FILE,
            ..LoggerConfig::default()
        };
        assert!(matches!(
            Sink::open(&config),
            Err(LoggerError::OpenFile { .. })
        ));
    }
}
