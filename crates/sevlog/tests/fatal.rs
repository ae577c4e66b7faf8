//! The fatal path exits the process, so it runs in a re-executed copy of this test binary.

#![allow(clippy::unwrap_used)]

use std::{process::Command, time::Duration};

use sevlog::{Logger, LoggerConfig, OutputFlags, Severity, FATAL_EXIT_CODE};

const CHILD_LOG_ENV: &str = "SEVLOG_FATAL_CHILD_LOG";

#[test]
fn fatal_child() {
    let Ok(path) = std::env::var(CHILD_LOG_ENV) else {
        return;
    };
    let logger = Logger::new(&LoggerConfig {
        file: Some(path.into()),
        flush_interval: Duration::from_secs(60),
        level: Severity::Critical,
        flags: OutputFlags::FILE,
    })
    .unwrap();

    logger.info("buffered before the crash");
    sevlog::fatal!(logger, "unrecoverable: {}", "journal corrupted");
}

#[test]
fn fatal_writes_record_and_stacks_then_exits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fatal.log");

    let output = Command::new(std::env::current_exe().unwrap())
        .args(["--exact", "fatal_child", "--nocapture", "--test-threads=1"])
        .env(CHILD_LOG_ENV, &path)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(FATAL_EXIT_CODE));

    let contents = std::fs::read_to_string(&path).unwrap();
    let mut lines = contents.lines();
    let record = lines.next().unwrap();
    assert!(record.starts_with("    F"), "{record:?}");
    assert!(
        record.ends_with("] unrecoverable: journal corrupted"),
        "{record:?}"
    );
    // The info record was below the child's verbosity.
    assert!(!contents.contains("buffered before the crash"));
    assert!(lines.next().is_some_and(|l| l.starts_with("thread '")));
    assert!(contents.contains("[running]:"));

    // File-only output still puts the crashing thread's trace on stderr.
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[running]:"), "{stderr}");
}
