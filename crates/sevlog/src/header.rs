//! Fixed-width record header encoding.
//!
//! Every record starts with a 34-byte prefix followed by the call site:
//!
//! ```text
//! <6> I1019 14:03:27.004512   41207 server.rs:88] message
//! ^^^^ journald prefix, or four spaces
//! ```
//!
//! Numbers are laid out by hand in the buffer's scratch area; this is the hot path and the
//! layout is simple enough that `fmt` machinery would only cost time.

use std::panic::Location;

use time::OffsetDateTime;

use crate::{buffer::Buffer, Severity};

/// Length of the fixed part of the header, up to and including the space after the pid.
pub const FIXED_HEADER_LEN: usize = 34;

const PID_WIDTH: usize = 7;

/// Source location a record is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite<'a> {
    /// Path of the source file. Only the final component is written.
    pub file: &'a str,

    /// Line number, if known. A missing line is written as `0`.
    pub line: Option<u32>,
}

impl CallSite<'static> {
    /// Placeholder used when the call site cannot be determined at all.
    pub const UNKNOWN: Self = Self {
        file: "???",
        line: Some(1),
    };

    /// The location of the caller of the `#[track_caller]` chain this is invoked from.
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }
}

impl<'a> CallSite<'a> {
    /// Creates a call site from a file path and an optional line number.
    pub const fn new(file: &'a str, line: Option<u32>) -> Self {
        Self { file, line }
    }

    /// The file name with any leading directories removed.
    pub fn short_file(&self) -> &'a str {
        self.file
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.file)
    }
}

impl From<&'static Location<'static>> for CallSite<'static> {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: Some(location.line()),
        }
    }
}

/// Writes record headers for one process.
#[derive(Debug, Clone, Copy)]
pub struct HeaderEncoder {
    pid: u32,
    journald: bool,
}

impl HeaderEncoder {
    /// Creates an encoder stamping records with `pid`.
    ///
    /// With `journald` set, each header starts with `<N> ` where `N` is the severity's facility
    /// number; otherwise it starts with four spaces.
    pub const fn new(pid: u32, journald: bool) -> Self {
        Self { pid, journald }
    }

    /// An encoder for the current process.
    pub fn for_current_process(journald: bool) -> Self {
        Self::new(std::process::id(), journald)
    }

    /// Appends the header for a record at `severity`, attributed to `site` at time `now`.
    #[allow(clippy::indexing_slicing)] // Offsets are constants within the 64-byte scratch area
    pub fn encode(
        &self,
        buf: &mut Buffer,
        severity: Severity,
        site: &CallSite<'_>,
        now: OffsetDateTime,
    ) {
        if self.journald {
            buf.tmp[0] = b'<';
            buf.some_digits(1, u32::from(severity.facility()));
            buf.tmp[2] = b'>';
            buf.tmp[3] = b' ';
        } else {
            buf.tmp[..4].fill(b' ');
        }
        buf.tmp[4] = severity.as_char();
        buf.two_digits(5, u32::from(u8::from(now.month())));
        buf.two_digits(7, u32::from(now.day()));
        buf.tmp[9] = b' ';
        buf.two_digits(10, u32::from(now.hour()));
        buf.tmp[12] = b':';
        buf.two_digits(13, u32::from(now.minute()));
        buf.tmp[15] = b':';
        buf.two_digits(16, u32::from(now.second()));
        buf.tmp[18] = b'.';
        buf.n_digits(6, 19, now.microsecond(), b'0');
        buf.tmp[25] = b' ';
        buf.n_digits(PID_WIDTH, 26, self.pid, b' ');
        buf.tmp[33] = b' ';
        buf.bytes.extend_from_slice(&buf.tmp[..FIXED_HEADER_LEN]);

        buf.bytes.extend_from_slice(site.short_file().as_bytes());
        buf.tmp[0] = b':';
        let n = buf.some_digits(1, site.line.unwrap_or(0));
        buf.tmp[n + 1] = b']';
        buf.tmp[n + 2] = b' ';
        buf.bytes.extend_from_slice(&buf.tmp[..n + 3]);
    }
}

#[allow(clippy::as_conversions, clippy::indexing_slicing)] // `d % 10` always fits a `u8`
impl Buffer {
    /// Writes a zero-padded two-digit number at `tmp[i]`.
    fn two_digits(&mut self, i: usize, d: u32) {
        self.tmp[i + 1] = b'0' + (d % 10) as u8;
        self.tmp[i] = b'0' + (d / 10 % 10) as u8;
    }

    /// Writes an `n`-column number at `tmp[i]`, left-padded with `pad`.
    ///
    /// Digits beyond `n` columns are dropped from the left. Zero renders as all padding.
    fn n_digits(&mut self, n: usize, i: usize, mut d: u32, pad: u8) {
        let mut j = n;
        while j > 0 && d > 0 {
            j -= 1;
            self.tmp[i + j] = b'0' + (d % 10) as u8;
            d /= 10;
        }
        self.tmp[i..i + j].fill(pad);
    }

    /// Writes a variable-width number at `tmp[i]` and returns the number of digits.
    fn some_digits(&mut self, i: usize, mut d: u32) -> usize {
        // Build from the top of the scratch area, then copy down.
        let mut j = self.tmp.len();
        loop {
            j -= 1;
            self.tmp[j] = b'0' + (d % 10) as u8;
            d /= 10;
            if d == 0 {
                break;
            }
        }
        let n = self.tmp.len() - j;
        self.tmp.copy_within(j.., i);
        n
    }
}
