//! Reusable message-assembly buffers.

use std::sync::{Mutex, PoisonError};

/// Buffers holding at least this many bytes are dropped instead of pooled.
pub(crate) const MAX_POOLED_LEN: usize = 256;

/// Size of the scratch area used to lay out header digits.
pub(crate) const SCRATCH_LEN: usize = 64;

/// A growable byte accumulator for a single log record.
#[derive(Debug)]
pub struct Buffer {
    pub(crate) bytes: Vec<u8>,
    pub(crate) tmp: [u8; SCRATCH_LEN],
}

impl Buffer {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            tmp: [0; SCRATCH_LEN],
        }
    }

    /// The bytes accumulated so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Appends a newline unless the content already ends with one.
    pub(crate) fn terminate_line(&mut self) {
        if self.bytes.last() != Some(&b'\n') {
            self.bytes.push(b'\n');
        }
    }
}

impl std::io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A free list of [`Buffer`]s.
///
/// The pool has its own lock, independent of any write lock, so recycling never waits on I/O.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<Vec<Buffer>>,
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a cleared buffer from the free list, or allocates a new one.
    pub fn acquire(&self) -> Buffer {
        let pooled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match pooled {
            Some(mut buf) => {
                buf.bytes.clear();
                buf
            }
            None => Buffer::new(),
        }
    }

    /// Returns a buffer to the free list.
    ///
    /// Buffers holding 256 bytes or more are dropped, so one oversized message
    /// cannot permanently grow the pool.
    pub fn release(&self, buf: Buffer) {
        if buf.len() >= MAX_POOLED_LEN {
            return;
        }
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buf);
    }

    #[cfg(test)]
    pub(crate) fn free_len(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
