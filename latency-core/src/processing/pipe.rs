//! Fixed-capacity byte FIFO between a capture thread and a playback thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::models::error::LatencyError;

/// Ten seconds of 16 kHz, 16-bit mono audio.
pub const LOOPBACK_PIPE_CAPACITY: usize = 10 * 16000 * 2;

/// State shared by the two halves of one pipe.
#[derive(Debug, Default)]
struct PipeShared {
    closed: AtomicBool,
    dropped_bytes: AtomicU64,
}

/// Single-producer, single-consumer byte pipe.
///
/// Unlike an overwriting ring buffer, a full pipe rejects new bytes: `write`
/// accepts only the prefix that fits, so whatever is read back is always a
/// prefix of what was written, in order.
///
/// While whole, the pipe can be pre-filled and flushed from one thread. For
/// streaming it is [`split`](Pipe::split) into a [`PipeWriter`] and a
/// [`PipeReader`] which move to their own threads; cursors are then updated
/// lock-free with acquire/release ordering. `flush` needs `&mut Pipe`, so it
/// cannot race with either half.
pub struct Pipe {
    writer: PipeWriter,
    reader: PipeReader,
}

impl Pipe {
    pub fn new(capacity: usize) -> Self {
        let shared = Arc::new(PipeShared::default());
        let (prod, cons) = HeapRb::<u8>::new(capacity.max(1)).split();
        Self {
            writer: PipeWriter {
                prod,
                shared: Arc::clone(&shared),
            },
            reader: PipeReader { cons, shared },
        }
    }

    /// Reassemble a pipe from the halves returned by [`split`](Pipe::split).
    pub fn rejoin(writer: PipeWriter, reader: PipeReader) -> Result<Self, LatencyError> {
        if !Arc::ptr_eq(&writer.shared, &reader.shared) {
            return Err(LatencyError::PipeMismatch);
        }
        Ok(Self { writer, reader })
    }

    pub fn split(self) -> (PipeWriter, PipeReader) {
        (self.writer, self.reader)
    }

    /// Copy the longest prefix of `data` that fits. Returns bytes accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.writer.write(data)
    }

    /// Copy up to `buf.len()` buffered bytes into `buf`. Returns bytes read.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.reader.cons.pop_slice(buf)
    }

    /// Discard all buffered bytes and reopen the pipe.
    pub fn flush(&mut self) {
        let discarded = self.reader.cons.clear();
        self.reader.shared.closed.store(false, Ordering::Release);
        self.reader.shared.dropped_bytes.store(0, Ordering::Relaxed);
        if discarded > 0 {
            log::debug!("pipe flushed {} bytes", discarded);
        }
    }

    pub fn len(&self) -> usize {
        self.reader.available()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.reader.cons.capacity().get()
    }

    /// Bytes rejected by `write` since the last flush.
    pub fn dropped_bytes(&self) -> u64 {
        self.writer.dropped_bytes()
    }
}

/// Producer half of a [`Pipe`].
pub struct PipeWriter {
    prod: HeapProd<u8>,
    shared: Arc<PipeShared>,
}

impl PipeWriter {
    /// Best-effort write; bytes that do not fit are dropped and counted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let written = self.prod.push_slice(data);
        if written < data.len() {
            self.shared
                .dropped_bytes
                .fetch_add((data.len() - written) as u64, Ordering::Relaxed);
        }
        written
    }

    /// Mark the end of the stream. The reader drains what is left, then
    /// sees the terminal signal.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn vacant(&self) -> usize {
        self.prod.vacant_len()
    }

    pub fn dropped_bytes(&self) -> u64 {
        self.shared.dropped_bytes.load(Ordering::Relaxed)
    }
}

/// Consumer half of a [`Pipe`].
pub struct PipeReader {
    cons: HeapCons<u8>,
    shared: Arc<PipeShared>,
}

impl PipeReader {
    /// Read up to `buf.len()` bytes without blocking.
    ///
    /// Returns `Some(0)` when nothing is buffered yet and `None` once the
    /// writer has closed the pipe and every byte has been consumed.
    pub fn read(&mut self, buf: &mut [u8]) -> Option<usize> {
        let read = self.cons.pop_slice(buf);
        if read > 0 || buf.is_empty() {
            return Some(read);
        }
        if !self.shared.closed.load(Ordering::Acquire) {
            return Some(0);
        }
        // Writes made before close are visible now.
        match self.cons.pop_slice(buf) {
            0 => None,
            n => Some(n),
        }
    }

    pub fn available(&self) -> usize {
        self.cons.occupied_len()
    }
}
