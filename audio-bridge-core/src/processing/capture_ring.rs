use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::models::config::BridgeConfig;
use crate::models::diagnostics::CaptureStats;
use crate::models::error::BridgeError;

/// How a blocked ring transfer waits for the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBackoff {
    pub interval: Duration,
    /// Polls before giving up with `Timeout` (None = until shutdown).
    pub max_spins: Option<u32>,
}

impl PollBackoff {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_spins: config.max_poll_spins,
        }
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2),
            max_spins: None,
        }
    }
}

/// Lock-free single-producer/single-consumer byte ring for captured PCM.
///
/// The device callback thread writes, the application thread reads. Cursors
/// are plain indices advanced modulo capacity with atomic load/store; a
/// blocked side sleeps for `PollBackoff::interval` between checks instead of
/// parking on a lock, so the real-time thread never contends for a mutex.
///
/// Equal cursors always mean *empty*. One byte of storage is kept free so a
/// full ring never looks empty, which makes the largest single transfer
/// `capacity - 1` bytes.
///
/// Transfers longer than a single call should take go through `write_all`
/// and `read_exact`, which split them into chunks of at most `chunk_len`
/// bytes. The chunk never exceeds half the capacity, so a waiting writer and
/// a waiting reader can always make progress against each other.
///
/// A second concurrent writer (or reader) is rejected with `InvalidState`
/// rather than racing the first one.
pub struct CaptureRingBuffer {
    storage: Box<[UnsafeCell<u8>]>,
    chunk_len: usize,
    read_cursor: AtomicUsize,
    write_cursor: AtomicUsize,
    writer_busy: AtomicBool,
    reader_busy: AtomicBool,
    shut_down: AtomicBool,
    backoff: PollBackoff,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    bytes_dropped: AtomicU64,
}

// SAFETY: the producer only touches bytes in [write_cursor, read_cursor) and the
// consumer only bytes in [read_cursor, write_cursor). Cursor publication uses
// Release stores paired with Acquire loads, and the busy flags keep each side to
// a single thread at a time.
unsafe impl Sync for CaptureRingBuffer {}

/// Marks one side of the ring as in use for the duration of a transfer.
struct SideClaim<'a>(&'a AtomicBool);

impl<'a> SideClaim<'a> {
    fn acquire(flag: &'a AtomicBool, side: &str) -> Result<Self, BridgeError> {
        if flag.swap(true, Ordering::Acquire) {
            return Err(BridgeError::InvalidState(format!(
                "concurrent capture ring {}",
                side
            )));
        }
        Ok(Self(flag))
    }
}

impl Drop for SideClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CaptureRingBuffer {
    /// Allocate a zero-filled ring of `capacity` bytes.
    pub fn new(capacity: usize, backoff: PollBackoff) -> Result<Self, BridgeError> {
        if capacity < 2 {
            return Err(BridgeError::InvalidSpec(format!(
                "capture ring needs at least 2 bytes, got {}",
                capacity
            )));
        }

        let mut storage: Vec<UnsafeCell<u8>> = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| BridgeError::Allocation(capacity))?;
        storage.resize_with(capacity, || UnsafeCell::new(0));

        Ok(Self {
            storage: storage.into_boxed_slice(),
            chunk_len: capacity / 2,
            read_cursor: AtomicUsize::new(0),
            write_cursor: AtomicUsize::new(0),
            writer_busy: AtomicBool::new(false),
            reader_busy: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            backoff,
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_dropped: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Split chunked transfers into pieces of at most `len` bytes, clamped to
    /// `1..=capacity / 2`.
    pub fn with_chunk_len(mut self, len: usize) -> Self {
        self.chunk_len = len.clamp(1, self.capacity() / 2);
        self
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Largest length a single `write` or `read` accepts.
    pub fn max_transfer(&self) -> usize {
        self.storage.len() - 1
    }

    /// Bytes written but not yet read.
    pub fn available(&self) -> usize {
        let (read, write) = self.cursors();
        self.used(read, write)
    }

    /// Bytes that can be written without blocking.
    pub fn free_space(&self) -> usize {
        self.max_transfer() - self.available()
    }

    /// Whether fewer than `len` bytes are readable.
    pub fn is_empty_for(&self, len: usize) -> bool {
        let (read, write) = self.cursors();
        if read == write {
            return true;
        }
        self.used(read, write) < len
    }

    /// Whether fewer than `len` bytes are writable.
    pub fn is_full_for(&self, len: usize) -> bool {
        let (read, write) = self.cursors();
        if read == write {
            return false;
        }
        self.max_transfer() - self.used(read, write) < len
    }

    /// Copy `data` into the ring, waiting while it does not fit.
    ///
    /// Called from the device callback thread.
    pub fn write(&self, data: &[u8]) -> Result<(), BridgeError> {
        let len = data.len();
        if len == 0 {
            return Ok(());
        }
        self.check_transfer(len)?;
        let _claim = SideClaim::acquire(&self.writer_busy, "writer")?;
        self.wait_until(|| !self.is_full_for(len))?;

        let capacity = self.capacity();
        let write = self.write_cursor.load(Ordering::Relaxed);
        let head = len.min(capacity - write);
        let base = self.base();
        // SAFETY: `wait_until` guaranteed `len` free bytes starting at `write`
        // (wrapping), which the consumer does not read until the cursor moves.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), base.add(write), head);
            ptr::copy_nonoverlapping(data.as_ptr().add(head), base, len - head);
        }
        self.write_cursor
            .store((write + len) % capacity, Ordering::Release);
        self.bytes_written.fetch_add(len as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Fill `buffer` from the ring, waiting until enough bytes are available.
    ///
    /// Called from the application thread.
    pub fn read(&self, buffer: &mut [u8]) -> Result<(), BridgeError> {
        let len = buffer.len();
        if len == 0 {
            return Ok(());
        }
        self.check_transfer(len)?;
        let _claim = SideClaim::acquire(&self.reader_busy, "reader")?;
        self.wait_until(|| !self.is_empty_for(len))?;

        let capacity = self.capacity();
        let read = self.read_cursor.load(Ordering::Relaxed);
        let head = len.min(capacity - read);
        let base = self.base();
        // SAFETY: `wait_until` guaranteed `len` published bytes starting at
        // `read` (wrapping), which the producer does not overwrite until the
        // cursor moves.
        unsafe {
            ptr::copy_nonoverlapping(base.add(read), buffer.as_mut_ptr(), head);
            ptr::copy_nonoverlapping(base, buffer.as_mut_ptr().add(head), len - head);
        }
        self.read_cursor
            .store((read + len) % capacity, Ordering::Release);
        self.bytes_read.fetch_add(len as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Write all of `data` in `chunk_len` pieces.
    ///
    /// Returns the number of bytes that reached the ring alongside the error
    /// that stopped the transfer, if any.
    pub fn write_all(&self, data: &[u8]) -> Result<(), (usize, BridgeError)> {
        let mut written = 0;
        for chunk in data.chunks(self.chunk_len) {
            self.write(chunk).map_err(|e| (written, e))?;
            written += chunk.len();
        }
        Ok(())
    }

    /// Fill all of `buffer` in `chunk_len` pieces.
    pub fn read_exact(&self, buffer: &mut [u8]) -> Result<(), BridgeError> {
        for chunk in buffer.chunks_mut(self.chunk_len) {
            self.read(chunk)?;
        }
        Ok(())
    }

    /// Reset both cursors and zero the storage.
    ///
    /// Only valid while no transfer is in flight (the capture stream is
    /// paused); a concurrent transfer makes this return `InvalidState`.
    pub fn flush(&self) -> Result<(), BridgeError> {
        let _writer = SideClaim::acquire(&self.writer_busy, "writer")?;
        let _reader = SideClaim::acquire(&self.reader_busy, "reader")?;
        self.read_cursor.store(0, Ordering::Release);
        self.write_cursor.store(0, Ordering::Release);
        // SAFETY: both sides are claimed, nobody else touches the storage.
        unsafe {
            ptr::write_bytes(self.base(), 0, self.capacity());
        }
        Ok(())
    }

    /// Discard everything currently readable. Consumer side only, so it may
    /// run while the producer is mid-write. Returns the bytes discarded.
    pub fn drain(&self) -> Result<usize, BridgeError> {
        let _claim = SideClaim::acquire(&self.reader_busy, "reader")?;
        let (read, write) = self.cursors();
        let discarded = self.used(read, write);
        self.read_cursor.store(write, Ordering::Release);
        Ok(discarded)
    }

    /// Make every blocked and future transfer return `ShutDown`.
    pub fn shut_down(&self) {
        self.shut_down.store(true, Ordering::Release);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Account for device bytes that never reached the ring.
    pub fn record_dropped(&self, len: usize) {
        self.bytes_dropped.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_dropped: self.bytes_dropped.load(Ordering::Relaxed),
        }
    }

    // --- Internal helpers ---

    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.storage.as_ptr())
    }

    fn cursors(&self) -> (usize, usize) {
        (
            self.read_cursor.load(Ordering::Acquire),
            self.write_cursor.load(Ordering::Acquire),
        )
    }

    fn used(&self, read: usize, write: usize) -> usize {
        if write >= read {
            write - read
        } else {
            self.capacity() - read + write
        }
    }

    fn check_transfer(&self, len: usize) -> Result<(), BridgeError> {
        if len > self.max_transfer() {
            return Err(BridgeError::Oversized {
                requested: len,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    fn wait_until(&self, ready: impl Fn() -> bool) -> Result<(), BridgeError> {
        let mut spins: u32 = 0;
        loop {
            if self.is_shut_down() {
                return Err(BridgeError::ShutDown);
            }
            if ready() {
                return Ok(());
            }
            if let Some(max) = self.backoff.max_spins {
                if spins >= max {
                    return Err(BridgeError::Timeout);
                }
            }
            spins += 1;
            thread::sleep(self.backoff.interval);
        }
    }
}

impl std::fmt::Debug for CaptureRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (read, write) = self.cursors();
        f.debug_struct("CaptureRingBuffer")
            .field("capacity", &self.capacity())
            .field("read_cursor", &read)
            .field("write_cursor", &write)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
