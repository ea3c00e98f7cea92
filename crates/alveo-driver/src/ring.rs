//! Part-granular ring buffers
//!
//! A ring buffer is a bounded circular byte store that holds whole
//! "parts" (one sample's worth of packed bytes). It decouples sample
//! production and consumption from DMA transfers: producers append parts,
//! the device buffer consumes exactly one part per kernel run.
//!
//! Two concurrency variants share one type and one operation set,
//! selected at construction:
//!
//! - [`RingMode::SingleThreaded`]: every operation is non-blocking;
//!   backpressure is reported through `false` returns.
//! - [`RingMode::MultiThreaded`]: `store` and `read_one` block on a
//!   condition variable until capacity/occupancy allows; each unblock
//!   wakes at most one peer. Reads can carry a [`CancellationToken`],
//!   checked on a coarse poll interval.

use crate::error::{DriverError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Interval at which a blocked cancellable read re-checks its token
const CANCEL_POLL: Duration = Duration::from_secs(2);

/// Concurrency variant of a ring buffer, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingMode {
    /// Non-blocking operations; backpressure via boolean returns
    SingleThreaded,
    /// Blocking store/read with condition variables
    MultiThreaded,
}

/// Size queries understood by rings and device buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpecifier {
    /// Total capacity in bytes (`parts * part_bytes`)
    TotalBytes,
    /// Capacity in parts
    CapacityParts,
    /// Bytes per part
    PartSize,
    /// Parts currently buffered
    PartCount,
    /// Total capacity in host elements (equals bytes for u8 transport)
    Elements,
    /// Host elements per part (equals bytes for u8 transport)
    ElementsPerPart,
}

/// Cooperative cancellation flag for blocking ring reads
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, un-cancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of waits holding this token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Bounded circular store of fixed-size parts
#[derive(Debug)]
pub struct RingBuffer {
    buf: Mutex<VecDeque<u8>>,
    space: Condvar,
    data: Condvar,
    parts: usize,
    part_bytes: usize,
    mode: RingMode,
}

impl RingBuffer {
    /// Construct a ring of `parts` parts of `part_bytes` bytes each
    ///
    /// # Errors
    ///
    /// Returns an error for a zero-capacity ring.
    pub fn new(parts: usize, part_bytes: usize, mode: RingMode) -> Result<Self> {
        if parts * part_bytes == 0 {
            return Err(DriverError::config(
                "cannot create a ring buffer of size 0",
            ));
        }
        tracing::debug!("Ring buffer initialised: {parts} parts x {part_bytes} bytes ({mode:?})");
        Ok(Self {
            buf: Mutex::new(VecDeque::with_capacity(parts * part_bytes)),
            space: Condvar::new(),
            data: Condvar::new(),
            parts,
            part_bytes,
            mode,
        })
    }

    /// Append whole parts to the ring
    ///
    /// `src` must be a non-zero multiple of the part size and at most the
    /// total capacity. Single-threaded mode returns `Ok(false)` when the
    /// free space is insufficient; multi-threaded mode blocks until the
    /// bytes fit.
    ///
    /// # Errors
    ///
    /// Returns an error when the length is not a part multiple or exceeds
    /// the ring capacity outright.
    pub fn store(&self, src: &[u8]) -> Result<bool> {
        self.check_store_len(src.len())?;

        let mut guard = self.buf.lock();
        match self.mode {
            RingMode::SingleThreaded => {
                if src.len() > self.capacity_bytes() - guard.len() {
                    return Ok(false);
                }
                guard.extend(src.iter().copied());
                Ok(true)
            }
            RingMode::MultiThreaded => {
                while src.len() > self.capacity_bytes() - guard.len() {
                    self.space.wait(&mut guard);
                }
                guard.extend(src.iter().copied());
                // unlock before notifying so the woken reader does not
                // immediately block on the mutex
                drop(guard);
                self.data.notify_one();
                Ok(true)
            }
        }
    }

    /// Consume exactly one part into `dst`
    ///
    /// Single-threaded mode returns `Ok(false)` when no full part is
    /// buffered; multi-threaded mode blocks until one is.
    ///
    /// # Errors
    ///
    /// Returns an error when `dst` is not exactly one part long.
    pub fn read_one(&self, dst: &mut [u8]) -> Result<bool> {
        self.check_read_len(dst.len())?;

        let mut guard = self.buf.lock();
        match self.mode {
            RingMode::SingleThreaded => {
                if guard.len() < self.part_bytes {
                    return Ok(false);
                }
                Self::pop_part(&mut guard, dst);
                Ok(true)
            }
            RingMode::MultiThreaded => {
                while guard.len() < self.part_bytes {
                    self.data.wait(&mut guard);
                }
                Self::pop_part(&mut guard, dst);
                drop(guard);
                self.space.notify_one();
                Ok(true)
            }
        }
    }

    /// Consume one part, giving up when `token` is cancelled
    ///
    /// The wait polls the token roughly every two seconds and returns
    /// `Ok(false)` on cancellation without consuming data. In
    /// single-threaded mode this is a token pre-check followed by a
    /// non-blocking read.
    ///
    /// # Errors
    ///
    /// Returns an error when `dst` is not exactly one part long.
    pub fn read_one_cancellable(
        &self,
        dst: &mut [u8],
        token: &CancellationToken,
    ) -> Result<bool> {
        self.check_read_len(dst.len())?;

        let mut guard = self.buf.lock();
        loop {
            if token.is_cancelled() {
                return Ok(false);
            }
            if guard.len() >= self.part_bytes {
                Self::pop_part(&mut guard, dst);
                if self.mode == RingMode::MultiThreaded {
                    drop(guard);
                    self.space.notify_one();
                }
                return Ok(true);
            }
            if self.mode == RingMode::SingleThreaded {
                return Ok(false);
            }
            let _ = self.data.wait_for(&mut guard, CANCEL_POLL);
        }
    }

    /// Drain all buffered bytes into `dst`; returns `false` when empty
    pub fn drain_all(&self, dst: &mut Vec<u8>) -> bool {
        let mut guard = self.buf.lock();
        if guard.is_empty() {
            return false;
        }
        dst.extend(guard.drain(..));
        if self.mode == RingMode::MultiThreaded {
            drop(guard);
            self.space.notify_one();
        }
        true
    }

    /// Non-destructive copy of buffered part `index` (0 = oldest)
    #[must_use]
    pub fn peek(&self, index: usize) -> Option<Vec<u8>> {
        let guard = self.buf.lock();
        if (index + 1) * self.part_bytes > guard.len() {
            return None;
        }
        Some(
            guard
                .iter()
                .skip(index * self.part_bytes)
                .take(self.part_bytes)
                .copied()
                .collect(),
        )
    }

    /// Non-destructive copy of all buffered bytes
    #[must_use]
    pub fn peek_all(&self) -> Vec<u8> {
        self.buf.lock().iter().copied().collect()
    }

    /// Query a ring dimension
    #[must_use]
    pub fn size(&self, spec: SizeSpecifier) -> usize {
        match spec {
            SizeSpecifier::TotalBytes | SizeSpecifier::Elements => self.capacity_bytes(),
            SizeSpecifier::CapacityParts => self.parts,
            SizeSpecifier::PartSize | SizeSpecifier::ElementsPerPart => self.part_bytes,
            SizeSpecifier::PartCount => self.buf.lock().len() / self.part_bytes,
        }
    }

    /// Whether the ring holds its full complement of parts
    #[must_use]
    pub fn full(&self) -> bool {
        self.buf.lock().len() == self.capacity_bytes()
    }

    /// Whether the ring holds no data
    #[must_use]
    pub fn empty(&self) -> bool {
        self.buf.lock().is_empty()
    }

    /// Free space in bytes
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.capacity_bytes() - self.buf.lock().len()
    }

    /// Concurrency variant this ring was constructed with
    #[must_use]
    pub const fn mode(&self) -> RingMode {
        self.mode
    }

    const fn capacity_bytes(&self) -> usize {
        self.parts * self.part_bytes
    }

    fn check_store_len(&self, len: usize) -> Result<()> {
        if len % self.part_bytes != 0 {
            return Err(DriverError::Length {
                bytes: len,
                part_bytes: self.part_bytes,
            });
        }
        if len > self.capacity_bytes() {
            return Err(DriverError::Capacity {
                bytes: len,
                capacity_bytes: self.capacity_bytes(),
            });
        }
        Ok(())
    }

    fn check_read_len(&self, len: usize) -> Result<()> {
        if len != self.part_bytes {
            return Err(DriverError::Length {
                bytes: len,
                part_bytes: self.part_bytes,
            });
        }
        Ok(())
    }

    fn pop_part(guard: &mut VecDeque<u8>, dst: &mut [u8]) {
        for slot in dst.iter_mut() {
            *slot = guard.pop_front().unwrap_or_default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ring(parts: usize, part_bytes: usize, mode: RingMode) -> RingBuffer {
        RingBuffer::new(parts, part_bytes, mode).unwrap()
    }

    #[test]
    fn test_init_sizes() {
        let rb = ring(3, 4, RingMode::SingleThreaded);
        assert_eq!(rb.size(SizeSpecifier::TotalBytes), 12);
        assert_eq!(rb.size(SizeSpecifier::CapacityParts), 3);
        assert_eq!(rb.size(SizeSpecifier::PartSize), 4);
        assert_eq!(rb.size(SizeSpecifier::PartCount), 0);
        assert_eq!(rb.size(SizeSpecifier::Elements), 12);
        assert_eq!(rb.size(SizeSpecifier::ElementsPerPart), 4);
        assert!(rb.empty());
        assert!(!rb.full());
        assert_eq!(rb.free_space(), 12);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(RingBuffer::new(0, 4, RingMode::SingleThreaded).is_err());
        assert!(RingBuffer::new(3, 0, RingMode::SingleThreaded).is_err());
    }

    #[test]
    fn test_store_read_fifo() {
        let rb = ring(3, 4, RingMode::SingleThreaded);
        assert!(rb.store(&[1, 2, 3, 4]).unwrap());
        assert!(rb.store(&[5, 6, 7, 8]).unwrap());
        assert_eq!(rb.size(SizeSpecifier::PartCount), 2);

        let mut part = [0u8; 4];
        assert!(rb.read_one(&mut part).unwrap());
        assert_eq!(part, [1, 2, 3, 4]);
        assert!(rb.read_one(&mut part).unwrap());
        assert_eq!(part, [5, 6, 7, 8]);
        assert!(!rb.read_one(&mut part).unwrap());
    }

    #[test]
    fn test_single_threaded_backpressure() {
        // N=3 parts, P=4 bytes: three stores succeed, the fourth reports
        // backpressure, and a read frees space for it
        let rb = ring(3, 4, RingMode::SingleThreaded);
        for i in 0..3u8 {
            assert!(rb.store(&[i; 4]).unwrap());
        }
        assert!(rb.full());
        assert!(!rb.store(&[9; 4]).unwrap());

        let mut part = [0u8; 4];
        assert!(rb.read_one(&mut part).unwrap());
        assert_eq!(part, [0; 4]);
        assert!(rb.store(&[9; 4]).unwrap());
        assert_eq!(rb.size(SizeSpecifier::PartCount), 3);
    }

    #[test]
    fn test_multi_part_store() {
        let rb = ring(4, 2, RingMode::SingleThreaded);
        assert!(rb.store(&[1, 2, 3, 4, 5, 6]).unwrap());
        assert_eq!(rb.size(SizeSpecifier::PartCount), 3);
        let mut part = [0u8; 2];
        assert!(rb.read_one(&mut part).unwrap());
        assert_eq!(part, [1, 2]);
    }

    #[test]
    fn test_length_and_capacity_errors() {
        let rb = ring(3, 4, RingMode::SingleThreaded);
        assert!(matches!(
            rb.store(&[1, 2, 3]),
            Err(DriverError::Length { bytes: 3, part_bytes: 4 })
        ));
        assert!(matches!(
            rb.store(&[0; 16]),
            Err(DriverError::Capacity { bytes: 16, capacity_bytes: 12 })
        ));
        let mut short = [0u8; 3];
        assert!(matches!(
            rb.read_one(&mut short),
            Err(DriverError::Length { .. })
        ));
    }

    #[test]
    fn test_peek_is_non_destructive() {
        let rb = ring(3, 2, RingMode::SingleThreaded);
        rb.store(&[1, 2, 3, 4]).unwrap();
        assert_eq!(rb.peek(0).unwrap(), vec![1, 2]);
        assert_eq!(rb.peek(1).unwrap(), vec![3, 4]);
        assert!(rb.peek(2).is_none());
        assert_eq!(rb.peek_all(), vec![1, 2, 3, 4]);
        assert_eq!(rb.size(SizeSpecifier::PartCount), 2);
    }

    #[test]
    fn test_drain_all() {
        let rb = ring(3, 2, RingMode::SingleThreaded);
        let mut out = Vec::new();
        assert!(!rb.drain_all(&mut out));

        rb.store(&[1, 2, 3, 4]).unwrap();
        assert!(rb.drain_all(&mut out));
        assert_eq!(out, vec![1, 2, 3, 4]);
        assert!(rb.empty());
    }

    #[test]
    fn test_occupancy_invariant() {
        let rb = ring(4, 2, RingMode::SingleThreaded);
        let mut stored = 0usize;
        let mut read = 0usize;
        let mut part = [0u8; 2];
        for round in 0..50u8 {
            if rb.store(&[round; 2]).unwrap() {
                stored += 1;
            }
            if round % 3 == 0 && rb.read_one(&mut part).unwrap() {
                read += 1;
            }
            let occupancy = rb.size(SizeSpecifier::PartCount);
            assert!(occupancy <= rb.size(SizeSpecifier::CapacityParts));
            assert_eq!(occupancy, stored - read);
        }
    }

    #[test]
    fn test_blocking_producer_consumer() {
        // five stores against three reads on a 3x4 ring: every operation
        // completes and two parts remain
        let rb = Arc::new(ring(3, 4, RingMode::MultiThreaded));
        let producer = {
            let rb = Arc::clone(&rb);
            thread::spawn(move || {
                for i in 0..5u8 {
                    assert!(rb.store(&[i; 4]).unwrap());
                }
            })
        };
        let consumer = {
            let rb = Arc::clone(&rb);
            thread::spawn(move || {
                let mut part = [0u8; 4];
                for expected in 0..3u8 {
                    assert!(rb.read_one(&mut part).unwrap());
                    assert_eq!(part, [expected; 4]);
                }
            })
        };
        producer.join().unwrap();
        consumer.join().unwrap();
        assert_eq!(rb.size(SizeSpecifier::PartCount), 2);
    }

    #[test]
    fn test_blocking_read_waits_for_store() {
        let rb = Arc::new(ring(2, 2, RingMode::MultiThreaded));
        let reader = {
            let rb = Arc::clone(&rb);
            thread::spawn(move || {
                let mut part = [0u8; 2];
                assert!(rb.read_one(&mut part).unwrap());
                part
            })
        };
        thread::sleep(std::time::Duration::from_millis(50));
        rb.store(&[7, 8]).unwrap();
        assert_eq!(reader.join().unwrap(), [7, 8]);
    }

    #[test]
    fn test_cancelled_token_returns_without_data() {
        let rb = ring(2, 2, RingMode::MultiThreaded);
        let token = CancellationToken::new();
        token.cancel();
        let mut part = [0u8; 2];
        assert!(!rb.read_one_cancellable(&mut part, &token).unwrap());
    }

    #[test]
    fn test_cancellation_unblocks_waiting_reader() {
        let rb = Arc::new(ring(2, 2, RingMode::MultiThreaded));
        let token = CancellationToken::new();
        let reader = {
            let rb = Arc::clone(&rb);
            let token = token.clone();
            thread::spawn(move || {
                let mut part = [0u8; 2];
                rb.read_one_cancellable(&mut part, &token).unwrap()
            })
        };
        thread::sleep(std::time::Duration::from_millis(50));
        token.cancel();
        assert!(!reader.join().unwrap());
    }

    #[test]
    fn test_cancellable_read_consumes_available_part() {
        let rb = ring(2, 2, RingMode::MultiThreaded);
        rb.store(&[1, 2]).unwrap();
        let token = CancellationToken::new();
        let mut part = [0u8; 2];
        assert!(rb.read_one_cancellable(&mut part, &token).unwrap());
        assert_eq!(part, [1, 2]);
    }
}
