use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::LineError;

use super::ring::RingBuffer;

/// Blocking byte pipe over a [`RingBuffer`], honouring connection lifecycle.
///
/// Exactly one producer and one consumer use a queue. The mutex guards only
/// the predicate checks and condition waits; the byte copies run lock-free
/// on the ring, which is safe because each side's available count can only
/// grow underneath it while it works.
pub(crate) struct DataQueue {
    ring: RingBuffer,
    connected: AtomicBool,
    lock: Mutex<()>,
    data_available: Condvar,
    space_available: Condvar,
}

impl DataQueue {
    /// Created disconnected; [`set_connected`](Self::set_connected) flips to
    /// connected exactly once, at pairing time.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            connected: AtomicBool::new(false),
            lock: Mutex::new(()),
            data_available: Condvar::new(),
            space_available: Condvar::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Flipping to disconnected broadcasts both conditions so every blocked
    /// caller wakes and either finishes with remaining data or fails with
    /// `ConnectionLost`.
    pub fn set_connected(&self, connected: bool) {
        let _guard = self.locked();
        if connected {
            self.connected.store(true, Ordering::Release);
        } else if self.connected.swap(false, Ordering::AcqRel) {
            self.data_available.notify_all();
            self.space_available.notify_all();
        }
    }

    /// Blocks until at least one byte is available, then drains up to
    /// `buf.len()` bytes. Fails with `ConnectionLost` once the queue is
    /// disconnected and empty.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, LineError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.ring.read(buf);
            if n > 0 {
                self.wake_writer();
                return Ok(n);
            }
            let guard = self.locked();
            // Re-check under the lock: the peer may have produced or
            // disconnected between the failed drain and acquiring it.
            if self.ring.available_read() == 0 {
                if !self.is_connected() {
                    return Err(LineError::ConnectionLost);
                }
                drop(self.data_available.wait(guard).unwrap_or_else(PoisonError::into_inner));
            }
        }
    }

    /// As [`read`](Self::read), but bounded: expiry with no data returns
    /// `Ok(0)`, or `ConnectionLost` when the queue is also disconnected.
    pub fn read_with_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, LineError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let n = self.ring.read(buf);
            if n > 0 {
                self.wake_writer();
                return Ok(n);
            }
            let guard = self.locked();
            if self.ring.available_read() == 0 {
                if !self.is_connected() {
                    return Err(LineError::ConnectionLost);
                }
                let now = Instant::now();
                if now >= deadline {
                    return Ok(0);
                }
                let (guard, _) = self
                    .data_available
                    .wait_timeout(guard, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                drop(guard);
            }
        }
    }

    /// Blocks until the whole request fits, then transfers it in one ring
    /// call. Requests of the full ring capacity or more can never fit and
    /// fail with `TooBigBuffer`.
    pub fn write(&self, buf: &[u8]) -> Result<usize, LineError> {
        if buf.len() >= self.ring.capacity() {
            return Err(LineError::TooBigBuffer(buf.len()));
        }
        let mut guard = self.locked();
        while self.ring.available_write() < buf.len() {
            if !self.is_connected() {
                return Err(LineError::ConnectionLost);
            }
            guard = self.space_available.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
        drop(guard);

        let written = self.ring.write(buf);
        debug_assert_eq!(written, buf.len());

        let _guard = self.locked();
        self.data_available.notify_one();
        Ok(written)
    }

    fn wake_writer(&self) {
        let _guard = self.locked();
        self.space_available.notify_one();
    }

    fn locked(&self) -> MutexGuard<'_, ()> {
        // A panicking peer must still release its blocked counterpart, so
        // poisoning is ignored.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
