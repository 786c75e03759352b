use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

// Synchronization protocol
//
// Producer: copy bytes into the free region, then store the advanced write
// index with Release. Consumer: load the write index with Acquire, then copy
// the bytes it covers out, then store the advanced read index with Release.
// The producer observes freed space through an Acquire load of the read
// index. A reader that sees `wr == W` therefore also sees every byte the
// producer published below W, and symmetrically for reclaimed space.
//
// One slot always stays unused so that `rd == wr` means empty and never
// full; the usable capacity is `capacity() - 1`.

/// Fixed-capacity single-producer/single-consumer byte ring.
///
/// Never blocks; both `read` and `write` return short counts and leave the
/// caller to loop. At most one thread may read and one thread may write
/// concurrently; the queue layer upholds that by construction.
pub(crate) struct RingBuffer {
    data: UnsafeCell<Box<[u8]>>,
    wr: CachePadded<AtomicUsize>,
    rd: CachePadded<AtomicUsize>,
}

// Safety: index publication follows the acquire/release protocol above, and
// the bytes between the indices are only ever touched by the side that owns
// them at that point in the protocol.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "ring buffer needs room for the reserved slot");
        Self {
            data: UnsafeCell::new(vec![0; capacity].into_boxed_slice()),
            wr: CachePadded::new(AtomicUsize::new(0)),
            rd: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        // The box itself is never touched after construction, only its bytes.
        unsafe { (&*self.data.get()).len() }
    }

    /// Copies up to `buf.len()` bytes out and advances the read index.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let wr = self.wr.load(Ordering::Acquire);
        let rd = self.rd.load(Ordering::Relaxed);
        let capacity = self.capacity();

        if wr == rd {
            0
        } else if rd < wr {
            let tocopy = (wr - rd).min(buf.len());
            // Safety: `[rd, rd + tocopy)` holds published bytes below `wr`.
            unsafe { self.copy_out(rd, &mut buf[..tocopy]) };
            self.rd.store(rd + tocopy, Ordering::Release);
            tocopy
        } else {
            // Occupied region straddles the end; drain the upper part first.
            let tocopy = (capacity - rd).min(buf.len());
            // Safety: `[rd, rd + tocopy)` stays below capacity and holds
            // published bytes.
            unsafe { self.copy_out(rd, &mut buf[..tocopy]) };
            let next = if rd + tocopy == capacity { 0 } else { rd + tocopy };
            self.rd.store(next, Ordering::Release);
            if tocopy > 0 && tocopy < buf.len() && next != wr {
                // Wrapped with data still ahead; continues at the start.
                tocopy + self.read(&mut buf[tocopy..])
            } else {
                tocopy
            }
        }
    }

    /// Copies up to `buf.len()` bytes in and advances the write index.
    pub fn write(&self, buf: &[u8]) -> usize {
        let wr = self.wr.load(Ordering::Relaxed);
        let rd = self.rd.load(Ordering::Acquire);
        let capacity = self.capacity();

        if rd <= wr {
            let mut tocopy = (capacity - wr).min(buf.len());
            // With the reader parked at zero the reserved slot is the last
            // one before the end; stop short of it.
            if rd == 0 && tocopy == capacity - wr {
                tocopy -= 1;
            }
            // Safety: `[wr, wr + tocopy)` is free space the reader cannot
            // touch until the Release store below.
            unsafe { self.copy_in(wr, &buf[..tocopy]) };
            let next = if wr + tocopy == capacity { 0 } else { wr + tocopy };
            self.wr.store(next, Ordering::Release);
            if tocopy > 0 && tocopy < buf.len() && rd != 0 {
                // Wrapped past the end; the rest goes to the start.
                tocopy + self.write(&buf[tocopy..])
            } else {
                tocopy
            }
        } else {
            let tocopy = (rd - 1 - wr).min(buf.len());
            // Safety: as above, and `rd - 1` keeps the reserved slot free.
            unsafe { self.copy_in(wr, &buf[..tocopy]) };
            self.wr.store(wr + tocopy, Ordering::Release);
            tocopy
        }
    }

    pub fn available_read(&self) -> usize {
        let wr = self.wr.load(Ordering::Acquire);
        let rd = self.rd.load(Ordering::Acquire);
        if rd == wr {
            0
        } else if rd < wr {
            wr - rd
        } else {
            self.capacity() - rd + wr
        }
    }

    pub fn available_write(&self) -> usize {
        let wr = self.wr.load(Ordering::Acquire);
        let rd = self.rd.load(Ordering::Acquire);
        if rd == wr {
            self.capacity() - 1
        } else if rd < wr {
            self.capacity() - wr + rd - 1
        } else {
            rd - wr - 1
        }
    }

    /// Safety: caller is the unique reader and `[at, at + dst.len())` lies
    /// within the published region.
    unsafe fn copy_out(&self, at: usize, dst: &mut [u8]) {
        unsafe {
            let base = (*self.data.get()).as_ptr();
            ptr::copy_nonoverlapping(base.add(at), dst.as_mut_ptr(), dst.len());
        }
    }

    /// Safety: caller is the unique writer and `[at, at + src.len())` lies
    /// within the free region.
    unsafe fn copy_in(&self, at: usize, src: &[u8]) {
        unsafe {
            let base = (*self.data.get()).as_mut_ptr();
            ptr::copy_nonoverlapping(src.as_ptr(), base.add(at), src.len());
        }
    }
}
