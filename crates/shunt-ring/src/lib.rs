//! # shunt-ring
//!
//! A bounded multi-producer multi-consumer queue after Dmitry Vyukov's
//! bounded MPMC design (1024cores.net). Each slot carries a 64-bit sequence
//! number that establishes publication order: a producer may claim a slot
//! when `seq == head`, a consumer when `seq == tail + 1`. Capacity is a
//! power of two so indexing is a mask.
//!
//! Push and pop never block and never spin; a `false`/`None` return means
//! "no space" or "no item" and the caller decides what to do about it. The
//! forwarder uses one of these as its upstream UDP socket pool, where an
//! empty pool is answered with SERVFAIL rather than waiting.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors from [`RingBuffer::new`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// Capacity zero is meaningless.
    #[error("ring capacity must be non-zero")]
    ZeroCapacity,

    /// Capacity too large to round up to a power of two.
    #[error("ring capacity {0} overflows")]
    CapacityOverflow(u64),
}

/// Pads a hot field to its own cache line so producers and consumers do not
/// false-share.
#[repr(align(64))]
struct CacheAligned<T>(T);

struct Slot<T> {
    seq: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded lock-free MPMC queue.
pub struct RingBuffer<T> {
    head: CacheAligned<AtomicU64>,
    tail: CacheAligned<AtomicU64>,
    mask: u64,
    slots: Box<[Slot<T>]>,
}

unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Creates a ring with at least `capacity` slots, rounded up to the next
    /// power of two.
    pub fn new(capacity: u64) -> Result<Self, RingError> {
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        let size = capacity
            .checked_next_power_of_two()
            .ok_or(RingError::CapacityOverflow(capacity))?;
        if size > (1 << 32) {
            return Err(RingError::CapacityOverflow(capacity));
        }

        let slots = (0..size)
            .map(|i| Slot {
                seq: AtomicU64::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            head: CacheAligned(AtomicU64::new(0)),
            tail: CacheAligned(AtomicU64::new(0)),
            mask: size - 1,
            slots,
        })
    }

    /// Attempts to enqueue; returns the value back when the ring is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        loop {
            let pos = self.head.0.load(Ordering::Relaxed);
            let slot = &self.slots[(pos & self.mask) as usize];
            let seq = slot.seq.load(Ordering::Acquire);

            match seq.wrapping_sub(pos) {
                0 => {
                    if self
                        .head
                        .0
                        .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                    {
                        unsafe { (*slot.value.get()).write(value) };
                        slot.seq.store(pos + 1, Ordering::Release);
                        return Ok(());
                    }
                    // Lost the race for this slot; retry with a fresh head.
                }
                diff if (diff as i64) < 0 => return Err(value), // full
                _ => {}                                          // producer behind, retry
            }
        }
    }

    /// Attempts to dequeue; `None` when the ring is empty.
    pub fn pop(&self) -> Option<T> {
        loop {
            let pos = self.tail.0.load(Ordering::Relaxed);
            let slot = &self.slots[(pos & self.mask) as usize];
            let seq = slot.seq.load(Ordering::Acquire);

            match seq.wrapping_sub(pos + 1) {
                0 => {
                    if self
                        .tail
                        .0
                        .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                    {
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.seq.store(pos + self.mask + 1, Ordering::Release);
                        return Some(value);
                    }
                }
                diff if (diff as i64) < 0 => return None, // empty
                _ => {}                                    // consumer behind, retry
            }
        }
    }

    /// Number of items currently queued. Approximate under concurrency.
    pub fn len(&self) -> u64 {
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Relaxed);
        head.saturating_sub(tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Slot count (always a power of two).
    pub fn capacity(&self) -> u64 {
        self.mask + 1
    }

    /// Fills remaining space from `make`, stopping early if `make` declines.
    ///
    /// Used to populate socket pools eagerly at startup; a `None` from `make`
    /// leaves the ring partially filled.
    pub fn fill(&self, mut make: impl FnMut() -> Option<T>) {
        while !self.is_full() {
            match make() {
                Some(value) => {
                    if self.push(value).is_err() {
                        return;
                    }
                }
                None => return,
            }
        }
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn rejects_zero_capacity() {
        assert_eq!(RingBuffer::<u32>::new(0).unwrap_err(), RingError::ZeroCapacity);
    }

    #[test]
    fn rejects_overflowing_capacity() {
        assert!(matches!(
            RingBuffer::<u32>::new(u64::MAX),
            Err(RingError::CapacityOverflow(_))
        ));
    }

    #[test]
    fn rounds_capacity_to_power_of_two() {
        let ring = RingBuffer::<u32>::new(5).unwrap();
        assert_eq!(ring.capacity(), 8);

        let ring = RingBuffer::<u32>::new(8).unwrap();
        assert_eq!(ring.capacity(), 8);
    }

    #[test]
    fn fifo_order_single_thread() {
        let ring = RingBuffer::new(4).unwrap();
        for i in 0..4 {
            ring.push(i).unwrap();
        }
        assert!(ring.is_full());
        assert_eq!(ring.push(99), Err(99));

        for i in 0..4 {
            assert_eq!(ring.pop(), Some(i));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn wraps_around() {
        let ring = RingBuffer::new(2).unwrap();
        for round in 0..100 {
            ring.push(round).unwrap();
            ring.push(round + 1).unwrap();
            assert_eq!(ring.pop(), Some(round));
            assert_eq!(ring.pop(), Some(round + 1));
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn fill_populates_remaining_space() {
        let ring = RingBuffer::new(8).unwrap();
        ring.push(100u32).unwrap();

        let mut next = 0;
        ring.fill(|| {
            next += 1;
            Some(next)
        });
        assert!(ring.is_full());
        assert_eq!(ring.pop(), Some(100));
    }

    #[test]
    fn fill_stops_when_maker_declines() {
        let ring = RingBuffer::<u32>::new(8).unwrap();
        let mut remaining = 3;
        ring.fill(|| {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            Some(remaining)
        });
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn concurrent_producers_and_consumers() {
        let ring = Arc::new(RingBuffer::new(64).unwrap());
        const PER_THREAD: u64 = 10_000;
        const THREADS: u64 = 4;

        let mut handles = Vec::new();
        for t in 0..THREADS {
            let ring = ring.clone();
            handles.push(thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let mut value = t * PER_THREAD + i;
                    loop {
                        match ring.push(value) {
                            Ok(()) => break,
                            Err(v) => {
                                value = v;
                                thread::yield_now();
                            }
                        }
                    }
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..THREADS {
            let ring = ring.clone();
            consumers.push(thread::spawn(move || {
                let mut got = Vec::new();
                while got.len() < PER_THREAD as usize {
                    match ring.pop() {
                        Some(v) => got.push(v),
                        None => thread::yield_now(),
                    }
                }
                got
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        let mut all: Vec<u64> = consumers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();

        // Every pushed value came out exactly once.
        let expected: Vec<u64> = (0..THREADS * PER_THREAD).collect();
        assert_eq!(all, expected);
    }
}
