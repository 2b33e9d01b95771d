use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Wait-free bounded FIFO for exactly one producer thread and one consumer
/// thread. Every inter-stage handoff in the pipeline goes through one of
/// these.
///
/// Full and empty are distinguished purely by comparing the read and write
/// indices, so one slot stays permanently reserved: a ring with external
/// capacity `n` allocates `n + 1` slots. Neither side ever blocks or spins
/// internally; callers retry after a short sleep when they observe a full or
/// empty ring.
///
/// Concurrent calls from more than one thread on the same side are undefined,
/// as is `resize` while either side is active.
pub struct SpscRing<T> {
    read: CachePadded<AtomicUsize>,
    write: CachePadded<AtomicUsize>,
    slots: UnsafeCell<Box<[UnsafeCell<MaybeUninit<T>>]>>,
}

// One producer and one consumer may touch the ring from different threads.
// Slot ownership is handed over through the release/acquire index stores.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Builds a ring that accepts `capacity` items before reporting full.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be > 0");
        Self {
            read: CachePadded::new(AtomicUsize::new(0)),
            write: CachePadded::new(AtomicUsize::new(0)),
            slots: UnsafeCell::new(Self::alloc_slots(capacity + 1)),
        }
    }

    fn alloc_slots(n: usize) -> Box<[UnsafeCell<MaybeUninit<T>>]> {
        (0..n)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect()
    }

    fn slot_count(&self) -> usize {
        unsafe { (&(*self.slots.get())).len() }
    }

    fn advance(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.slot_count() {
            0
        } else {
            next
        }
    }

    /// Number of items that can be held before `enqueue` reports full.
    pub fn capacity(&self) -> usize {
        self.slot_count() - 1
    }

    /// Current item count. Exact on the calling side, a snapshot on the other.
    pub fn len(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        let slots = self.slot_count();
        (write + slots - read) % slots
    }

    /// Whether the ring currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }

    /// Attempts to move `item` into the ring. Producer side only.
    ///
    /// Returns the item back when the ring is full so the caller can retry
    /// after a backoff; nothing is dropped.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let write = self.write.load(Ordering::Relaxed);
        let next = self.advance(write);
        if next == self.read.load(Ordering::Acquire) {
            return Err(item);
        }
        unsafe {
            let slots = &*self.slots.get();
            (*slots[write].get()).write(item);
        }
        self.write.store(next, Ordering::Release);
        Ok(())
    }

    /// Attempts to take the oldest item. Consumer side only.
    ///
    /// The returned value is exclusively owned by the caller; the ring keeps
    /// nothing behind.
    pub fn dequeue(&self) -> Option<T> {
        let read = self.read.load(Ordering::Relaxed);
        if read == self.write.load(Ordering::Acquire) {
            return None;
        }
        let item = unsafe {
            let slots = &*self.slots.get();
            (*slots[read].get()).assume_init_read()
        };
        self.read.store(self.advance(read), Ordering::Release);
        Some(item)
    }

    /// Replaces the backing storage with one of a different capacity.
    ///
    /// Only legal while the ring is empty and neither side is mid-call; this
    /// is a configuration-phase operation, not a runtime one.
    pub fn resize(&self, capacity: usize) -> Result<(), RingResizeError> {
        if capacity == 0 {
            return Err(RingResizeError::ZeroCapacity);
        }
        let len = self.len();
        if len != 0 {
            return Err(RingResizeError::NotEmpty { len });
        }
        unsafe {
            *self.slots.get() = Self::alloc_slots(capacity + 1);
        }
        self.read.store(0, Ordering::Release);
        self.write.store(0, Ordering::Release);
        Ok(())
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
    }
}

/// Error returned when a resize request cannot be honored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingResizeError {
    #[error("ring still holds {len} items; resize requires an empty ring")]
    NotEmpty { len: usize },
    #[error("ring capacity must be > 0")]
    ZeroCapacity,
}
