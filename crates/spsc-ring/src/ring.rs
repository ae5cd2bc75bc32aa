use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_initialized_read,
    debug_assert_monotonic,
};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// Classic SPSC producer-consumer protocol with unbounded u64 sequence numbers
// for `head`/`tail` (no ABA problem: wrap takes practically forever). Buffer
// index is `sequence & mask`, computed only at slot access time.
//
// **Producer (enqueue):**
// 1. Load `tail` Relaxed (only producer writes it)
// 2. Read `cached_head` unsynchronized (single-writer UnsafeCell)
// 3. If cache says full: Acquire-load `head` (synchronizes with consumer)
// 4. Write the value into the slot (no ordering needed, protected by protocol)
// 5. Release-store the new `tail` (publishes the write to the consumer)
//
// **Consumer (dequeue):**
// 1. Load `head` Relaxed (only consumer writes it)
// 2. Read `cached_tail` unsynchronized (single-writer UnsafeCell)
// 3. If cache says empty: Acquire-load `tail` (synchronizes with producer)
// 4. Read the value out of the slot
// 5. Release-store the new `head` (publishes the consumption to the producer)
//
// =============================================================================

/// Bounded single-producer single-consumer ring buffer of `T: Copy` values.
///
/// Not `Clone`: the only way to get a consumer-side view is to move the
/// `Ring` itself (or a reference to it) to the single thread that drains it.
/// Calling `dequeue` from two threads concurrently is a logic error the type
/// does not prevent by itself — callers (the epoch GC's per-thread staging
/// rings, the operation queue) uphold single-consumer by construction.
pub struct Ring<T> {
    tail: CachePadded<AtomicU64>,
    cached_head: CachePadded<UnsafeCell<u64>>,
    head: CachePadded<AtomicU64>,
    cached_tail: CachePadded<UnsafeCell<u64>>,
    mask: u64,
    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T: Copy> Ring<T> {
    /// Creates a ring able to hold at least `requested_capacity` items,
    /// rounded up to the next power of two.
    pub fn new(requested_capacity: usize) -> Self {
        let capacity = requested_capacity.max(1).next_power_of_two();
        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, MaybeUninit::uninit);

        Self {
            tail: CachePadded::new(AtomicU64::new(0)),
            cached_head: CachePadded::new(UnsafeCell::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
            cached_tail: CachePadded::new(UnsafeCell::new(0)),
            mask: (capacity - 1) as u64,
            buffer: UnsafeCell::new(buffer.into_boxed_slice()),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        (self.mask + 1) as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Pushes `value`. Returns `false` if the ring is full.
    #[inline]
    pub fn enqueue(&self, value: T) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: cached_head is written only by the producer (this code path).
        let cached_head = unsafe { *self.cached_head.get() };
        if tail.wrapping_sub(cached_head) as usize >= self.capacity() {
            let head = self.head.load(Ordering::Acquire);
            // SAFETY: single producer writer, synchronized by the Acquire above.
            unsafe {
                *self.cached_head.get() = head;
            }
            if tail.wrapping_sub(head) as usize >= self.capacity() {
                return false;
            }
        }

        let idx = (tail & self.mask) as usize;
        // SAFETY: idx is in-bounds; this slot is not in [head, tail) so the
        // consumer will not read it concurrently.
        unsafe {
            let buffer = &mut *self.buffer.get();
            buffer[idx].write(value);
        }

        let new_tail = tail.wrapping_add(1);
        let head = self.head.load(Ordering::Relaxed);
        debug_assert_bounded_count!(new_tail.wrapping_sub(head) as usize, self.capacity());
        debug_assert_monotonic!("tail", tail, new_tail);
        self.tail.store(new_tail, Ordering::Release);
        true
    }

    /// Reads the next value without removing it.
    #[inline]
    pub fn peek(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        if !self.has_readable(head) {
            return None;
        }
        let idx = (head & self.mask) as usize;
        // SAFETY: slot at `head` is published (tail observed > head via
        // Acquire in `has_readable`).
        unsafe {
            let buffer = &*self.buffer.get();
            Some(buffer[idx].assume_init())
        }
    }

    /// Removes and returns the next value. Must only be called by the single
    /// consumer thread.
    #[inline]
    pub fn dequeue(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        if !self.has_readable(head) {
            return None;
        }
        let idx = (head & self.mask) as usize;
        let tail = self.tail.load(Ordering::Relaxed);
        debug_assert_initialized_read!(head, head, tail);

        // SAFETY: slot at `head` was written by the producer and published
        // via the Acquire/Release pair established by `has_readable`.
        let value = unsafe {
            let buffer = &*self.buffer.get();
            buffer[idx].assume_init_read()
        };

        let new_head = head.wrapping_add(1);
        debug_assert_head_not_past_tail!(new_head, tail);
        debug_assert_monotonic!("head", head, new_head);
        self.head.store(new_head, Ordering::Release);
        Some(value)
    }

    #[inline]
    fn has_readable(&self, head: u64) -> bool {
        // SAFETY: cached_tail is written only by the consumer (this code path).
        let cached_tail = unsafe { *self.cached_tail.get() };
        if cached_tail.wrapping_sub(head) > 0 {
            return true;
        }
        let tail = self.tail.load(Ordering::Acquire);
        // SAFETY: single consumer writer, synchronized by the Acquire above.
        unsafe {
            *self.cached_tail.get() = tail;
        }
        tail.wrapping_sub(head) > 0
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        let count = tail.wrapping_sub(head) as usize;
        if count == 0 {
            return;
        }
        let buffer = self.buffer.get_mut();
        for i in 0..count {
            let idx = (head.wrapping_add(i as u64) & self.mask) as usize;
            // SAFETY: slots in [head, tail) are initialized and not aliased.
            unsafe {
                std::ptr::drop_in_place(buffer[idx].as_mut_ptr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue_roundtrip() {
        let ring = Ring::<u64>::new(4);
        assert!(ring.enqueue(1));
        assert!(ring.enqueue(2));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.peek(), Some(1));
        assert_eq!(ring.dequeue(), Some(1));
        assert_eq!(ring.dequeue(), Some(2));
        assert_eq!(ring.dequeue(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn capacity_rounds_to_power_of_two() {
        let ring = Ring::<u8>::new(5);
        assert_eq!(ring.capacity(), 8);
    }

    #[test]
    fn rejects_enqueue_when_full() {
        let ring = Ring::<u32>::new(2);
        assert!(ring.enqueue(1));
        assert!(ring.enqueue(2));
        assert!(!ring.enqueue(3));
        assert!(ring.is_full());
    }

    #[test]
    fn wraps_around_after_drain() {
        let ring = Ring::<u32>::new(2);
        for round in 0..10 {
            assert!(ring.enqueue(round));
            assert_eq!(ring.dequeue(), Some(round));
        }
    }

    #[test]
    fn drops_undrained_items() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROPPED: AtomicUsize = AtomicUsize::new(0);

        #[derive(Clone, Copy)]
        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPPED.fetch_add(1, Ordering::SeqCst);
            }
        }

        let ring = Ring::<Tracked>::new(4);
        ring.enqueue(Tracked);
        ring.enqueue(Tracked);
        drop(ring);
        assert_eq!(DROPPED.load(Ordering::SeqCst), 2);
    }
}
