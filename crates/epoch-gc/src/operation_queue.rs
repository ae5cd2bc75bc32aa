use crate::error::EpochGcError;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Number of in-flight operations a single thread may track before it must
/// wait for the oldest one to complete. Matches the original design's
/// `EPOCH_OPERATION_QUEUE_RING_SIZE`.
const RING_SIZE: usize = 16 * 1024;

struct Slot {
    /// Epoch the operation started at. Only meaningful once `completed`.
    start_epoch: AtomicU64,
    completed: AtomicBool,
}

/// Opaque handle returned by [`OperationQueue::enqueue`], redeemed by
/// [`OperationQueue::mark_completed`] once the operation it names has
/// finished.
#[derive(Debug, Clone, Copy)]
pub struct OperationHandle {
    index: usize,
}

/// Per-thread record of in-flight epoch-sensitive operations.
///
/// A thread enqueues an operation when it begins something that must not be
/// reclaimed out from under it, and marks it completed when done. The
/// queue's `latest_epoch` only advances past an operation once it has
/// completed, in enqueue order — so a long-running operation holds back the
/// whole thread's observable epoch, exactly the backpressure an epoch
/// reclaimer needs.
pub struct OperationQueue {
    slots: Box<[Slot]>,
    mask: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
    latest_epoch: AtomicU64,
}

impl OperationQueue {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(RING_SIZE);
        slots.resize_with(RING_SIZE, || Slot {
            start_epoch: AtomicU64::new(0),
            completed: AtomicBool::new(true),
        });
        Self {
            slots: slots.into_boxed_slice(),
            mask: RING_SIZE - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            latest_epoch: AtomicU64::new(0),
        }
    }

    /// Records the start of an operation at `start_epoch`. Single-producer
    /// (the owning thread) by construction.
    pub fn enqueue(&self, start_epoch: u64) -> Result<OperationHandle, EpochGcError> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        if tail.wrapping_sub(head) >= self.slots.len() {
            return Err(EpochGcError::OperationQueueFull);
        }
        let index = tail & self.mask;
        let slot = &self.slots[index];
        slot.start_epoch.store(start_epoch, Ordering::Relaxed);
        slot.completed.store(false, Ordering::Release);
        self.tail.store(tail.wrapping_add(1), Ordering::Relaxed);
        Ok(OperationHandle { index })
    }

    /// Marks the operation named by `handle` as complete.
    pub fn mark_completed(&self, handle: OperationHandle) {
        self.slots[handle.index]
            .completed
            .store(true, Ordering::Release);
    }

    /// Returns the latest epoch this thread is known to have fully passed
    /// through: every enqueued operation up to (and excluding) the first
    /// still-incomplete one.
    pub fn get_latest_epoch(&self) -> u64 {
        loop {
            let head = self.head.load(Ordering::Relaxed);
            let tail = self.tail.load(Ordering::Relaxed);
            if head == tail {
                return self.latest_epoch.load(Ordering::Relaxed);
            }
            let index = head & self.mask;
            let slot = &self.slots[index];
            if !slot.completed.load(Ordering::Acquire) {
                return self.latest_epoch.load(Ordering::Relaxed);
            }
            self.latest_epoch
                .store(slot.start_epoch.load(Ordering::Relaxed), Ordering::Relaxed);
            self.head.store(head.wrapping_add(1), Ordering::Relaxed);
        }
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_epoch_tracks_only_completed_operations() {
        let queue = OperationQueue::new();
        let a = queue.enqueue(1).unwrap();
        let b = queue.enqueue(2).unwrap();
        assert_eq!(queue.get_latest_epoch(), 0);

        queue.mark_completed(b);
        assert_eq!(queue.get_latest_epoch(), 0, "a is still open, blocks b's completion from counting");

        queue.mark_completed(a);
        assert_eq!(queue.get_latest_epoch(), 2);
    }

    #[test]
    fn full_queue_is_rejected() {
        let queue = OperationQueue::new();
        for epoch in 0..RING_SIZE as u64 {
            queue.enqueue(epoch).unwrap();
        }
        assert_eq!(queue.enqueue(999), Err(EpochGcError::OperationQueueFull));
    }
}
