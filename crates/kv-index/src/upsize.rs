use crate::data::Data;
use std::sync::atomic::{AtomicI64, AtomicPtr, AtomicU16, AtomicU8, AtomicUsize, Ordering};

pub const NOT_UPSIZING: u8 = 0;
pub const PREPARE_FOR_UPSIZE: u8 = 1;
pub const UPSIZING: u8 = 2;

/// Cooperative-resize bookkeeping shared by every thread helping drain a
/// migration. `from` is the table being emptied; the live `Hashtable::data`
/// pointer already points at the new, larger table by the time any thread
/// observes `status != NOT_UPSIZING`.
pub struct UpsizeInfo {
    pub from: AtomicPtr<Data>,
    pub status: AtomicU8,
    pub total_blocks: AtomicI64,
    pub remaining_blocks: AtomicI64,
    pub block_size: AtomicUsize,
    /// Number of threads currently inside `migrate_block` for this upsize.
    /// Completion requires both `remaining_blocks <= 0` *and* this reaching
    /// zero — a block can be claimed (decrementing `remaining_blocks`)
    /// before the thread that claimed it has finished copying it.
    pub threads_count: AtomicU16,
}

impl UpsizeInfo {
    pub fn new() -> Self {
        Self {
            from: AtomicPtr::new(std::ptr::null_mut()),
            status: AtomicU8::new(NOT_UPSIZING),
            total_blocks: AtomicI64::new(0),
            remaining_blocks: AtomicI64::new(0),
            block_size: AtomicUsize::new(0),
            threads_count: AtomicU16::new(0),
        }
    }

    pub fn is_upsizing(&self) -> bool {
        self.status.load(Ordering::Acquire) == UPSIZING
    }
}

impl Default for UpsizeInfo {
    fn default() -> Self {
        Self::new()
    }
}
