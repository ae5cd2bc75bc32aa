use crate::error::EpochGcError;
use crate::spinlock::Spinlock;
use spsc_ring::Ring;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Capacity of each per-thread staging ring. A thread that stages more than
/// this many objects before the next one is collected simply opens a new
/// ring rather than blocking — see [`GcThreadHandle::stage`].
const STAGING_RING_CAPACITY: usize = 4096;

/// An object staged for reclamation, tagged with the epoch at which it was
/// retired. It is safe to destroy once no registered thread can still
/// observe an epoch older than or equal to this one.
#[derive(Clone, Copy)]
pub struct StagedObject {
    pub epoch: u64,
    pub object: *mut (),
}

// SAFETY: StagedObject is only ever moved between the staging thread and the
// collecting thread, never aliased; the pointee's destructor decides what
// Send/Sync means for the pointee itself.
unsafe impl Send for StagedObject {}

/// Destroys objects staged against one [`EpochGc`]. Implementors own exactly
/// one object kind (e.g. key-value nodes, or `Data` tables), matching the
/// original design's one-epoch-gc-per-object-kind split.
pub trait Destructor: Send + Sync {
    fn destroy(&self, object: *mut ());
}

/// Per-thread registration with an [`EpochGc`].
///
/// Holds this thread's current epoch (read by every collector computing the
/// reclamation horizon) and the list of rings it has staged objects into.
/// The list only ever grows by appending a fresh ring when the current tail
/// ring is full; collection may shrink it again, but the tail ring — the one
/// actively being written to — is never removed.
pub struct GcThreadHandle {
    epoch: AtomicU64,
    terminated: AtomicBool,
    rings: Spinlock<Vec<Box<Ring<StagedObject>>>>,
}

impl GcThreadHandle {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            epoch: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
            rings: Spinlock::new(vec![Box::new(Ring::new(STAGING_RING_CAPACITY))]),
        })
    }

    /// Current epoch this thread has published. Read by other threads
    /// computing the reclamation horizon — Acquire/Release keeps that read
    /// ordered against the work the thread did before advancing its epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn set_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::Release);
    }

    pub fn advance_epoch_by_one(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn stage(&self, object: StagedObject) -> Result<(), EpochGcError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(EpochGcError::Terminated);
        }
        let mut rings = self.rings.lock();
        if !rings.last().expect("rings is never empty").enqueue(object) {
            let fresh = Box::new(Ring::new(STAGING_RING_CAPACITY));
            let accepted = fresh.enqueue(object);
            debug_assert!(accepted, "a freshly allocated ring cannot be full");
            rings.push(fresh);
        }
        Ok(())
    }
}

/// Epoch-based reclaimer for one object kind.
///
/// Construction takes the destructor used for every object staged against
/// this instance. Threads register a [`GcThreadHandle`], advance their own
/// epoch as they make progress, and stage objects they retire; any
/// registered thread may later run collection, which destroys objects whose
/// epoch is older than every currently-registered thread's epoch.
pub struct EpochGc<D: Destructor> {
    destructor: D,
    threads: Spinlock<Vec<Arc<GcThreadHandle>>>,
}

impl<D: Destructor> EpochGc<D> {
    pub fn new(destructor: D) -> Self {
        Self {
            destructor,
            threads: Spinlock::new(Vec::new()),
        }
    }

    /// Creates a fresh, unregistered thread handle.
    pub fn thread_init(&self) -> Arc<GcThreadHandle> {
        GcThreadHandle::new()
    }

    pub fn thread_register_global(&self, handle: &Arc<GcThreadHandle>) -> Result<(), EpochGcError> {
        let mut threads = self.threads.lock();
        if threads.iter().any(|h| Arc::ptr_eq(h, handle)) {
            return Err(EpochGcError::AlreadyRegistered);
        }
        threads.push(Arc::clone(handle));
        Ok(())
    }

    pub fn thread_unregister_global(&self, handle: &Arc<GcThreadHandle>) -> Result<(), EpochGcError> {
        let mut threads = self.threads.lock();
        let before = threads.len();
        threads.retain(|h| !Arc::ptr_eq(h, handle));
        if threads.len() == before {
            return Err(EpochGcError::NotRegistered);
        }
        Ok(())
    }

    /// Marks a handle terminated: it may no longer stage new objects, but it
    /// must still be collected (via `thread_collect_all`) and freed.
    pub fn thread_terminate(&self, handle: &GcThreadHandle) {
        handle.terminated.store(true, Ordering::Release);
    }

    /// Retires `object`, to be destroyed once no registered thread can still
    /// be observing `epoch`.
    pub fn stage_object(
        &self,
        handle: &GcThreadHandle,
        object: *mut (),
        epoch: u64,
    ) -> Result<(), EpochGcError> {
        handle.stage(StagedObject { epoch, object })
    }

    /// Reclamation horizon: the oldest epoch any registered thread might
    /// still be observing. Objects staged strictly before this epoch are
    /// safe to destroy.
    fn horizon(&self) -> u64 {
        let threads = self.threads.lock();
        threads
            .iter()
            .map(|h| h.epoch())
            .min()
            .unwrap_or(u64::MAX)
    }

    /// Drains and destroys everything in `handle`'s rings that is older
    /// than the current horizon. Fast path: a single ring (the common case)
    /// is drained in place without touching the global thread list lock
    /// more than once. Slow path: multiple rings are drained oldest-first
    /// and fully-drained rings (other than the tail) are dropped.
    pub fn thread_collect(&self, handle: &GcThreadHandle) {
        let horizon = self.horizon();
        self.drain_handle(handle, horizon);
    }

    /// Runs collection for every registered thread under a single horizon
    /// snapshot, so one thread's rapid epoch advancement mid-sweep can't
    /// make the sweep inconsistent across handles.
    pub fn thread_collect_all(&self) {
        let horizon = self.horizon();
        let snapshot: Vec<Arc<GcThreadHandle>> = self.threads.lock().clone();
        for handle in &snapshot {
            self.drain_handle(handle, horizon);
        }
    }

    fn drain_handle(&self, handle: &GcThreadHandle, horizon: u64) {
        let mut rings = handle.rings.lock();
        let ring_count = rings.len();

        for ring in rings.iter() {
            loop {
                let Some(staged) = ring.peek() else {
                    break;
                };
                if staged.epoch >= horizon {
                    break;
                }
                let staged = ring.dequeue().expect("peek guaranteed a value");
                self.destructor.destroy(staged.object);
            }
        }

        // Never drop the tail ring: it may still be actively accepting new
        // staged objects from `stage`.
        if ring_count > 1 {
            let tail_ptr = rings[ring_count - 1].as_ref() as *const Ring<StagedObject>;
            rings.retain(|r| !r.is_empty() || std::ptr::eq(r.as_ref(), tail_ptr));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingDestructor(Arc<AtomicUsize>);
    impl Destructor for CountingDestructor {
        fn destroy(&self, _object: *mut ()) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn collects_only_once_all_threads_pass_the_epoch() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let gc = EpochGc::new(CountingDestructor(Arc::clone(&destroyed)));

        let slow = gc.thread_init();
        let fast = gc.thread_init();
        gc.thread_register_global(&slow).unwrap();
        gc.thread_register_global(&fast).unwrap();

        gc.stage_object(&fast, std::ptr::null_mut(), 1).unwrap();
        fast.set_epoch(5);

        gc.thread_collect(&fast);
        assert_eq!(
            destroyed.load(Ordering::SeqCst),
            0,
            "slow thread is still at epoch 0, object staged at epoch 1 is not yet safe"
        );

        slow.set_epoch(5);
        gc.thread_collect(&fast);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_handle_rejects_operations() {
        let gc = EpochGc::new(CountingDestructor(Arc::new(AtomicUsize::new(0))));
        let handle = gc.thread_init();
        assert_eq!(
            gc.thread_unregister_global(&handle),
            Err(EpochGcError::NotRegistered)
        );
    }

    #[test]
    fn double_registration_is_rejected() {
        let gc = EpochGc::new(CountingDestructor(Arc::new(AtomicUsize::new(0))));
        let handle = gc.thread_init();
        gc.thread_register_global(&handle).unwrap();
        assert_eq!(
            gc.thread_register_global(&handle),
            Err(EpochGcError::AlreadyRegistered)
        );
    }

    #[test]
    fn staging_after_termination_is_rejected() {
        let gc = EpochGc::new(CountingDestructor(Arc::new(AtomicUsize::new(0))));
        let handle = gc.thread_init();
        gc.thread_terminate(&handle);
        assert_eq!(
            gc.stage_object(&handle, std::ptr::null_mut(), 0),
            Err(EpochGcError::Terminated)
        );
    }
}
