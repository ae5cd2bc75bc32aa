//! Epoch-based garbage collection for concurrent data structures.
//!
//! Readers publish a monotonically increasing epoch as they make progress;
//! writers retire objects tagged with the epoch at which they stopped being
//! reachable. An object is safe to destroy once every registered thread's
//! published epoch has moved past the epoch it was retired at. This crate
//! provides that mechanism generically, independent of what is being
//! reclaimed — `kv-index` uses one [`EpochGc`] for key-value nodes and
//! another for whole hash table tables.
//!
//! # Example
//!
//! ```
//! use epoch_gc::{Destructor, EpochGc};
//!
//! struct Noop;
//! impl Destructor for Noop {
//!     fn destroy(&self, _object: *mut ()) {}
//! }
//!
//! let gc = EpochGc::new(Noop);
//! let handle = gc.thread_init();
//! gc.thread_register_global(&handle).unwrap();
//! gc.stage_object(&handle, std::ptr::null_mut(), handle.epoch()).unwrap();
//! handle.advance_epoch_by_one();
//! gc.thread_collect(&handle);
//! ```

mod error;
mod gc;
mod operation_queue;
mod spinlock;

pub use error::EpochGcError;
pub use gc::{Destructor, EpochGc, GcThreadHandle, StagedObject};
pub use operation_queue::{OperationHandle, OperationQueue};
pub use spinlock::{Spinlock, SpinlockGuard};
