//! Bounded single-producer single-consumer ring buffer.
//!
//! This is the leaf building block of the workspace: `epoch-gc` uses one
//! `Ring<T>` per registered thread to stage reclaimable objects and another
//! to track in-flight epoch operations, and `kv-index` never touches it
//! directly.
//!
//! # Example
//!
//! ```
//! use spsc_ring::Ring;
//!
//! let ring = Ring::<u64>::new(16);
//! assert!(ring.enqueue(42));
//! assert_eq!(ring.dequeue(), Some(42));
//! ```

mod backoff;
mod invariants;
mod ring;

pub use backoff::Backoff;
pub use ring::Ring;
