//! A lock-free, multi-producer multi-consumer key-value index.
//!
//! Backed by an open-addressed bucket array ([`data::Data`]) whose slots are
//! updated with a single 128-bit compare-and-swap ([`bucket::Bucket`]),
//! grown by cooperative background migration rather than stop-the-world
//! rehashing ([`upsize`]), and reclaimed via epoch-based garbage collection
//! (the `epoch_gc` crate) so a node or a retired table generation is only
//! freed once no thread could still be reading it.
//!
//! ```
//! use kv_index::{Config, Hashtable};
//!
//! let table = Hashtable::new(Config::default());
//! let handle = table.thread_init();
//!
//! table.set(&handle, b"answer", 42).unwrap();
//! assert_eq!(table.get(&handle, b"answer"), Some(42));
//!
//! table.thread_free(handle);
//! ```

mod bucket;
mod config;
mod data;
mod error;
mod hash;
mod hashtable;
mod metrics;
mod node;
mod upsize;

pub use config::{Config, LARGE_CONFIG, SMALL_CONFIG};
pub use error::HashtableError;
pub use hashtable::{Hashtable, SetOutcome, ThreadHandle};
pub use metrics::MetricsSnapshot;
