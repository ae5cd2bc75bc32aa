use thiserror::Error;

/// Failure modes surfaced by [`crate::Hashtable`]'s fallible entry points.
///
/// Matches the design note that this index treats contention and capacity
/// limits as ordinary result kinds (`TryLater`, `NeedsResizing`), not
/// exceptions — only genuinely unrecoverable states (e.g. an upsize
/// requested while one is already running) are errors here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashtableError {
    /// The table has already reached `buckets_count_max` and cannot grow
    /// further, yet an insert found no free slot within the probe window.
    #[error("hashtable is full and cannot be upsized further")]
    Full,

    /// An upsize was requested while the table was not in a state that
    /// allows starting one (e.g. one is already in progress).
    #[error("hashtable is not in a state that allows starting an upsize")]
    UpsizeNotAllowed,
}
