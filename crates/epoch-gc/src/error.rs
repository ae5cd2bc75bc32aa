use thiserror::Error;

/// Failure modes for the epoch GC's small set of fallible entry points.
///
/// Mirrors the result-kind framing used throughout this workspace: these are
/// ordinary control flow, not panics, except where noted on the variant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EpochGcError {
    /// `thread_register_global`/`thread_register_local` called twice for the
    /// same handle without an intervening unregister.
    #[error("thread handle is already registered")]
    AlreadyRegistered,

    /// An unregister/terminate call referenced a handle that was never (or
    /// no longer) registered.
    #[error("thread handle is not registered")]
    NotRegistered,

    /// `stage_object` called after `thread_terminate` on the same handle.
    #[error("thread handle has been terminated")]
    Terminated,

    /// The thread's epoch operation queue has no free slots; the caller has
    /// enough in-flight operations outstanding that none have completed.
    #[error("operation queue is full")]
    OperationQueueFull,
}
