//! Thread-safe client-id allocation.
//!
//! Client ids are handed out by the connection listener, one per accepted
//! socket.  The allocator is a 64-bit atomic counter: ids are unique for the
//! lifetime of the process and never reused, so a log line or a stale handle
//! can never be confused with a later connection that happened to get a
//! recycled id.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a connected client, unique per process lifetime.
pub type ClientId = u64;

/// A monotonically increasing allocator for [`ClientId`]s.
///
/// Ids start at 0 and increment by 1 with each call to [`next`].
///
/// # Examples
///
/// ```rust
/// use fiff_stream::protocol::client_id::ClientIdCounter;
///
/// let counter = ClientIdCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
///
/// [`next`]: ClientIdCounter::next
#[derive(Debug, Default)]
pub struct ClientIdCounter {
    inner: AtomicU64,
}

impl ClientIdCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next client id and atomically advances the counter.
    ///
    /// `Ordering::Relaxed` is sufficient: ids are only required to be unique,
    /// not to synchronise memory between threads.
    pub fn next(&self) -> ClientId {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the number of ids allocated so far without advancing.
    ///
    /// Useful for logging and diagnostics; by the time the caller uses the
    /// value another task may already have allocated further ids.
    pub fn allocated(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}
