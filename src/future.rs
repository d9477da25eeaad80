//! Future: single-assignment result cell for events.
//!
//! A `Future<T>` is created by the bus when an event is routed and handed
//! back to the sender. The micro-service that handles the event resolves it
//! through `complete`, which wakes every thread blocked in `get`.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

struct Slot<T> {
    value: Mutex<Option<T>>,
    resolved: Condvar,
}

/// A promised result that is resolved at most once.
///
/// Cloning a `Future` yields another handle to the same cell, so the sender
/// and the bus can both hold it.
///
/// ## Example
///
/// ```
/// use microbus::Future;
///
/// let future = Future::new();
/// assert!(!future.is_done());
///
/// future.resolve("pong".to_string());
/// future.resolve("ignored".to_string());
///
/// assert!(future.is_done());
/// assert_eq!(future.get(), "pong");
/// ```
pub struct Future<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Future<T> {
    /// Create an unresolved future.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                value: Mutex::new(None),
                resolved: Condvar::new(),
            }),
        }
    }

    /// Resolve the future with `value` and wake all waiters.
    ///
    /// Only the first resolution is honored; later calls are no-ops.
    /// Returns `true` if this call resolved the future.
    pub fn resolve(&self, value: T) -> bool {
        // A poisoned slot still holds a consistent Option.
        let mut slot = self
            .slot
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        self.slot.resolved.notify_all();
        true
    }

    /// Non-blocking check of the resolution state.
    pub fn is_done(&self) -> bool {
        self.slot
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T: Clone> Future<T> {
    /// Block until the future is resolved, then return the value.
    pub fn get(&self) -> T {
        let mut slot = self
            .slot
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            slot = self
                .slot
                .resolved
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout` waiting for the value.
    ///
    /// Returns `None` if the future was not resolved within the window. The
    /// producer side is left untouched.
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self
            .slot
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(value) = slot.as_ref() {
                return Some(value.clone());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .slot
                .resolved
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// The value, if already resolved. Never blocks.
    pub fn try_get(&self) -> Option<T> {
        self.slot
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("done", &self.is_done())
            .finish()
    }
}
