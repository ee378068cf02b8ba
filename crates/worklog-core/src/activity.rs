//! In-flight persist indicator
//!
//! A counted observer: every persist holds an [`ActivityGuard`] for its
//! duration, and renderers poll [`ActivityIndicator::is_busy`] to show a
//! spinner. Dropping the guard decrements the count on every exit path,
//! including timeouts and early returns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared count of operations in flight
#[derive(Debug, Clone, Default)]
pub struct ActivityIndicator {
    in_flight: Arc<AtomicUsize>,
}

impl ActivityIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one operation as started
    #[must_use = "the operation is only counted while the guard is alive"]
    pub fn begin(&self) -> ActivityGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight() > 0
    }
}

/// Keeps an operation counted until dropped
#[derive(Debug)]
pub struct ActivityGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
