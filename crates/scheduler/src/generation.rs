//! Generation stamps for discarding stale asynchronous results.
//!
//! Every piece of background work carries the [`Stamp`] that was current when
//! it was issued. Advancing the [`Generation`] invalidates every outstanding
//! stamp at once; a completion whose stamp is no longer current is dropped by
//! the receiver instead of being applied.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Shared monotonically increasing counter.
///
/// # Example
///
/// ```
/// use pdfview_scheduler::Generation;
///
/// let generation = Generation::new();
/// let stamp = generation.advance();
/// assert!(stamp.is_current());
///
/// // Source changed: the earlier request is now stale.
/// let newer = generation.advance();
/// assert!(!stamp.is_current());
/// assert!(newer.is_current());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Generation {
    counter: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidates all outstanding stamps and returns the new current one.
    pub fn advance(&self) -> Stamp {
        let value = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        Stamp { value, counter: self.counter.clone() }
    }

    /// Stamp for the current value without invalidating anything.
    pub fn stamp(&self) -> Stamp {
        Stamp { value: self.current(), counter: self.counter.clone() }
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

/// Token captured when work is issued.
///
/// Workers may also poll [`Stamp::is_current`] to skip work whose result
/// would be thrown away.
#[derive(Debug, Clone)]
pub struct Stamp {
    value: u64,
    counter: Arc<AtomicU64>,
}

impl Stamp {
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::Acquire) == self.value
    }

    /// True when both stamps came from the same [`Generation`] and value.
    pub fn matches(&self, other: &Stamp) -> bool {
        self.value == other.value && Arc::ptr_eq(&self.counter, &other.counter)
    }
}
