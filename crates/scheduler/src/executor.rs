//! Where background work runs.
//!
//! The viewer never blocks on document I/O or rasterization; it hands a
//! [`Task`] to an [`Executor`] and later collects the result from a channel.

use crate::priority::{Task, TaskPriority, TaskQueue};

pub trait Executor: Send + Sync {
    fn spawn(&self, priority: TaskPriority, task: Task);
}

/// Runs every task immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn spawn(&self, _priority: TaskPriority, task: Task) {
        task();
    }
}

/// Queues tasks until the owner calls [`DeferredExecutor::run_pending`].
///
/// Single-threaded hosts pump this from their event loop; tests use it to
/// interleave completions deterministically.
#[derive(Default)]
pub struct DeferredExecutor {
    queue: TaskQueue,
}

impl DeferredExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs queued tasks in priority order, including tasks queued while
    /// running. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(queued) = self.queue.pop() {
            (queued.task)();
            ran += 1;
        }
        ran
    }

    /// Runs only the highest priority queued task.
    pub fn run_one(&self) -> bool {
        match self.queue.pop() {
            Some(queued) => {
                (queued.task)();
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drops queued tasks without running them.
    pub fn discard_pending(&self) -> usize {
        self.queue.clear()
    }
}

impl Executor for DeferredExecutor {
    fn spawn(&self, priority: TaskPriority, task: Task) {
        self.queue.push(priority, task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_inline_runs_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();

        InlineExecutor.spawn(TaskPriority::Visible, Box::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_waits_for_pump() {
        let executor = DeferredExecutor::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (priority, name) in [
            (TaskPriority::Prefetch, "prefetch"),
            (TaskPriority::Load, "load"),
            (TaskPriority::Visible, "visible"),
        ] {
            let order = order.clone();
            executor.spawn(priority, Box::new(move || order.lock().unwrap().push(name)));
        }

        assert_eq!(executor.pending(), 3);
        assert!(order.lock().unwrap().is_empty());

        assert_eq!(executor.run_pending(), 3);
        assert_eq!(*order.lock().unwrap(), vec!["load", "visible", "prefetch"]);
    }

    #[test]
    fn test_deferred_run_one_and_discard() {
        let executor = DeferredExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            executor.spawn(TaskPriority::Visible, Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert!(executor.run_one());
        assert_eq!(executor.discard_pending(), 2);
        assert!(!executor.run_one());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
