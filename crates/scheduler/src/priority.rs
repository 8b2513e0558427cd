//! Priority-ordered task queue.
//!
//! Tasks run highest priority first and in submission order within a priority.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Unit of background work. Results travel back through whatever channel the
/// closure captured.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Task priority levels
///
/// Higher numeric values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    /// Tiles around the viewport that are not yet on screen
    Prefetch = 0,

    /// Tiles currently on screen
    Visible = 1,

    /// Document resolve, open and decrypt
    Load = 2,
}

pub(crate) struct QueuedTask {
    pub(crate) priority: TaskPriority,
    insertion_order: u64,
    pub(crate) task: Task,
}

impl fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("priority", &self.priority)
            .field("insertion_order", &self.insertion_order)
            .finish_non_exhaustive()
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.insertion_order == other.insertion_order
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max heap, so earlier insertions compare greater.
            Ordering::Equal => other.insertion_order.cmp(&self.insertion_order),
            other => other,
        }
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedTask>,
    insertion_counter: u64,
}

/// Thread-safe priority queue shared by executors and their workers.
#[derive(Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, priority: TaskPriority, task: Task) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let insertion_order = state.insertion_counter;
        state.insertion_counter += 1;
        state.heap.push(QueuedTask { priority, insertion_order, task });
        drop(state);

        self.available.notify_one();
    }

    pub(crate) fn pop(&self) -> Option<QueuedTask> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).heap.pop()
    }

    /// Pops the next task, waiting up to `timeout` for one to arrive.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<QueuedTask> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.heap.is_empty() {
            state = self
                .available
                .wait_timeout(state, timeout)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        state.heap.pop()
    }

    pub(crate) fn wake_all(&self) {
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every queued task without running it. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = state.heap.len();
        state.heap.clear();
        dropped
    }
}
