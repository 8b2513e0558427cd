//! Background work scheduling for the viewer.
//!
//! Work is submitted to an [`Executor`] with a [`TaskPriority`]. Document loads
//! run before visible tiles, which run before prefetch. Results are matched
//! against a [`Generation`] on arrival so that anything issued for a previous
//! source, page or transform is discarded.
//!
//! # Example
//!
//! ```
//! use pdfview_scheduler::{DeferredExecutor, Executor, Generation, TaskPriority};
//! use std::sync::mpsc;
//!
//! let executor = DeferredExecutor::new();
//! let generation = Generation::new();
//! let (tx, rx) = mpsc::channel();
//!
//! let stamp = generation.advance();
//! executor.spawn(TaskPriority::Visible, Box::new(move || {
//!     tx.send((stamp, "tile")).unwrap();
//! }));
//!
//! // The viewport moved before the task ran.
//! generation.advance();
//! executor.run_pending();
//!
//! let (stamp, _) = rx.recv().unwrap();
//! assert!(!stamp.is_current());
//! ```

mod executor;
mod generation;
mod priority;
mod worker;

pub use executor::{DeferredExecutor, Executor, InlineExecutor};
pub use generation::{Generation, Stamp};
pub use priority::{Task, TaskPriority, TaskQueue};
pub use worker::{WorkerPool, WorkerPoolConfig};
