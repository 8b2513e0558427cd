//! Worker pool for background tasks.
//!
//! Workers run on named threads, pulling tasks from a shared priority queue.
//! Tasks are expected to check their [`Stamp`](crate::Stamp) and return early
//! when the result is no longer wanted.

use crate::executor::Executor;
use crate::priority::{Task, TaskPriority, TaskQueue};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: number of logical CPU cores.
    pub num_workers: usize,

    /// Maximum time a worker waits for a task before checking shutdown.
    /// Default: 100ms.
    pub poll_interval: Duration,

    /// Thread name prefix; workers are named `{prefix}-{id}`.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(num_cpus())
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            poll_interval: Duration::from_millis(100),
            thread_name: "pdfview-worker".to_string(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Fixed set of threads executing tasks from a shared [`TaskQueue`].
///
/// Dropping the pool stops the workers after their current task; queued
/// tasks that never started are dropped.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> io::Result<Self> {
        let queue = Arc::new(TaskQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut pool = Self { queue, workers: Vec::with_capacity(config.num_workers), shutdown };

        for id in 0..config.num_workers {
            let worker = Worker::new(
                format!("{}-{}", config.thread_name, id),
                pool.queue.clone(),
                pool.shutdown.clone(),
                config.poll_interval,
            )?;
            pool.workers.push(worker);
        }

        Ok(pool)
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stops all workers and waits for them to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.queue.wake_all();

        for worker in self.workers.drain(..) {
            worker.join();
        }

        let dropped = self.queue.clear();
        if dropped > 0 {
            log::debug!("worker pool stopped with {dropped} queued tasks dropped");
        }
    }
}

impl Executor for WorkerPool {
    fn spawn(&self, priority: TaskPriority, task: Task) {
        if self.is_shutting_down() {
            log::warn!("task submitted to a stopped worker pool was dropped");
            return;
        }
        self.queue.push(priority, task);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
        }
    }
}

struct Worker {
    name: String,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(
        name: String,
        queue: Arc<TaskQueue>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::run(queue, shutdown, poll_interval))?;

        Ok(Self { name, thread: Some(thread) })
    }

    fn run(queue: Arc<TaskQueue>, shutdown: Arc<AtomicBool>, poll_interval: Duration) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            if let Some(queued) = queue.pop_timeout(poll_interval) {
                let priority = queued.priority;
                // A panicking task must not take the worker down with it.
                if panic::catch_unwind(AssertUnwindSafe(queued.task)).is_err() {
                    log::warn!("{priority:?} task panicked on {}", current_name());
                }
            }
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("worker thread {} exited with a panic", self.name);
            }
        }
    }
}

fn current_name() -> String {
    thread::current().name().unwrap_or("worker").to_string()
}

fn num_cpus() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Mutex};

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert!(config.num_workers > 0);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.thread_name, "pdfview-worker");
    }

    #[test]
    fn test_worker_pool_config_builder() {
        let config = WorkerPoolConfig::new(0)
            .with_poll_interval(Duration::from_millis(50))
            .with_thread_name("tiles");
        assert_eq!(config.num_workers, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.thread_name, "tiles");
    }

    #[test]
    fn test_worker_pool_executes_tasks() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(2)).unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            pool.spawn(TaskPriority::Visible, Box::new(move || tx.send(i).unwrap()));
        }

        let mut results: Vec<i32> =
            (0..5).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        results.sort_unstable();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);

        pool.shutdown();
    }

    #[test]
    fn test_worker_pool_priority_ordering() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        // Hold the single worker so the rest queue up behind it.
        pool.spawn(TaskPriority::Load, Box::new(move || {
            gate_rx.recv_timeout(Duration::from_secs(5)).ok();
        }));

        for (priority, page) in
            [(TaskPriority::Prefetch, 3), (TaskPriority::Visible, 1), (TaskPriority::Load, 0)]
        {
            let order = order.clone();
            let done_tx = done_tx.clone();
            pool.spawn(priority, Box::new(move || {
                order.lock().unwrap().push(page);
                done_tx.send(()).unwrap();
            }));
        }

        gate_tx.send(()).unwrap();
        for _ in 0..3 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 3]);
        pool.shutdown();
    }

    #[test]
    fn test_worker_survives_panicking_task() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1)).unwrap();
        let (tx, rx) = mpsc::channel();

        pool.spawn(TaskPriority::Visible, Box::new(|| panic!("boom")));
        pool.spawn(TaskPriority::Prefetch, Box::new(move || tx.send(()).unwrap()));

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        pool.shutdown();
    }

    #[test]
    fn test_worker_threads_are_named() {
        let pool =
            WorkerPool::new(WorkerPoolConfig::new(1).with_thread_name("pdfview-test")).unwrap();
        let (tx, rx) = mpsc::channel();

        pool.spawn(TaskPriority::Visible, Box::new(move || tx.send(current_name()).unwrap()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "pdfview-test-0");
    }

    #[test]
    fn test_drop_stops_workers() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(WorkerPoolConfig::new(2)).unwrap();
            assert_eq!(pool.num_workers(), 2);
            assert!(!pool.is_shutting_down());
            let counter = counter.clone();
            pool.spawn(TaskPriority::Visible, Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        // Shutdown is successful if the drop above completes without hanging.
        assert!(counter.load(Ordering::SeqCst) <= 1);
    }
}
