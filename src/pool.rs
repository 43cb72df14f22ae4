//! Worker pool: a fixed set of threads cooperatively draining one bounded
//! FIFO queue guarded by a single mutex and condition variable (spec.md
//! §4.6). Deliberately not a work-stealing pool: this is the exact
//! custom-pool design spec.md describes, not a `rayon::ThreadPool`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// A typed task closure; replaces the teacher-era `void*` callback pattern
/// (spec.md §9, "Callback-based worker pool with raw `void*`").
type Task = Box<dyn FnOnce() -> TaskOutcome + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Ok,
    Failed,
}

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    cond: Condvar,
    shutdown: AtomicBool,
    idle_workers: AtomicUsize,
    num_workers: usize,
    failures: AtomicUsize,
}

/// `init(ctx, num_workers, task_fn)` / `add(task)` / `wait()` from spec.md
/// §4.6. `ctx` in this Rust rendition is whatever the caller's task closures
/// capture; there is no separate context pointer. `wait()` is purely a
/// completion barrier — it does not stop the worker threads, so the pool can
/// be reused for further `add()` calls afterward; only `shutdown` ends them.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.clamp(1, 256);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            idle_workers: AtomicUsize::new(num_workers),
            num_workers,
            failures: AtomicUsize::new(0),
        });

        let mut handles = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let shared = Arc::clone(&shared);
            handles.push(std::thread::spawn(move || worker_loop(shared)));
        }

        Self { shared, handles }
    }

    /// `add(task)`: appends to the queue and signals waiting workers.
    pub fn add<F>(&self, task: F)
    where
        F: FnOnce() -> TaskOutcome + Send + 'static,
    {
        self.shared.queue.lock().unwrap().push_back(Box::new(task));
        self.shared.cond.notify_all();
    }

    /// `wait()`: blocks until the queue is empty and every worker is idle
    /// (spec.md §4.6, "Scheduling model").
    pub fn wait(&self) {
        let guard = self.shared.queue.lock().unwrap();
        let _guard = self
            .shared
            .cond
            .wait_while(guard, |queue| {
                !(self.shared.idle_workers.load(Ordering::SeqCst) == self.shared.num_workers
                    && queue.is_empty())
            })
            .unwrap();
    }

    /// Number of tasks that returned `TaskOutcome::Failed` so far (spec.md
    /// §4.6, "the orchestrator surfaces a non-zero exit status if any task
    /// reported failure").
    pub fn failure_count(&self) -> usize {
        self.shared.failures.load(Ordering::SeqCst)
    }

    /// Waits for all outstanding work, then stops and joins every worker
    /// thread.
    pub fn shutdown(mut self) {
        self.wait();
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.cond.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(task) = queue.pop_front() {
                    shared.idle_workers.fetch_sub(1, Ordering::SeqCst);
                    break Some(task);
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                shared.cond.notify_all();
                queue = shared.cond.wait(queue).unwrap();
            }
        };

        let Some(task) = task else {
            return;
        };

        if task() == TaskOutcome::Failed {
            shared.failures.fetch_add(1, Ordering::SeqCst);
        }

        shared.idle_workers.fetch_add(1, Ordering::SeqCst);
        shared.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as Counter;

    #[test]
    fn runs_every_task_before_wait_returns() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(Counter::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.add(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                TaskOutcome::Ok
            });
        }
        pool.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        pool.shutdown();
    }

    #[test]
    fn wait_can_be_followed_by_more_work() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(Counter::new(0));
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.add(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                TaskOutcome::Ok
            });
        }
        pool.wait();
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.add(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                TaskOutcome::Ok
            });
        }
        pool.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        pool.shutdown();
    }

    #[test]
    fn failure_count_tracks_failed_tasks() {
        let pool = WorkerPool::new(2);
        pool.add(|| TaskOutcome::Ok);
        pool.add(|| TaskOutcome::Failed);
        pool.add(|| TaskOutcome::Failed);
        pool.wait();
        assert_eq!(pool.failure_count(), 2);
        pool.shutdown();
    }

    #[test]
    fn single_worker_serializes_tasks() {
        let pool = WorkerPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let order = Arc::clone(&order);
            pool.add(move || {
                order.lock().unwrap().push(i);
                TaskOutcome::Ok
            });
        }
        pool.wait();
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
        pool.shutdown();
    }
}
