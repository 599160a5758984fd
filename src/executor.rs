//! The external worker pool a dispatched request runs on (spec.md §1
//! "depends on an external executor", §4.7).

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::JoinHandle;

/// A unit of handler work submitted by the dispatcher.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Anything that can run a `Task` off the reactor thread. The engine
/// never schedules work itself beyond this call; a real deployment
/// plugs in a thread pool, a Tokio runtime, or any other executor.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: Task);
}

/// A minimal executor that spawns one OS thread per task. Handy for
/// tests and embedders who want handler concurrency proportional to
/// load rather than a fixed pool.
#[derive(Debug, Default)]
pub struct ThreadPerTaskExecutor;

impl Executor for ThreadPerTaskExecutor {
    fn execute(&self, task: Task) {
        std::thread::spawn(task);
    }
}

/// The engine's default executor: one persistent worker thread
/// draining an mpsc queue (spec.md §6 "if absent, a single-thread
/// executor is created").
pub struct SingleThreadExecutor {
    sender: mpsc::Sender<Task>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SingleThreadExecutor {
    pub fn new() -> SingleThreadExecutor {
        let (sender, receiver) = mpsc::channel::<Task>();
        let worker = std::thread::spawn(move || {
            while let Ok(task) = receiver.recv() {
                task();
            }
        });
        SingleThreadExecutor { sender, worker: Mutex::new(Some(worker)) }
    }
}

impl Default for SingleThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for SingleThreadExecutor {
    fn execute(&self, task: Task) {
        // Dropped silently if the worker has already shut down; a
        // handler submitted past that point simply never runs.
        let _ = self.sender.send(task);
    }
}

impl Drop for SingleThreadExecutor {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn thread_per_task_runs_task() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let exec = ThreadPerTaskExecutor;
        exec.execute(Box::new(move || ran2.store(true, Ordering::SeqCst)));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn single_thread_executor_runs_tasks_in_order() {
        let exec = SingleThreadExecutor::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            exec.execute(Box::new(move || order.lock().unwrap().push(i)));
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
