//! Task Worker
//!
//! Background task that recycles a cache as a recency-ordered work queue.
//!
//! Tasks are queued at the front of an [`LruCache`]. The worker repeatedly
//! peeks at the front task, runs it if it has not run yet, and demotes it to
//! the back. A task whose key has not been re-added within the staleness
//! window is dropped instead. When the queue outgrows its capacity, the
//! least recently queued tasks are evicted.
//!
//! Jobs run on tokio's blocking pool, so a slow job does not stall the
//! runtime and a panicking job is logged without stopping the worker.

use std::any::Any;
use std::panic;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::LruCache;
use crate::config::CacheConfig;

type Job = Box<dyn FnOnce() + Send>;

// == Task ==
/// A queued job that runs at most once.
pub struct Task {
    job: Mutex<Option<Job>>,
}

impl Task {
    pub fn new(job: impl FnOnce() + Send + 'static) -> Self {
        Self {
            job: Mutex::new(Some(Box::new(job))),
        }
    }

    pub fn is_done(&self) -> bool {
        self.job.lock().is_none()
    }

    /// Runs the job if it has not run yet. Returns `true` if it ran now.
    pub fn run(&self) -> bool {
        let mut job = self.job.lock();
        match job.take() {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("done", &self.is_done()).finish()
    }
}

// == Task Worker ==
/// Runs queued tasks on a tokio task.
#[derive(Debug)]
pub struct TaskWorker {
    tasks: Arc<LruCache<Task>>,
    stale_after: Duration,
    idle: Duration,
    handle: Option<JoinHandle<()>>,
}

impl TaskWorker {
    // == Constructor ==
    /// Creates a stopped worker queueing at most `queue_size` tasks.
    ///
    /// # Arguments
    /// * `queue_size` - Maximum number of queued tasks
    /// * `stale_after` - Age after which an untouched task is dropped
    /// * `idle` - Sleep between polls when there is nothing to run
    pub fn new(queue_size: usize, stale_after: Duration, idle: Duration) -> Self {
        Self {
            tasks: Arc::new(LruCache::new(queue_size)),
            stale_after,
            idle,
            handle: None,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.task_queue_size,
            config.task_stale_after(),
            config.worker_idle(),
        )
    }

    // == Add Task ==
    /// Queues `job` under `key`.
    ///
    /// If a task with this key is already queued, it is refreshed (promoted
    /// and its age reset) and `job` is discarded. Returns `true` if `job`
    /// was queued.
    ///
    /// # Panics
    /// Panics if `key` is empty.
    pub fn add_task(&self, key: &str, job: impl FnOnce() + Send + 'static) -> bool {
        if let Some(mut existing) = self.tasks.lookup(key) {
            existing.release();
            return false;
        }
        self.tasks.push_front(key, Task::new(job), 1, None);
        true
    }

    /// Number of queued tasks, finished ones included.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    // == Start ==
    /// Spawns the worker loop on the current tokio runtime.
    ///
    /// # Panics
    /// Panics if the worker is already running or if called outside a
    /// tokio runtime.
    pub fn start(&mut self) {
        assert!(self.handle.is_none(), "task worker already started");

        let tasks = self.tasks.clone();
        let stale_after = self.stale_after;
        let idle = self.idle;

        self.handle = Some(tokio::spawn(async move {
            info!(
                "Starting task worker with staleness of {:?} and idle sleep of {:?}",
                stale_after, idle
            );

            loop {
                let queue = tasks.clone();
                let polled =
                    tokio::task::spawn_blocking(move || poll_once(&queue, stale_after)).await;
                match polled {
                    Ok(true) => tokio::task::yield_now().await,
                    Ok(false) => tokio::time::sleep(idle).await,
                    Err(err) if err.is_panic() => {
                        let payload = err.into_panic();
                        error!(panic = panic_message(&*payload), "task panicked");
                    }
                    Err(err) => {
                        debug!(error = %err, "task poll cancelled");
                        break;
                    }
                }
            }
        }));
    }

    // == Stop ==
    /// Stops the worker loop and waits for it to finish. Queued tasks stay
    /// queued.
    ///
    /// # Panics
    /// Panics if the worker is not running.
    pub async fn stop(&mut self) {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => panic!("task worker is not running"),
        };
        handle.abort();
        match handle.await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => {}
            Err(err) => {
                warn!(error = %err, "task worker loop failed");
                if err.is_panic() {
                    panic::resume_unwind(err.into_panic());
                }
            }
        }
        info!("Task worker stopped");
    }
}

impl Drop for TaskWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handles the front task. Returns `true` if a job ran.
///
/// A job that panics is already marked done, so the next poll demotes it.
fn poll_once(tasks: &LruCache<Task>, stale_after: Duration) -> bool {
    let Some(mut front) = tasks.front() else {
        return false;
    };

    let age = (Utc::now() - front.time_accessed())
        .to_std()
        .unwrap_or_default();

    let ran = if age < stale_after {
        let ran = front.value().run();
        tasks.move_to_back(front.key());
        ran
    } else {
        debug!(key = front.key(), ?age, "dropping stale task");
        tasks.erase(front.key());
        false
    };

    front.release();
    ran
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_job(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_task_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = Task::new(counter_job(&counter));

        assert!(!task.is_done());
        assert!(task.run());
        assert!(!task.run());
        assert!(task.is_done());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_add_task_deduplicates() {
        let worker = TaskWorker::new(8, Duration::from_secs(30), Duration::from_millis(10));
        let counter = Arc::new(AtomicUsize::new(0));

        assert!(worker.add_task("a", counter_job(&counter)));
        assert!(!worker.add_task("a", counter_job(&counter)));
        assert!(worker.add_task("b", counter_job(&counter)));
        assert_eq!(worker.pending(), 2);
    }

    #[test]
    fn test_queue_size_evicts_oldest() {
        let worker = TaskWorker::new(2, Duration::from_secs(30), Duration::from_millis(10));
        worker.add_task("a", || {});
        worker.add_task("b", || {});
        worker.add_task("c", || {});

        assert_eq!(worker.tasks.keys(), ["c", "b"]);
    }

    #[test]
    fn test_poll_once_runs_and_demotes() {
        let tasks = LruCache::new(8);
        let counter = Arc::new(AtomicUsize::new(0));
        tasks.push_front("a", Task::new(counter_job(&counter)), 1, None);
        tasks.push_front("b", Task::new(counter_job(&counter)), 1, None);

        assert!(poll_once(&tasks, Duration::from_secs(30)));
        assert_eq!(tasks.keys(), ["a", "b"]);
        assert!(poll_once(&tasks, Duration::from_secs(30)));
        assert!(!poll_once(&tasks, Duration::from_secs(30)));

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn test_poll_once_drops_stale() {
        let tasks = LruCache::new(8);
        let counter = Arc::new(AtomicUsize::new(0));
        tasks.push_front("a", Task::new(counter_job(&counter)), 1, None);

        std::thread::sleep(Duration::from_millis(5));
        assert!(!poll_once(&tasks, Duration::from_millis(1)));

        assert!(tasks.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!poll_once(&tasks, Duration::from_millis(1)));
    }

    #[tokio::test]
    async fn test_worker_runs_tasks() {
        let mut worker = TaskWorker::new(8, Duration::from_secs(30), Duration::from_millis(5));
        let counter = Arc::new(AtomicUsize::new(0));
        worker.add_task("a", counter_job(&counter));
        worker.add_task("b", counter_job(&counter));

        worker.start();
        assert!(worker.is_running());
        tokio::time::sleep(Duration::from_millis(200)).await;
        worker.stop().await;

        assert!(!worker.is_running());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_worker_drops_stale_tasks() {
        let mut worker = TaskWorker::new(8, Duration::from_millis(50), Duration::from_millis(5));
        let counter = Arc::new(AtomicUsize::new(0));
        worker.add_task("a", counter_job(&counter));

        worker.start();
        tokio::time::sleep(Duration::from_millis(400)).await;
        worker.stop().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(worker.pending(), 0);
    }

    #[tokio::test]
    async fn test_worker_survives_panicking_job() {
        let mut worker = TaskWorker::new(8, Duration::from_secs(30), Duration::from_millis(5));
        let counter = Arc::new(AtomicUsize::new(0));
        worker.add_task("boom", || panic!("job failed"));

        worker.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.add_task("later", counter_job(&counter));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(worker.is_running());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        worker.stop().await;
        assert_eq!(worker.pending(), 2);
    }

    #[tokio::test]
    async fn test_slow_job_does_not_block_runtime() {
        let mut worker = TaskWorker::new(8, Duration::from_secs(30), Duration::from_millis(5));
        worker.add_task("slow", || std::thread::sleep(Duration::from_millis(500)));

        worker.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Single-threaded runtime: this only wakes on time if the job is
        // off the runtime thread.
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(started.elapsed() < Duration::from_millis(300));

        worker.stop().await;
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }

    #[tokio::test]
    #[should_panic(expected = "not running")]
    async fn test_stop_without_start_panics() {
        let mut worker = TaskWorker::new(1, Duration::from_secs(1), Duration::from_millis(1));
        worker.stop().await;
    }
}
