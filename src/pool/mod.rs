//! Fixed-size-but-growable pool of worker threads with per-worker
//! priority-ordered queues and peer work stealing.

mod worker;

use std::sync::{Arc, OnceLock};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, instrument};

use crate::error::{Error, PoolError};
use crate::task::{self, CancellationToken, FunctionTask, PoolTask, TaskHandle};
use worker::{QueuedTask, WorkerState, WorkerThread};

/// Configuration accepted by [`ThreadPool::with_config`].
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads to start with. `reserve` may grow this
    /// later; the pool never shrinks.
    pub initial_workers: usize,
    /// Name prefix for worker threads; each gets `"{prefix}-{id}"`.
    pub thread_name: String,
    /// Stack size for worker threads in bytes. `None` uses the platform
    /// default.
    pub stack_size: Option<usize>,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            initial_workers: 1,
            thread_name: "loomcore-worker".to_string(),
            stack_size: None,
        }
    }
}

struct Inner {
    workers: Mutex<Vec<WorkerThread>>,
    wait_lock: Mutex<bool>,
    wait_condvar: Condvar,
    thread_name: String,
    stack_size: Option<usize>,
}

impl Inner {
    /// Scan workers in creation order, skipping `skip_id`, and transfer the
    /// front entry of the first non-empty queue found onto `into`.
    fn steal_work(&self, skip_id: usize, into: &WorkerState) -> bool {
        let workers = self.workers.lock();
        for worker in workers.iter() {
            if worker.state.id == skip_id {
                continue;
            }
            if let Some(task) = worker.state.pop_front() {
                into.add(task);
                return true;
            }
        }
        false
    }

    /// Recompute the "all workers idle" flag and wake anyone in `wait()`.
    fn update_idle(&self) {
        let workers = self.workers.lock();
        let all_idle = workers.iter().all(|w| w.state.idle());
        drop(workers);
        *self.wait_lock.lock() = all_idle;
        self.wait_condvar.notify_all();
    }
}

/// A fixed-width (growable, never-shrinking) pool of worker threads, each
/// owning a priority-ordered local queue and able to steal from its peers
/// when idle.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<Inner>,
}

static GLOBAL: OnceLock<ThreadPool> = OnceLock::new();

impl ThreadPool {
    /// Create an empty pool with no workers; call [`ThreadPool::reserve`]
    /// before submitting work.
    pub fn new() -> Self {
        Self::with_config(ThreadPoolConfig {
            initial_workers: 0,
            ..ThreadPoolConfig::default()
        })
    }

    /// Create a pool and immediately reserve `config.initial_workers`
    /// worker threads.
    pub fn with_config(config: ThreadPoolConfig) -> Self {
        let pool = Self {
            inner: Arc::new(Inner {
                workers: Mutex::new(Vec::new()),
                wait_lock: Mutex::new(true),
                wait_condvar: Condvar::new(),
                thread_name: config.thread_name,
                stack_size: config.stack_size,
            }),
        };
        pool.reserve(config.initial_workers);
        pool
    }

    /// A process-wide default pool, lazily created with one worker per CPU
    /// on first access.
    pub fn global() -> &'static ThreadPool {
        GLOBAL.get_or_init(|| {
            ThreadPool::with_config(ThreadPoolConfig {
                initial_workers: std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
                ..ThreadPoolConfig::default()
            })
        })
    }

    /// Grow the worker count to `n`. A no-op if the pool already has at
    /// least `n` workers; never removes existing workers.
    pub fn reserve(&self, n: usize) {
        let mut workers = self.inner.workers.lock();
        while workers.len() < n {
            let id = workers.len();
            let inner = self.inner.clone();
            let steal = move |state: &WorkerState| inner.steal_work(state.id, state);
            let inner_transition = self.inner.clone();
            let on_transition = move |_id: usize, _active: bool| inner_transition.update_idle();
            workers.push(WorkerThread::spawn(
                id,
                &self.inner.thread_name,
                self.inner.stack_size,
                steal,
                on_transition,
            ));
        }
    }

    fn worker_count(&self) -> usize {
        self.inner.workers.lock().len()
    }

    /// Submit a boxed task at the given priority. Selects the first idle
    /// worker; if none are idle, places onto worker 0.
    #[instrument(target = "loomcore::pool", name = "pool_run", skip(self, task))]
    pub fn start<Tk>(&self, task: Tk, priority: i32) -> Result<TaskHandle<Tk::Output>, Error>
    where
        Tk: PoolTask + 'static,
    {
        let workers = self.inner.workers.lock();
        if workers.is_empty() {
            return Err(Error::Pool(PoolError::NoThreads));
        }
        let target = workers
            .iter()
            .find(|w| !w.state.active())
            .unwrap_or(&workers[0]);

        let (handle, completion, cancellation) = task::channel();
        let queued = QueuedTask::new(Box::new(task), priority, completion, cancellation);
        debug!(target: "loomcore::pool", worker = target.state.id, priority, "dispatching task");
        target.state.add(queued);
        Ok(handle)
    }

    /// Like [`ThreadPool::start`], but returns `Ok(None)` without enqueuing
    /// if no worker is currently idle.
    pub fn try_start<Tk>(
        &self,
        task: Tk,
        priority: i32,
    ) -> Result<Option<TaskHandle<Tk::Output>>, Error>
    where
        Tk: PoolTask + 'static,
    {
        let workers = self.inner.workers.lock();
        if workers.is_empty() {
            return Err(Error::Pool(PoolError::NoThreads));
        }
        let Some(target) = workers.iter().find(|w| !w.state.active()) else {
            return Ok(None);
        };

        let (handle, completion, cancellation) = task::channel();
        let queued = QueuedTask::new(Box::new(task), priority, completion, cancellation);
        target.state.add(queued);
        Ok(Some(handle))
    }

    /// Wrap a plain closure as a [`crate::task::FunctionTask`] and submit
    /// it via [`ThreadPool::start`].
    pub fn run<F, T>(&self, priority: i32, func: F) -> Result<TaskHandle<T>, Error>
    where
        F: FnOnce(crate::task::YieldMode, &CancellationToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.start(FunctionTask::new(func), priority)
    }

    /// Block the calling thread until the pool is either stopped or every
    /// worker is simultaneously idle. Must not be called from a worker
    /// thread owned by this pool (it would deadlock).
    pub fn wait(&self) {
        let mut idle = self.inner.wait_lock.lock();
        while !*idle {
            self.inner.wait_condvar.wait(&mut idle);
        }
    }

    /// Signal every worker to stop and join its thread. Idempotent: calling
    /// twice is safe since stopping an already-stopped worker is a no-op.
    pub fn stop(&self) {
        let mut workers = self.inner.workers.lock();
        for worker in workers.iter_mut() {
            worker.stop_and_join();
        }
        drop(workers);
        *self.inner.wait_lock.lock() = true;
        self.inner.wait_condvar.notify_all();
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

// Ensure ThreadPool is Send + Sync
static_assertions::assert_impl_all!(ThreadPool: Send, Sync);
