//! The cancellable, awaitable unit of work the thread pool and its callers
//! exchange.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Condvar, Mutex};

use crate::error::{Error, TaskPanic};

/// Controls whether a worker yields to other queued work before running a
/// task's body, or runs it immediately in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldMode {
    /// Run inline, without giving other ready work a chance to run first.
    NoYield,
    /// Give the scheduler a chance to run other ready work first.
    Yield,
}

/// A unit of work a [`crate::pool::ThreadPool`] can execute.
///
/// Implemented by [`FunctionTask`] for plain closures; implement it directly
/// when a task needs to observe cancellation mid-run rather than only at the
/// boundary.
pub trait PoolTask: Send {
    /// The value produced on successful completion.
    type Output: Send + 'static;

    /// Run the task to completion. `cancelled` reflects the handle's
    /// cancellation flag at call time and may be polled for cooperative
    /// early exit; the pool does not interrupt a running task by itself.
    fn run(self: Box<Self>, yield_mode: YieldMode, cancelled: &CancellationToken) -> Self::Output;
}

/// A shared, cloneable flag a task may poll to cooperatively stop early.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; does not interrupt a running task.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Adapts a plain `FnOnce` closure into a [`PoolTask`].
pub struct FunctionTask<F> {
    func: F,
}

impl<F, T> FunctionTask<F>
where
    F: FnOnce(YieldMode, &CancellationToken) -> T + Send,
    T: Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, T> PoolTask for FunctionTask<F>
where
    F: FnOnce(YieldMode, &CancellationToken) -> T + Send,
    T: Send + 'static,
{
    type Output = T;

    fn run(self: Box<Self>, yield_mode: YieldMode, cancelled: &CancellationToken) -> T {
        (self.func)(yield_mode, cancelled)
    }
}

/// Wakes exactly one waiter on a [`TaskHandle`], avoiding the lost-wakeup
/// race between "check done flag" and "go to sleep".
#[derive(Debug, Default)]
struct TaskWakeup {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl TaskWakeup {
    fn signal(&self) {
        *self.done.lock() = true;
        self.condvar.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.condvar.wait(&mut done);
        }
    }
}

/// The outcome of a completed task.
pub enum TaskOutcome<T> {
    /// The task ran to completion.
    Ok(T),
    /// The task's body panicked.
    Panicked(TaskPanic),
    /// The task was cancelled before it started running.
    Cancelled,
}

impl<T> TaskOutcome<T> {
    /// Convert into a `Result`, mapping panics and cancellation to errors.
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Panicked(panic) => Err(Error::TaskFailed(panic)),
            Self::Cancelled => Err(Error::TaskFailed(TaskPanic(Box::new("task cancelled")))),
        }
    }
}

/// A handle to a task submitted to the pool: lets a caller wait for
/// completion and request cancellation.
pub struct TaskHandle<T> {
    cancellation: CancellationToken,
    wakeup: Arc<TaskWakeup>,
    result_rx: Receiver<TaskOutcome<T>>,
}

impl<T> TaskHandle<T> {
    /// Request cancellation. Has no effect once the task has already started
    /// running unless the task itself observes the token.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Block the calling thread until the task completes, then return its
    /// outcome. May be called at most once: subsequent calls will block
    /// forever once the single-slot result channel has been drained.
    pub fn join(self) -> TaskOutcome<T> {
        self.wakeup.wait();
        self.result_rx
            .recv()
            .unwrap_or_else(|_| TaskOutcome::Cancelled)
    }

    /// Non-blocking poll: `Some` once the task has completed.
    pub fn try_join(&self) -> Option<TaskOutcome<T>> {
        self.result_rx.try_recv().ok()
    }
}

/// The producer side used internally by a worker to publish a task's result
/// and wake any waiting [`TaskHandle`].
pub(crate) struct TaskCompletion<T> {
    wakeup: Arc<TaskWakeup>,
    result_tx: Sender<TaskOutcome<T>>,
}

impl<T> TaskCompletion<T> {
    pub(crate) fn complete(self, outcome: TaskOutcome<T>) {
        let _ = self.result_tx.send(outcome);
        self.wakeup.signal();
    }
}

/// Creates a linked [`TaskHandle`]/[`TaskCompletion`] pair and the
/// [`CancellationToken`] shared between them.
pub(crate) fn channel<T>() -> (TaskHandle<T>, TaskCompletion<T>, CancellationToken) {
    let cancellation = CancellationToken::new();
    let wakeup = Arc::new(TaskWakeup::default());
    let (result_tx, result_rx) = bounded(1);
    (
        TaskHandle {
            cancellation: cancellation.clone(),
            wakeup: wakeup.clone(),
            result_rx,
        },
        TaskCompletion { wakeup, result_tx },
        cancellation,
    )
}

/// Runs a task's body with `catch_unwind`, translating a panic into
/// [`TaskOutcome::Panicked`] instead of propagating it onto the worker
/// thread.
pub(crate) fn run_catching<Tk>(
    task: Box<Tk>,
    yield_mode: YieldMode,
    cancelled: &CancellationToken,
) -> TaskOutcome<Tk::Output>
where
    Tk: PoolTask + ?Sized,
{
    if cancelled.is_cancelled() {
        return TaskOutcome::Cancelled;
    }
    match panic::catch_unwind(AssertUnwindSafe(|| task.run(yield_mode, cancelled))) {
        Ok(value) => TaskOutcome::Ok(value),
        Err(payload) => TaskOutcome::Panicked(TaskPanic(payload)),
    }
}

// Ensure CancellationToken and TaskHandle are Send + Sync
static_assertions::assert_impl_all!(CancellationToken: Send, Sync, Clone);
static_assertions::assert_impl_all!(TaskHandle<i32>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handle_joins_successful_task() {
        let (handle, completion, _cancel) = channel::<i32>();
        thread::spawn(move || {
            completion.complete(TaskOutcome::Ok(42));
        });
        match handle.join() {
            TaskOutcome::Ok(v) => assert_eq!(v, 42),
            _ => panic!("expected Ok"),
        }
    }

    #[test]
    fn cancel_before_run_short_circuits() {
        let task = Box::new(FunctionTask::new(|_yield, _cancel| 1_u32));
        let cancelled = CancellationToken::new();
        cancelled.cancel();
        match run_catching(task, YieldMode::NoYield, &cancelled) {
            TaskOutcome::Cancelled => {}
            _ => panic!("expected Cancelled"),
        }
    }

    #[test]
    fn panic_is_captured_not_propagated() {
        let task = Box::new(FunctionTask::new(|_yield, _cancel| -> u32 {
            panic!("boom")
        }));
        let cancelled = CancellationToken::new();
        match run_catching(task, YieldMode::NoYield, &cancelled) {
            TaskOutcome::Panicked(p) => assert_eq!(p.message(), "boom"),
            _ => panic!("expected Panicked"),
        }
    }

    #[test]
    fn function_task_runs_closure() {
        let task = Box::new(FunctionTask::new(|_yield, _cancel| 7_i32));
        let cancelled = CancellationToken::new();
        match run_catching(task, YieldMode::Yield, &cancelled) {
            TaskOutcome::Ok(v) => assert_eq!(v, 7),
            _ => panic!("expected Ok"),
        }
    }
}
