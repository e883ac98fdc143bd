//! A single worker thread: a priority-ordered local queue plus the
//! currently active task.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::task::{PoolTask, TaskCompletion, YieldMode, run_catching};

/// A task boxed up with its priority and the plumbing needed to publish its
/// result once it runs.
pub(crate) struct QueuedTask {
    pub(crate) priority: i32,
    run: Box<dyn FnOnce(YieldMode) + Send>,
}

impl QueuedTask {
    pub(crate) fn new<Tk>(
        task: Box<Tk>,
        priority: i32,
        completion: TaskCompletion<Tk::Output>,
        cancellation: crate::task::CancellationToken,
    ) -> Self
    where
        Tk: PoolTask + ?Sized + 'static,
    {
        let run = Box::new(move |yield_mode: YieldMode| {
            let outcome = run_catching(task, yield_mode, &cancellation);
            completion.complete(outcome);
        });
        Self { priority, run }
    }
}

/// Per-worker state shared between the owning thread and the pool's
/// topology operations (`add`, `steal_work`). Protected by the pool lock;
/// the worker's own condvar guards only the idle/wake transition.
pub(crate) struct WorkerState {
    pub(crate) id: usize,
    queue: Mutex<Vec<QueuedTask>>,
    active: Mutex<bool>,
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl WorkerState {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            queue: Mutex::new(Vec::new()),
            active: Mutex::new(false),
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Insert preserving non-increasing priority order, stable for ties.
    /// If nothing is active, promotes immediately and wakes the thread.
    pub(crate) fn add(&self, task: QueuedTask) {
        let mut queue = self.queue.lock();
        let pos = queue.partition_point(|existing| existing.priority >= task.priority);
        queue.insert(pos, task);
        drop(queue);

        let active = self.active.lock();
        if !*active {
            drop(active);
            self.condvar.notify_all();
        }
    }

    /// Pop the front (highest priority) entry, if any, without touching
    /// `active`. Used both by the worker's own drain and by `steal_work`.
    pub(crate) fn pop_front(&self) -> Option<QueuedTask> {
        let mut queue = self.queue.lock();
        if queue.is_empty() { None } else { Some(queue.remove(0)) }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub(crate) fn active(&self) -> bool {
        *self.active.lock()
    }

    pub(crate) fn idle(&self) -> bool {
        !self.active() && self.is_empty()
    }

    fn set_active(&self, value: bool) {
        *self.active.lock() = value;
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    pub(crate) fn stop(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }

    /// Block until either a task is ready to run or the worker is stopped.
    fn wait_for_work(&self) {
        let mut active = self.active.lock();
        while !*active && self.is_empty() && !self.is_stopped() {
            self.condvar.wait(&mut active);
        }
    }
}

/// Runs on the dedicated worker thread: the Idle/Promoting/Running/Releasing
/// state machine from the worker's perspective. `steal` asks the pool (under
/// its topology lock) to pull one entry from a sibling worker.
pub(crate) fn worker_loop(
    state: Arc<WorkerState>,
    steal: impl Fn(&WorkerState) -> bool,
    on_transition: impl Fn(usize, bool),
) {
    loop {
        if state.is_stopped() {
            return;
        }

        let mut task = state.pop_front();
        if task.is_none() && steal(&state) {
            task = state.pop_front();
        }

        let Some(task) = task else {
            on_transition(state.id, false);
            state.wait_for_work();
            if state.is_stopped() {
                return;
            }
            continue;
        };

        state.set_active(true);
        on_transition(state.id, true);
        trace!(target: "loomcore::worker", worker = state.id, "running task");
        (task.run)(YieldMode::NoYield);
        state.set_active(false);
    }
}

/// Owns the OS thread backing a worker's loop. Dropped by `ThreadPool::stop`
/// after signalling every worker to stop.
pub(crate) struct WorkerThread {
    pub(crate) state: Arc<WorkerState>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    pub(crate) fn spawn(
        id: usize,
        thread_name: &str,
        stack_size: Option<usize>,
        steal: impl Fn(&WorkerState) -> bool + Send + 'static,
        on_transition: impl Fn(usize, bool) + Send + 'static,
    ) -> Self {
        let state = Arc::new(WorkerState::new(id));
        let loop_state = state.clone();
        let mut builder = thread::Builder::new().name(format!("{thread_name}-{id}"));
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        let handle = builder
            .spawn(move || worker_loop(loop_state, steal, on_transition))
            .expect("failed to spawn worker thread");
        Self {
            state,
            handle: Some(handle),
        }
    }

    pub(crate) fn stop_and_join(&mut self) {
        self.state.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_queued(priority: i32) -> QueuedTask {
        QueuedTask {
            priority,
            run: Box::new(|_| {}),
        }
    }

    #[test]
    fn add_preserves_non_increasing_priority_order() {
        let state = WorkerState::new(0);
        state.add(dummy_queued(5));
        state.add(dummy_queued(10));
        state.add(dummy_queued(7));
        let first = state.pop_front().unwrap();
        assert_eq!(first.priority, 10);
        let second = state.pop_front().unwrap();
        assert_eq!(second.priority, 7);
        let third = state.pop_front().unwrap();
        assert_eq!(third.priority, 5);
    }

    #[test]
    fn equal_priority_is_fifo_stable() {
        let state = WorkerState::new(0);
        for i in 0..3 {
            let mut t = dummy_queued(1);
            t.run = {
                let i = i;
                Box::new(move |_| {
                    let _ = i;
                })
            };
            state.add(t);
        }
        // All three share priority 1; pop order must match insertion order.
        assert_eq!(state.pop_front().unwrap().priority, 1);
        assert_eq!(state.pop_front().unwrap().priority, 1);
        assert_eq!(state.pop_front().unwrap().priority, 1);
    }

    #[test]
    fn idle_reports_empty_and_inactive() {
        let state = WorkerState::new(0);
        assert!(state.idle());
        state.add(dummy_queued(1));
        assert!(!state.idle());
    }
}
