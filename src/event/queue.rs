//! Per-thread asynchronous event delivery queue.
//!
//! Every thread that subscribes to or triggers an [`crate::event::Event`]
//! lazily gets exactly one of these. Cross-thread delivery posts a callback
//! onto the *subscriber's* queue; the subscriber's own main loop drains it
//! by calling [`AsyncEventQueue::exec`].

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::cookie::Cookie;
use crate::lifetime::{DestroyedFlag, Lifetime};

/// Identifies a specific [`crate::event::Event`] instance, independent of
/// its `Args` type, for filter lookup and cross-thread dedup/unqueue.
pub type EventId = usize;

/// Groups the cross-thread deliveries produced by a single trigger so they
/// drain contiguously on the receiving queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction(u64);

struct Entry {
    transaction: Transaction,
    event_id: EventId,
    /// `Some(cookie)` when the handler is stateless, enabling latest-wins
    /// coalescing with an immediately preceding entry for the same handler.
    stateless_cookie: Option<Cookie>,
    destroyed: DestroyedFlag,
    callback: Box<dyn FnOnce() + Send>,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<Entry>,
    terminated: bool,
    next_transaction: u64,
    filters: HashMap<EventId, Vec<Arc<dyn Fn() -> bool + Send + Sync>>>,
}

struct AsyncEventQueueInner {
    state: RefCell<QueueState>,
}

// Every access to `state` happens with the crate's single global event
// lock held (see crate::event::event_lock), which serializes all callers
// regardless of which thread reaches in to post a cross-thread delivery.
unsafe impl Sync for AsyncEventQueueInner {}

/// Configuration for a thread's async event queue.
#[derive(Debug, Clone, Copy)]
pub struct EventQueueConfig {
    /// Entry storage reserved up front.
    pub initial_capacity: usize,
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self { initial_capacity: 16 }
    }
}

/// A cheap, cloneable handle to a thread's async event queue.
#[derive(Clone)]
pub struct AsyncEventQueue {
    inner: Arc<AsyncEventQueueInner>,
    destroyed: DestroyedFlag,
}

struct ThreadQueueCell {
    // Held only so that dropping it at thread exit marks `destroyed`;
    // queue handles clone `inner`/`destroyed` out independently.
    _lifetime: Lifetime,
    queue: AsyncEventQueue,
}

thread_local! {
    static CURRENT: RefCell<Option<ThreadQueueCell>> = const { RefCell::new(None) };
}

impl AsyncEventQueue {
    /// The calling thread's queue, lazily created on first use on that
    /// thread with default capacity.
    pub fn current() -> AsyncEventQueue {
        Self::current_with_config(EventQueueConfig::default())
    }

    /// Like [`AsyncEventQueue::current`], but controls initial capacity if
    /// this is the call that creates the queue (ignored otherwise).
    pub fn current_with_config(config: EventQueueConfig) -> AsyncEventQueue {
        CURRENT.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                let lifetime = Lifetime::new();
                let destroyed = lifetime.watch();
                let inner = Arc::new(AsyncEventQueueInner {
                    state: RefCell::new(QueueState {
                        entries: VecDeque::with_capacity(config.initial_capacity),
                        ..Default::default()
                    }),
                });
                let queue = AsyncEventQueue { inner, destroyed };
                *slot = Some(ThreadQueueCell {
                    _lifetime: lifetime,
                    queue: queue.clone(),
                });
            }
            slot.as_ref().unwrap().queue.clone()
        })
    }

    /// A stable identity for this queue, used by handlers to decide whether
    /// a target queue is "the emitter's current queue".
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Whether this queue's owning thread has exited (or called
    /// [`AsyncEventQueue::terminate`]).
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.is_destroyed()
    }

    pub(crate) fn destroyed_flag(&self) -> DestroyedFlag {
        self.destroyed.clone()
    }

    /// Append an entry, reusing `prior_transaction` if the tail of the
    /// queue already carries it, otherwise allocating a fresh one. If
    /// `stateless_cookie` is set and the tail entry shares the same
    /// `(event_id, cookie)`, the two are coalesced and only the new
    /// callback survives (latest-wins).
    pub(crate) fn enqueue(
        &self,
        event_id: EventId,
        stateless_cookie: Option<Cookie>,
        destroyed: DestroyedFlag,
        prior_transaction: Option<Transaction>,
        callback: Box<dyn FnOnce() + Send>,
    ) -> Transaction {
        let mut state = self.inner.state.borrow_mut();
        if state.terminated {
            return prior_transaction.unwrap_or(Transaction(0));
        }

        if let Some(cookie) = stateless_cookie {
            if let Some(back) = state.entries.back_mut() {
                if back.event_id == event_id && back.stateless_cookie == Some(cookie) {
                    back.callback = callback;
                    return back.transaction;
                }
            }
        }

        let reuse = prior_transaction
            .filter(|t| state.entries.back().map(|e| e.transaction) == Some(*t));
        let transaction = match reuse {
            Some(t) => t,
            None => {
                state.next_transaction += 1;
                Transaction(state.next_transaction)
            }
        };
        state.entries.push_back(Entry {
            transaction,
            event_id,
            stateless_cookie,
            destroyed,
            callback,
        });
        transaction
    }

    /// Drop every pending entry referencing `event_id`. Used by the
    /// `*DontQueue` trigger variants and on event destruction.
    pub(crate) fn unqueue(&self, event_id: EventId) {
        let _guard = crate::event::event_lock().lock();
        self.inner
            .state
            .borrow_mut()
            .entries
            .retain(|e| e.event_id != event_id);
    }

    /// Drain the queue FIFO, returning whether any entry was processed.
    ///
    /// Supports re-entrancy: a dispatched callback may itself call `exec`
    /// (directly, or by triggering an event that delivers back onto this
    /// same queue). Each call takes its own local snapshot of
    /// `state.entries` before draining, so a nested call only ever sees
    /// entries posted after the outer call began draining; once the nested
    /// call returns, the outer call resumes popping its own snapshot. The
    /// Rust call stack itself plays the role of the publish-cache stack.
    pub fn exec(&self) -> bool {
        let mut guard = crate::event::event_lock().lock();
        let mut snapshot = std::mem::take(&mut self.inner.state.borrow_mut().entries);
        let mut did_work = false;
        while let Some(entry) = snapshot.pop_front() {
            did_work = true;
            if !entry.destroyed.is_destroyed() {
                // Released around the callback, same as `Event::sync_trigger`'s
                // inline dispatch, so an unrelated thread isn't blocked on the
                // global event lock for the duration of arbitrary user code.
                drop(guard);
                (entry.callback)();
                guard = crate::event::event_lock().lock();
            }
        }
        did_work
    }

    /// Mark the queue dead: further `enqueue` calls are rejected and
    /// `exec` becomes a no-op.
    pub fn terminate(&self) {
        let _guard = crate::event::event_lock().lock();
        self.inner.state.borrow_mut().terminated = true;
    }

    pub(crate) fn register_filter(
        &self,
        event_id: EventId,
        filter: Arc<dyn Fn() -> bool + Send + Sync>,
    ) {
        self.inner
            .state
            .borrow_mut()
            .filters
            .entry(event_id)
            .or_default()
            .push(filter);
    }

    /// Run every registered filter for `event_id` in registration order.
    /// Returns `true` as soon as one reports acceptance.
    pub(crate) fn run_filters(&self, event_id: EventId) -> bool {
        let filters = {
            let state = self.inner.state.borrow();
            state.filters.get(&event_id).cloned()
        };
        let Some(filters) = filters else {
            return false;
        };
        filters.iter().any(|filter| filter())
    }
}

// Ensure AsyncEventQueue is Send + Sync
static_assertions::assert_impl_all!(AsyncEventQueue: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    // Each test runs on its own freshly spawned OS thread so the per-thread
    // `CURRENT` queue starts empty; the test harness otherwise reuses
    // worker threads across tests and would leak state (e.g. a prior
    // `terminate()`) between them.
    fn on_fresh_thread<F: FnOnce() + Send + 'static>(f: F) {
        thread::spawn(f).join().unwrap();
    }

    #[test]
    fn exec_drains_fifo() {
        on_fresh_thread(|| {
            let queue = AsyncEventQueue::current();
            let order = Arc::new(Mutex::new(Vec::new()));
            for i in 0..3 {
                let order = order.clone();
                queue.enqueue(1, None, DestroyedFlag::never(), None, Box::new(move || {
                    order.lock().push(i);
                }));
            }
            assert!(queue.exec());
            assert_eq!(*order.lock(), vec![0, 1, 2]);
            assert!(!queue.exec());
        });
    }

    #[test]
    fn stateless_entries_coalesce_to_latest() {
        on_fresh_thread(|| {
            let queue = AsyncEventQueue::current();
            let seen = Arc::new(AtomicUsize::new(0));
            let cookie = Cookie::default();
            for i in 0..5 {
                let seen = seen.clone();
                queue.enqueue(
                    2,
                    Some(cookie),
                    DestroyedFlag::never(),
                    None,
                    Box::new(move || {
                        seen.store(i, Ordering::SeqCst);
                    }),
                );
            }
            let runs = queue.inner.state.borrow().entries.len();
            assert_eq!(runs, 1);
            queue.exec();
            assert_eq!(seen.load(Ordering::SeqCst), 4);
        });
    }

    #[test]
    fn unqueue_drops_only_matching_event() {
        on_fresh_thread(|| {
            let queue = AsyncEventQueue::current();
            queue.enqueue(1, None, DestroyedFlag::never(), None, Box::new(|| {}));
            queue.enqueue(2, None, DestroyedFlag::never(), None, Box::new(|| {}));
            queue.unqueue(1);
            assert_eq!(queue.inner.state.borrow().entries.len(), 1);
            assert_eq!(queue.inner.state.borrow().entries[0].event_id, 2);
        });
    }

    #[test]
    fn terminate_rejects_further_drains() {
        on_fresh_thread(|| {
            let queue = AsyncEventQueue::current();
            queue.terminate();
            queue.enqueue(1, None, DestroyedFlag::never(), None, Box::new(|| {}));
            assert!(!queue.exec());
        });
    }

    #[test]
    fn reentrant_exec_drains_inner_before_outer_resumes() {
        on_fresh_thread(|| {
            let queue = AsyncEventQueue::current();
            let order = Arc::new(Mutex::new(Vec::new()));
            let inner_queue = queue.clone();
            let inner_order = order.clone();
            queue.enqueue(
                1,
                None,
                DestroyedFlag::never(),
                None,
                Box::new(move || {
                    inner_order.lock().push("outer-start");
                    inner_queue.enqueue(
                        1,
                        None,
                        DestroyedFlag::never(),
                        None,
                        Box::new({
                            let inner_order = inner_order.clone();
                            move || inner_order.lock().push("nested")
                        }),
                    );
                    inner_queue.exec();
                    inner_order.lock().push("outer-end");
                }),
            );
            queue.exec();
            assert_eq!(*order.lock(), vec!["outer-start", "nested", "outer-end"]);
        });
    }
}
