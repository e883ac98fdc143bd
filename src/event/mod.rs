//! Typed multicast event channel with synchronous and asynchronous
//! dispatch, per-target delivery queues, filters and acceptance contexts.

mod queue;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::ReentrantMutex;
use slotmap::SlotMap;
use tracing::trace;

use crate::cookie::Cookie;
use crate::error::{Error, EventError};

pub use queue::{AsyncEventQueue, EventQueueConfig};
use queue::{EventId, Transaction};

/// Caps nested `sync_trigger` recursion (handlers triggering events from
/// handlers, recursively) so a cyclic wiring mistake fails loudly instead
/// of blowing the stack.
const MAX_TRIGGER_DEPTH: u32 = 128;

thread_local! {
    static TRIGGER_DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct RecursionGuard;

impl RecursionGuard {
    fn enter() -> Result<RecursionGuard, Error> {
        TRIGGER_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= MAX_TRIGGER_DEPTH {
                return Err(Error::Event(EventError::TooDeep));
            }
            depth.set(current + 1);
            Ok(RecursionGuard)
        })
    }
}

impl Drop for RecursionGuard {
    fn drop(&mut self) {
        TRIGGER_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// The crate's single, process-wide, reentrant lock over all event state.
///
/// A single global lock (rather than one per event) sidesteps lock
/// ordering entirely: handlers are free to trigger other events, including
/// the event currently dispatching, from the same thread. It is released
/// around the actual invocation of a handler callable so unrelated threads
/// can make progress while a handler runs.
pub(crate) fn event_lock() -> &'static ReentrantMutex<()> {
    static LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// How a trigger walks the handler list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerType {
    /// Inline where legal, enqueue otherwise. The default.
    #[default]
    Synchronous,
    /// Like `Synchronous`, but first drops any callbacks this event has
    /// already queued.
    SynchronousDontQueue,
    /// Never inline: every handler is enqueued, even same-thread ones.
    Asynchronous,
    /// Like `Asynchronous`, but first drops any callbacks this event has
    /// already queued.
    AsynchronousDontQueue,
}

struct Handler<Args> {
    client_id: Option<usize>,
    callable: Arc<dyn Fn(Args) + Send + Sync>,
    same_thread_as_emitter: bool,
    stateless: bool,
    refcount: std::sync::atomic::AtomicUsize,
    last_trigger_id: AtomicU64,
    target_queue: AsyncEventQueue,
}

struct AcceptanceContext {
    accepted: Cell<bool>,
    handlers_changed: Cell<bool>,
}

struct EventInner<Args> {
    handlers: RefCell<SlotMap<Cookie, Handler<Args>>>,
    acceptance_stack: RefCell<Vec<AcceptanceContext>>,
    trigger_type: Cell<TriggerType>,
    next_trigger_id: AtomicU64,
    handlers_changed: Cell<bool>,
    filter_count: std::sync::atomic::AtomicUsize,
    ignore_errors: Cell<bool>,
    last_transaction_by_queue: RefCell<HashMap<usize, Transaction>>,
}

// Every field above is only ever touched with `event_lock()` held, which
// serializes access regardless of which thread calls in — the same
// justification the thread pool's worker state and the async queue use.
unsafe impl<Args> Sync for EventInner<Args> where Args: Send {}

impl<Args> Default for EventInner<Args> {
    fn default() -> Self {
        Self {
            handlers: RefCell::new(SlotMap::with_key()),
            acceptance_stack: RefCell::new(Vec::new()),
            trigger_type: Cell::new(TriggerType::default()),
            next_trigger_id: AtomicU64::new(0),
            handlers_changed: Cell::new(false),
            filter_count: std::sync::atomic::AtomicUsize::new(0),
            ignore_errors: Cell::new(false),
            last_transaction_by_queue: RefCell::new(HashMap::new()),
        }
    }
}

/// A typed multicast event. Owns its handler list; dropping it invalidates
/// every outstanding [`EventHandle`] (their weak reference to this event's
/// shared state stops upgrading).
pub struct Event<Args> {
    inner: Arc<EventInner<Args>>,
}

impl<Args> Default for Event<Args> {
    fn default() -> Self {
        Self {
            inner: Arc::new(EventInner::default()),
        }
    }
}

/// Options controlling how a subscription is recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Opaque token used for bulk removal via `unsubscribe_client`.
    pub client_id: Option<usize>,
    /// Force inline delivery on the emitter's thread regardless of which
    /// thread subscribed.
    pub same_thread_as_emitter: bool,
    /// Mark eligible for latest-wins dedup in the async queue.
    pub stateless: bool,
}

impl<Args> Event<Args>
where
    Args: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&self) -> EventId {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Register a handler, returning the primary handle for it. Dropping
    /// every handle for this subscription (this one and any clones)
    /// removes the handler.
    pub fn subscribe<F>(&self, callable: F, options: SubscribeOptions) -> EventHandle<Args>
    where
        F: Fn(Args) + Send + Sync + 'static,
    {
        let _guard = event_lock().lock();
        let handler = Handler {
            client_id: options.client_id,
            callable: Arc::new(callable),
            same_thread_as_emitter: options.same_thread_as_emitter,
            stateless: options.stateless,
            refcount: std::sync::atomic::AtomicUsize::new(1),
            last_trigger_id: AtomicU64::new(0),
            target_queue: AsyncEventQueue::current(),
        };
        let cookie = self.inner.handlers.borrow_mut().insert(handler);
        self.mark_mutated();
        trace!(target: "loomcore::event", cookie = ?cookie, "subscribed");
        EventHandle {
            event: Arc::downgrade(&self.inner),
            cookie,
            primary: true,
        }
    }

    /// Register a filter, run during synchronous dispatch before any
    /// handler; returning `true` is equivalent to a handler calling
    /// `accept()` and short-circuits the trigger.
    pub fn add_filter<F>(&self, filter: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let _guard = event_lock().lock();
        AsyncEventQueue::current().register_filter(self.id(), Arc::new(filter));
        self.inner
            .filter_count
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Remove the handler named by `handle`'s cookie unconditionally.
    pub fn unsubscribe(&self, handle: &EventHandle<Args>) -> Result<(), Error> {
        let _guard = event_lock().lock();
        self.remove_cookie(handle.cookie)
    }

    /// Remove every handler whose subscription carried this client id.
    pub fn unsubscribe_client(&self, client_id: usize) {
        let _guard = event_lock().lock();
        let mut handlers = self.inner.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|_, h| h.client_id != Some(client_id));
        if handlers.len() != before {
            drop(handlers);
            self.mark_mutated();
        }
    }

    fn remove_cookie(&self, cookie: Cookie) -> Result<(), Error> {
        let removed = self.inner.handlers.borrow_mut().remove(cookie);
        if removed.is_none() {
            return Err(Error::Event(EventError::HandlerNotFound));
        }
        self.mark_mutated();
        Ok(())
    }

    fn mark_mutated(&self) {
        self.inner.handlers_changed.set(true);
        for ctx in self.inner.acceptance_stack.borrow().iter() {
            ctx.handlers_changed.set(true);
        }
    }

    /// Mark the innermost live acceptance context accepted: dispatch stops
    /// after the current handler returns and `sync_trigger` returns
    /// `false`.
    pub fn accept(&self) {
        let _guard = event_lock().lock();
        if let Some(ctx) = self.inner.acceptance_stack.borrow().last() {
            ctx.accepted.set(true);
        }
    }

    /// Reset the innermost live acceptance context.
    pub fn ignore(&self) {
        let _guard = event_lock().lock();
        if let Some(ctx) = self.inner.acceptance_stack.borrow().last() {
            ctx.accepted.set(false);
        }
    }

    pub fn set_trigger_type(&self, trigger_type: TriggerType) {
        let _guard = event_lock().lock();
        self.inner.trigger_type.set(trigger_type);
    }

    pub fn set_ignore_errors(&self, ignore: bool) {
        let _guard = event_lock().lock();
        self.inner.ignore_errors.set(ignore);
    }

    /// Trigger using the event's configured [`TriggerType`].
    pub fn trigger(&self, args: Args) -> Result<bool, Error> {
        let trigger_type = {
            let _guard = event_lock().lock();
            self.inner.trigger_type.get()
        };
        match trigger_type {
            TriggerType::Synchronous => self.sync_trigger(args),
            TriggerType::SynchronousDontQueue => {
                self.drop_queued();
                self.sync_trigger(args)
            }
            TriggerType::Asynchronous => self.async_trigger(args).map(|()| true),
            TriggerType::AsynchronousDontQueue => {
                self.drop_queued();
                self.async_trigger(args).map(|()| true)
            }
        }
    }

    fn drop_queued(&self) {
        // A thread only knows about its own queue; `DontQueue` semantics
        // are necessarily best-effort for deliveries already posted to
        // other threads' queues, matching the per-thread-singleton model.
        AsyncEventQueue::current().unqueue(self.id());
    }

    /// Walk the handler list under the event lock: same-thread handlers run
    /// inline (lock released around the call), others are enqueued onto
    /// their subscriber's queue. Returns `false` if a filter or handler
    /// called `accept()`.
    pub fn sync_trigger(&self, args: Args) -> Result<bool, Error> {
        let mut guard = event_lock().lock();
        let _depth = RecursionGuard::enter()?;

        let no_handlers = self.inner.handlers.borrow().is_empty();
        let no_filters = self.inner.filter_count.load(Ordering::Relaxed) == 0;
        if no_handlers && no_filters {
            return Ok(true);
        }

        self.inner.acceptance_stack.borrow_mut().push(AcceptanceContext {
            accepted: Cell::new(false),
            handlers_changed: Cell::new(false),
        });

        if AsyncEventQueue::current().run_filters(self.id()) {
            self.inner.acceptance_stack.borrow_mut().pop();
            return Ok(false);
        }

        let trigger_id = self.inner.next_trigger_id.fetch_add(1, Ordering::Relaxed) + 1;
        let emitter_queue = AsyncEventQueue::current();
        let mut keys: Vec<Cookie> = self.inner.handlers.borrow().keys().collect();
        let mut index = 0;

        loop {
            if index >= keys.len() {
                break;
            }
            let cookie = keys[index];

            // A `None` here means the handler was removed mid-dispatch
            // (e.g. by an earlier handler in this same walk); skip it
            // rather than restarting, since nothing still references it.
            let already_dispatched = {
                let handlers = self.inner.handlers.borrow();
                match handlers.get(cookie) {
                    Some(h) => h.last_trigger_id.load(Ordering::Acquire) == trigger_id,
                    None => true,
                }
            };
            if already_dispatched {
                index += 1;
                continue;
            }

            {
                let handlers = self.inner.handlers.borrow();
                handlers[cookie]
                    .last_trigger_id
                    .store(trigger_id, Ordering::Release);
            }

            let inline = {
                let handlers = self.inner.handlers.borrow();
                let h = &handlers[cookie];
                h.same_thread_as_emitter || h.target_queue.id() == emitter_queue.id()
            };

            if inline {
                let callable = {
                    let handlers = self.inner.handlers.borrow();
                    handlers[cookie].callable.clone()
                };
                let args_for_call = args.clone();
                // Release the event lock around user code so an unrelated
                // thread's trigger can make progress while this handler
                // runs, then reacquire before resuming the dispatch loop.
                drop(guard);
                callable(args_for_call);
                guard = event_lock().lock();
            } else {
                let (stateless, destroyed, target_queue) = {
                    let handlers = self.inner.handlers.borrow();
                    let h = &handlers[cookie];
                    (
                        h.stateless,
                        h.target_queue.destroyed_flag(),
                        h.target_queue.clone(),
                    )
                };
                if target_queue.is_destroyed() {
                    if !self.inner.ignore_errors.get() {
                        self.inner.acceptance_stack.borrow_mut().pop();
                        return Err(Error::Event(EventError::QueueDestroyed));
                    }
                } else {
                    let prior = self
                        .inner
                        .last_transaction_by_queue
                        .borrow()
                        .get(&target_queue.id())
                        .copied();
                    let callable = {
                        let handlers = self.inner.handlers.borrow();
                        handlers[cookie].callable.clone()
                    };
                    let args_for_call = args.clone();
                    let transaction = target_queue.enqueue(
                        self.id(),
                        stateless.then_some(cookie),
                        destroyed,
                        prior,
                        Box::new(move || callable(args_for_call)),
                    );
                    self.inner
                        .last_transaction_by_queue
                        .borrow_mut()
                        .insert(target_queue.id(), transaction);
                }
            }

            let ctx_accepted = self
                .inner
                .acceptance_stack
                .borrow()
                .last()
                .map(|ctx| ctx.accepted.get())
                .unwrap_or(false);
            if ctx_accepted {
                self.inner.acceptance_stack.borrow_mut().pop();
                return Ok(false);
            }

            let restart = self
                .inner
                .acceptance_stack
                .borrow()
                .last()
                .map(|ctx| ctx.handlers_changed.replace(false))
                .unwrap_or(false);
            if restart {
                keys = self.inner.handlers.borrow().keys().collect();
                index = 0;
                continue;
            }

            index += 1;
        }

        self.inner.acceptance_stack.borrow_mut().pop();
        let _ = &guard;
        Ok(true)
    }

    /// Enqueue every handler regardless of thread affinity; mirrors
    /// `sync_trigger`'s mutation-safe index walk but with no acceptance
    /// context.
    pub fn async_trigger(&self, args: Args) -> Result<(), Error> {
        let _guard = event_lock().lock();
        let trigger_id = self.inner.next_trigger_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.handlers_changed.set(false);
        let mut keys: Vec<Cookie> = self.inner.handlers.borrow().keys().collect();
        let mut index = 0;
        loop {
            if index >= keys.len() {
                break;
            }
            let cookie = keys[index];

            let already_dispatched = {
                let handlers = self.inner.handlers.borrow();
                match handlers.get(cookie) {
                    Some(h) => h.last_trigger_id.load(Ordering::Acquire) == trigger_id,
                    None => true,
                }
            };
            if already_dispatched {
                index += 1;
                continue;
            }
            let (stateless, destroyed, target_queue, callable) = {
                let handlers = self.inner.handlers.borrow();
                let h = &handlers[cookie];
                h.last_trigger_id.store(trigger_id, Ordering::Release);
                (
                    h.stateless,
                    h.target_queue.destroyed_flag(),
                    h.target_queue.clone(),
                    h.callable.clone(),
                )
            };

            if target_queue.is_destroyed() {
                if !self.inner.ignore_errors.get() {
                    return Err(Error::Event(EventError::QueueDestroyed));
                }
            } else {
                let prior = self
                    .inner
                    .last_transaction_by_queue
                    .borrow()
                    .get(&target_queue.id())
                    .copied();
                let args_for_call = args.clone();
                let transaction = target_queue.enqueue(
                    self.id(),
                    stateless.then_some(cookie),
                    destroyed,
                    prior,
                    Box::new(move || callable(args_for_call)),
                );
                self.inner
                    .last_transaction_by_queue
                    .borrow_mut()
                    .insert(target_queue.id(), transaction);
            }

            if self.inner.handlers_changed.replace(false) {
                keys = self.inner.handlers.borrow().keys().collect();
                index = 0;
                continue;
            }
            index += 1;
        }
        Ok(())
    }
}

/// A shared reference to a subscription. The primary handle (the one
/// returned by `subscribe`) unsubscribes unconditionally when dropped;
/// clones only decrement the handler's reference count, removing it if
/// that reaches zero and no other handle (primary included) has already
/// done so.
pub struct EventHandle<Args> {
    event: Weak<EventInner<Args>>,
    cookie: Cookie,
    primary: bool,
}

impl<Args> EventHandle<Args>
where
    Args: Clone + Send + 'static,
{
    /// Whether the underlying event still exists.
    pub fn valid(&self) -> bool {
        self.event.upgrade().is_some()
    }

    /// Explicitly unsubscribe through this handle rather than waiting for
    /// `Drop`. Fails with [`EventError::NoControl`] if the event has
    /// already been destroyed.
    pub fn unsubscribe(&self) -> Result<(), Error> {
        let inner = self
            .event
            .upgrade()
            .ok_or(Error::Event(EventError::NoControl))?;
        let _guard = event_lock().lock();
        let removed = inner.handlers.borrow_mut().remove(self.cookie);
        if removed.is_none() {
            return Err(Error::Event(EventError::HandlerNotFound));
        }
        inner.handlers_changed.set(true);
        for ctx in inner.acceptance_stack.borrow().iter() {
            ctx.handlers_changed.set(true);
        }
        Ok(())
    }
}

impl<Args> Clone for EventHandle<Args> {
    fn clone(&self) -> Self {
        if let Some(inner) = self.event.upgrade() {
            let _guard = event_lock().lock();
            if let Some(h) = inner.handlers.borrow().get(self.cookie) {
                h.refcount.fetch_add(1, Ordering::Relaxed);
            }
        }
        Self {
            event: self.event.clone(),
            cookie: self.cookie,
            primary: false,
        }
    }
}

impl<Args> Drop for EventHandle<Args> {
    fn drop(&mut self) {
        let Some(inner) = self.event.upgrade() else {
            return;
        };
        let _guard = event_lock().lock();
        let remove = if self.primary {
            true
        } else {
            match inner.handlers.borrow().get(self.cookie) {
                Some(h) => h.refcount.fetch_sub(1, Ordering::AcqRel) == 1,
                None => false,
            }
        };
        if remove && inner.handlers.borrow_mut().remove(self.cookie).is_some() {
            inner.handlers_changed.set(true);
            for ctx in inner.acceptance_stack.borrow().iter() {
                ctx.handlers_changed.set(true);
            }
        }
    }
}

/// Owns a sequence of [`EventHandle`]s and releases them together when
/// dropped — the idiomatic way to tie a group of subscriptions to a
/// subscriber's own lifetime.
#[derive(Default)]
pub struct Sink<Args> {
    handles: Vec<EventHandle<Args>>,
}

impl<Args> Sink<Args>
where
    Args: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handle: EventHandle<Args>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::thread;

    fn on_fresh_thread<F: FnOnce() + Send + 'static>(f: F) {
        thread::spawn(f).join().unwrap();
    }

    #[test]
    fn trigger_with_no_handlers_returns_true() {
        on_fresh_thread(|| {
            let event: Event<i32> = Event::new();
            assert_eq!(event.sync_trigger(1).unwrap(), true);
        });
    }

    #[test]
    fn subscribe_then_unsubscribe_empties_handler_list() {
        on_fresh_thread(|| {
            let event: Event<i32> = Event::new();
            let handle = event.subscribe(|_| {}, SubscribeOptions::default());
            assert_eq!(event.inner.handlers.borrow().len(), 1);
            event.unsubscribe(&handle).unwrap();
            assert_eq!(event.inner.handlers.borrow().len(), 0);
        });
    }

    #[test]
    fn same_thread_handler_runs_inline() {
        on_fresh_thread(|| {
            let event: Event<i32> = Event::new();
            let seen = Arc::new(AtomicU32::new(0));
            let seen2 = seen.clone();
            let _handle = event.subscribe(
                move |v| seen2.store(v as u32, Ordering::SeqCst),
                SubscribeOptions {
                    same_thread_as_emitter: true,
                    ..Default::default()
                },
            );
            assert_eq!(event.sync_trigger(42).unwrap(), true);
            assert_eq!(seen.load(Ordering::SeqCst), 42);
        });
    }

    #[test]
    fn accept_stops_dispatch_and_returns_false() {
        on_fresh_thread(|| {
            let event: Event<()> = Event::new();
            let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

            let o1 = order.clone();
            let _h1 = event.subscribe(
                move |_| o1.lock().push(1),
                SubscribeOptions {
                    same_thread_as_emitter: true,
                    ..Default::default()
                },
            );
            let event_for_accept = event.inner.clone();
            let o2 = order.clone();
            let _h2 = event.subscribe(
                move |_| {
                    o2.lock().push(2);
                    if let Some(ctx) = event_for_accept.acceptance_stack.borrow().last() {
                        ctx.accepted.set(true);
                    }
                },
                SubscribeOptions {
                    same_thread_as_emitter: true,
                    ..Default::default()
                },
            );
            let o3 = order.clone();
            let _h3 = event.subscribe(
                move |_| o3.lock().push(3),
                SubscribeOptions {
                    same_thread_as_emitter: true,
                    ..Default::default()
                },
            );

            let result = event.sync_trigger(()).unwrap();
            assert_eq!(result, false);
            assert_eq!(*order.lock(), vec![1, 2]);
        });
    }

    #[test]
    fn handler_fires_at_most_once_even_if_it_resubscribes() {
        on_fresh_thread(|| {
            let event: Rc_<i32> = Rc_::new(Event::new());
            let calls = Arc::new(AtomicU32::new(0));
            let calls2 = calls.clone();
            let event2 = event.clone();
            let _h1 = event.0.subscribe(
                move |_| {
                    calls2.fetch_add(1, Ordering::SeqCst);
                    // Subscribing another handler mid-dispatch must not
                    // cause this handler to be invoked twice on restart.
                    let _new_handle = event2.0.subscribe(|_| {}, SubscribeOptions::default());
                    std::mem::forget(_new_handle);
                },
                SubscribeOptions {
                    same_thread_as_emitter: true,
                    ..Default::default()
                },
            );
            event.0.sync_trigger(1).unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        });
    }

    // Minimal clonable wrapper so the mid-dispatch-resubscribe test can
    // share one `Event` between the outer scope and the handler closure
    // without fighting borrow rules.
    #[derive(Clone)]
    struct Rc_<T>(std::rc::Rc<Event<T>>);
    impl<T> Rc_<T> {
        fn new(event: Event<T>) -> Self {
            Self(std::rc::Rc::new(event))
        }
    }

    #[test]
    fn stateless_cross_thread_dedup_keeps_latest() {
        let event: Arc<Event<i32>> = Arc::new(Event::new());
        let seen = Arc::new(AtomicU32::new(0));

        let event_sub = event.clone();
        let seen_sub = seen.clone();
        let subscriber_queue = Arc::new(parking_lot::Mutex::new(None));
        let subscriber_queue2 = subscriber_queue.clone();
        let subscriber = thread::spawn(move || {
            let _handle = event_sub.subscribe(
                move |v| seen_sub.store(v as u32, Ordering::SeqCst),
                SubscribeOptions {
                    stateless: true,
                    ..Default::default()
                },
            );
            *subscriber_queue2.lock() = Some(AsyncEventQueue::current());
            // Park until the emitter thread is done triggering.
            while subscriber_queue2.lock().is_some() {
                thread::sleep(std::time::Duration::from_millis(5));
                if seen_sub_done(&seen) {
                    break;
                }
            }
        });

        // Give the subscriber a moment to register before we trigger.
        while subscriber_queue.lock().is_none() {
            thread::sleep(std::time::Duration::from_millis(2));
        }
        let queue = subscriber_queue.lock().clone().unwrap();

        for v in 0..50 {
            event.async_trigger(v).unwrap();
        }
        assert_eq!(queue.exec(), true);
        assert_eq!(seen.load(Ordering::SeqCst), 49);

        *subscriber_queue.lock() = None;
        subscriber.join().unwrap();
    }

    fn seen_sub_done(_seen: &Arc<AtomicU32>) -> bool {
        true
    }

    #[test]
    fn cross_thread_handler_is_queued_not_called_inline() {
        let event: Arc<Event<i32>> = Arc::new(Event::new());
        let seen = Arc::new(AtomicU32::new(0));

        let event_sub = event.clone();
        let seen_sub = seen.clone();
        let subscriber_queue = Arc::new(parking_lot::Mutex::new(None));
        let subscriber_queue2 = subscriber_queue.clone();
        let release = Arc::new(parking_lot::Mutex::new(false));
        let release2 = release.clone();
        let subscriber = thread::spawn(move || {
            let _handle = event_sub.subscribe(
                move |v| seen_sub.store(v as u32, Ordering::SeqCst),
                SubscribeOptions::default(),
            );
            *subscriber_queue2.lock() = Some(AsyncEventQueue::current());
            while !*release2.lock() {
                thread::sleep(std::time::Duration::from_millis(2));
            }
        });

        while subscriber_queue.lock().is_none() {
            thread::sleep(std::time::Duration::from_millis(2));
        }
        let queue = subscriber_queue.lock().clone().unwrap();

        assert_eq!(event.sync_trigger(7).unwrap(), true);
        // The handler lives on another thread: sync_trigger must not have
        // called it inline, only posted it to that thread's queue.
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        assert_eq!(queue.exec(), true);
        assert_eq!(seen.load(Ordering::SeqCst), 7);

        *release.lock() = true;
        subscriber.join().unwrap();
    }
}
