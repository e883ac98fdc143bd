//! Core concurrency primitives: a priority work-stealing thread pool, a
//! cancellable task abstraction, and a typed multicast event system with
//! synchronous and cross-thread asynchronous delivery.

#![warn(missing_docs)]
#![allow(clippy::type_complexity)]
//!
//! - **Thread Pool**: priority-ordered worker queues with peer work stealing
//! - **Task**: cancellable, awaitable units of work with panic capture
//! - **Event**: type-safe multicast subscriptions, same-thread inline
//!   dispatch, and per-thread async delivery queues
//! - **Lifetime**: cheap cross-thread "has this been destroyed" signaling
//!
//! # Thread Pool Example
//!
//! ```
//! use loomcore::pool::{ThreadPool, ThreadPoolConfig};
//!
//! let pool = ThreadPool::with_config(ThreadPoolConfig {
//!     initial_workers: 2,
//!     ..ThreadPoolConfig::default()
//! });
//! let handle = pool.run(0, |_yield, _cancel| 1 + 1).unwrap();
//! assert!(matches!(handle.join().into_result(), Ok(2)));
//! ```
//!
//! # Event Example
//!
//! ```
//! use loomcore::event::{Event, SubscribeOptions};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI32, Ordering};
//!
//! let value_changed: Event<i32> = Event::new();
//! let seen = Arc::new(AtomicI32::new(0));
//! let seen2 = seen.clone();
//! let _handle = value_changed.subscribe(
//!     move |v| seen2.store(v, Ordering::SeqCst),
//!     SubscribeOptions { same_thread_as_emitter: true, ..Default::default() },
//! );
//! value_changed.sync_trigger(42).unwrap();
//! assert_eq!(seen.load(Ordering::SeqCst), 42);
//! ```

mod cookie;
pub mod error;
pub mod event;
mod lifetime;
pub mod logging;
pub mod pool;
pub mod task;

pub use error::{Error, EventError, PoolError, Result, TaskPanic};
pub use event::{
    AsyncEventQueue, Event, EventHandle, EventQueueConfig, Sink, SubscribeOptions, TriggerType,
};
pub use lifetime::{DestroyedFlag, Lifetime};
pub use pool::{ThreadPool, ThreadPoolConfig};
pub use task::{CancellationToken, PoolTask, TaskHandle, TaskOutcome, YieldMode};
