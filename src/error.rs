//! Error types for loomcore.

use std::any::Any;
use std::fmt;

/// The main error type for loomcore operations.
#[derive(Debug)]
pub enum Error {
    /// Thread pool error.
    Pool(PoolError),
    /// Event system error.
    Event(EventError),
    /// A task's closure panicked while running.
    TaskFailed(TaskPanic),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool(err) => write!(f, "thread pool error: {err}"),
            Self::Event(err) => write!(f, "event error: {err}"),
            Self::TaskFailed(panic) => write!(f, "task panicked: {panic}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pool(err) => Some(err),
            Self::Event(err) => Some(err),
            Self::TaskFailed(_) => None,
        }
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        Self::Pool(err)
    }
}

impl From<EventError> for Error {
    fn from(err: EventError) -> Self {
        Self::Event(err)
    }
}

/// Thread-pool-specific errors.
#[derive(Debug)]
pub enum PoolError {
    /// `start`/`run` was called on a pool with zero worker threads.
    NoThreads,
    /// Internal invariant violation: a worker was asked to promote a task
    /// while one was already active.
    AlreadyActive,
    /// Internal invariant violation: `release` was called with no active
    /// task.
    NoActiveTask,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoThreads => write!(f, "pool has no worker threads"),
            Self::AlreadyActive => write!(f, "worker already has an active task"),
            Self::NoActiveTask => write!(f, "worker has no active task to release"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Event-system-specific errors.
#[derive(Debug)]
pub enum EventError {
    /// `unsubscribe` was called with a cookie that does not (or no longer)
    /// name a handler.
    HandlerNotFound,
    /// A cross-thread delivery targeted a queue whose owning thread has
    /// exited. Suppressed when the event has `ignore_errors` set.
    QueueDestroyed,
    /// A handle operation was attempted without a live event control block.
    NoControl,
    /// The recursion limiter for nested synchronous triggers tripped.
    TooDeep,
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandlerNotFound => write!(f, "no handler registered for that cookie"),
            Self::QueueDestroyed => write!(f, "target event queue's thread has exited"),
            Self::NoControl => write!(f, "event handle has no live control block"),
            Self::TooDeep => write!(f, "nested trigger recursion limit exceeded"),
        }
    }
}

impl std::error::Error for EventError {}

/// The captured payload of a task closure's panic.
///
/// Wraps `Box<dyn Any + Send>` (the same type `std::panic::catch_unwind`
/// produces) behind a type that can be formatted and stored in `Result`s.
pub struct TaskPanic(pub Box<dyn Any + Send + 'static>);

impl TaskPanic {
    /// Best-effort extraction of a human-readable message from the panic
    /// payload, covering the common `&str` / `String` cases produced by
    /// `panic!` and friends.
    pub fn message(&self) -> &str {
        if let Some(s) = self.0.downcast_ref::<&str>() {
            s
        } else if let Some(s) = self.0.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Box<dyn Any>"
        }
    }
}

impl fmt::Debug for TaskPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskPanic").field(&self.message()).finish()
    }
}

impl fmt::Display for TaskPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// A specialized `Result` type for loomcore operations.
pub type Result<T> = std::result::Result<T, Error>;
