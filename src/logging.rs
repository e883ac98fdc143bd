//! `tracing` target and span-name constants shared by every subsystem.
//!
//! Keeping these in one place means a consumer can filter on
//! `RUST_LOG=loomcore::pool=debug` without grepping the source for string
//! literals.

/// `tracing` target strings, one per subsystem.
pub mod targets {
    /// The thread pool's topology and scheduling decisions.
    pub const POOL: &str = "loomcore::pool";
    /// Individual worker lifecycle (idle, promote, running, release).
    pub const WORKER: &str = "loomcore::worker";
    /// Event subscription, trigger and dispatch.
    pub const EVENT: &str = "loomcore::event";
    /// Per-thread async event queue drain.
    pub const QUEUE: &str = "loomcore::queue";
}

/// Canonical span names, used with `#[tracing::instrument(name = ...)]`.
pub mod span_names {
    /// Span covering one call to `ThreadPool::run`.
    pub const POOL_RUN: &str = "pool_run";
    /// Span covering one worker's processing of a single task.
    pub const WORKER_TASK: &str = "worker_task";
    /// Span covering one call to `Event::trigger`.
    pub const EVENT_TRIGGER: &str = "event_trigger";
    /// Span covering one drain of a thread's async event queue.
    pub const QUEUE_DRAIN: &str = "queue_drain";
}
