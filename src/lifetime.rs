//! Asynchronous destruction signaling.
//!
//! [`Lifetime`] is owned by some long-lived object (a thread's event queue,
//! an [`crate::event::Event`] instance). Cloning a [`DestroyedFlag`] from it
//! gives an observer a cheap, thread-safe way to ask "has the thing I'm
//! watching started tearing down?" without holding a reference to the thing
//! itself — useful when the watcher and the watched object may live on
//! different threads and the watched object may be gone by the time the
//! watcher gets around to checking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Owned by the watched object. Setting this to destroyed happens either
/// explicitly (`mark_destroyed`) or implicitly on `Drop`.
#[derive(Debug)]
pub struct Lifetime {
    flag: Arc<AtomicBool>,
}

impl Lifetime {
    /// Create a new lifetime, initially alive.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a cloneable, `Send + Sync` flag observers can poll.
    pub fn watch(&self) -> DestroyedFlag {
        DestroyedFlag {
            flag: self.flag.clone(),
        }
    }

    /// Mark destroyed without waiting for `Drop`. Idempotent.
    pub fn mark_destroyed(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        self.mark_destroyed();
    }
}

/// A cheap, `Clone`-able handle that reports whether the watched [`Lifetime`]
/// has begun destruction.
#[derive(Debug, Clone)]
pub struct DestroyedFlag {
    flag: Arc<AtomicBool>,
}

impl DestroyedFlag {
    /// Returns `true` once the watched object has begun (or finished)
    /// destruction.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// A flag that never reports destroyed — used where no watchable is
    /// available (e.g. the default trigger-time inline path).
    pub fn never() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }
}

// Ensure DestroyedFlag is Send + Sync
static_assertions::assert_impl_all!(DestroyedFlag: Send, Sync, Clone);
