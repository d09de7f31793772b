//! State Container
//!
//! Minimal observable state holder with partial updates and reset. Every
//! stateful component (pagers, data sources) keeps its state in one of these.
//!
//! The value lives inside a `tokio::sync::watch` channel, so snapshots are
//! cheap clones and subscribers see every committed change.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// State that can absorb a partial update
pub trait Merge: Clone + Send + Sync + 'static {
    /// Partial form of the state; `None` fields are left untouched
    type Partial;

    /// Merge a partial update into the current value
    fn merge(&mut self, partial: Self::Partial);
}

/// Observable state holder
pub struct StateContainer<S: Merge> {
    init: Arc<dyn Fn() -> S + Send + Sync>,
    tx: watch::Sender<S>,
}

impl<S: Merge> StateContainer<S> {
    /// Create a container; `init` is kept for `reset()`
    pub fn new(init: impl Fn() -> S + Send + Sync + 'static) -> Self {
        let init: Arc<dyn Fn() -> S + Send + Sync> = Arc::new(init);
        let (tx, _rx) = watch::channel(init());
        Self { init, tx }
    }

    /// Snapshot of the current state
    ///
    /// The snapshot is detached: mutating it never affects the container.
    pub fn state(&self) -> S {
        self.tx.borrow().clone()
    }

    /// Read the current state without cloning it
    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Merge a partial update and return the new snapshot
    pub fn set_state(&self, partial: S::Partial) -> S {
        self.update_state(move |_| partial)
    }

    /// Merge a partial update computed from the current state
    ///
    /// `f` runs while the state is locked and must not call back into this
    /// container.
    pub fn update_state(&self, f: impl FnOnce(&S) -> S::Partial) -> S {
        let mut snapshot = None;
        self.tx.send_modify(|state| {
            let partial = f(state);
            state.merge(partial);
            snapshot = Some(state.clone());
        });
        snapshot.unwrap_or_else(|| self.state())
    }

    /// Reinitialize from the original init function
    pub fn reset(&self) {
        self.tx.send_replace((self.init)());
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }
}

impl<S: Merge + fmt::Debug> fmt::Debug for StateContainer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContainer")
            .field("state", &*self.tx.borrow())
            .finish()
    }
}
