//! Pager Contract
//!
//! A pager proposes the next page (`advance`) and only mutates its own state
//! once the fetch for that page is closed successfully:
//!
//! ```text
//! advance() ──► Step { info, steps, generation }
//!                  │
//!                  ├── close(step, true)  ──► step += steps
//!                  └── close(step, false) ──► nothing changes (rollback)
//! ```
//!
//! `reset()` bumps the pager generation; steps proposed before a reset are
//! stale and can no longer commit.

use std::fmt;

/// Parameters handed to the loader for one page
pub trait PageRequest: Clone + fmt::Debug + Send + Sync + 'static {
    /// Whether the page appends to the accumulated data or replaces it
    fn merge(&self) -> bool;

    /// Number of items requested
    fn take(&self) -> usize;
}

/// A proposed, not yet committed, pager advance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step<I> {
    info: I,
    steps: usize,
    generation: u64,
}

impl<I> Step<I> {
    pub(crate) fn new(info: I, steps: usize, generation: u64) -> Self {
        Self {
            info,
            steps,
            generation,
        }
    }

    /// Page parameters for the loader
    pub fn info(&self) -> &I {
        &self.info
    }

    /// Number of pages this step covers
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Pager generation the step was proposed in
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Consume the step, keeping only the page parameters
    pub fn into_info(self) -> I {
        self.info
    }
}

/// Pagination strategy
pub trait Pager: Send + Sync + 'static {
    /// Snapshot of the pager state
    type State: Clone + fmt::Debug + Send + Sync + 'static;
    /// Page parameters produced by `advance`
    type Info: PageRequest;
    /// Page metadata reported back by the loader (cursor tokens, totals)
    type Feedback: Clone + fmt::Debug + Default + Send + Sync + 'static;

    /// Propose the next `steps` pages without mutating state
    fn advance(&self, steps: usize) -> Step<Self::Info>;

    /// Commit (`successful`) or roll back a proposed step
    ///
    /// Returns `true` if the pager state changed.
    fn close(&self, step: Step<Self::Info>, successful: bool, feedback: &Self::Feedback) -> bool;

    /// Check if `step` was proposed after the latest reset
    fn is_current(&self, step: &Step<Self::Info>) -> bool;

    /// Check if the page that `step` fetched was the last one upstream
    fn finished(&self, step: &Step<Self::Info>, last_batch: usize, feedback: &Self::Feedback) -> bool;

    /// Current state snapshot
    fn state(&self) -> Self::State;

    /// Back to the first page, discarding any in-flight advance
    fn reset(&self);
}
