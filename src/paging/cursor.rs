//! Cursor Pager
//!
//! Token-based paging: the loader hands back opaque `prev_page`/`next_page`
//! tokens and the pager requests the page behind `next_page` next time.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::config::ManagerConfig;
use crate::paging::{PageRequest, Pager, Step};
use crate::state::{Merge, StateContainer};

/// Page tokens reported by the loader
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub prev_page: Option<String>,
    pub next_page: Option<String>,
}

/// Cursor pager state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPagerState {
    pub step: usize,
    pub take: usize,
    pub last_cursor: Cursor,
}

/// Partial update for [`CursorPagerState`]
#[derive(Clone, Debug, Default)]
pub struct CursorPagerUpdate {
    pub step: Option<usize>,
    pub take: Option<usize>,
    pub last_cursor: Option<Cursor>,
}

impl Merge for CursorPagerState {
    type Partial = CursorPagerUpdate;

    fn merge(&mut self, partial: CursorPagerUpdate) {
        if let Some(step) = partial.step {
            self.step = step;
        }
        if let Some(take) = partial.take {
            self.take = take;
        }
        if let Some(cursor) = partial.last_cursor {
            self.last_cursor = cursor;
        }
    }
}

/// Page parameters for token-based loaders
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorAdvance {
    /// Token of the page to fetch, `None` for the first page
    pub next_page: Option<String>,
    /// Token pointing back from the page to fetch
    pub prev_page: Option<String>,
    pub take: usize,
    pub merge: bool,
}

impl PageRequest for CursorAdvance {
    fn merge(&self) -> bool {
        self.merge
    }

    fn take(&self) -> usize {
        self.take
    }
}

/// Token-based pager
#[derive(Debug)]
pub struct CursorPager {
    state: StateContainer<CursorPagerState>,
    generation: AtomicU64,
}

impl CursorPager {
    /// Create a pager with the given page size
    pub fn new(take: usize) -> Self {
        Self {
            state: StateContainer::new(move || CursorPagerState {
                take,
                ..Default::default()
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// Create a pager sized from the manager configuration
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(config.take)
    }
}

impl Pager for CursorPager {
    type State = CursorPagerState;
    type Info = CursorAdvance;
    type Feedback = Cursor;

    fn advance(&self, steps: usize) -> Step<CursorAdvance> {
        let steps = steps.max(1);
        let state = self.state.state();

        Step::new(
            CursorAdvance {
                next_page: state.last_cursor.next_page,
                prev_page: state.last_cursor.prev_page,
                take: state.take * steps,
                merge: state.step > 0,
            },
            steps,
            self.generation.load(Ordering::SeqCst),
        )
    }

    fn close(&self, step: Step<CursorAdvance>, successful: bool, feedback: &Cursor) -> bool {
        if !successful || !self.is_current(&step) {
            tracing::debug!(
                "Cursor pager: advance from {:?} not committed",
                step.info().next_page
            );
            return false;
        }

        self.state.update_state(|s| CursorPagerUpdate {
            step: Some(s.step + step.steps()),
            last_cursor: Some(feedback.clone()),
            ..Default::default()
        });
        true
    }

    fn is_current(&self, step: &Step<CursorAdvance>) -> bool {
        step.generation() == self.generation.load(Ordering::SeqCst)
    }

    fn finished(&self, _step: &Step<CursorAdvance>, last_batch: usize, feedback: &Cursor) -> bool {
        last_batch == 0 || feedback.next_page.is_none()
    }

    fn state(&self) -> CursorPagerState {
        self.state.state()
    }

    fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.reset();
    }
}
