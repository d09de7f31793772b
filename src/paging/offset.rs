//! Offset Pager
//!
//! Classic skip/take paging: `skip = take * step`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::config::ManagerConfig;
use crate::paging::{PageRequest, Pager, Step};
use crate::state::{Merge, StateContainer};

/// Offset pager state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPagerState {
    /// Completed advances
    pub step: usize,
    /// Page size
    pub take: usize,
    /// Total upstream count, when the loader reported one
    pub total_count: Option<usize>,
}

/// Partial update for [`OffsetPagerState`]
#[derive(Clone, Copy, Debug, Default)]
pub struct OffsetPagerUpdate {
    pub step: Option<usize>,
    pub take: Option<usize>,
    pub total_count: Option<usize>,
}

impl Merge for OffsetPagerState {
    type Partial = OffsetPagerUpdate;

    fn merge(&mut self, partial: OffsetPagerUpdate) {
        if let Some(step) = partial.step {
            self.step = step;
        }
        if let Some(take) = partial.take {
            self.take = take;
        }
        if partial.total_count.is_some() {
            self.total_count = partial.total_count;
        }
    }
}

/// Page parameters for skip/take loaders
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetAdvance {
    pub skip: usize,
    pub take: usize,
    pub merge: bool,
}

impl PageRequest for OffsetAdvance {
    fn merge(&self) -> bool {
        self.merge
    }

    fn take(&self) -> usize {
        self.take
    }
}

/// Page metadata an offset loader may report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetFeedback {
    /// Total number of items upstream
    pub total_count: Option<usize>,
}

/// Skip/take pager
#[derive(Debug)]
pub struct OffsetPager {
    state: StateContainer<OffsetPagerState>,
    generation: AtomicU64,
}

impl OffsetPager {
    /// Create a pager with the given page size
    pub fn new(take: usize) -> Self {
        Self {
            state: StateContainer::new(move || OffsetPagerState {
                step: 0,
                take,
                total_count: None,
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// Create a pager sized from the manager configuration
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(config.take)
    }

    /// A page is the last one if it came back empty or short
    pub fn is_last_page(last_batch_count: usize, take: usize) -> bool {
        last_batch_count == 0 || last_batch_count < take
    }
}

impl Pager for OffsetPager {
    type State = OffsetPagerState;
    type Info = OffsetAdvance;
    type Feedback = OffsetFeedback;

    fn advance(&self, steps: usize) -> Step<OffsetAdvance> {
        let steps = steps.max(1);
        let state = self.state.state();
        let skip = state.take * state.step;

        Step::new(
            OffsetAdvance {
                skip,
                take: state.take * steps,
                merge: skip > 0,
            },
            steps,
            self.generation.load(Ordering::SeqCst),
        )
    }

    fn close(&self, step: Step<OffsetAdvance>, successful: bool, feedback: &OffsetFeedback) -> bool {
        if !successful {
            tracing::debug!("Offset pager: rolled back advance at skip {}", step.info().skip);
            return false;
        }
        if !self.is_current(&step) {
            tracing::debug!("Offset pager: ignoring stale advance at skip {}", step.info().skip);
            return false;
        }

        let state = self.state.update_state(|s| OffsetPagerUpdate {
            step: Some(s.step + step.steps()),
            total_count: feedback.total_count,
            ..Default::default()
        });
        tracing::trace!("Offset pager: committed step {}", state.step);
        true
    }

    fn is_current(&self, step: &Step<OffsetAdvance>) -> bool {
        step.generation() == self.generation.load(Ordering::SeqCst)
    }

    fn finished(&self, step: &Step<OffsetAdvance>, last_batch: usize, feedback: &OffsetFeedback) -> bool {
        let info = step.info();
        let total = feedback.total_count.or(self.state.state().total_count);
        let reached_total = total.is_some_and(|total| info.skip + last_batch >= total);

        Self::is_last_page(last_batch, info.take) || reached_total
    }

    fn state(&self) -> OffsetPagerState {
        self.state.state()
    }

    fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.reset();
    }
}
