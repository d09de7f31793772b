//! Data Source
//!
//! Owns the accumulated result set and the "exhausted" latch.

use serde::Serialize;
use tokio::sync::watch;

use crate::state::{Merge, StateContainer};

/// Accumulated items plus the upstream exhaustion flag
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataSourceState<I> {
    pub data: Vec<I>,
    /// No further pages upstream; sticky until `reset()`
    pub exhausted: bool,
}

impl<I> Default for DataSourceState<I> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            exhausted: false,
        }
    }
}

/// Partial update for [`DataSourceState`]
#[derive(Clone, Debug)]
pub struct DataSourceUpdate<I> {
    pub data: Option<Vec<I>>,
    pub exhausted: Option<bool>,
}

impl<I> Default for DataSourceUpdate<I> {
    fn default() -> Self {
        Self {
            data: None,
            exhausted: None,
        }
    }
}

impl<I> DataSourceUpdate<I> {
    /// Replace the items
    pub fn data(data: Vec<I>) -> Self {
        Self {
            data: Some(data),
            exhausted: None,
        }
    }

    /// Set the exhaustion flag
    pub fn exhausted(mut self, exhausted: bool) -> Self {
        self.exhausted = Some(exhausted);
        self
    }
}

impl<I: Clone + Send + Sync + 'static> Merge for DataSourceState<I> {
    type Partial = DataSourceUpdate<I>;

    fn merge(&mut self, partial: DataSourceUpdate<I>) {
        if let Some(data) = partial.data {
            self.data = data;
        }
        if let Some(exhausted) = partial.exhausted {
            // latched: only reset() clears it
            self.exhausted |= exhausted;
        }
    }
}

/// Data source over a state container
#[derive(Debug)]
pub struct DataSource<I: Clone + Send + Sync + 'static> {
    state: StateContainer<DataSourceState<I>>,
}

impl<I: Clone + Send + Sync + 'static> DataSource<I> {
    pub fn new() -> Self {
        Self {
            state: StateContainer::new(DataSourceState::default),
        }
    }

    /// Snapshot of items and exhaustion flag
    pub fn state(&self) -> DataSourceState<I> {
        self.state.state()
    }

    /// Merge a partial update
    pub fn set_state(&self, update: DataSourceUpdate<I>) -> DataSourceState<I> {
        self.state.set_state(update)
    }

    /// Merge a partial update computed from the current state
    pub fn update_state(
        &self,
        f: impl FnOnce(&DataSourceState<I>) -> DataSourceUpdate<I>,
    ) -> DataSourceState<I> {
        self.state.update_state(f)
    }

    /// Current items
    pub fn data(&self) -> Vec<I> {
        self.state.state().data
    }

    /// Replace the items; callers merge pages beforehand
    pub fn set_data(&self, data: Vec<I>) {
        self.state.set_state(DataSourceUpdate::data(data));
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.state.with_state(|s| s.data.len())
    }

    /// Check if no items are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.with_state(|s| s.exhausted)
    }

    /// Empty the items and clear the exhaustion flag
    pub fn reset(&self) {
        self.state.reset();
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<DataSourceState<I>> {
        self.state.subscribe()
    }
}

impl<I: Clone + Send + Sync + 'static> Default for DataSource<I> {
    fn default() -> Self {
        Self::new()
    }
}
