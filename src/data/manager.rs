//! Input Data Manager
//!
//! Orchestrates pager, loader, data source and task queue behind a select or
//! autocomplete input:
//!
//! ```text
//!  init / filter / request_next_page / sync
//!                 │
//!                 ▼
//!           TaskQueue<LoadTask>  (serial, priority, privileged)
//!                 │
//!                 ▼
//!   pager.advance ─► loader.load ─► merge page ─► pager.close
//!                                        │
//!                                        └─► not sufficient? enqueue next page
//! ```
//!
//! Selected values are tracked alongside the loaded data. Their items are
//! kept even when a search no longer returns them, and values with no known
//! item are fetched out of band through a privileged load.

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::{oneshot, watch};

use crate::data::{
    DataInitOptionals, DataSource, DataSourceState, DataSourceUpdate, Loader, LoaderOptionals,
    PageResult,
};
use crate::domain::config::ManagerConfig;
use crate::domain::item::{DataItem, ItemStrategy, SelectedValue};
use crate::helpers::{Debouncer, Throttler};
use crate::paging::{PageRequest, Pager, Step};
use crate::queue::{QueueMode, QueueTask, TaskQueue};
use crate::services::spawn_named;

type SufficientFn = Arc<dyn Fn(usize) -> bool + Send + Sync>;

/// What the manager is currently doing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerPhase {
    #[default]
    Idle,
    /// Loading pages for the current search
    Loading,
    /// Fetching items for selected values
    Reconciling,
}

impl fmt::Display for ManagerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerPhase::Idle => write!(f, "idle"),
            ManagerPhase::Loading => write!(f, "loading"),
            ManagerPhase::Reconciling => write!(f, "reconciling"),
        }
    }
}

/// Combined snapshot of data source, pager and phase
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ManagerState<I, S> {
    pub data: Vec<I>,
    pub exhausted: bool,
    pub pager: S,
    pub phase: ManagerPhase,
}

struct Selection<I, V> {
    values: Vec<V>,
    items: Vec<I>,
}

// ============================================================================
// Load tasks
// ============================================================================

#[derive(Clone)]
struct LoadTask<V> {
    optionals: LoaderOptionals<V>,
    /// Number of automatic follow-up loads before this one
    continuation: usize,
    done: Arc<Mutex<Option<oneshot::Sender<bool>>>>,
}

impl<V> LoadTask<V> {
    fn new(optionals: LoaderOptionals<V>, continuation: usize) -> (Self, LoadTicket) {
        let (tx, rx) = oneshot::channel();
        let task = Self {
            optionals,
            continuation,
            done: Arc::new(Mutex::new(Some(tx))),
        };
        (task, LoadTicket(rx))
    }

    fn finish(&self, applied: bool) {
        if let Some(tx) = self.done.lock().take() {
            // the caller may not be waiting
            let _ = tx.send(applied);
        }
    }
}

impl<V: Send + 'static> QueueTask for LoadTask<V> {
    fn priority(&self) -> Option<i32> {
        self.optionals.priority
    }

    fn privileged(&self) -> bool {
        self.optionals.privileged
    }
}

/// Completion handle of a queued load
///
/// Resolves to `true` when the page was applied, `false` when the load failed,
/// was discarded as stale, or was rejected by the queue. Dropping the ticket
/// does not cancel the load.
#[derive(Debug)]
pub struct LoadTicket(oneshot::Receiver<bool>);

impl Future for LoadTicket {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        Pin::new(&mut self.0).poll(cx).map(|res| res.unwrap_or(false))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`InputDataManager`]
pub struct InputDataManagerBuilder<I, V, P, L> {
    name: String,
    pager: P,
    loader: L,
    strategy: ItemStrategy<I, V>,
    config: ManagerConfig,
    sufficient: Option<SufficientFn>,
}

impl<I, V, P, L> InputDataManagerBuilder<I, V, P, L>
where
    I: DataItem,
    V: SelectedValue,
    P: Pager,
    L: Loader<I, V, P>,
{
    /// Name used in log lines
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Decide when enough items are visible to stop auto-loading
    ///
    /// Defaults to `count >= min_items`. A loader's own verdict takes
    /// precedence over this predicate.
    pub fn sufficient_amount(mut self, f: impl Fn(usize) -> bool + Send + Sync + 'static) -> Self {
        self.sufficient = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> InputDataManager<I, V, P, L> {
        InputDataManager::from_builder(self)
    }
}

// ============================================================================
// Manager
// ============================================================================

struct ManagerInner<I: DataItem, V: SelectedValue, P, L> {
    name: String,
    config: ManagerConfig,
    pager: P,
    loader: L,
    strategy: ItemStrategy<I, V>,
    sufficient: Option<SufficientFn>,
    data_source: DataSource<I>,
    queue: TaskQueue<LoadTask<V>>,
    selection: Mutex<Selection<I, V>>,
    search: Mutex<Option<String>>,
    phase: watch::Sender<ManagerPhase>,
    /// Search/init load waiting for a selection fetch to finish
    deferred: Mutex<Option<LoadTask<V>>>,
    this: Weak<Self>,
}

/// Paginated, selection-aware data layer
pub struct InputDataManager<I, V, P, L>
where
    I: DataItem,
    V: SelectedValue,
    P: Pager,
    L: Loader<I, V, P>,
{
    inner: Arc<ManagerInner<I, V, P, L>>,
    filter: Debouncer<(String, DataInitOptionals)>,
    next_page: Debouncer<()>,
    reconcile: Throttler<()>,
}

/// Manager whose items are their own values
pub type PrimitiveInputDataManager<T, P, L> = InputDataManager<T, T, P, L>;

/// Manager over JSON records identified by a value key
pub type RecordInputDataManager<P, L> =
    InputDataManager<serde_json::Value, serde_json::Value, P, L>;

impl<I, V, P, L> InputDataManager<I, V, P, L>
where
    I: DataItem,
    V: SelectedValue,
    P: Pager,
    L: Loader<I, V, P>,
{
    /// Start building a manager
    pub fn builder(
        pager: P,
        loader: L,
        strategy: ItemStrategy<I, V>,
    ) -> InputDataManagerBuilder<I, V, P, L> {
        InputDataManagerBuilder {
            name: "input-data".to_string(),
            pager,
            loader,
            strategy,
            config: ManagerConfig::default(),
            sufficient: None,
        }
    }

    /// Create a manager with the given configuration
    pub fn new(pager: P, loader: L, strategy: ItemStrategy<I, V>, config: ManagerConfig) -> Self {
        Self::builder(pager, loader, strategy).config(config).build()
    }

    fn from_builder(builder: InputDataManagerBuilder<I, V, P, L>) -> Self {
        let InputDataManagerBuilder {
            name,
            pager,
            loader,
            strategy,
            config,
            sufficient,
        } = builder;

        let inner = Arc::new_cyclic(|this: &Weak<ManagerInner<I, V, P, L>>| {
            let weak = this.clone();
            let queue = TaskQueue::new("input-data-queue", move |task: LoadTask<V>| {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => inner.run_load(task).await,
                        None => task.finish(false),
                    }
                }
                .boxed()
            });
            let (phase, _rx) = watch::channel(ManagerPhase::Idle);

            ManagerInner {
                name,
                config: config.clone(),
                pager,
                loader,
                strategy,
                sufficient,
                data_source: DataSource::new(),
                queue,
                selection: Mutex::new(Selection {
                    values: Vec::new(),
                    items: Vec::new(),
                }),
                search: Mutex::new(None),
                phase,
                deferred: Mutex::new(None),
                this: this.clone(),
            }
        });

        let weak = Arc::downgrade(&inner);
        let filter = Debouncer::new(
            config.filter_debounce(),
            move |(search, opts): (String, DataInitOptionals)| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_filter(search, opts);
                }
            },
        );

        let weak = Arc::downgrade(&inner);
        let next_page = Debouncer::new(config.next_page_debounce(), move |()| {
            if let Some(inner) = weak.upgrade() {
                inner.load_next_page();
            }
        });

        let weak = Arc::downgrade(&inner);
        let reconcile = Throttler::new(config.reconcile_throttle(), move |()| {
            if let Some(inner) = weak.upgrade() {
                inner.request_items_for_values();
            }
        });

        tracing::debug!("{}: manager created", inner.name);
        Self {
            inner,
            filter,
            next_page,
            reconcile,
        }
    }

    // ==================== Loading ====================

    /// Reset paging and load the first unfiltered page
    pub fn init(&self, opts: DataInitOptionals) -> LoadTicket {
        self.filter.cancel();
        self.inner.init(opts)
    }

    /// Debounced search; only the last text within the window is loaded
    pub fn filter(&self, search: impl Into<String>, opts: DataInitOptionals) {
        self.filter.call((search.into(), opts));
    }

    /// Debounced request for the next page of the current search
    ///
    /// Ignored once the data source is exhausted.
    pub fn request_next_page(&self) {
        self.next_page.call(());
    }

    /// Enqueue a raw load with the given hints
    pub fn load_data(&self, optionals: LoaderOptionals<V>) -> LoadTicket {
        self.inner.load_data(optionals)
    }

    /// Wait until every queued load (continuations and deferred searches
    /// included) has run
    pub async fn settled(&self) {
        loop {
            self.inner.queue.idle().await;
            if self.inner.deferred.lock().is_none() && self.inner.queue.is_idle() {
                return;
            }
            // a deferred load is about to be replayed
            tokio::task::yield_now().await;
        }
    }

    // ==================== Selection ====================

    /// Replace the selected values
    ///
    /// Absent values (`None`, or whatever the strategy treats as absent) are
    /// dropped. Items are resolved from what is already known; nothing is
    /// fetched.
    pub fn set_selection<S>(&self, values: S)
    where
        S: IntoIterator,
        S::Item: Into<Option<V>>,
    {
        self.inner.set_selection(normalize(values));
    }

    /// Set the selection and fetch items for values that have none
    ///
    /// Returns `true` if a fetch was requested. Requests are throttled; a
    /// request inside the window is folded into one trailing fetch.
    ///
    /// Without pagination nothing is fetched; primitive values then stand in
    /// for their own items.
    pub fn sync<S>(&self, values: S) -> bool
    where
        S: IntoIterator,
        S::Item: Into<Option<V>>,
    {
        self.set_selection(values);
        if !self.inner.missing_items_for_values() {
            return false;
        }
        if !self.inner.config.paginate {
            self.inner.adopt_values_as_items();
            return false;
        }
        self.reconcile.call(());
        true
    }

    /// Currently selected values
    pub fn selected_values(&self) -> Vec<V> {
        self.inner.selection.lock().values.clone()
    }

    /// Items resolved for the selected values, in selection order
    pub fn selected_items(&self) -> Vec<I> {
        self.inner.selection.lock().items.clone()
    }

    /// Check if some selected value has no known item
    pub fn has_missing_items(&self) -> bool {
        self.inner.missing_items_for_values()
    }

    // ==================== State ====================

    /// Selected items missing from the loaded data, followed by the loaded data
    pub fn data(&self) -> Vec<I> {
        self.inner.data()
    }

    pub fn state(&self) -> ManagerState<I, P::State> {
        self.inner.state()
    }

    pub fn is_exhausted(&self) -> bool {
        self.inner.data_source.is_exhausted()
    }

    /// Search text of the last applied filter
    pub fn search(&self) -> Option<String> {
        self.inner.search.lock().clone()
    }

    /// Replace the loaded data, e.g. with a cached result
    pub fn set_data(&self, data: Vec<I>) {
        self.inner.pager.reset();
        self.inner.data_source.set_data(data);
        self.inner.refresh_selected_items();
    }

    /// Clear data and pager; responses still in flight are discarded
    pub fn reset(&self) {
        self.next_page.cancel();
        self.inner.reset();
    }

    pub fn phase(&self) -> ManagerPhase {
        *self.inner.phase.borrow()
    }

    /// Observe phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<ManagerPhase> {
        self.inner.phase.subscribe()
    }

    /// Observe the loaded data
    pub fn subscribe(&self) -> watch::Receiver<DataSourceState<I>> {
        self.inner.data_source.subscribe()
    }

    /// Number of loads waiting in the queue
    pub fn pending_loads(&self) -> usize {
        self.inner.queue.len()
    }

    /// Admission mode of the load queue
    pub fn queue_mode(&self) -> QueueMode {
        self.inner.queue.mode()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Cancel timers and drop pending loads
    pub fn shutdown(&self) {
        self.filter.cancel();
        self.next_page.cancel();
        self.reconcile.cancel();
        if let Some(task) = self.inner.deferred.lock().take() {
            task.finish(false);
        }
        self.inner.queue.reset();
        tracing::debug!("{}: manager shut down", self.inner.name);
    }
}

impl<I, V, P, L> fmt::Debug for InputDataManager<I, V, P, L>
where
    I: DataItem,
    V: SelectedValue,
    P: Pager,
    L: Loader<I, V, P>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputDataManager")
            .field("name", &self.inner.name)
            .field("items", &self.inner.data_source.len())
            .field("phase", &self.phase())
            .field("pending_loads", &self.pending_loads())
            .finish()
    }
}

fn normalize<V, S>(values: S) -> Vec<V>
where
    S: IntoIterator,
    S::Item: Into<Option<V>>,
{
    values.into_iter().filter_map(Into::into).collect()
}

impl<I, V, P, L> ManagerInner<I, V, P, L>
where
    I: DataItem,
    V: SelectedValue,
    P: Pager,
    L: Loader<I, V, P>,
{
    fn init(&self, opts: DataInitOptionals) -> LoadTicket {
        self.restart(LoaderOptionals {
            req_total_count: opts.req_total_count,
            ..Default::default()
        })
    }

    fn apply_filter(&self, search: String, opts: DataInitOptionals) -> LoadTicket {
        let search = (!search.is_empty()).then_some(search);
        tracing::debug!("{}: filter {:?}", self.name, search);

        self.restart(LoaderOptionals {
            search,
            req_total_count: opts.req_total_count,
            ..Default::default()
        })
    }

    /// Load the first page of a new search
    ///
    /// While a selection fetch runs the load is held back and replayed once
    /// the queue drains, so the fetch is neither invalidated nor lost.
    fn restart(&self, optionals: LoaderOptionals<V>) -> LoadTicket {
        let (task, ticket) = LoadTask::new(optionals, 0);
        if self.queue.mode() == QueueMode::Privileged {
            self.defer(task);
        } else {
            self.start(task);
        }
        ticket
    }

    fn start(&self, task: LoadTask<V>) {
        *self.search.lock() = task.optionals.search.clone();
        self.pager.reset();
        if !self.queue.set_task(task.clone()) {
            // a selection fetch slipped in since the mode check
            self.defer(task);
        }
    }

    fn defer(&self, task: LoadTask<V>) {
        tracing::debug!(
            "{}: selected items are being fetched, load deferred",
            self.name
        );
        let superseded = self.deferred.lock().replace(task);
        if let Some(superseded) = superseded {
            // the waiter is already running and picks up the newer load
            superseded.finish(false);
            return;
        }

        let queue = self.queue.clone();
        let this = self.this.clone();
        let waiter = spawn_named("deferred-load", async move {
            queue.idle().await;
            if let Some(inner) = this.upgrade() {
                inner.replay_deferred();
            }
        });
        if waiter.is_none()
            && let Some(task) = self.deferred.lock().take()
        {
            task.finish(false);
        }
    }

    fn replay_deferred(&self) {
        let Some(task) = self.deferred.lock().take() else {
            return;
        };
        tracing::debug!("{}: replaying deferred load", self.name);
        self.start(task);
    }

    fn load_next_page(&self) -> Option<LoadTicket> {
        if !self.config.paginate {
            return None;
        }
        if self.data_source.is_exhausted() {
            tracing::trace!("{}: exhausted, next page ignored", self.name);
            return None;
        }
        if !self.queue.is_idle() {
            // the running load already moves the pager forward
            tracing::trace!("{}: load in flight, next page ignored", self.name);
            return None;
        }

        let search = self.search.lock().clone();
        Some(self.load_data(LoaderOptionals {
            search,
            ..Default::default()
        }))
    }

    fn request_items_for_values(&self) -> Option<LoadTicket> {
        if !self.missing_items_for_values() {
            return None;
        }
        let values = self.selection.lock().values.clone();
        tracing::debug!(
            "{}: fetching items for {} selected value(s)",
            self.name,
            values.len()
        );

        *self.search.lock() = None;
        self.pager.reset();
        Some(self.load_data(LoaderOptionals::selection(values)))
    }

    fn load_data(&self, optionals: LoaderOptionals<V>) -> LoadTicket {
        self.enqueue(optionals, 0)
    }

    fn enqueue(&self, optionals: LoaderOptionals<V>, continuation: usize) -> LoadTicket {
        let (task, ticket) = LoadTask::new(optionals, continuation);
        if !self.queue.set_task(task) {
            tracing::warn!(
                "{}: load rejected while selected items are being fetched",
                self.name
            );
        }
        ticket
    }

    fn reset(&self) {
        self.pager.reset();
        self.data_source.reset();
    }

    // ==================== Execution ====================

    async fn run_load(self: Arc<Self>, task: LoadTask<V>) {
        let phase = if task.optionals.is_reconciliation() {
            ManagerPhase::Reconciling
        } else {
            ManagerPhase::Loading
        };
        self.phase.send_replace(phase);

        // captured at execution time so queued loads never reuse an offset
        let step = self.pager.advance(1);
        tracing::debug!(
            "{}: loading {:?} (continuation {})",
            self.name,
            step.info(),
            task.continuation
        );

        let load = self
            .loader
            .load(step.info().clone(), self.data(), task.optionals.clone());

        let applied = match load.await {
            Ok(result) => self.apply_page(step, result, &task),
            Err(err) => {
                tracing::error!("{}: data load failed: {}", self.name, err);
                self.pager.close(step, false, &P::Feedback::default());
                false
            }
        };

        task.finish(applied);
        if self.queue.is_empty() {
            self.phase.send_replace(ManagerPhase::Idle);
        }
    }

    fn apply_page(
        &self,
        step: Step<P::Info>,
        result: PageResult<I, P>,
        task: &LoadTask<V>,
    ) -> bool {
        if !self.pager.is_current(&step) {
            tracing::debug!("{}: discarding page of a superseded request", self.name);
            self.pager.close(step, false, &result.page);
            return false;
        }

        let merge = step.info().merge();
        let batch = result.data.len();
        let exhausted = result.exhausted || self.pager.finished(&step, batch, &result.page);

        let (data, fresh) = if merge {
            let mut data = self.data_source.data();
            let fresh = result
                .data
                .iter()
                .filter(|item| !data.contains(item))
                .count();
            data.extend(result.data);
            (data, fresh)
        } else {
            // a fresh first page also clears the exhausted latch
            self.data_source.reset();
            (result.data, batch)
        };
        let state = self
            .data_source
            .set_state(DataSourceUpdate::data(data).exhausted(exhausted));
        self.pager.close(step, true, &result.page);
        self.refresh_selected_items();

        let total = state.data.len();
        tracing::debug!(
            "{}: applied {} item(s), {} total, exhausted={}",
            self.name,
            batch,
            total,
            state.exhausted
        );

        if task.optionals.is_reconciliation() || state.exhausted || !self.config.paginate {
            return true;
        }

        let sufficient = result
            .sufficient_amount
            .unwrap_or_else(|| self.verify_sufficient_amount(total));
        if sufficient {
            return true;
        }

        if fresh == 0 {
            tracing::warn!("{}: page added no items, not loading further", self.name);
            return true;
        }
        if task.continuation >= self.config.max_continuations {
            tracing::warn!(
                "{}: stopped after {} follow-up loads",
                self.name,
                task.continuation
            );
            return true;
        }

        let next = LoaderOptionals {
            search: task.optionals.search.clone(),
            priority: task.optionals.priority,
            ..Default::default()
        };
        // follow-ups settle on their own; the origin's ticket resolves now
        let _ = self.enqueue(next, task.continuation + 1);
        true
    }

    fn verify_sufficient_amount(&self, count: usize) -> bool {
        match &self.sufficient {
            Some(f) => f(count),
            None => count >= self.config.min_items,
        }
    }

    // ==================== Selection ====================

    fn set_selection(&self, values: Vec<V>) {
        let values: Vec<V> = values
            .into_iter()
            .filter(|v| !self.strategy.is_absent(v))
            .collect();
        self.resolve_selection(Some(values));
    }

    fn refresh_selected_items(&self) {
        self.resolve_selection(None);
    }

    /// Re-resolve selected items, preferring freshly loaded ones
    fn resolve_selection(&self, values: Option<Vec<V>>) {
        let base = self.data_source.data();
        let mut selection = self.selection.lock();
        if let Some(values) = values {
            selection.values = values;
        }

        let mut pool = base;
        pool.extend(selection.items.iter().cloned());
        selection.items = self.strategy.resolve(&pool, &selection.values);
    }

    /// Use values as their own items where the strategy allows it
    fn adopt_values_as_items(&self) {
        let mut selection = self.selection.lock();
        let items: Option<Vec<I>> = selection
            .values
            .iter()
            .map(|value| self.strategy.item_for_value(value))
            .collect();
        if let Some(items) = items {
            selection.items = items;
        }
    }

    fn missing_items_for_values(&self) -> bool {
        let selection = self.selection.lock();
        selection.items.len() < selection.values.len()
    }

    // ==================== State ====================

    fn data(&self) -> Vec<I> {
        let base = self.data_source.data();
        let selection = self.selection.lock();

        let mut merged: Vec<I> = Vec::with_capacity(base.len() + selection.items.len());
        for item in &selection.items {
            if !base.contains(item) && !merged.contains(item) {
                merged.push(item.clone());
            }
        }
        merged.extend(base);
        merged
    }

    fn state(&self) -> ManagerState<I, P::State> {
        let DataSourceState { data, exhausted } = self.data_source.state();
        ManagerState {
            data,
            exhausted,
            pager: self.pager.state(),
            phase: *self.phase.borrow(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LoadResult;
    use crate::error::Error;
    use crate::paging::{Cursor, CursorAdvance, CursorPager, OffsetAdvance, OffsetPager};
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Calls<A> = Arc<Mutex<Vec<(A, LoaderOptionals<String>)>>>;

    /// Loader replaying a fixed sequence of pages
    #[derive(Clone, Default)]
    struct ScriptedLoader {
        pages: Arc<Mutex<VecDeque<crate::Result<PageResult<String, OffsetPager>>>>>,
        calls: Calls<OffsetAdvance>,
        gate: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    }

    impl ScriptedLoader {
        fn with_pages(pages: Vec<crate::Result<PageResult<String, OffsetPager>>>) -> Self {
            let loader = Self::default();
            loader.pages.lock().extend(pages);
            loader
        }

        /// Hold the next load until the returned sender fires
        fn gate(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.gate.lock() = Some(rx);
            tx
        }

        fn calls(&self) -> Vec<(OffsetAdvance, LoaderOptionals<String>)> {
            self.calls.lock().clone()
        }
    }

    impl Loader<String, String, OffsetPager> for ScriptedLoader {
        fn load(
            &self,
            info: OffsetAdvance,
            _current: Vec<String>,
            optionals: LoaderOptionals<String>,
        ) -> futures::future::BoxFuture<'static, crate::Result<PageResult<String, OffsetPager>>>
        {
            self.calls.lock().push((info, optionals));
            let page = self
                .pages
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(LoadResult::new(Vec::new())));
            let gate = self.gate.lock().take();
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                page
            }
            .boxed()
        }
    }

    /// Loader over an in-memory catalog; selection requests return the
    /// matching items plus their neighbours
    #[derive(Clone, Default)]
    struct CatalogLoader {
        catalog: Vec<String>,
        calls: Calls<OffsetAdvance>,
        gate: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    }

    impl CatalogLoader {
        fn new(catalog: &[&str]) -> Self {
            Self {
                catalog: strings(catalog),
                ..Default::default()
            }
        }

        /// Hold the next load until the returned sender fires
        fn gate(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.gate.lock() = Some(rx);
            tx
        }

        fn calls(&self) -> Vec<(OffsetAdvance, LoaderOptionals<String>)> {
            self.calls.lock().clone()
        }
    }

    impl Loader<String, String, OffsetPager> for CatalogLoader {
        fn load(
            &self,
            info: OffsetAdvance,
            _current: Vec<String>,
            optionals: LoaderOptionals<String>,
        ) -> futures::future::BoxFuture<'static, crate::Result<PageResult<String, OffsetPager>>>
        {
            self.calls.lock().push((info.clone(), optionals.clone()));
            let items: Vec<String> = match &optionals.search {
                Some(search) => self
                    .catalog
                    .iter()
                    .filter(|item| item.contains(search.as_str()))
                    .cloned()
                    .collect(),
                None => self.catalog.clone(),
            };
            let page = items
                .into_iter()
                .skip(info.skip)
                .take(info.take)
                .collect::<Vec<_>>();
            let gate = self.gate.lock().take();
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(LoadResult::new(page))
            }
            .boxed()
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn numbered(prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{prefix}{i}")).collect()
    }

    fn manager<L: Loader<String, String, OffsetPager>>(
        loader: L,
    ) -> PrimitiveInputDataManager<String, OffsetPager, L> {
        let config = ManagerConfig::default().with_take(10);
        InputDataManager::builder(OffsetPager::from_config(&config), loader, ItemStrategy::primitive())
            .config(config)
            .name("test")
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_loads_first_page() {
        let loader = ScriptedLoader::with_pages(vec![Ok(LoadResult::new(numbered("a", 10)))]);
        let manager = manager(loader.clone());

        assert!(manager.init(DataInitOptionals::default()).await);
        manager.settled().await;

        let state = manager.state();
        assert_eq!(state.data.len(), 10);
        assert!(!state.exhausted);
        assert_eq!(state.pager.step, 1);
        assert_eq!(state.phase, ManagerPhase::Idle);

        let calls = loader.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.skip, 0);
        assert!(!calls[0].0.merge);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loads_until_sufficient_or_exhausted() {
        let loader = ScriptedLoader::with_pages(vec![
            Ok(LoadResult::new(numbered("a", 10))),
            Ok(LoadResult::new(numbered("b", 4))),
        ]);
        let config = ManagerConfig::default().with_take(10);
        let manager = InputDataManager::builder(
            OffsetPager::from_config(&config),
            loader.clone(),
            ItemStrategy::primitive(),
        )
        .config(config)
        .sufficient_amount(|count| count >= 15)
        .build();

        assert!(manager.init(DataInitOptionals::default()).await);
        manager.settled().await;

        let calls = loader.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0.skip, 10);
        assert!(calls[1].0.merge);

        let state = manager.state();
        assert_eq!(state.data.len(), 14);
        assert!(state.exhausted);
        assert_eq!(state.pager.step, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_verdict_overrides_predicate() {
        let loader = ScriptedLoader::with_pages(vec![Ok(
            LoadResult::new(numbered("a", 10)).sufficient(true)
        )]);
        let config = ManagerConfig::default().with_take(10);
        let manager = InputDataManager::builder(
            OffsetPager::from_config(&config),
            loader.clone(),
            ItemStrategy::primitive(),
        )
        .config(config)
        .sufficient_amount(|_| false)
        .build();

        manager.init(DataInitOptionals::default()).await;
        manager.settled().await;
        assert_eq!(loader.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_rolls_back() {
        let loader = ScriptedLoader::with_pages(vec![
            Ok(LoadResult::new(numbered("a", 10))),
            Err(Error::loader("upstream unavailable")),
            Ok(LoadResult::new(numbered("b", 10))),
        ]);
        let manager = manager(loader.clone());

        assert!(manager.init(DataInitOptionals::default()).await);
        assert!(!manager.load_data(LoaderOptionals::default()).await);

        let state = manager.state();
        assert_eq!(state.pager.step, 1);
        assert_eq!(state.data.len(), 10);

        assert!(manager.load_data(LoaderOptionals::default()).await);
        let calls = loader.calls();
        assert_eq!(calls[1].0.skip, 10);
        assert_eq!(calls[2].0.skip, 10);
        assert_eq!(manager.state().pager.step, 2);
        assert_eq!(manager.data().len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_discarded() {
        let loader = ScriptedLoader::with_pages(vec![Ok(LoadResult::new(numbered("a", 10)))]);
        let release = loader.gate();
        let manager = manager(loader.clone());

        let ticket = manager.init(DataInitOptionals::default());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(loader.calls().len(), 1);

        manager.reset();
        let _ = release.send(());
        assert!(!ticket.await);
        manager.settled().await;

        let state = manager.state();
        assert!(state.data.is_empty());
        assert_eq!(state.pager.step, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_is_debounced() {
        let loader = CatalogLoader {
            catalog: strings(&["apple", "banana", "cherry", "blueberry"]),
            ..Default::default()
        };
        let manager = manager(loader.clone());

        manager.filter("a", DataInitOptionals::default());
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.filter("berry", DataInitOptionals::default());
        tokio::time::sleep(Duration::from_millis(300)).await;
        manager.settled().await;

        let calls = loader.calls.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.search.as_deref(), Some("berry"));
        assert_eq!(calls[0].0.skip, 0);
        assert_eq!(manager.data(), strings(&["blueberry"]));
        assert_eq!(manager.search().as_deref(), Some("berry"));
        assert!(manager.is_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_page_ignored_when_exhausted() {
        let loader = ScriptedLoader::with_pages(vec![Ok(LoadResult::new(numbered("a", 3)))]);
        let manager = manager(loader.clone());

        manager.init(DataInitOptionals::default()).await;
        assert!(manager.is_exhausted());

        manager.request_next_page();
        tokio::time::sleep(Duration::from_millis(300)).await;
        manager.settled().await;
        assert_eq!(loader.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_page_appends() {
        let loader = ScriptedLoader::with_pages(vec![
            Ok(LoadResult::new(numbered("a", 10))),
            Ok(LoadResult::new(numbered("b", 10))),
        ]);
        let manager = manager(loader.clone());

        manager.init(DataInitOptionals::default()).await;
        manager.request_next_page();
        manager.request_next_page();
        tokio::time::sleep(Duration::from_millis(300)).await;
        manager.settled().await;

        assert_eq!(loader.calls().len(), 2);
        let data = manager.data();
        assert_eq!(data.len(), 20);
        assert_eq!(data[10], "b0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_selected_items_precede_data() {
        let manager = manager(ScriptedLoader::default());

        manager.set_data(strings(&["x", "a"]));
        manager.set_selection(strings(&["x"]));
        assert_eq!(manager.selected_items(), strings(&["x"]));

        manager.set_data(strings(&["b", "c"]));
        assert_eq!(manager.data(), strings(&["x", "b", "c"]));

        manager.set_data(strings(&["x", "b"]));
        assert_eq!(manager.data(), strings(&["x", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_selection_drops_absent_values() {
        let manager = manager(ScriptedLoader::default());

        manager.set_selection(Some("x".to_string()));
        assert_eq!(manager.selected_values(), strings(&["x"]));

        manager.set_selection(vec![Some("x".to_string()), None, Some("y".to_string())]);
        assert_eq!(manager.selected_values(), strings(&["x", "y"]));

        manager.set_selection(None::<String>);
        assert!(manager.selected_values().is_empty());
        assert!(!manager.has_missing_items());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_fetches_missing_items() {
        let loader = CatalogLoader {
            catalog: strings(&["x", "y", "z"]),
            ..Default::default()
        };
        let manager = manager(loader.clone());
        manager.set_data(strings(&["x"]));

        assert!(manager.sync(strings(&["x", "y"])));
        manager.settled().await;

        let calls = loader.calls.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.selected_values, Some(strings(&["x", "y"])));
        assert!(calls[0].1.privileged);
        assert_eq!(calls[0].1.search, None);

        assert_eq!(manager.data(), strings(&["x", "y", "z"]));
        assert_eq!(manager.selected_items(), strings(&["x", "y"]));
        assert!(!manager.has_missing_items());
        assert_eq!(manager.phase(), ManagerPhase::Idle);
        assert_eq!(manager.queue_mode(), QueueMode::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_without_missing_items() {
        let loader = CatalogLoader::default();
        let manager = manager(loader.clone());
        manager.set_data(strings(&["x", "y"]));

        assert!(!manager.sync(strings(&["y"])));
        manager.settled().await;
        assert!(loader.calls.lock().is_empty());
        assert_eq!(manager.selected_items(), strings(&["y"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_is_throttled() {
        let loader = CatalogLoader {
            catalog: strings(&["x", "y"]),
            ..Default::default()
        };
        let manager = manager(loader.clone());

        assert!(manager.sync(strings(&["x"])));
        manager.settled().await;
        assert!(manager.sync(strings(&["q"])));
        assert!(manager.sync(strings(&["r"])));
        manager.settled().await;
        assert_eq!(loader.calls.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(3100)).await;
        manager.settled().await;
        let calls = loader.calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1.selected_values, Some(strings(&["r"])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_during_selection_fetch_runs_afterwards() {
        let loader = CatalogLoader::new(&["x", "y", "z", "b1", "b2"]);
        let manager = manager(loader.clone());
        manager.set_data(strings(&["x"]));

        let release = loader.gate();
        assert!(manager.sync(strings(&["x", "y"])));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.phase(), ManagerPhase::Reconciling);

        manager.filter("b", DataInitOptionals::default());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(loader.calls().len(), 1);
        assert_eq!(manager.search(), None);

        let _ = release.send(());
        manager.settled().await;

        let calls = loader.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1.search.as_deref(), Some("b"));
        assert_eq!(calls[1].0.skip, 0);
        assert!(!calls[1].1.privileged);

        assert_eq!(manager.search().as_deref(), Some("b"));
        assert_eq!(manager.selected_items(), strings(&["x", "y"]));
        assert!(!manager.has_missing_items());
        assert_eq!(manager.data(), strings(&["x", "y", "b1", "b2"]));
        assert_eq!(manager.queue_mode(), QueueMode::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_during_selection_fetch_keeps_fetched_items() {
        let loader = CatalogLoader::new(&["x", "y"]);
        let manager = manager(loader.clone());

        let release = loader.gate();
        assert!(manager.sync(strings(&["y"])));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let ticket = manager.init(DataInitOptionals::default());
        let _ = release.send(());
        assert!(ticket.await);
        manager.settled().await;

        let calls = loader.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.privileged);
        assert!(!calls[1].1.privileged);
        assert_eq!(manager.selected_items(), strings(&["y"]));
        assert_eq!(manager.data(), strings(&["x", "y"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_page_stops_loading() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader = move |_info: OffsetAdvance, _current: Vec<String>, _opts: LoaderOptionals<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            let result: crate::Result<PageResult<String, OffsetPager>> =
                Ok(LoadResult::new(numbered("a", 10)));
            async move { result }
        };
        let config = ManagerConfig::default().with_take(10);
        let manager = InputDataManager::builder(
            OffsetPager::from_config(&config),
            loader,
            ItemStrategy::primitive(),
        )
        .config(config)
        .sufficient_amount(|_| false)
        .build();

        manager.init(DataInitOptionals::default()).await;
        manager.settled().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!manager.is_exhausted());
        assert_eq!(manager.pending_loads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_loads_are_capped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader = move |info: OffsetAdvance, _current: Vec<String>, _opts: LoaderOptionals<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            let page = numbered(&format!("p{}-", info.skip), info.take);
            let result: crate::Result<PageResult<String, OffsetPager>> = Ok(LoadResult::new(page));
            async move { result }
        };
        let config = ManagerConfig {
            max_continuations: 3,
            ..ManagerConfig::default().with_take(10)
        };
        let manager = InputDataManager::builder(
            OffsetPager::from_config(&config),
            loader,
            ItemStrategy::primitive(),
        )
        .config(config)
        .sufficient_amount(|_| false)
        .build();

        manager.init(DataInitOptionals::default()).await;
        manager.settled().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3 + 1);
        assert_eq!(manager.data().len(), 40);
        assert_eq!(manager.state().pager.step, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpaginated_sync_uses_values_as_items() {
        let loader = CatalogLoader::new(&["x", "y"]);
        let config = ManagerConfig::default().with_take(10).with_paginate(false);
        let manager = InputDataManager::builder(
            OffsetPager::from_config(&config),
            loader.clone(),
            ItemStrategy::primitive(),
        )
        .config(config)
        .build();
        manager.set_data(strings(&["x"]));

        assert!(!manager.sync(strings(&["x", "q"])));
        manager.settled().await;

        assert!(loader.calls().is_empty());
        assert_eq!(manager.selected_items(), strings(&["x", "q"]));
        assert!(!manager.has_missing_items());
        assert_eq!(manager.data(), strings(&["q", "x"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpaginated_record_sync_leaves_items_missing() {
        let loader = |_info: OffsetAdvance, _current: Vec<Value>, _opts: LoaderOptionals<Value>| {
            let result: crate::Result<PageResult<Value, OffsetPager>> =
                Ok(LoadResult::new(Vec::new()));
            async move { result }
        };
        let manager: RecordInputDataManager<OffsetPager, _> = InputDataManager::new(
            OffsetPager::new(10),
            loader,
            ItemStrategy::record(Some("id")),
            ManagerConfig::default().with_paginate(false),
        );

        assert!(!manager.sync(vec![json!(5)]));
        assert!(manager.selected_items().is_empty());
        assert!(manager.has_missing_items());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_state() {
        let loader = ScriptedLoader::with_pages(vec![Ok(LoadResult::new(numbered("a", 3)))]);
        let manager = manager(loader);

        manager.init(DataInitOptionals::default()).await;
        assert!(manager.is_exhausted());

        manager.reset();
        let state = manager.state();
        assert!(state.data.is_empty());
        assert!(!state.exhausted);
        assert_eq!(state.pager.step, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_manager_by_value_key() {
        let records = vec![
            json!({"id": 1, "name": "one"}),
            json!({"id": 2, "name": "two"}),
        ];
        let loader = move |info: OffsetAdvance, _current: Vec<Value>, _opts: LoaderOptionals<Value>| {
            let page: Vec<Value> = records.iter().skip(info.skip).take(info.take).cloned().collect();
            let result: crate::Result<PageResult<Value, OffsetPager>> =
                Ok(LoadResult::new(page).exhausted(true));
            async move { result }
        };
        let manager: RecordInputDataManager<OffsetPager, _> = InputDataManager::new(
            OffsetPager::new(10),
            loader,
            ItemStrategy::record(Some("id")),
            ManagerConfig::default(),
        );

        manager.init(DataInitOptionals::default()).await;
        manager.set_selection(vec![json!(2), Value::Null]);
        assert_eq!(manager.selected_values(), vec![json!(2)]);
        assert_eq!(manager.selected_items(), vec![json!({"id": 2, "name": "two"})]);
        assert_eq!(manager.data().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_pager_follows_tokens() {
        let calls: Arc<Mutex<Vec<CursorAdvance>>> = Arc::default();
        let seen = calls.clone();
        let loader = move |info: CursorAdvance, _current: Vec<String>, _opts: LoaderOptionals<String>| {
            seen.lock().push(info.clone());
            let page = match info.next_page.as_deref() {
                None => LoadResult::new(numbered("a", 5)).page(Cursor {
                    prev_page: None,
                    next_page: Some("p2".to_string()),
                }),
                Some(_) => LoadResult::new(numbered("b", 5)),
            };
            let result: crate::Result<PageResult<String, CursorPager>> = Ok(page);
            async move { result }
        };
        let manager = InputDataManager::builder(CursorPager::new(5), loader, ItemStrategy::primitive())
            .sufficient_amount(|count| count >= 8)
            .build();

        manager.init(DataInitOptionals::default()).await;
        manager.settled().await;

        let calls = calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].next_page.as_deref(), Some("p2"));
        assert_eq!(manager.data().len(), 10);
        assert!(manager.is_exhausted());
    }
}
