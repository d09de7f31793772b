//! Loader Contract
//!
//! The loader is the only component that talks to the upstream source. It
//! receives the page parameters produced by the pager, the items currently
//! visible and the request hints, and returns one page.

use futures::future::BoxFuture;
use std::future::Future;

use crate::error::Result;
use crate::paging::Pager;

/// Hints attached to a load request
#[derive(Clone, Debug, PartialEq)]
pub struct LoaderOptionals<V> {
    /// Search text scoping the request
    pub search: Option<String>,
    /// Values whose items must be fetched out of band
    pub selected_values: Option<Vec<V>>,
    /// Ask the loader to report the upstream total
    pub req_total_count: bool,
    /// Queue priority of the load
    pub priority: Option<i32>,
    /// Run the load as a privileged queue task
    pub privileged: bool,
}

impl<V> Default for LoaderOptionals<V> {
    fn default() -> Self {
        Self {
            search: None,
            selected_values: None,
            req_total_count: false,
            priority: None,
            privileged: false,
        }
    }
}

impl<V> LoaderOptionals<V> {
    /// Request scoped to a search text
    pub fn search(search: impl Into<String>) -> Self {
        Self {
            search: Some(search.into()),
            ..Default::default()
        }
    }

    /// Privileged request for the items behind `values`
    pub fn selection(values: Vec<V>) -> Self {
        Self {
            selected_values: Some(values),
            privileged: true,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_total_count(mut self) -> Self {
        self.req_total_count = true;
        self
    }

    /// Check if this request reconciles selected values
    pub fn is_reconciliation(&self) -> bool {
        self.selected_values.is_some()
    }
}

/// Options a consumer passes to `init`/`filter`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataInitOptionals {
    pub req_total_count: bool,
}

/// One page returned by a loader
#[derive(Clone, Debug, PartialEq)]
pub struct LoadResult<I, F> {
    /// Items of this page
    pub data: Vec<I>,
    /// Upstream has no further pages
    pub exhausted: bool,
    /// Loader's own verdict on whether enough items are visible
    pub sufficient_amount: Option<bool>,
    /// Pager feedback (cursor tokens, total count)
    pub page: F,
}

impl<I, F: Default> LoadResult<I, F> {
    pub fn new(data: Vec<I>) -> Self {
        Self {
            data,
            exhausted: false,
            sufficient_amount: None,
            page: F::default(),
        }
    }

    pub fn exhausted(mut self, exhausted: bool) -> Self {
        self.exhausted = exhausted;
        self
    }

    pub fn sufficient(mut self, sufficient: bool) -> Self {
        self.sufficient_amount = Some(sufficient);
        self
    }

    pub fn page(mut self, page: F) -> Self {
        self.page = page;
        self
    }
}

/// Result of one loader call for pager `P`
pub type PageResult<I, P> = LoadResult<I, <P as Pager>::Feedback>;

/// Upstream page fetcher
pub trait Loader<I, V, P: Pager>: Send + Sync + 'static {
    fn load(
        &self,
        info: P::Info,
        current: Vec<I>,
        optionals: LoaderOptionals<V>,
    ) -> BoxFuture<'static, Result<PageResult<I, P>>>;
}

impl<I, V, P, F, Fut> Loader<I, V, P> for F
where
    P: Pager,
    F: Fn(P::Info, Vec<I>, LoaderOptionals<V>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PageResult<I, P>>> + Send + 'static,
{
    fn load(
        &self,
        info: P::Info,
        current: Vec<I>,
        optionals: LoaderOptionals<V>,
    ) -> BoxFuture<'static, Result<PageResult<I, P>>> {
        Box::pin(self(info, current, optionals))
    }
}
