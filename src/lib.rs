//! Pagekeeper Library
//!
//! Asynchronous, paginated and selection-aware data supply for searchable
//! selection widgets (selects, autocompletes, lookups).
//!
//! The [`data::InputDataManager`] drives everything: it schedules loads on a
//! serial [`queue::TaskQueue`], asks a [`paging::Pager`] for page parameters,
//! calls a user supplied [`data::Loader`] and merges the pages into a
//! [`data::DataSource`], while keeping the items behind the current selection
//! visible.

pub mod constants;
pub mod data;
pub mod domain;
pub mod error;
pub mod helpers;
pub mod paging;
pub mod queue;
pub mod services;
pub mod state;
pub mod utils;

pub use error::{Error, Result};
