//! Data Layer Constants
//!
//! Centralized defaults for paging, rate limiting and auto continuation.

/// Default page size
pub const DEFAULT_TAKE: usize = 20;

/// Trailing-edge debounce applied to search input
pub const FILTER_DEBOUNCE_MS: u64 = 250;

/// Debounce applied to "viewport near end" signals
pub const NEXT_PAGE_DEBOUNCE_MS: u64 = 250;

/// Minimum interval between out-of-band requests for missing selected items
pub const RECONCILE_THROTTLE_MS: u64 = 3000;

/// Item count considered enough to fill the visible list
pub const DEFAULT_MIN_ITEMS: usize = 10;

/// Upper bound on automatic follow-up page loads after one request
pub const MAX_CONTINUATIONS: usize = 32;
