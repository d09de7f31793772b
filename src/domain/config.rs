//! Config - Data Manager Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_MIN_ITEMS, DEFAULT_TAKE, FILTER_DEBOUNCE_MS, MAX_CONTINUATIONS, NEXT_PAGE_DEBOUNCE_MS,
    RECONCILE_THROTTLE_MS,
};
use crate::error::{Error, Result};

/// Input data manager configuration
///
/// Every field has a default, so partial TOML files are fine:
///
/// ```toml
/// take = 50
/// filter_debounce_ms = 300
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Page size
    pub take: usize,
    /// Debounce window for search input
    pub filter_debounce_ms: u64,
    /// Debounce window for "load next page" signals
    pub next_page_debounce_ms: u64,
    /// Throttle window for out-of-band missing item requests (0 = off)
    pub reconcile_throttle_ms: u64,
    /// Item count considered sufficient when no predicate is injected
    pub min_items: usize,
    /// Maximum automatic follow-up loads per request
    pub max_continuations: usize,
    /// Page through the source; when off, missing selected items are never
    /// fetched and no follow-up pages are loaded
    pub paginate: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            take: DEFAULT_TAKE,
            filter_debounce_ms: FILTER_DEBOUNCE_MS,
            next_page_debounce_ms: NEXT_PAGE_DEBOUNCE_MS,
            reconcile_throttle_ms: RECONCILE_THROTTLE_MS,
            min_items: DEFAULT_MIN_ITEMS,
            max_continuations: MAX_CONTINUATIONS,
            paginate: true,
        }
    }
}

impl ManagerConfig {
    /// Parse from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings that would stall paging
    pub fn validate(&self) -> Result<()> {
        if self.take == 0 {
            return Err(Error::invalid("take must be greater than zero"));
        }
        Ok(())
    }

    /// Turn paging on or off
    pub fn with_paginate(mut self, paginate: bool) -> Self {
        self.paginate = paginate;
        self
    }

    /// Page size override
    pub fn with_take(mut self, take: usize) -> Self {
        self.take = take;
        self
    }

    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }

    pub fn next_page_debounce(&self) -> Duration {
        Duration::from_millis(self.next_page_debounce_ms)
    }

    pub fn reconcile_throttle(&self) -> Duration {
        Duration::from_millis(self.reconcile_throttle_ms)
    }
}
