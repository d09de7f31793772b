//! Utility Functions
//!
//! Configuration file persistence.

mod config_store;

pub use config_store::*;
