//! Domain - Pure Data Structures
//!
//! Configuration and item matching rules, independent of the async layer.

pub mod config;
pub mod item;
