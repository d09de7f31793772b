//! State Building Blocks
//!
//! Observable state containers shared by the pagers and data sources.

mod container;

pub use container::*;
