//! Data Layer
//!
//! Data sources, the loader contract, and the input data manager that ties
//! paging, loading and selection together.

mod data_source;
mod loader;
mod manager;

pub use data_source::*;
pub use loader::*;
pub use manager::*;
