//! Helper Utilities
//!
//! Rate limiting primitives used by the data managers.

mod debounce;

pub use debounce::*;
