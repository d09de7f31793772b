//! Service Layer
//!
//! Runtime plumbing shared by the queue and the rate limiters.

mod runtime;

pub use runtime::*;
