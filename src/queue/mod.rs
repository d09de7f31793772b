//! Task Scheduling
//!
//! Serial, priority-aware execution of asynchronous work.

mod task_queue;

pub use task_queue::*;
